use crate::challenge::{CeremonyKind, Challenge, ChallengeError, ChallengeStore};
use crate::db::models::ChallengeRow;
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use subtle::ConstantTimeEq;

/// Challenge store shared by every process that points at the same database.
#[derive(Debug, Clone)]
pub struct SqliteChallengeStore {
    pool: SqlitePool,
    ttl: Duration,
}

impl SqliteChallengeStore {
    pub fn new(pool: SqlitePool, ttl: Duration) -> Self {
        Self { pool, ttl }
    }

    /// Delete the row for the key only if it still holds `challenge`; a
    /// challenge issued in the meantime survives.
    async fn remove_if_current(
        &self,
        user_id: &str,
        kind: CeremonyKind,
        challenge: &[u8],
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "DELETE FROM challenges WHERE user_id = ? AND kind = ? AND challenge = ?",
        )
        .bind(user_id)
        .bind(kind.as_str())
        .bind(challenge)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ChallengeStore for SqliteChallengeStore {
    fn ttl(&self) -> Duration {
        self.ttl
    }

    async fn issue_at(
        &self,
        user_id: &str,
        kind: CeremonyKind,
        now: DateTime<Utc>,
    ) -> Result<Challenge, StoreError> {
        let challenge = Challenge::generate(now + self.ttl);

        // The (user_id, kind) primary key makes this replace any earlier challenge.
        sqlx::query(
            "INSERT OR REPLACE INTO challenges (user_id, kind, challenge, created_at, expires_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(kind.as_str())
        .bind(challenge.as_bytes())
        .bind(now.timestamp_millis())
        .bind(challenge.expires_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(challenge)
    }

    async fn consume_at(
        &self,
        user_id: &str,
        kind: CeremonyKind,
        presented: &[u8],
        now: DateTime<Utc>,
    ) -> Result<(), ChallengeError> {
        let row = sqlx::query_as::<_, ChallengeRow>(
            "SELECT challenge, expires_at FROM challenges WHERE user_id = ? AND kind = ?",
        )
        .bind(user_id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;

        let Some(row) = row else {
            return Err(ChallengeError::Absent);
        };

        if now.timestamp_millis() >= row.expires_at {
            self.remove_if_current(user_id, kind, &row.challenge).await?;
            return Err(ChallengeError::Expired);
        }

        if !bool::from(row.challenge.as_slice().ct_eq(presented)) {
            return Err(ChallengeError::Mismatch);
        }

        // Of two racing consumers only one removes the row.
        if self.remove_if_current(user_id, kind, &row.challenge).await? == 1 {
            Ok(())
        } else {
            Err(ChallengeError::Absent)
        }
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM challenges WHERE expires_at <= ?")
            .bind(now.timestamp_millis())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
