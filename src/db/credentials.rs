//! # Credential Database Operations
//!
//! SQLite implementation of [`CredentialRegistry`].
//!
//! ## Security Note
//! Only public keys are stored. Private keys never leave the authenticator.
//!
//! ## Atomicity
//! `update_counter` folds the regression check into the `UPDATE ... WHERE`
//! clause, so two concurrent assertions presenting the same counter cannot both
//! be accepted.

use crate::db::models::CredentialRow;
use crate::error::StoreError;
use crate::registry::{CredentialRecord, CredentialRegistry, RegistryError};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

#[derive(Debug, Clone)]
pub struct SqliteCredentialRegistry {
    pool: SqlitePool,
}

impl SqliteCredentialRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialRegistry for SqliteCredentialRegistry {
    /// Returns an empty vector for users without credentials.
    async fn list_for_user(&self, owner: &str) -> Result<Vec<CredentialRecord>, RegistryError> {
        let rows = sqlx::query_as::<_, CredentialRow>(
            "SELECT * FROM credentials WHERE owner = ? ORDER BY created_at",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| CredentialRecord::try_from(row).map_err(RegistryError::from))
            .collect()
    }

    async fn insert(&self, record: &CredentialRecord) -> Result<(), RegistryError> {
        // Convert transports vector to a JSON array for storage
        let transports_json = if record.transports.is_empty() {
            None
        } else {
            Some(
                serde_json::to_string(&record.transports)
                    .map_err(|e| StoreError::Corrupt(format!("transports: {e}")))?,
            )
        };

        let result = sqlx::query(
            "INSERT INTO credentials
             (credential_id, owner, public_key, algorithm, sign_count, transports, attachment,
              backup_eligible, backup_state, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.credential_id)
        .bind(&record.owner)
        .bind(&record.public_key)
        .bind(record.algorithm as i64)
        .bind(record.sign_count as i64)
        .bind(transports_json)
        .bind(&record.attachment)
        .bind(record.backup_eligible)
        .bind(record.backup_state)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(RegistryError::Duplicate)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_credential_id(
        &self,
        credential_id: &[u8],
    ) -> Result<CredentialRecord, RegistryError> {
        let row = sqlx::query_as::<_, CredentialRow>(
            "SELECT * FROM credentials WHERE credential_id = ?",
        )
        .bind(credential_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RegistryError::NotFound)?;

        Ok(CredentialRecord::try_from(row)?)
    }

    /// Update the signature counter after a verified assertion.
    ///
    /// Accepts the new value when the stored counter is `0` (authenticator
    /// without counter support) or the new value is strictly greater. Also
    /// stamps `last_used_at`.
    async fn update_counter(
        &self,
        credential_id: &[u8],
        new_counter: u32,
    ) -> Result<(), RegistryError> {
        let now = Utc::now().to_rfc3339();

        let updated = sqlx::query(
            "UPDATE credentials
             SET sign_count = ?, last_used_at = ?
             WHERE credential_id = ? AND (sign_count = 0 OR sign_count < ?)",
        )
        .bind(new_counter as i64)
        .bind(now)
        .bind(credential_id)
        .bind(new_counter as i64)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 1 {
            return Ok(());
        }

        // Nothing changed: either the credential is gone or the counter regressed.
        let stored: Option<i64> =
            sqlx::query_scalar("SELECT sign_count FROM credentials WHERE credential_id = ?")
                .bind(credential_id)
                .fetch_optional(&self.pool)
                .await?;

        match stored {
            None => Err(RegistryError::NotFound),
            Some(stored) => Err(RegistryError::CounterRegression {
                stored: u32::try_from(stored).unwrap_or(u32::MAX),
                presented: new_counter,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::registry::COSE_ALG_ES256;
    use std::sync::Arc;

    fn record(id: &[u8], owner: &str, sign_count: u32) -> CredentialRecord {
        CredentialRecord {
            credential_id: id.to_vec(),
            owner: owner.to_string(),
            public_key: vec![0xa5, 0x01, 0x02],
            algorithm: COSE_ALG_ES256,
            sign_count,
            transports: vec!["internal".to_string(), "hybrid".to_string()],
            attachment: Some("platform".to_string()),
            backup_eligible: true,
            backup_state: false,
            created_at: Utc::now(),
            last_used_at: None,
        }
    }

    async fn registry() -> SqliteCredentialRegistry {
        SqliteCredentialRegistry::new(db::connect_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn insert_and_find() {
        let reg = registry().await;
        let rec = record(b"cred-1", "u1", 0);
        reg.insert(&rec).await.unwrap();

        let found = reg.find_by_credential_id(b"cred-1").await.unwrap();
        assert_eq!(found.owner, "u1");
        assert_eq!(found.transports, rec.transports);
        assert_eq!(found.attachment.as_deref(), Some("platform"));
        assert!(found.backup_eligible);

        assert!(matches!(
            reg.find_by_credential_id(b"missing").await,
            Err(RegistryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn duplicate_id_rejected_even_for_other_user() {
        let reg = registry().await;
        reg.insert(&record(b"cred-1", "u1", 0)).await.unwrap();
        let dup = reg.insert(&record(b"cred-1", "u2", 0)).await;
        assert!(matches!(dup, Err(RegistryError::Duplicate)));

        // The original owner is untouched.
        let found = reg.find_by_credential_id(b"cred-1").await.unwrap();
        assert_eq!(found.owner, "u1");
    }

    #[tokio::test]
    async fn list_is_scoped_to_owner() {
        let reg = registry().await;
        reg.insert(&record(b"a", "u1", 0)).await.unwrap();
        reg.insert(&record(b"b", "u1", 0)).await.unwrap();
        reg.insert(&record(b"c", "u2", 0)).await.unwrap();

        let u1 = reg.list_for_user("u1").await.unwrap();
        assert_eq!(u1.len(), 2);
        assert!(u1.iter().all(|r| r.owner == "u1"));
        assert!(reg.list_for_user("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn counter_must_increase_once_nonzero() {
        let reg = registry().await;
        reg.insert(&record(b"cred", "u1", 0)).await.unwrap();

        reg.update_counter(b"cred", 5).await.unwrap();
        let err = reg.update_counter(b"cred", 5).await.unwrap_err();
        assert!(matches!(
            err,
            RegistryError::CounterRegression { stored: 5, presented: 5 }
        ));
        assert!(matches!(
            reg.update_counter(b"cred", 3).await,
            Err(RegistryError::CounterRegression { .. })
        ));
        reg.update_counter(b"cred", 6).await.unwrap();

        let found = reg.find_by_credential_id(b"cred").await.unwrap();
        assert_eq!(found.sign_count, 6);
        assert!(found.last_used_at.is_some());
    }

    #[tokio::test]
    async fn zero_counter_authenticators_are_exempt() {
        let reg = registry().await;
        reg.insert(&record(b"cred", "u1", 0)).await.unwrap();
        reg.update_counter(b"cred", 0).await.unwrap();
        reg.update_counter(b"cred", 0).await.unwrap();
    }

    #[tokio::test]
    async fn update_unknown_credential() {
        let reg = registry().await;
        assert!(matches!(
            reg.update_counter(b"ghost", 1).await,
            Err(RegistryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn racing_updates_accept_one_counter_value() {
        let reg = Arc::new(registry().await);
        reg.insert(&record(b"cred", "u1", 1)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let reg = reg.clone();
            handles.push(tokio::spawn(async move { reg.update_counter(b"cred", 2).await.is_ok() }));
        }
        let mut accepted = 0;
        for h in handles {
            if h.await.unwrap() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
    }
}
