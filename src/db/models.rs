//! # Database Models
//!
//! Row types that map one-to-one onto the tables in `migrations/`.
//! They are converted into domain types ([`CredentialRecord`]) at the edge of the
//! `db` module so the rest of the crate never sees SQLite representations.
//!
//! ## Representation choices
//! - Timestamps on credentials are RFC3339 text, matching what SQLite tools display
//! - Challenge expiry is stored as Unix milliseconds so `expires_at <= ?` compares
//!   numerically
//! - Transports are a JSON array in a TEXT column

use crate::error::StoreError;
use crate::registry::CredentialRecord;
use chrono::{DateTime, Utc};

/// A row of the `credentials` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CredentialRow {
    pub credential_id: Vec<u8>,
    pub owner: String,
    pub public_key: Vec<u8>,
    pub algorithm: i64,
    /// u32 widened to i64 for SQLite
    pub sign_count: i64,
    pub transports: Option<String>,
    pub attachment: Option<String>,
    pub backup_eligible: bool,
    pub backup_state: bool,
    pub created_at: String,
    pub last_used_at: Option<String>,
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| StoreError::Corrupt(format!("invalid timestamp '{value}'")))
}

impl TryFrom<CredentialRow> for CredentialRecord {
    type Error = StoreError;

    fn try_from(row: CredentialRow) -> Result<Self, Self::Error> {
        let transports = match row.transports.as_deref() {
            Some(json) => serde_json::from_str(json)
                .map_err(|e| StoreError::Corrupt(format!("invalid transports: {e}")))?,
            None => Vec::new(),
        };
        let sign_count = u32::try_from(row.sign_count)
            .map_err(|_| StoreError::Corrupt(format!("sign_count out of range: {}", row.sign_count)))?;
        let algorithm = i32::try_from(row.algorithm)
            .map_err(|_| StoreError::Corrupt(format!("algorithm out of range: {}", row.algorithm)))?;

        Ok(CredentialRecord {
            credential_id: row.credential_id,
            owner: row.owner,
            public_key: row.public_key,
            algorithm,
            sign_count,
            transports,
            attachment: row.attachment,
            backup_eligible: row.backup_eligible,
            backup_state: row.backup_state,
            created_at: parse_timestamp(&row.created_at)?,
            last_used_at: row.last_used_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

/// The parts of a `challenges` row needed to judge a presented challenge.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChallengeRow {
    pub challenge: Vec<u8>,
    /// Unix milliseconds
    pub expires_at: i64,
}
