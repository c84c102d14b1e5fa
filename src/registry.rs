//! # Credential Registry
//!
//! Durable mapping from a user to the public-key credentials they registered.
//! The SQLite implementation lives in [`crate::db::credentials`].
//!
//! ## Signature counter
//! Authenticators that support counters increment one on every assertion. If a
//! presented counter is not strictly greater than the stored one, two copies of
//! the private key may exist and the ceremony must be denied. Authenticators that
//! always report `0` are exempt: a stored counter of `0` accepts any value.

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// COSE algorithm identifier for ECDSA P-256 with SHA-256.
pub const COSE_ALG_ES256: i32 = -7;
/// COSE algorithm identifier for Ed25519.
pub const COSE_ALG_EDDSA: i32 = -8;

/// One registered authenticator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub credential_id: Vec<u8>,
    pub owner: String,
    /// COSE_Key bytes as produced by the authenticator.
    pub public_key: Vec<u8>,
    /// COSE algorithm the key is used with.
    pub algorithm: i32,
    pub sign_count: u32,
    pub transports: Vec<String>,
    pub attachment: Option<String>,
    pub backup_eligible: bool,
    pub backup_state: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("credential already registered")]
    Duplicate,

    #[error("credential not found")]
    NotFound,

    #[error("counter regression: stored {stored}, presented {presented}")]
    CounterRegression { stored: u32, presented: u32 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<sqlx::Error> for RegistryError {
    fn from(e: sqlx::Error) -> Self {
        RegistryError::Store(StoreError::Database(e))
    }
}

/// Whether moving a counter from `stored` to `presented` is acceptable.
pub fn counter_advances(stored: u32, presented: u32) -> bool {
    stored == 0 || presented > stored
}

#[async_trait]
pub trait CredentialRegistry: Send + Sync {
    async fn list_for_user(&self, owner: &str) -> Result<Vec<CredentialRecord>, RegistryError>;

    /// Fails with [`RegistryError::Duplicate`] if the id exists for any user.
    async fn insert(&self, record: &CredentialRecord) -> Result<(), RegistryError>;

    async fn find_by_credential_id(
        &self,
        credential_id: &[u8],
    ) -> Result<CredentialRecord, RegistryError>;

    /// Compare-and-update of the signature counter; see the module docs.
    async fn update_counter(
        &self,
        credential_id: &[u8],
        new_counter: u32,
    ) -> Result<(), RegistryError>;
}

#[cfg(test)]
mod tests {
    use super::counter_advances;

    #[test]
    fn counter_rule() {
        assert!(counter_advances(0, 0));
        assert!(counter_advances(0, 7));
        assert!(counter_advances(4, 5));
        assert!(!counter_advances(5, 5));
        assert!(!counter_advances(5, 4));
        assert!(!counter_advances(5, 0));
    }
}
