//! # Challenge Store
//!
//! Holds at most one outstanding challenge per `(user, ceremony kind)`.
//!
//! ## Lifecycle
//! 1. `issue` generates 32 random bytes and replaces any earlier entry for the key
//! 2. The client signs over the challenge (inside `clientDataJSON`)
//! 3. `consume` removes the entry if and only if it is present, unexpired and
//!    byte-equal to what the client presented
//!
//! A challenge is live while `now < expires_at`. Once consumed or expired it can
//! never be consumed again.
//!
//! Two backends implement [`ChallengeStore`]:
//! - [`MemoryChallengeStore`]: sharded concurrent map, the default
//! - [`crate::db::challenges::SqliteChallengeStore`]: shared between processes

mod memory;

pub use memory::MemoryChallengeStore;

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of random bytes in every challenge.
pub const CHALLENGE_LEN: usize = 32;

/// Which ceremony a challenge belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CeremonyKind {
    Registration,
    Authentication,
}

impl CeremonyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CeremonyKind::Registration => "registration",
            CeremonyKind::Authentication => "authentication",
        }
    }
}

impl fmt::Display for CeremonyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CeremonyKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registration" => Ok(CeremonyKind::Registration),
            "authentication" => Ok(CeremonyKind::Authentication),
            other => Err(StoreError::Corrupt(format!("unknown ceremony kind '{other}'"))),
        }
    }
}

/// A freshly issued challenge.
#[derive(Clone, PartialEq, Eq)]
pub struct Challenge {
    bytes: Vec<u8>,
    pub expires_at: DateTime<Utc>,
}

impl Challenge {
    pub(crate) fn generate(expires_at: DateTime<Utc>) -> Self {
        let mut bytes = vec![0u8; CHALLENGE_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes, expires_at }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

// Challenge bytes stay out of logs.
impl fmt::Debug for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Challenge")
            .field("len", &self.bytes.len())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Why a challenge could not be consumed.
#[derive(Debug, Error)]
pub enum ChallengeError {
    /// Nothing outstanding for the key: never issued, already consumed, or reaped.
    #[error("no outstanding challenge")]
    Absent,

    #[error("challenge expired")]
    Expired,

    /// Presented bytes differ from the outstanding challenge. The entry is kept.
    #[error("challenge mismatch")]
    Mismatch,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Keyed, expiring, single-use challenge storage.
///
/// Implementations must make `consume_at` atomic per key: two concurrent calls
/// presenting the same challenge succeed at most once.
#[async_trait]
pub trait ChallengeStore: Send + Sync {
    /// How long an issued challenge stays live.
    fn ttl(&self) -> Duration;

    async fn issue_at(
        &self,
        user_id: &str,
        kind: CeremonyKind,
        now: DateTime<Utc>,
    ) -> Result<Challenge, StoreError>;

    async fn consume_at(
        &self,
        user_id: &str,
        kind: CeremonyKind,
        presented: &[u8],
        now: DateTime<Utc>,
    ) -> Result<(), ChallengeError>;

    /// Remove every entry that expired at or before `now`. Returns how many went.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn issue(&self, user_id: &str, kind: CeremonyKind) -> Result<Challenge, StoreError> {
        self.issue_at(user_id, kind, Utc::now()).await
    }

    async fn consume(
        &self,
        user_id: &str,
        kind: CeremonyKind,
        presented: &[u8],
    ) -> Result<(), ChallengeError> {
        self.consume_at(user_id, kind, presented, Utc::now()).await
    }
}
