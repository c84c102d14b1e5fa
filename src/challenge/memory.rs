use super::{CeremonyKind, Challenge, ChallengeError, ChallengeStore};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use subtle::ConstantTimeEq;

type Key = (String, CeremonyKind);

/// Process-local challenge store.
///
/// `DashMap` shards its keys, so ceremonies for different users never contend,
/// while the entry lock serializes issue/consume on a single key.
#[derive(Debug)]
pub struct MemoryChallengeStore {
    entries: DashMap<Key, Challenge>,
    ttl: Duration,
}

impl MemoryChallengeStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ChallengeStore for MemoryChallengeStore {
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
        self.entries
            .insert((user_id.to_string(), kind), challenge.clone());
        Ok(challenge)
    }

    async fn consume_at(
        &self,
        user_id: &str,
        kind: CeremonyKind,
        presented: &[u8],
        now: DateTime<Utc>,
    ) -> Result<(), ChallengeError> {
        match self.entries.entry((user_id.to_string(), kind)) {
            Entry::Vacant(_) => Err(ChallengeError::Absent),
            Entry::Occupied(entry) => {
                if now >= entry.get().expires_at {
                    entry.remove();
                    return Err(ChallengeError::Expired);
                }
                if !bool::from(entry.get().as_bytes().ct_eq(presented)) {
                    return Err(ChallengeError::Mismatch);
                }
                entry.remove();
                Ok(())
            }
        }
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let before = self.entries.len();
        self.entries.retain(|_, challenge| now < challenge.expires_at);
        Ok(before.saturating_sub(self.entries.len()) as u64)
    }
}
