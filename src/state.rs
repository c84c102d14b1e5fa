//! # Application State
//!
//! Shared resources handed to every request handler. Axum clones the state per
//! request, so everything in it is either a pool or behind an `Arc`.

use crate::challenge::{ChallengeStore, MemoryChallengeStore};
use crate::config::{ChallengeBackend, Config};
use crate::db::{self, challenges::SqliteChallengeStore, credentials::SqliteCredentialRegistry};
use crate::webauthn::{CeremonyEngine, RelyingParty};
use anyhow::Result;
use sqlx::sqlite::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    /// Database connection pool, also used by the session store
    pub db: SqlitePool,

    /// Registration and authentication ceremonies
    pub engine: Arc<CeremonyEngine>,
}

impl AppState {
    /// Connect to the database, run migrations and wire up the ceremony engine.
    ///
    /// # Errors
    /// - Database connection or migrations fail
    pub async fn new(config: &Config) -> Result<Self> {
        let db = db::connect(&config.database_url).await?;
        Ok(Self::with_pool(db, config))
    }

    /// Build state around an existing, migrated pool.
    pub fn with_pool(db: SqlitePool, config: &Config) -> Self {
        let ttl = chrono::Duration::seconds(config.challenge_timeout_secs as i64);

        let challenges: Arc<dyn ChallengeStore> = match config.challenge_backend {
            ChallengeBackend::Memory => Arc::new(MemoryChallengeStore::new(ttl)),
            ChallengeBackend::Sqlite => Arc::new(SqliteChallengeStore::new(db.clone(), ttl)),
        };
        let credentials = Arc::new(SqliteCredentialRegistry::new(db.clone()));

        let rp = RelyingParty::new(&config.rp_id, &config.rp_name, &config.rp_origin);
        tracing::debug!(
            rp_id = %rp.id,
            origin = %rp.origin,
            backend = ?config.challenge_backend,
            "ceremony engine configured"
        );

        AppState {
            db,
            engine: Arc::new(CeremonyEngine::new(rp, challenges, credentials)),
        }
    }
}
