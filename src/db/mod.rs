//! # Database Module
//!
//! - `models`: row types for the tables in `migrations/`
//! - `credentials`: SQLite-backed [`crate::registry::CredentialRegistry`]
//! - `challenges`: SQLite-backed [`crate::challenge::ChallengeStore`]

pub mod challenges;
pub mod credentials;
pub mod models;

use anyhow::Result;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

/// Open a connection pool and bring the schema up to date.
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let pool = SqlitePool::connect(database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

/// A private in-memory database with the schema applied.
///
/// Every SQLite `:memory:` connection is a separate database, so the pool is
/// limited to a single connection.
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}
