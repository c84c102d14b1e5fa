//! # Biometric Authentication Server
//!
//! Serves the WebAuthn registration and authentication ceremonies over HTTP.
//!
//! ## Key Concepts
//! - **WebAuthn**: browser API for public-key authentication
//! - **Platform authenticator**: the device's own biometric sensor
//! - **Relying party**: this service, identified by its RP ID and origin

use biometric_auth::{config::Config, routes, state::AppState};
use tower_sessions_sqlx_store::SqliteStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often expired challenges are swept from the challenge store.
const CHALLENGE_SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(600);

/// Main application entry point
///
/// 1. Set up logging
/// 2. Load and validate configuration
/// 3. Open the database and build the ceremony engine
/// 4. Start the expired-challenge sweeper
/// 5. Configure sessions, routes and middleware
/// 6. Serve
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default filter. Denied ceremonies are logged on
    // the `security` target.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,biometric_auth=debug,security=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded: {:?}", config);

    let app_state = AppState::new(&config).await?;
    tracing::info!("Application state initialized");

    // Expired challenges can never be consumed; this only reclaims space.
    let sweeper = app_state.engine.challenges().clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CHALLENGE_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            match sweeper.purge_expired(chrono::Utc::now()).await {
                Ok(0) => {}
                Ok(n) => tracing::debug!(purged = n, "Swept expired challenges"),
                Err(e) => tracing::error!("Challenge sweep failed: {:?}", e),
            }
        }
    });

    // Session data lives server-side in SQLite; the cookie carries only the id.
    let session_store = SqliteStore::new(app_state.db.clone());
    session_store.migrate().await?;

    let app = routes::router(app_state, &config, session_store)?;

    let bind_addr = config.bind_address();
    tracing::info!(
        rp_id = %config.rp_id,
        origin = %config.rp_origin,
        "Starting server on {}",
        bind_addr
    );

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
