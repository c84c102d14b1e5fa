//! Router assembly: endpoints plus the session, CORS, CSP and trace layers.

use crate::config::Config;
use crate::handlers::{auth::*, health::health_check};
use crate::middleware::{cors_layer, csp_layer};
use crate::state::AppState;
use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use time::Duration;
use tower_http::trace::TraceLayer;
use tower_sessions::{cookie::SameSite, Expiry, SessionManagerLayer, SessionStore};

/// Build the application router.
///
/// Layers run outermost first on requests: trace, CORS, CSP, sessions.
pub fn router<S>(state: AppState, config: &Config, sessions: S) -> Result<Router>
where
    S: SessionStore + Clone,
{
    // Session cookie is only marked Secure when the site is served over https,
    // so local development on http://localhost keeps working.
    let session_layer = SessionManagerLayer::new(sessions)
        .with_secure(config.rp_origin.starts_with("https://"))
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(Duration::hours(
            config.session_inactivity_hours,
        )));

    Ok(Router::new()
        .route("/health", get(health_check))
        .route("/auth/register/:user_id/challenge", post(register_challenge))
        .route("/auth/register/:user_id/verify", post(register_verify))
        .route(
            "/auth/authenticate/:user_id/challenge",
            post(authenticate_challenge),
        )
        .route(
            "/auth/authenticate/:user_id/verify",
            post(authenticate_verify),
        )
        .layer(session_layer)
        .layer(csp_layer(config)?)
        .layer(cors_layer(config)?)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}
