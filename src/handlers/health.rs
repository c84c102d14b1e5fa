//! # Health Check Handler
//!
//! Used by load balancers and monitoring. Also confirms the database answers.

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

/// ## Route
/// GET /health
///
/// ## Response
/// ```json
/// { "status": "healthy", "service": "biometric-auth", "database": "ok" }
/// ```
/// Returns 503 with `"status": "degraded"` when the database is unreachable.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "service": "biometric-auth",
                "database": "ok"
            })),
        ),
        Err(e) => {
            tracing::error!("Health check database probe failed: {:?}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "degraded",
                    "service": "biometric-auth",
                    "database": "unavailable"
                })),
            )
        }
    }
}
