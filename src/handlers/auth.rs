//! # Ceremony Handlers
//!
//! Thin HTTP wrappers around [`crate::webauthn::CeremonyEngine`]. The user
//! identity travels in the path; relying party settings never come from the
//! request. Registering a further credential for an account requires the
//! session to be signed in as that account.
//!
//! ## Routes
//! - `POST /auth/register/:user_id/challenge`
//! - `POST /auth/register/:user_id/verify`
//! - `POST /auth/authenticate/:user_id/challenge`
//! - `POST /auth/authenticate/:user_id/verify`

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::webauthn::types::*;
use axum::{
    extract::{Path, State},
    Json,
};
use tower_sessions::Session;

/// Key under which an authenticated user identity is kept in the session.
pub const SESSION_USER_KEY: &str = "user_id";

/// WebAuthn caps the user handle at 64 bytes.
pub const MAX_USER_ID_LEN: usize = 64;

fn validate_user_id(user_id: &str) -> AppResult<()> {
    if user_id.is_empty() || user_id.len() > MAX_USER_ID_LEN {
        return Err(AppError::BadRequest(format!(
            "user identity must be between 1 and {MAX_USER_ID_LEN} bytes"
        )));
    }
    Ok(())
}

async fn signed_in_user(session: &Session) -> AppResult<Option<String>> {
    session
        .get::<String>(SESSION_USER_KEY)
        .await
        .map_err(|e| AppError::Internal(format!("Session error: {}", e)))
}

pub async fn register_challenge(
    session: Session,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<RegistrationOptions>> {
    validate_user_id(&user_id)?;
    let signed_in = signed_in_user(&session).await?;
    state
        .engine
        .authorize_registration(&user_id, signed_in.as_deref())
        .await?;
    let options = state.engine.begin_registration(&user_id).await?;
    Ok(Json(options))
}

pub async fn register_verify(
    session: Session,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(req): Json<RegistrationVerifyRequest>,
) -> AppResult<Json<VerificationResult>> {
    validate_user_id(&user_id)?;
    let signed_in = signed_in_user(&session).await?;
    state
        .engine
        .authorize_registration(&user_id, signed_in.as_deref())
        .await?;
    let result = state
        .engine
        .complete_registration(&user_id, &req.credential)
        .await?;
    Ok(Json(result))
}

pub async fn authenticate_challenge(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> AppResult<Json<AuthenticationOptions>> {
    validate_user_id(&user_id)?;
    let options = state.engine.begin_authentication(&user_id).await?;
    Ok(Json(options))
}

/// On success the session is bound to `user_id`. The session id is cycled
/// first so an id planted before login cannot be reused afterwards.
pub async fn authenticate_verify(
    session: Session,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(req): Json<AuthenticationVerifyRequest>,
) -> AppResult<Json<VerificationResult>> {
    validate_user_id(&user_id)?;
    let result = state
        .engine
        .complete_authentication(&user_id, &req.credential)
        .await?;

    session
        .cycle_id()
        .await
        .map_err(|e| AppError::Internal(format!("Session error: {}", e)))?;
    session
        .insert(SESSION_USER_KEY, &user_id)
        .await
        .map_err(|e| AppError::Internal(format!("Session error: {}", e)))?;

    tracing::debug!(user = %user_id, "session established");
    Ok(Json(result))
}
