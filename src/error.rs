//! # Error Handling
//!
//! Errors are layered:
//! - [`StoreError`]: a persistence backend failed (database, corrupt row)
//! - [`CeremonyError`]: the closed taxonomy of ways a ceremony can fail
//! - [`AppError`]: what an HTTP handler can return; converts into a JSON response
//!
//! Ceremony failures are terminal for the attempt. The client must restart from
//! challenge issuance, so none of these carry retry hints.

use crate::challenge::ChallengeError;
use crate::encoding::DecodeError;
use crate::registry::RegistryError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// A storage backend failed.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A row exists but cannot be interpreted (unknown ceremony kind, bad JSON).
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Why a registration or authentication ceremony was denied.
///
/// `UnknownCredential`, `SignatureInvalid` and `CounterRegression` are reported to
/// clients under a single `authentication_failed` reason so a caller cannot learn
/// which check tripped. Logs keep the distinction.
#[derive(Error, Debug)]
pub enum CeremonyError {
    #[error("challenge expired")]
    ChallengeExpired,

    #[error("challenge does not match the outstanding challenge")]
    ChallengeMismatch,

    #[error("origin or relying party mismatch")]
    OriginMismatch,

    #[error("unknown credential")]
    UnknownCredential,

    #[error("credential is already registered")]
    DuplicateCredential,

    #[error("signature verification failed")]
    SignatureInvalid,

    #[error("signature counter regressed (stored {stored}, presented {presented})")]
    CounterRegression { stored: u32, presented: u32 },

    #[error("not supported: {0}")]
    NotSupported(String),

    /// The client response could not be decoded or is structurally invalid.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Registering another credential for an account needs a session signed in
    /// as that account.
    #[error("sign-in required")]
    SignInRequired,

    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

impl CeremonyError {
    /// Failures that suggest an attack or a cloned authenticator rather than a
    /// user mistake.
    pub fn is_security_relevant(&self) -> bool {
        matches!(
            self,
            CeremonyError::SignatureInvalid | CeremonyError::CounterRegression { .. }
        )
    }

    /// Reason string sent to clients.
    pub fn client_reason(&self) -> &'static str {
        match self {
            CeremonyError::ChallengeExpired => "challenge_expired",
            CeremonyError::ChallengeMismatch => "challenge_mismatch",
            CeremonyError::OriginMismatch => "origin_mismatch",
            CeremonyError::DuplicateCredential => "duplicate_credential",
            CeremonyError::UnknownCredential
            | CeremonyError::SignatureInvalid
            | CeremonyError::CounterRegression { .. } => "authentication_failed",
            CeremonyError::NotSupported(_) => "not_supported",
            CeremonyError::Malformed(_) => "malformed_response",
            CeremonyError::SignInRequired => "sign_in_required",
            CeremonyError::Storage(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            CeremonyError::ChallengeExpired
            | CeremonyError::ChallengeMismatch
            | CeremonyError::NotSupported(_)
            | CeremonyError::Malformed(_) => StatusCode::BAD_REQUEST,
            CeremonyError::OriginMismatch => StatusCode::FORBIDDEN,
            CeremonyError::UnknownCredential
            | CeremonyError::SignatureInvalid
            | CeremonyError::CounterRegression { .. }
            | CeremonyError::SignInRequired => StatusCode::UNAUTHORIZED,
            CeremonyError::DuplicateCredential => StatusCode::CONFLICT,
            CeremonyError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DecodeError> for CeremonyError {
    fn from(e: DecodeError) -> Self {
        CeremonyError::Malformed(e.to_string())
    }
}

impl From<ChallengeError> for CeremonyError {
    fn from(e: ChallengeError) -> Self {
        match e {
            ChallengeError::Expired => CeremonyError::ChallengeExpired,
            ChallengeError::Absent | ChallengeError::Mismatch => CeremonyError::ChallengeMismatch,
            ChallengeError::Store(e) => CeremonyError::Storage(e),
        }
    }
}

impl From<RegistryError> for CeremonyError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::Duplicate => CeremonyError::DuplicateCredential,
            RegistryError::NotFound => CeremonyError::UnknownCredential,
            RegistryError::CounterRegression { stored, presented } => {
                CeremonyError::CounterRegression { stored, presented }
            }
            RegistryError::Store(e) => CeremonyError::Storage(e),
        }
    }
}

/// Errors an HTTP handler can return.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Ceremony(#[from] CeremonyError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Ceremony(e) => {
                if let CeremonyError::Storage(inner) = &e {
                    tracing::error!("Storage error during ceremony: {:?}", inner);
                }
                let body = Json(json!({
                    "verified": false,
                    "error": e.client_reason(),
                }));
                (e.status_code(), body).into_response()
            }
            AppError::BadRequest(_) => {
                let body = Json(json!({ "error": self.to_string() }));
                (StatusCode::BAD_REQUEST, body).into_response()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                let body = Json(json!({ "error": "Internal server error" }));
                (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
            }
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn security_failures_collapse_to_one_client_reason() {
        let reasons: Vec<_> = [
            CeremonyError::UnknownCredential,
            CeremonyError::SignatureInvalid,
            CeremonyError::CounterRegression { stored: 5, presented: 5 },
        ]
        .iter()
        .map(CeremonyError::client_reason)
        .collect();
        assert!(reasons.iter().all(|r| *r == "authentication_failed"));
    }

    #[test]
    fn only_crypto_failures_are_security_relevant() {
        assert!(CeremonyError::SignatureInvalid.is_security_relevant());
        assert!(CeremonyError::CounterRegression { stored: 1, presented: 1 }.is_security_relevant());
        assert!(!CeremonyError::OriginMismatch.is_security_relevant());
        assert!(!CeremonyError::ChallengeExpired.is_security_relevant());
    }

    #[test]
    fn absent_challenge_reads_as_mismatch() {
        let e: CeremonyError = ChallengeError::Absent.into();
        assert!(matches!(e, CeremonyError::ChallengeMismatch));
        let e: CeremonyError = ChallengeError::Expired.into();
        assert!(matches!(e, CeremonyError::ChallengeExpired));
    }

    #[test]
    fn missing_sign_in_is_unauthorized() {
        let e = CeremonyError::SignInRequired;
        assert_eq!(e.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(e.client_reason(), "sign_in_required");
    }
}
