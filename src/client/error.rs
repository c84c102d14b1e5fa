use thiserror::Error;

/// An error raised by the platform credential API, identified by its DOM
/// exception name (`NotAllowedError`, `SecurityError`, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformError {
    pub name: String,
    pub message: String,
}

impl PlatformError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Everything a client-side ceremony can end with besides success.
///
/// Raw platform errors are always translated into one of these; callers never
/// see a DOM exception name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// No credential API, or not a secure context.
    #[error("{0}")]
    NotSupported(String),

    /// The user dismissed the prompt or the biometric check failed.
    #[error("Operation was denied by the user or the security key.")]
    Cancelled,

    #[error("The operation failed for security reasons.")]
    SecurityViolation,

    #[error("The operation was aborted.")]
    Aborted,

    /// The authenticator already holds a credential from the exclude list.
    #[error("This device is already registered for this account.")]
    AlreadyRegistered,

    /// The server answered and refused the ceremony.
    #[error("Server rejected the ceremony ({status}): {reason}")]
    VerificationFailed { status: u16, reason: String },

    #[error("Could not reach the authentication server: {0}")]
    TransportFailure(String),

    #[error("{0}")]
    Failed(String),
}

const NOT_SUPPORTED: &str = "This operation is not supported by your browser or device.";
const UNKNOWN: &str = "An unknown error occurred.";

impl ClientError {
    pub fn from_platform(err: PlatformError) -> Self {
        match err.name.as_str() {
            "NotAllowedError" => ClientError::Cancelled,
            "SecurityError" => ClientError::SecurityViolation,
            "AbortError" => ClientError::Aborted,
            "NotSupportedError" => ClientError::NotSupported(NOT_SUPPORTED.to_string()),
            "InvalidStateError" => ClientError::AlreadyRegistered,
            _ if err.message.is_empty() => ClientError::Failed(UNKNOWN.to_string()),
            _ => ClientError::Failed(err.message),
        }
    }
}

impl From<PlatformError> for ClientError {
    fn from(err: PlatformError) -> Self {
        ClientError::from_platform(err)
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::TransportFailure(err.to_string())
    }
}
