//! The seam between the ceremony adapter and a platform authenticator.
//!
//! Requests and results carry raw bytes; conversion to and from the base64url
//! wire types happens here and nowhere else on the client side.

use super::error::{ClientError, PlatformError};
use crate::encoding;
use crate::webauthn::types::*;
use async_trait::async_trait;
use std::time::Duration;

/// What the runtime offers before any ceremony starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformCapabilities {
    /// A public-key credential API exists
    pub credentials_api: bool,
    /// Page or app runs in a secure context (https or localhost)
    pub secure_context: bool,
}

impl PlatformCapabilities {
    pub fn check(&self) -> Result<(), ClientError> {
        if !self.credentials_api {
            return Err(ClientError::NotSupported(
                "WebAuthn is not supported on this device. Use a browser or device that supports biometric authentication."
                    .into(),
            ));
        }
        if !self.secure_context {
            return Err(ClientError::NotSupported(
                "Biometric authentication requires a secure context (HTTPS).".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRef {
    pub id: Vec<u8>,
    pub transports: Vec<String>,
}

/// Input to the platform's "create credential" call.
#[derive(Debug, Clone)]
pub struct CreationRequest {
    pub challenge: Vec<u8>,
    pub rp: RelyingPartyEntity,
    pub user_handle: Vec<u8>,
    pub user_name: String,
    pub user_display_name: String,
    /// COSE algorithms in order of preference
    pub algorithms: Vec<i32>,
    pub exclude: Vec<CredentialRef>,
    pub timeout: Duration,
    pub selection: AuthenticatorSelection,
    pub attestation: AttestationConveyancePreference,
}

/// Input to the platform's "get assertion" call.
#[derive(Debug, Clone)]
pub struct AssertionRequest {
    pub challenge: Vec<u8>,
    pub rp_id: String,
    pub allow: Vec<CredentialRef>,
    pub timeout: Duration,
    pub user_verification: UserVerificationRequirement,
}

#[derive(Debug, Clone)]
pub struct CreatedCredential {
    pub raw_id: Vec<u8>,
    pub client_data_json: Vec<u8>,
    pub attestation_object: Vec<u8>,
    pub transports: Vec<String>,
    pub attachment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AssertedCredential {
    pub raw_id: Vec<u8>,
    pub client_data_json: Vec<u8>,
    pub authenticator_data: Vec<u8>,
    pub signature: Vec<u8>,
    pub user_handle: Option<Vec<u8>>,
    pub attachment: Option<String>,
}

/// A platform authenticator reachable through the OS or browser credential API.
///
/// `create` and `get` are the only calls that wait on the user; each completes
/// once, either with a result or with a [`PlatformError`].
#[async_trait]
pub trait PlatformCredentials: Send + Sync {
    fn capabilities(&self) -> PlatformCapabilities;

    async fn create(&self, request: CreationRequest) -> Result<CreatedCredential, PlatformError>;

    async fn get(&self, request: AssertionRequest) -> Result<AssertedCredential, PlatformError>;
}

fn decode_option(field: &str, value: &str) -> Result<Vec<u8>, ClientError> {
    encoding::decode(value)
        .map_err(|e| ClientError::Failed(format!("server sent an invalid {field}: {e}")))
}

fn decode_refs(list: &[CredentialDescriptor]) -> Result<Vec<CredentialRef>, ClientError> {
    list.iter()
        .map(|d| {
            Ok(CredentialRef {
                id: decode_option("credential id", &d.id)?,
                transports: d.transports.clone(),
            })
        })
        .collect()
}

impl TryFrom<&RegistrationOptions> for CreationRequest {
    type Error = ClientError;

    fn try_from(options: &RegistrationOptions) -> Result<Self, Self::Error> {
        Ok(Self {
            challenge: decode_option("challenge", &options.challenge)?,
            rp: options.rp.clone(),
            user_handle: decode_option("user id", &options.user.id)?,
            user_name: options.user.name.clone(),
            user_display_name: options.user.display_name.clone(),
            algorithms: options.pub_key_cred_params.iter().map(|p| p.alg).collect(),
            exclude: decode_refs(&options.exclude_credentials)?,
            timeout: Duration::from_millis(options.timeout),
            selection: options.authenticator_selection.clone(),
            attestation: options.attestation,
        })
    }
}

impl TryFrom<&AuthenticationOptions> for AssertionRequest {
    type Error = ClientError;

    fn try_from(options: &AuthenticationOptions) -> Result<Self, Self::Error> {
        Ok(Self {
            challenge: decode_option("challenge", &options.challenge)?,
            rp_id: options.rp_id.clone(),
            allow: decode_refs(&options.allow_credentials)?,
            timeout: Duration::from_millis(options.timeout),
            user_verification: options.user_verification,
        })
    }
}

impl From<CreatedCredential> for RegistrationResponse {
    fn from(c: CreatedCredential) -> Self {
        let id = encoding::encode(&c.raw_id);
        RegistrationResponse {
            raw_id: id.clone(),
            id,
            type_: PUBLIC_KEY_TYPE.to_string(),
            response: AttestationResponse {
                client_data_json: encoding::encode(&c.client_data_json),
                attestation_object: encoding::encode(&c.attestation_object),
                transports: c.transports,
            },
            authenticator_attachment: c.attachment,
        }
    }
}

impl From<AssertedCredential> for AuthenticationResponse {
    fn from(c: AssertedCredential) -> Self {
        let id = encoding::encode(&c.raw_id);
        AuthenticationResponse {
            raw_id: id.clone(),
            id,
            type_: PUBLIC_KEY_TYPE.to_string(),
            response: AssertionResponse {
                client_data_json: encoding::encode(&c.client_data_json),
                authenticator_data: encoding::encode(&c.authenticator_data),
                signature: encoding::encode(&c.signature),
                user_handle: c.user_handle.map(encoding::encode),
            },
            authenticator_attachment: c.attachment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_check_names_the_missing_piece() {
        let full = PlatformCapabilities {
            credentials_api: true,
            secure_context: true,
        };
        assert!(full.check().is_ok());

        let insecure = PlatformCapabilities {
            secure_context: false,
            ..full
        };
        match insecure.check() {
            Err(ClientError::NotSupported(msg)) => assert!(msg.contains("secure context")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn assertion_request_decodes_binary_fields() {
        let options = AuthenticationOptions {
            challenge: encoding::encode([9u8; 32]),
            timeout: 60_000,
            rp_id: "fit.example.com".into(),
            allow_credentials: vec![CredentialDescriptor {
                type_: PUBLIC_KEY_TYPE.into(),
                id: encoding::encode([1u8, 2, 3]),
                transports: vec!["internal".into()],
            }],
            user_verification: UserVerificationRequirement::Preferred,
        };
        let req = AssertionRequest::try_from(&options).unwrap();
        assert_eq!(req.challenge, vec![9u8; 32]);
        assert_eq!(req.allow[0].id, vec![1, 2, 3]);
        assert_eq!(req.timeout, Duration::from_secs(60));
    }

    #[test]
    fn bad_option_encoding_is_reported() {
        let options = AuthenticationOptions {
            challenge: "***".into(),
            timeout: 0,
            rp_id: String::new(),
            allow_credentials: vec![],
            user_verification: UserVerificationRequirement::Required,
        };
        assert!(matches!(
            AssertionRequest::try_from(&options),
            Err(ClientError::Failed(_))
        ));
    }

    #[test]
    fn assertion_result_encodes_for_the_wire() {
        let wire = AuthenticationResponse::from(AssertedCredential {
            raw_id: vec![0xfb, 0xff],
            client_data_json: b"{}".to_vec(),
            authenticator_data: vec![0; 37],
            signature: vec![1, 2],
            user_handle: Some(b"alice".to_vec()),
            attachment: Some("platform".into()),
        });
        assert_eq!(wire.id, wire.raw_id);
        assert_eq!(wire.id, "-_8");
        assert_eq!(wire.response.client_data_json, "e30");
        assert_eq!(wire.response.user_handle.as_deref(), Some("YWxpY2U"));
    }
}
