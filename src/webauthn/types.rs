//! # WebAuthn Wire Types
//!
//! JSON shapes exchanged between the server and the client ceremony adapter.
//! Field names follow the WebAuthn JSON serialization (`PublicKeyCredentialCreationOptionsJSON`,
//! `RegistrationResponseJSON`, ...) so browser helper libraries can consume them
//! unchanged. Every binary value is base64url text (see [`crate::encoding`]).
//!
//! ## API Flow
//! Each ceremony has two steps:
//! - Challenge: the server returns [`RegistrationOptions`] or [`AuthenticationOptions`]
//! - Verify: the client posts a [`RegistrationVerifyRequest`] or
//!   [`AuthenticationVerifyRequest`] and gets a [`VerificationResult`]

use serde::{Deserialize, Serialize};

/// Credential type string used throughout WebAuthn.
pub const PUBLIC_KEY_TYPE: &str = "public-key";

/// Relying party as presented to the authenticator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelyingPartyEntity {
    pub id: String,
    pub name: String,
}

/// User account the new credential is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntity {
    /// User handle, base64url
    pub id: String,
    pub name: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PubKeyCredParam {
    #[serde(rename = "type")]
    pub type_: String,
    /// COSE algorithm identifier
    pub alg: i32,
}

/// Reference to an existing credential in an exclude or allow list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialDescriptor {
    #[serde(rename = "type")]
    pub type_: String,
    /// Credential id, base64url
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transports: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthenticatorAttachment {
    Platform,
    CrossPlatform,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserVerificationRequirement {
    Required,
    Preferred,
    Discouraged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResidentKeyRequirement {
    Discouraged,
    Preferred,
    Required,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttestationConveyancePreference {
    None,
    Indirect,
    Direct,
}

/// Which authenticators may take part in registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator_attachment: Option<AuthenticatorAttachment>,
    pub user_verification: UserVerificationRequirement,
    pub resident_key: ResidentKeyRequirement,
    pub require_resident_key: bool,
}

impl Default for AuthenticatorSelection {
    /// Built-in biometric sensors, verification preferred, no discoverable key required.
    fn default() -> Self {
        Self {
            authenticator_attachment: Some(AuthenticatorAttachment::Platform),
            user_verification: UserVerificationRequirement::Preferred,
            resident_key: ResidentKeyRequirement::Discouraged,
            require_resident_key: false,
        }
    }
}

/// Options for `navigator.credentials.create()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationOptions {
    pub challenge: String,
    pub rp: RelyingPartyEntity,
    pub user: UserEntity,
    pub pub_key_cred_params: Vec<PubKeyCredParam>,
    /// Milliseconds
    pub timeout: u64,
    pub attestation: AttestationConveyancePreference,
    pub exclude_credentials: Vec<CredentialDescriptor>,
    pub authenticator_selection: AuthenticatorSelection,
}

/// Options for `navigator.credentials.get()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationOptions {
    pub challenge: String,
    /// Milliseconds
    pub timeout: u64,
    pub rp_id: String,
    pub allow_credentials: Vec<CredentialDescriptor>,
    pub user_verification: UserVerificationRequirement,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    pub attestation_object: String,
    #[serde(default)]
    pub transports: Vec<String>,
}

/// Result of `navigator.credentials.create()`, with binary fields encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationResponse {
    pub id: String,
    pub raw_id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub response: AttestationResponse,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator_attachment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionResponse {
    #[serde(rename = "clientDataJSON")]
    pub client_data_json: String,
    pub authenticator_data: String,
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_handle: Option<String>,
}

/// Result of `navigator.credentials.get()`, with binary fields encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationResponse {
    pub id: String,
    pub raw_id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub response: AssertionResponse,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticator_attachment: Option<String>,
}

/// Body of `POST /auth/register/{user}/verify`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationVerifyRequest {
    pub credential: RegistrationResponse,
}

/// Body of `POST /auth/authenticate/{user}/verify`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticationVerifyRequest {
    pub credential: AuthenticationResponse,
}

/// Successful verification. Failures travel as `{ "verified": false, "error": reason }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub verified: bool,
    pub credential_id: String,
    pub counter: u32,
}
