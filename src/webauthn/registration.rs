//! # Registration Ceremony
//!
//! Binds a new authenticator to a user. Two steps:
//! 1. **Begin**: issue a challenge and return creation options, listing the
//!    user's existing credentials so the platform refuses to register one twice
//! 2. **Complete**: check the signed client data and authenticator data, then
//!    store the new public key
//!
//! ## Security Concepts
//! - **Challenge**: proves the response was produced for this ceremony, now
//! - **Origin / RP ID**: proves the browser was talking to us, not a look-alike site
//! - **Duplicate check**: a credential id can belong to exactly one user

use crate::challenge::CeremonyKind;
use crate::encoding;
use crate::error::CeremonyError;
use crate::registry::{CredentialRecord, COSE_ALG_EDDSA, COSE_ALG_ES256};
use crate::webauthn::authenticator_data::{AttestationObject, AttestedCredential, AuthenticatorData};
use crate::webauthn::client_data::{ParsedClientData, TYPE_CREATE};
use crate::webauthn::engine::CeremonyEngine;
use crate::webauthn::types::*;
use chrono::Utc;

/// A registration response with every field decoded.
struct DecodedRegistration {
    client_data: ParsedClientData,
    attestation_format: String,
    auth_data: AuthenticatorData,
    credential: AttestedCredential,
}

impl DecodedRegistration {
    fn decode(response: &RegistrationResponse) -> Result<Self, CeremonyError> {
        if response.type_ != PUBLIC_KEY_TYPE {
            return Err(CeremonyError::Malformed(format!(
                "credential type '{}'",
                response.type_
            )));
        }
        let raw_id = encoding::decode(&response.raw_id)?;
        if encoding::decode(&response.id)? != raw_id {
            return Err(CeremonyError::Malformed("id and rawId differ".into()));
        }

        let client_data_json = encoding::decode(&response.response.client_data_json)?;
        let client_data = ParsedClientData::from_bytes(&client_data_json)?;

        let attestation_bytes = encoding::decode(&response.response.attestation_object)?;
        let attestation = AttestationObject::parse(&attestation_bytes)?;
        let mut auth_data = AuthenticatorData::parse(&attestation.auth_data)?;

        let credential = auth_data
            .attested
            .take()
            .ok_or_else(|| CeremonyError::Malformed("no attested credential data".into()))?;
        if credential.credential_id != raw_id {
            return Err(CeremonyError::Malformed(
                "attested credential id does not match rawId".into(),
            ));
        }

        Ok(Self {
            client_data,
            attestation_format: attestation.fmt,
            auth_data,
            credential,
        })
    }
}

impl CeremonyEngine {
    /// Decide whether the caller may run a registration ceremony for `user_id`.
    ///
    /// The first credential of an account can be registered by anyone. Adding
    /// another one requires a session signed in as that account.
    pub async fn authorize_registration(
        &self,
        user_id: &str,
        signed_in_as: Option<&str>,
    ) -> Result<(), CeremonyError> {
        if signed_in_as == Some(user_id) {
            return Ok(());
        }
        if self.credentials.list_for_user(user_id).await?.is_empty() {
            return Ok(());
        }
        tracing::warn!(
            target: "security",
            user = user_id,
            signed_in = signed_in_as.is_some(),
            "registration for an existing account without its session"
        );
        Err(CeremonyError::SignInRequired)
    }

    /// Start a registration ceremony for `user_id`.
    ///
    /// Any earlier unfinished registration challenge for the user stops being
    /// valid. The user handle sent to the authenticator is the UTF-8 bytes of
    /// `user_id`.
    ///
    /// ## Returns
    /// [`RegistrationOptions`] for `navigator.credentials.create()`:
    /// - challenge and timeout
    /// - relying party and user entities
    /// - accepted algorithms (ES256, EdDSA)
    /// - `excludeCredentials` with every credential the user already has
    pub async fn begin_registration(
        &self,
        user_id: &str,
    ) -> Result<RegistrationOptions, CeremonyError> {
        let challenge = self
            .challenges
            .issue(user_id, CeremonyKind::Registration)
            .await?;
        let existing = self.credentials.list_for_user(user_id).await?;

        tracing::debug!(
            user = user_id,
            excluded = existing.len(),
            "issued registration challenge"
        );

        Ok(RegistrationOptions {
            challenge: encoding::encode(challenge.as_bytes()),
            rp: RelyingPartyEntity {
                id: self.rp.id.clone(),
                name: self.rp.name.clone(),
            },
            user: UserEntity {
                id: encoding::encode(user_id.as_bytes()),
                name: user_id.to_string(),
                display_name: user_id.to_string(),
            },
            pub_key_cred_params: [COSE_ALG_ES256, COSE_ALG_EDDSA]
                .into_iter()
                .map(|alg| PubKeyCredParam {
                    type_: PUBLIC_KEY_TYPE.to_string(),
                    alg,
                })
                .collect(),
            timeout: self.timeout_ms(),
            attestation: AttestationConveyancePreference::None,
            exclude_credentials: existing
                .iter()
                .map(|c| CredentialDescriptor {
                    type_: PUBLIC_KEY_TYPE.to_string(),
                    id: encoding::encode(&c.credential_id),
                    transports: c.transports.clone(),
                })
                .collect(),
            authenticator_selection: self.selection.clone(),
        })
    }

    /// Finish a registration ceremony.
    ///
    /// ## What gets verified?
    /// 1. The response decodes (client data JSON, CBOR attestation object, COSE key)
    /// 2. The challenge in the client data is the outstanding one, and unexpired
    /// 3. The client data is of type `webauthn.create`
    /// 4. Origin and RP ID hash match this relying party
    /// 5. The user was present
    /// 6. No user already owns the credential id
    ///
    /// Once the challenge has been consumed it cannot be used again, whatever the
    /// outcome. A response that fails to decode leaves it in place until it expires.
    pub async fn complete_registration(
        &self,
        user_id: &str,
        response: &RegistrationResponse,
    ) -> Result<VerificationResult, CeremonyError> {
        let result = self.verify_registration(user_id, response).await;
        match &result {
            Ok(v) => tracing::info!(
                user = user_id,
                credential = %v.credential_id,
                counter = v.counter,
                "registration verified"
            ),
            Err(e) => self.report_failure(user_id, CeremonyKind::Registration, e),
        }
        result
    }

    async fn verify_registration(
        &self,
        user_id: &str,
        response: &RegistrationResponse,
    ) -> Result<VerificationResult, CeremonyError> {
        let kind = CeremonyKind::Registration;

        let decoded = DecodedRegistration::decode(response)?;

        self.challenges
            .consume(user_id, kind, &decoded.client_data.challenge)
            .await?;

        decoded.client_data.expect_type(TYPE_CREATE)?;
        self.check_relying_party(&decoded.client_data, &decoded.auth_data)?;
        if !decoded.auth_data.user_present() {
            return Err(CeremonyError::Malformed("user presence flag not set".into()));
        }

        let key = &decoded.credential.public_key;
        let record = CredentialRecord {
            credential_id: decoded.credential.credential_id.clone(),
            owner: user_id.to_string(),
            public_key: key.to_bytes(),
            algorithm: key.algorithm(),
            sign_count: decoded.auth_data.sign_count,
            transports: response.response.transports.clone(),
            attachment: response.authenticator_attachment.clone(),
            backup_eligible: decoded.auth_data.backup_eligible(),
            backup_state: decoded.auth_data.backup_state(),
            created_at: Utc::now(),
            last_used_at: None,
        };

        self.credentials.insert(&record).await?;

        tracing::debug!(
            user = user_id,
            fmt = %decoded.attestation_format,
            algorithm = record.algorithm,
            user_verified = decoded.auth_data.user_verified(),
            "stored new credential"
        );

        Ok(VerificationResult {
            verified: true,
            credential_id: encoding::encode(&record.credential_id),
            counter: record.sign_count,
        })
    }
}
