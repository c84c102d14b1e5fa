//! # Authentication Ceremony
//!
//! Proves a returning user still holds the private key of a registered credential.
//!
//! 1. **Begin**: issue a challenge and list the credentials the user may sign with
//! 2. **Complete**: check the assertion signature against the stored public key
//!    and advance the signature counter
//!
//! A credential is only accepted for the user it was registered to. Asking for
//! user A with a credential of user B reads exactly like an unknown credential.

use crate::challenge::CeremonyKind;
use crate::encoding;
use crate::error::{CeremonyError, StoreError};
use crate::registry::CredentialRecord;
use crate::webauthn::authenticator_data::AuthenticatorData;
use crate::webauthn::client_data::{ParsedClientData, TYPE_GET};
use crate::webauthn::cose::CoseKey;
use crate::webauthn::engine::CeremonyEngine;
use crate::webauthn::types::*;
use subtle::ConstantTimeEq;

struct DecodedAssertion {
    client_data: ParsedClientData,
    auth_data_raw: Vec<u8>,
    auth_data: AuthenticatorData,
    signature: Vec<u8>,
}

fn decode_credential_id(response: &AuthenticationResponse) -> Result<Vec<u8>, CeremonyError> {
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
    Ok(raw_id)
}

impl DecodedAssertion {
    fn decode(response: &AssertionResponse) -> Result<Self, CeremonyError> {
        let client_data_json = encoding::decode(&response.client_data_json)?;
        let auth_data_raw = encoding::decode(&response.authenticator_data)?;

        Ok(Self {
            client_data: ParsedClientData::from_bytes(&client_data_json)?,
            auth_data: AuthenticatorData::parse(&auth_data_raw)?,
            auth_data_raw,
            signature: encoding::decode(&response.signature)?,
        })
    }

    /// `authenticatorData ‖ SHA-256(clientDataJSON)`
    fn signed_message(&self) -> Vec<u8> {
        let mut msg = Vec::with_capacity(self.auth_data_raw.len() + 32);
        msg.extend_from_slice(&self.auth_data_raw);
        msg.extend_from_slice(&self.client_data.hash);
        msg
    }
}

impl CeremonyEngine {
    /// Start an authentication ceremony for `user_id`.
    ///
    /// The allow-list contains every credential the user registered. A user with
    /// none still gets a challenge and an empty list, so the response does not
    /// reveal whether the account exists.
    pub async fn begin_authentication(
        &self,
        user_id: &str,
    ) -> Result<AuthenticationOptions, CeremonyError> {
        let credentials = self.credentials.list_for_user(user_id).await?;
        let challenge = self
            .challenges
            .issue(user_id, CeremonyKind::Authentication)
            .await?;

        tracing::debug!(
            user = user_id,
            allowed = credentials.len(),
            "issued authentication challenge"
        );

        Ok(AuthenticationOptions {
            challenge: encoding::encode(challenge.as_bytes()),
            timeout: self.timeout_ms(),
            rp_id: self.rp.id.clone(),
            allow_credentials: credentials
                .iter()
                .map(|c| CredentialDescriptor {
                    type_: PUBLIC_KEY_TYPE.to_string(),
                    id: encoding::encode(&c.credential_id),
                    transports: c.transports.clone(),
                })
                .collect(),
            user_verification: self.selection.user_verification,
        })
    }

    /// Finish an authentication ceremony.
    ///
    /// On success the credential's stored counter has been advanced and the
    /// caller may establish a session for `user_id`.
    pub async fn complete_authentication(
        &self,
        user_id: &str,
        response: &AuthenticationResponse,
    ) -> Result<VerificationResult, CeremonyError> {
        let result = self.verify_assertion(user_id, response).await;
        match &result {
            Ok(v) => tracing::info!(
                user = user_id,
                credential = %v.credential_id,
                counter = v.counter,
                "authentication verified"
            ),
            Err(e) => self.report_failure(user_id, CeremonyKind::Authentication, e),
        }
        result
    }

    /// Look up the credential and make sure it belongs to `user_id`.
    async fn owned_credential(
        &self,
        user_id: &str,
        response: &AuthenticationResponse,
    ) -> Result<CredentialRecord, CeremonyError> {
        let credential_id = decode_credential_id(response)?;
        let record = self.credentials.find_by_credential_id(&credential_id).await?;

        if record.owner != user_id {
            return Err(CeremonyError::UnknownCredential);
        }
        if let Some(handle) = &response.response.user_handle {
            let handle = encoding::decode(handle)?;
            if !bool::from(handle.as_slice().ct_eq(user_id.as_bytes())) {
                return Err(CeremonyError::UnknownCredential);
            }
        }
        Ok(record)
    }

    async fn verify_assertion(
        &self,
        user_id: &str,
        response: &AuthenticationResponse,
    ) -> Result<VerificationResult, CeremonyError> {
        let kind = CeremonyKind::Authentication;

        // Rejections before the consume leave the outstanding challenge in place.
        let record = self.owned_credential(user_id, response).await?;
        let assertion = DecodedAssertion::decode(&response.response)?;

        self.challenges
            .consume(user_id, kind, &assertion.client_data.challenge)
            .await?;

        assertion.client_data.expect_type(TYPE_GET)?;
        self.check_relying_party(&assertion.client_data, &assertion.auth_data)?;
        if !assertion.auth_data.user_present() {
            return Err(CeremonyError::Malformed("user presence flag not set".into()));
        }

        let key = CoseKey::from_bytes(&record.public_key).map_err(|e| {
            StoreError::Corrupt(format!("stored public key for credential: {e}"))
        })?;
        if key.algorithm() != record.algorithm {
            return Err(StoreError::Corrupt("stored algorithm does not match key".into()).into());
        }
        key.verify(&assertion.signed_message(), &assertion.signature)?;

        let counter = assertion.auth_data.sign_count;
        self.credentials
            .update_counter(&record.credential_id, counter)
            .await?;

        Ok(VerificationResult {
            verified: true,
            credential_id: encoding::encode(&record.credential_id),
            counter,
        })
    }
}
