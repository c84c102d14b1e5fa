#![allow(dead_code)]

use async_trait::async_trait;
use biometric_auth::challenge::MemoryChallengeStore;
use biometric_auth::client::{
    AssertedCredential, AssertionRequest, CreatedCredential, CreationRequest, PlatformCapabilities,
    PlatformCredentials, PlatformError,
};
use biometric_auth::db::{self, credentials::SqliteCredentialRegistry};
use biometric_auth::encoding;
use biometric_auth::webauthn::cose::CoseKey;
use biometric_auth::webauthn::types::*;
use biometric_auth::webauthn::{CeremonyEngine, RelyingParty};
use ciborium::value::Value;
use p256::ecdsa::{signature::Signer, Signature, SigningKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::sync::Arc;

pub const RP_ID: &str = "localhost";
pub const ORIGIN: &str = "http://localhost:8080";

const FLAGS_UP_UV: u8 = 0x01 | 0x04;
const FLAG_AT: u8 = 0x40;

pub struct Harness {
    pub engine: Arc<CeremonyEngine>,
    pub challenges: Arc<MemoryChallengeStore>,
    pub pool: SqlitePool,
}

pub async fn harness() -> Harness {
    harness_with_ttl(chrono::Duration::seconds(60)).await
}

pub async fn harness_with_ttl(ttl: chrono::Duration) -> Harness {
    let pool = db::connect_in_memory().await.unwrap();
    let challenges = Arc::new(MemoryChallengeStore::new(ttl));
    let credentials = Arc::new(SqliteCredentialRegistry::new(pool.clone()));
    let engine = CeremonyEngine::new(
        RelyingParty::new(RP_ID, "FitTrack", ORIGIN),
        challenges.clone(),
        credentials,
    );
    Harness {
        engine: Arc::new(engine),
        challenges,
        pool,
    }
}

/// A P-256 platform authenticator in software.
#[derive(Clone)]
pub struct SoftAuthenticator {
    key: SigningKey,
    pub credential_id: Vec<u8>,
    pub rp_id: String,
    pub origin: String,
    pub counter: u32,
    /// Added to the counter on every assertion; 0 models counterless authenticators.
    pub counter_step: u32,
    /// Set by the platform wrapper at creation time.
    pub user_handle: Vec<u8>,
}

impl SoftAuthenticator {
    pub fn new() -> Self {
        let mut credential_id = vec![0u8; 16];
        OsRng.fill_bytes(&mut credential_id);
        Self {
            key: SigningKey::random(&mut OsRng),
            credential_id,
            rp_id: RP_ID.to_string(),
            origin: ORIGIN.to_string(),
            counter: 0,
            counter_step: 1,
            user_handle: Vec::new(),
        }
    }

    pub fn cose_key(&self) -> CoseKey {
        let point = p256::PublicKey::from(self.key.verifying_key()).to_encoded_point(false);
        let mut x = [0u8; 32];
        let mut y = [0u8; 32];
        x.copy_from_slice(point.x().unwrap());
        y.copy_from_slice(point.y().unwrap());
        CoseKey::Es256 { x, y }
    }

    fn authenticator_data(&self, counter: u32, attested: bool) -> Vec<u8> {
        let mut out = Sha256::digest(self.rp_id.as_bytes()).to_vec();
        out.push(if attested { FLAGS_UP_UV | FLAG_AT } else { FLAGS_UP_UV });
        out.extend_from_slice(&counter.to_be_bytes());
        if attested {
            out.extend_from_slice(&[0u8; 16]);
            out.extend_from_slice(&(self.credential_id.len() as u16).to_be_bytes());
            out.extend_from_slice(&self.credential_id);
            out.extend_from_slice(&self.cose_key().to_bytes());
        }
        out
    }

    fn client_data(&self, ceremony_type: &str, challenge: &[u8]) -> Vec<u8> {
        serde_json::json!({
            "type": ceremony_type,
            "challenge": encoding::encode(challenge),
            "origin": self.origin,
            "crossOrigin": false,
        })
        .to_string()
        .into_bytes()
    }

    pub fn create(&self, challenge: &[u8]) -> CreatedCredential {
        let auth_data = self.authenticator_data(self.counter, true);
        let attestation = Value::Map(vec![
            (Value::Text("fmt".into()), Value::Text("none".into())),
            (Value::Text("attStmt".into()), Value::Map(vec![])),
            (Value::Text("authData".into()), Value::Bytes(auth_data)),
        ]);
        let mut attestation_object = Vec::new();
        ciborium::ser::into_writer(&attestation, &mut attestation_object).unwrap();

        CreatedCredential {
            raw_id: self.credential_id.clone(),
            client_data_json: self.client_data("webauthn.create", challenge),
            attestation_object,
            transports: vec!["internal".into()],
            attachment: Some("platform".into()),
        }
    }

    /// Sign an assertion with an explicit counter, leaving state untouched.
    pub fn get_with_counter(
        &self,
        challenge: &[u8],
        user_handle: &[u8],
        counter: u32,
    ) -> AssertedCredential {
        let authenticator_data = self.authenticator_data(counter, false);
        let client_data_json = self.client_data("webauthn.get", challenge);

        let mut message = authenticator_data.clone();
        message.extend_from_slice(&Sha256::digest(&client_data_json));
        let signature: Signature = self.key.sign(&message);

        AssertedCredential {
            raw_id: self.credential_id.clone(),
            client_data_json,
            authenticator_data,
            signature: signature.to_der().as_bytes().to_vec(),
            user_handle: Some(user_handle.to_vec()),
            attachment: Some("platform".into()),
        }
    }

    pub fn get(&mut self, challenge: &[u8], user_handle: &[u8]) -> AssertedCredential {
        self.counter += self.counter_step;
        self.get_with_counter(challenge, user_handle, self.counter)
    }

    pub fn register_response(&self, options: &RegistrationOptions) -> RegistrationResponse {
        self.create(&decode(&options.challenge)).into()
    }

    pub fn authenticate_response(
        &mut self,
        options: &AuthenticationOptions,
        user_id: &str,
    ) -> AuthenticationResponse {
        self.get(&decode(&options.challenge), user_id.as_bytes()).into()
    }
}

pub fn decode(text: &str) -> Vec<u8> {
    encoding::decode(text).unwrap()
}

/// [`SoftAuthenticator`] behind the platform credential API.
pub struct SoftPlatform {
    pub authenticator: tokio::sync::Mutex<SoftAuthenticator>,
}

impl SoftPlatform {
    pub fn new(authenticator: SoftAuthenticator) -> Self {
        Self {
            authenticator: tokio::sync::Mutex::new(authenticator),
        }
    }
}

#[async_trait]
impl PlatformCredentials for SoftPlatform {
    fn capabilities(&self) -> PlatformCapabilities {
        PlatformCapabilities {
            credentials_api: true,
            secure_context: true,
        }
    }

    async fn create(&self, request: CreationRequest) -> Result<CreatedCredential, PlatformError> {
        let mut auth = self.authenticator.lock().await;
        if request.rp.id != auth.rp_id {
            return Err(PlatformError::new("SecurityError", "rp id mismatch"));
        }
        if request.exclude.iter().any(|c| c.id == auth.credential_id) {
            return Err(PlatformError::new("InvalidStateError", "already registered"));
        }
        auth.user_handle = request.user_handle.clone();
        Ok(auth.create(&request.challenge))
    }

    async fn get(&self, request: AssertionRequest) -> Result<AssertedCredential, PlatformError> {
        let mut auth = self.authenticator.lock().await;
        if !request.allow.iter().any(|c| c.id == auth.credential_id) {
            return Err(PlatformError::new("NotAllowedError", "no matching credential"));
        }
        let handle = auth.user_handle.clone();
        Ok(auth.get(&request.challenge, &handle))
    }
}
