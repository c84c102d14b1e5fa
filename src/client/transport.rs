//! How the ceremony adapter talks to the relying party.

use super::error::ClientError;
use crate::error::CeremonyError;
use crate::webauthn::types::*;
use crate::webauthn::CeremonyEngine;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use url::Url;

/// The four ceremony endpoints, independent of how they are reached.
#[async_trait]
pub trait CeremonyTransport: Send + Sync {
    async fn registration_options(&self, user_id: &str) -> Result<RegistrationOptions, ClientError>;

    async fn verify_registration(
        &self,
        user_id: &str,
        credential: RegistrationResponse,
    ) -> Result<VerificationResult, ClientError>;

    async fn authentication_options(
        &self,
        user_id: &str,
    ) -> Result<AuthenticationOptions, ClientError>;

    async fn verify_authentication(
        &self,
        user_id: &str,
        credential: AuthenticationResponse,
    ) -> Result<VerificationResult, ClientError>;
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// JSON over HTTP with a cookie jar, so the session set by a successful
/// authentication is kept for later requests.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base: Url,
}

impl HttpTransport {
    pub fn new(base: Url) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder().cookie_store(true).build()?;
        Ok(Self { client, base })
    }

    /// `{base}/auth/{ceremony}/{user}/{step}`, with `user` percent-encoded.
    fn endpoint(&self, ceremony: &str, user_id: &str, step: &str) -> Result<Url, ClientError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::TransportFailure(format!("{} cannot be a base URL", self.base)))?
            .pop_if_empty()
            .extend(["auth", ceremony, user_id, step]);
        Ok(url)
    }

    async fn post<B, R>(&self, url: Url, body: Option<&B>) -> Result<R, ClientError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let mut request = self.client.post(url.clone());
        request = match body {
            Some(body) => request.json(body),
            None => request.header(reqwest::header::CONTENT_TYPE, "application/json"),
        };

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let reason = response
            .json::<ErrorBody>()
            .await
            .map(|b| b.error)
            .unwrap_or_else(|_| status.canonical_reason().unwrap_or("unknown").to_string());
        tracing::debug!(%url, %status, %reason, "ceremony request rejected");
        Err(ClientError::VerificationFailed {
            status: status.as_u16(),
            reason,
        })
    }
}

#[async_trait]
impl CeremonyTransport for HttpTransport {
    async fn registration_options(&self, user_id: &str) -> Result<RegistrationOptions, ClientError> {
        let url = self.endpoint("register", user_id, "challenge")?;
        self.post::<(), _>(url, None).await
    }

    async fn verify_registration(
        &self,
        user_id: &str,
        credential: RegistrationResponse,
    ) -> Result<VerificationResult, ClientError> {
        let url = self.endpoint("register", user_id, "verify")?;
        self.post(url, Some(&RegistrationVerifyRequest { credential })).await
    }

    async fn authentication_options(
        &self,
        user_id: &str,
    ) -> Result<AuthenticationOptions, ClientError> {
        let url = self.endpoint("authenticate", user_id, "challenge")?;
        self.post::<(), _>(url, None).await
    }

    async fn verify_authentication(
        &self,
        user_id: &str,
        credential: AuthenticationResponse,
    ) -> Result<VerificationResult, ClientError> {
        let url = self.endpoint("authenticate", user_id, "verify")?;
        self.post(url, Some(&AuthenticationVerifyRequest { credential })).await
    }
}

/// Drives a [`CeremonyEngine`] in the same process, with no HTTP in between.
///
/// Errors come back in the same shape the HTTP endpoints would produce.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    engine: Arc<CeremonyEngine>,
}

impl LocalTransport {
    pub fn new(engine: Arc<CeremonyEngine>) -> Self {
        Self { engine }
    }
}

fn rejected(err: CeremonyError) -> ClientError {
    let status = err.status_code();
    ClientError::VerificationFailed {
        status: status.as_u16(),
        reason: err.client_reason().to_string(),
    }
}

#[async_trait]
impl CeremonyTransport for LocalTransport {
    async fn registration_options(&self, user_id: &str) -> Result<RegistrationOptions, ClientError> {
        self.engine.begin_registration(user_id).await.map_err(rejected)
    }

    async fn verify_registration(
        &self,
        user_id: &str,
        credential: RegistrationResponse,
    ) -> Result<VerificationResult, ClientError> {
        self.engine
            .complete_registration(user_id, &credential)
            .await
            .map_err(rejected)
    }

    async fn authentication_options(
        &self,
        user_id: &str,
    ) -> Result<AuthenticationOptions, ClientError> {
        self.engine.begin_authentication(user_id).await.map_err(rejected)
    }

    async fn verify_authentication(
        &self,
        user_id: &str,
        credential: AuthenticationResponse,
    ) -> Result<VerificationResult, ClientError> {
        self.engine
            .complete_authentication(user_id, &credential)
            .await
            .map_err(rejected)
    }
}
