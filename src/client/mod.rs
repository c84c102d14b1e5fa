//! # Client Ceremony Adapter
//!
//! Runs a full ceremony from the client side:
//! 1. Check the platform can do WebAuthn at all
//! 2. Fetch options from the relying party
//! 3. Hand them, as bytes, to the platform authenticator (the biometric prompt)
//! 4. Post the encoded result back for verification
//!
//! Step 3 is the only place the adapter waits on the user, and it can be
//! cancelled by the caller. Platform failures are translated into
//! [`ClientError`] before they leave this module.

mod error;
mod platform;
mod transport;

pub use error::{ClientError, PlatformError};
pub use platform::{
    AssertedCredential, AssertionRequest, CreatedCredential, CreationRequest, CredentialRef,
    PlatformCapabilities, PlatformCredentials,
};
pub use transport::{CeremonyTransport, HttpTransport, LocalTransport};

use crate::webauthn::types::{AuthenticationResponse, RegistrationResponse, VerificationResult};
use std::future::Future;

pub struct CeremonyClient<P, T> {
    platform: P,
    transport: T,
}

impl<P, T> CeremonyClient<P, T>
where
    P: PlatformCredentials,
    T: CeremonyTransport,
{
    pub fn new(platform: P, transport: T) -> Self {
        Self {
            platform,
            transport,
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Register a new platform credential for `user_id`.
    pub async fn register(&self, user_id: &str) -> Result<VerificationResult, ClientError> {
        self.register_with_cancel(user_id, std::future::pending()).await
    }

    /// Like [`register`](Self::register); resolving `cancel` while the platform
    /// prompt is open ends the ceremony with [`ClientError::Aborted`].
    pub async fn register_with_cancel<C>(
        &self,
        user_id: &str,
        cancel: C,
    ) -> Result<VerificationResult, ClientError>
    where
        C: Future<Output = ()> + Send,
    {
        self.platform.capabilities().check()?;

        let options = self.transport.registration_options(user_id).await?;
        tracing::debug!(
            user = user_id,
            excluded = options.exclude_credentials.len(),
            timeout_ms = options.timeout,
            "registration options received"
        );

        let request = CreationRequest::try_from(&options)?;
        let created = tokio::select! {
            biased;
            _ = cancel => return Err(ClientError::Aborted),
            created = self.platform.create(request) => created?,
        };
        tracing::debug!(user = user_id, "platform credential created");

        let result = self
            .transport
            .verify_registration(user_id, RegistrationResponse::from(created))
            .await?;
        ensure_verified(result)
    }

    /// Sign in as `user_id` with a previously registered credential.
    pub async fn authenticate(&self, user_id: &str) -> Result<VerificationResult, ClientError> {
        self.authenticate_with_cancel(user_id, std::future::pending()).await
    }

    pub async fn authenticate_with_cancel<C>(
        &self,
        user_id: &str,
        cancel: C,
    ) -> Result<VerificationResult, ClientError>
    where
        C: Future<Output = ()> + Send,
    {
        self.platform.capabilities().check()?;

        let options = self.transport.authentication_options(user_id).await?;
        tracing::debug!(
            user = user_id,
            allowed = options.allow_credentials.len(),
            timeout_ms = options.timeout,
            "authentication options received"
        );

        let request = AssertionRequest::try_from(&options)?;
        let asserted = tokio::select! {
            biased;
            _ = cancel => return Err(ClientError::Aborted),
            asserted = self.platform.get(request) => asserted?,
        };

        let result = self
            .transport
            .verify_authentication(user_id, AuthenticationResponse::from(asserted))
            .await?;
        ensure_verified(result)
    }
}

fn ensure_verified(result: VerificationResult) -> Result<VerificationResult, ClientError> {
    if result.verified {
        Ok(result)
    } else {
        Err(ClientError::VerificationFailed {
            status: 200,
            reason: "not verified".into(),
        })
    }
}
