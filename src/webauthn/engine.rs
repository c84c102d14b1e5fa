use crate::challenge::{CeremonyKind, ChallengeStore};
use crate::error::CeremonyError;
use crate::registry::CredentialRegistry;
use crate::webauthn::authenticator_data::AuthenticatorData;
use crate::webauthn::client_data::ParsedClientData;
use crate::webauthn::types::AuthenticatorSelection;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// The service identity credentials are scoped to.
///
/// Built from deployment configuration only; nothing in a request can change it.
#[derive(Debug, Clone)]
pub struct RelyingParty {
    pub id: String,
    pub name: String,
    /// Serialized origin, e.g. `https://fit.example.com`
    pub origin: String,
    id_hash: [u8; 32],
}

impl RelyingParty {
    pub fn new(id: impl Into<String>, name: impl Into<String>, origin: impl Into<String>) -> Self {
        let id = id.into();
        let id_hash = Sha256::digest(id.as_bytes()).into();
        Self {
            id,
            name: name.into(),
            origin: origin.into(),
            id_hash,
        }
    }

    pub fn id_hash(&self) -> &[u8; 32] {
        &self.id_hash
    }
}

/// Runs the registration and authentication ceremonies.
///
/// Per-user ceremony state is nothing more than the outstanding challenge in
/// the [`ChallengeStore`]: "awaiting response" means an entry exists, "idle"
/// means it does not.
pub struct CeremonyEngine {
    pub(crate) rp: RelyingParty,
    pub(crate) challenges: Arc<dyn ChallengeStore>,
    pub(crate) credentials: Arc<dyn CredentialRegistry>,
    pub(crate) selection: AuthenticatorSelection,
}

impl CeremonyEngine {
    pub fn new(
        rp: RelyingParty,
        challenges: Arc<dyn ChallengeStore>,
        credentials: Arc<dyn CredentialRegistry>,
    ) -> Self {
        Self {
            rp,
            challenges,
            credentials,
            selection: AuthenticatorSelection::default(),
        }
    }

    pub fn with_selection(mut self, selection: AuthenticatorSelection) -> Self {
        self.selection = selection;
        self
    }

    pub fn relying_party(&self) -> &RelyingParty {
        &self.rp
    }

    pub fn challenges(&self) -> &Arc<dyn ChallengeStore> {
        &self.challenges
    }

    pub(crate) fn timeout_ms(&self) -> u64 {
        u64::try_from(self.challenges.ttl().num_milliseconds()).unwrap_or(0)
    }

    /// Anti-phishing: the browser-reported origin and the authenticator's RP ID
    /// hash must both name this relying party.
    pub(crate) fn check_relying_party(
        &self,
        client: &ParsedClientData,
        auth: &AuthenticatorData,
    ) -> Result<(), CeremonyError> {
        if client.data.cross_origin || client.data.origin != self.rp.origin {
            return Err(CeremonyError::OriginMismatch);
        }
        if !bool::from(auth.rp_id_hash.as_slice().ct_eq(self.rp.id_hash().as_slice())) {
            return Err(CeremonyError::OriginMismatch);
        }
        Ok(())
    }

    pub(crate) fn report_failure(&self, user_id: &str, kind: CeremonyKind, error: &CeremonyError) {
        if error.is_security_relevant() {
            tracing::warn!(
                target: "security",
                user = user_id,
                %kind,
                reason = %error,
                "ceremony denied"
            );
        } else if matches!(error, CeremonyError::Storage(_)) {
            tracing::error!(user = user_id, %kind, "ceremony failed: {}", error);
        } else {
            tracing::info!(user = user_id, %kind, reason = %error, "ceremony rejected");
        }
    }
}

impl std::fmt::Debug for CeremonyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CeremonyEngine")
            .field("rp", &self.rp)
            .field("selection", &self.selection)
            .finish_non_exhaustive()
    }
}
