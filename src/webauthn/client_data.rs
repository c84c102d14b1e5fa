//! Parsing of `clientDataJSON`, the browser-built record of what was signed.

use crate::encoding;
use crate::error::CeremonyError;
use serde::Deserialize;
use sha2::{Digest, Sha256};

pub const TYPE_CREATE: &str = "webauthn.create";
pub const TYPE_GET: &str = "webauthn.get";

#[derive(Debug, Clone, Deserialize)]
pub struct ClientData {
    #[serde(rename = "type")]
    pub ceremony_type: String,
    /// base64url challenge as seen by the browser
    pub challenge: String,
    pub origin: String,
    #[serde(default, rename = "crossOrigin")]
    pub cross_origin: bool,
}

/// Client data plus the values derived from its raw bytes.
#[derive(Debug, Clone)]
pub struct ParsedClientData {
    pub data: ClientData,
    pub challenge: Vec<u8>,
    /// SHA-256 of the exact bytes the authenticator signed over
    pub hash: [u8; 32],
}

impl ParsedClientData {
    pub fn from_bytes(raw: &[u8]) -> Result<Self, CeremonyError> {
        let data: ClientData = serde_json::from_slice(raw)
            .map_err(|e| CeremonyError::Malformed(format!("clientDataJSON: {e}")))?;
        let challenge = encoding::decode(&data.challenge)?;
        let hash = Sha256::digest(raw).into();

        Ok(Self {
            data,
            challenge,
            hash,
        })
    }

    pub fn expect_type(&self, expected: &str) -> Result<(), CeremonyError> {
        if self.data.ceremony_type == expected {
            Ok(())
        } else {
            Err(CeremonyError::Malformed(format!(
                "clientData type '{}' where '{}' was expected",
                self.data.ceremony_type, expected
            )))
        }
    }
}
