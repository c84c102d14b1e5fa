//! # Binary <-> Text Encoding
//!
//! Every challenge, credential ID and user handle crosses the network as
//! base64url text. The encoder never emits padding; the decoder accepts input
//! with or without trailing `=` so values copied from padded sources still work.

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine as _,
};
use thiserror::Error;

const BASE64_URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Returned when text is not valid unpadded-or-padded base64url.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid base64url data: {0}")]
pub struct DecodeError(#[from] base64::DecodeError);

/// Encode bytes as url-safe base64 without padding.
pub fn encode(bytes: impl AsRef<[u8]>) -> String {
    BASE64_URL.encode(bytes)
}

/// Decode url-safe base64; trailing padding is optional.
pub fn decode(text: &str) -> Result<Vec<u8>, DecodeError> {
    Ok(BASE64_URL.decode(text.as_bytes())?)
}
