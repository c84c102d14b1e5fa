//! Authenticator data and attestation object parsing.
//!
//! Layout of authenticator data:
//!
//! ```text
//! rpIdHash (32) | flags (1) | signCount (4, big endian)
//!   [ aaguid (16) | credIdLen (2) | credId | COSE_Key ]   if flags & AT
//!   [ extensions (CBOR map) ]                             if flags & ED
//! ```

use crate::error::CeremonyError;
use crate::webauthn::cose::CoseKey;
use ciborium::value::Value;

pub const FLAG_USER_PRESENT: u8 = 0x01;
pub const FLAG_USER_VERIFIED: u8 = 0x04;
pub const FLAG_BACKUP_ELIGIBLE: u8 = 0x08;
pub const FLAG_BACKUP_STATE: u8 = 0x10;
pub const FLAG_ATTESTED_CREDENTIAL: u8 = 0x40;
pub const FLAG_EXTENSIONS: u8 = 0x80;

const HEADER_LEN: usize = 37;
const AAGUID_LEN: usize = 16;

#[derive(Debug, Clone)]
pub struct AttestedCredential {
    pub aaguid: [u8; AAGUID_LEN],
    pub credential_id: Vec<u8>,
    pub public_key: CoseKey,
}

#[derive(Debug, Clone)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; 32],
    pub flags: u8,
    pub sign_count: u32,
    pub attested: Option<AttestedCredential>,
}

fn malformed(msg: &str) -> CeremonyError {
    CeremonyError::Malformed(format!("authenticator data: {msg}"))
}

impl AuthenticatorData {
    pub fn parse(bytes: &[u8]) -> Result<Self, CeremonyError> {
        if bytes.len() < HEADER_LEN {
            return Err(malformed("too short"));
        }

        let mut rp_id_hash = [0u8; 32];
        rp_id_hash.copy_from_slice(&bytes[..32]);
        let flags = bytes[32];
        let sign_count = u32::from_be_bytes([bytes[33], bytes[34], bytes[35], bytes[36]]);

        let attested = if flags & FLAG_ATTESTED_CREDENTIAL != 0 {
            Some(Self::parse_attested(&bytes[HEADER_LEN..])?)
        } else {
            None
        };

        Ok(Self {
            rp_id_hash,
            flags,
            sign_count,
            attested,
        })
    }

    fn parse_attested(rest: &[u8]) -> Result<AttestedCredential, CeremonyError> {
        if rest.len() < AAGUID_LEN + 2 {
            return Err(malformed("attested credential data truncated"));
        }

        let mut aaguid = [0u8; AAGUID_LEN];
        aaguid.copy_from_slice(&rest[..AAGUID_LEN]);
        let id_len = u16::from_be_bytes([rest[AAGUID_LEN], rest[AAGUID_LEN + 1]]) as usize;

        let id_start = AAGUID_LEN + 2;
        let key_start = id_start + id_len;
        if id_len == 0 || rest.len() <= key_start {
            return Err(malformed("credential id truncated"));
        }

        // from_reader stops after the first CBOR item; any extensions map follows it.
        let key: Value = ciborium::de::from_reader(&rest[key_start..])
            .map_err(|e| malformed(&format!("credential public key: {e}")))?;

        Ok(AttestedCredential {
            aaguid,
            credential_id: rest[id_start..key_start].to_vec(),
            public_key: CoseKey::from_value(&key)?,
        })
    }

    pub fn user_present(&self) -> bool {
        self.flags & FLAG_USER_PRESENT != 0
    }

    pub fn user_verified(&self) -> bool {
        self.flags & FLAG_USER_VERIFIED != 0
    }

    pub fn backup_eligible(&self) -> bool {
        self.flags & FLAG_BACKUP_ELIGIBLE != 0
    }

    pub fn backup_state(&self) -> bool {
        self.flags & FLAG_BACKUP_STATE != 0
    }
}

fn text_field<'a>(map: &'a [(Value, Value)], name: &str) -> Option<&'a Value> {
    map.iter()
        .find(|(k, _)| k.as_text() == Some(name))
        .map(|(_, v)| v)
}

/// The parts of an attestation object this service uses.
///
/// Options ask for `attestation: "none"`, so the statement itself is not
/// verified; only its format is recorded for logging.
#[derive(Debug, Clone)]
pub struct AttestationObject {
    pub fmt: String,
    pub auth_data: Vec<u8>,
}

impl AttestationObject {
    pub fn parse(bytes: &[u8]) -> Result<Self, CeremonyError> {
        let value: Value = ciborium::de::from_reader(bytes)
            .map_err(|e| CeremonyError::Malformed(format!("attestation object: {e}")))?;
        let map = value
            .as_map()
            .ok_or_else(|| CeremonyError::Malformed("attestation object is not a map".into()))?;

        let fmt = text_field(map, "fmt")
            .and_then(Value::as_text)
            .ok_or_else(|| CeremonyError::Malformed("attestation object: missing fmt".into()))?
            .to_string();
        let auth_data = text_field(map, "authData")
            .and_then(Value::as_bytes)
            .ok_or_else(|| CeremonyError::Malformed("attestation object: missing authData".into()))?
            .clone();

        Ok(Self { fmt, auth_data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(flags: u8, count: u32) -> Vec<u8> {
        let mut out = vec![0xaa; 32];
        out.push(flags);
        out.extend_from_slice(&count.to_be_bytes());
        out
    }

    #[test]
    fn parses_assertion_header() {
        let data = AuthenticatorData::parse(&header(FLAG_USER_PRESENT | FLAG_USER_VERIFIED, 42)).unwrap();
        assert_eq!(data.rp_id_hash, [0xaa; 32]);
        assert_eq!(data.sign_count, 42);
        assert!(data.user_present());
        assert!(data.user_verified());
        assert!(!data.backup_eligible());
        assert!(data.attested.is_none());
    }

    #[test]
    fn short_input_is_malformed() {
        assert!(matches!(
            AuthenticatorData::parse(&[0u8; 36]),
            Err(CeremonyError::Malformed(_))
        ));
    }

    #[test]
    fn attested_flag_without_payload_is_malformed() {
        let mut bytes = header(FLAG_USER_PRESENT | FLAG_ATTESTED_CREDENTIAL, 0);
        bytes.extend_from_slice(&[0u8; 16]);
        bytes.extend_from_slice(&4u16.to_be_bytes());
        bytes.extend_from_slice(&[1, 2]);
        assert!(matches!(
            AuthenticatorData::parse(&bytes),
            Err(CeremonyError::Malformed(_))
        ));
    }

    #[test]
    fn attestation_object_requires_auth_data() {
        let mut bytes = Vec::new();
        let value = Value::Map(vec![(Value::Text("fmt".into()), Value::Text("none".into()))]);
        ciborium::ser::into_writer(&value, &mut bytes).unwrap();
        assert!(matches!(
            AttestationObject::parse(&bytes),
            Err(CeremonyError::Malformed(_))
        ));
        assert!(AttestationObject::parse(b"\xff\xff").is_err());
    }
}
