//! COSE public keys (RFC 9052 / 9053) and assertion signature verification.
//!
//! Supported:
//! - ES256: EC2 key on P-256, ECDSA with SHA-256, DER-encoded signatures
//! - EdDSA: OKP key on Ed25519, 64-byte signatures

use crate::error::CeremonyError;
use crate::registry::{COSE_ALG_EDDSA, COSE_ALG_ES256};
use ciborium::value::Value;

const LABEL_KTY: i64 = 1;
const LABEL_ALG: i64 = 3;
const LABEL_CRV: i64 = -1;
const LABEL_X: i64 = -2;
const LABEL_Y: i64 = -3;

const KTY_OKP: i64 = 1;
const KTY_EC2: i64 = 2;
const CRV_P256: i64 = 1;
const CRV_ED25519: i64 = 6;

#[derive(Clone, PartialEq, Eq)]
pub enum CoseKey {
    Es256 { x: [u8; 32], y: [u8; 32] },
    EdDsa { x: [u8; 32] },
}

impl std::fmt::Debug for CoseKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoseKey::Es256 { .. } => f.write_str("CoseKey::Es256"),
            CoseKey::EdDsa { .. } => f.write_str("CoseKey::EdDsa"),
        }
    }
}

fn field(map: &[(Value, Value)], label: i64) -> Option<&Value> {
    map.iter()
        .find(|(k, _)| k.as_integer().and_then(|i| i64::try_from(i).ok()) == Some(label))
        .map(|(_, v)| v)
}

fn int_field(map: &[(Value, Value)], label: i64) -> Result<i64, CeremonyError> {
    field(map, label)
        .and_then(Value::as_integer)
        .and_then(|i| i64::try_from(i).ok())
        .ok_or_else(|| CeremonyError::Malformed(format!("COSE key: missing integer label {label}")))
}

fn coordinate(map: &[(Value, Value)], label: i64) -> Result<[u8; 32], CeremonyError> {
    field(map, label)
        .and_then(Value::as_bytes)
        .and_then(|b| <[u8; 32]>::try_from(b.as_slice()).ok())
        .ok_or_else(|| CeremonyError::Malformed(format!("COSE key: bad coordinate {label}")))
}

impl CoseKey {
    pub fn from_value(value: &Value) -> Result<Self, CeremonyError> {
        let map = value
            .as_map()
            .ok_or_else(|| CeremonyError::Malformed("COSE key is not a map".into()))?;

        let kty = int_field(map, LABEL_KTY)?;
        let alg = int_field(map, LABEL_ALG)?;

        let key = match (kty, alg) {
            (KTY_EC2, alg) if alg == COSE_ALG_ES256 as i64 => {
                if int_field(map, LABEL_CRV)? != CRV_P256 {
                    return Err(CeremonyError::NotSupported("EC2 curve other than P-256".into()));
                }
                CoseKey::Es256 {
                    x: coordinate(map, LABEL_X)?,
                    y: coordinate(map, LABEL_Y)?,
                }
            }
            (KTY_OKP, alg) if alg == COSE_ALG_EDDSA as i64 => {
                if int_field(map, LABEL_CRV)? != CRV_ED25519 {
                    return Err(CeremonyError::NotSupported("OKP curve other than Ed25519".into()));
                }
                CoseKey::EdDsa {
                    x: coordinate(map, LABEL_X)?,
                }
            }
            (kty, alg) => {
                return Err(CeremonyError::NotSupported(format!(
                    "COSE key type {kty} with algorithm {alg}"
                )))
            }
        };

        // Reject points that are not on the curve now rather than at first login.
        key.check_point()?;
        Ok(key)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CeremonyError> {
        let value: Value = ciborium::de::from_reader(bytes)
            .map_err(|e| CeremonyError::Malformed(format!("COSE key: {e}")))?;
        Self::from_value(&value)
    }

    pub fn algorithm(&self) -> i32 {
        match self {
            CoseKey::Es256 { .. } => COSE_ALG_ES256,
            CoseKey::EdDsa { .. } => COSE_ALG_EDDSA,
        }
    }

    /// Canonical CBOR encoding, the form kept in the credential registry.
    pub fn to_bytes(&self) -> Vec<u8> {
        let int = |v: i64| Value::Integer(v.into());
        let map = match self {
            CoseKey::Es256 { x, y } => vec![
                (int(LABEL_KTY), int(KTY_EC2)),
                (int(LABEL_ALG), int(COSE_ALG_ES256 as i64)),
                (int(LABEL_CRV), int(CRV_P256)),
                (int(LABEL_X), Value::Bytes(x.to_vec())),
                (int(LABEL_Y), Value::Bytes(y.to_vec())),
            ],
            CoseKey::EdDsa { x } => vec![
                (int(LABEL_KTY), int(KTY_OKP)),
                (int(LABEL_ALG), int(COSE_ALG_EDDSA as i64)),
                (int(LABEL_CRV), int(CRV_ED25519)),
                (int(LABEL_X), Value::Bytes(x.to_vec())),
            ],
        };

        let mut out = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = ciborium::ser::into_writer(&Value::Map(map), &mut out);
        out
    }

    fn check_point(&self) -> Result<(), CeremonyError> {
        match self {
            CoseKey::Es256 { .. } => self.es256_key().map(|_| ()),
            CoseKey::EdDsa { x } => ed25519_dalek::VerifyingKey::from_bytes(x)
                .map(|_| ())
                .map_err(|_| CeremonyError::Malformed("invalid Ed25519 public key".into())),
        }
    }

    fn es256_key(&self) -> Result<p256::ecdsa::VerifyingKey, CeremonyError> {
        let CoseKey::Es256 { x, y } = self else {
            return Err(CeremonyError::NotSupported("not an ES256 key".into()));
        };
        let mut sec1 = Vec::with_capacity(65);
        sec1.push(0x04);
        sec1.extend_from_slice(x);
        sec1.extend_from_slice(y);
        p256::ecdsa::VerifyingKey::from_sec1_bytes(&sec1)
            .map_err(|_| CeremonyError::Malformed("invalid P-256 public key".into()))
    }

    /// Verify `signature` over `message` (authenticatorData ‖ clientDataHash).
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), CeremonyError> {
        match self {
            CoseKey::Es256 { .. } => {
                use p256::ecdsa::{signature::Verifier, Signature};

                let key = self.es256_key()?;
                let sig =
                    Signature::from_der(signature).map_err(|_| CeremonyError::SignatureInvalid)?;
                key.verify(message, &sig)
                    .map_err(|_| CeremonyError::SignatureInvalid)
            }
            CoseKey::EdDsa { x } => {
                use ed25519_dalek::{Signature, Verifier, VerifyingKey};

                let key = VerifyingKey::from_bytes(x)
                    .map_err(|_| CeremonyError::Malformed("invalid Ed25519 public key".into()))?;
                let sig =
                    Signature::from_slice(signature).map_err(|_| CeremonyError::SignatureInvalid)?;
                key.verify(message, &sig)
                    .map_err(|_| CeremonyError::SignatureInvalid)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::{signature::Signer, Signature, SigningKey};
    use p256::elliptic_curve::sec1::ToEncodedPoint;
    use rand::rngs::OsRng;

    fn es256_pair() -> (SigningKey, CoseKey) {
        let sk = SigningKey::random(&mut OsRng);
        let point = p256::PublicKey::from(sk.verifying_key()).to_encoded_point(false);
        let mut x = [0u8; 32];
        let mut y = [0u8; 32];
        x.copy_from_slice(point.x().unwrap());
        y.copy_from_slice(point.y().unwrap());
        (sk, CoseKey::Es256 { x, y })
    }

    #[test]
    fn es256_signature_verifies_and_tampering_fails() {
        let (sk, key) = es256_pair();
        let msg = b"authenticator data || client data hash";
        let sig: Signature = sk.sign(msg);
        let der = sig.to_der();

        key.verify(msg, der.as_bytes()).unwrap();
        assert!(matches!(
            key.verify(b"something else", der.as_bytes()),
            Err(CeremonyError::SignatureInvalid)
        ));
        assert!(matches!(
            key.verify(msg, &[0x30, 0x00]),
            Err(CeremonyError::SignatureInvalid)
        ));
    }

    #[test]
    fn encoding_round_trips_through_cbor() {
        let (_, key) = es256_pair();
        let decoded = CoseKey::from_bytes(&key.to_bytes()).unwrap();
        assert_eq!(decoded, key);
        assert_eq!(decoded.algorithm(), COSE_ALG_ES256);
    }

    #[test]
    fn eddsa_signature_verifies() {
        use ed25519_dalek::{Signer as _, SigningKey as EdSigningKey};

        let sk = EdSigningKey::from_bytes(&[7u8; 32]);
        let key = CoseKey::EdDsa {
            x: sk.verifying_key().to_bytes(),
        };
        let decoded = CoseKey::from_bytes(&key.to_bytes()).unwrap();
        let sig = sk.sign(b"msg");
        decoded.verify(b"msg", &sig.to_bytes()).unwrap();
        assert!(decoded.verify(b"other", &sig.to_bytes()).is_err());
    }

    #[test]
    fn rs256_is_not_supported() {
        let value = Value::Map(vec![
            (Value::Integer(1.into()), Value::Integer(3.into())),
            (Value::Integer(3.into()), Value::Integer((-257).into())),
        ]);
        assert!(matches!(
            CoseKey::from_value(&value),
            Err(CeremonyError::NotSupported(_))
        ));
    }

    #[test]
    fn off_curve_point_is_rejected() {
        let mut bytes = Vec::new();
        let value = Value::Map(vec![
            (Value::Integer(1.into()), Value::Integer(2.into())),
            (Value::Integer(3.into()), Value::Integer((-7).into())),
            (Value::Integer((-1).into()), Value::Integer(1.into())),
            (Value::Integer((-2).into()), Value::Bytes(vec![1u8; 32])),
            (Value::Integer((-3).into()), Value::Bytes(vec![2u8; 32])),
        ]);
        ciborium::ser::into_writer(&value, &mut bytes).unwrap();
        assert!(matches!(
            CoseKey::from_bytes(&bytes),
            Err(CeremonyError::Malformed(_))
        ));
    }
}
