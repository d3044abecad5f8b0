#[cfg(any(test, feature = "testing"))]
use ciborium::value::Integer;
use ciborium::value::Value as CborValue;
use ring::signature::{self, RsaPublicKeyComponents, UnparsedPublicKey};

use crate::errors::PasskeyError;
use crate::types::CoseAlgorithm;

// COSE_Key labels (RFC 9052/9053)
const LABEL_KTY: i64 = 1;
const LABEL_ALG: i64 = 3;
const LABEL_CRV: i64 = -1;
const LABEL_X: i64 = -2;
const LABEL_Y: i64 = -3;
const LABEL_N: i64 = -1;
const LABEL_E: i64 = -2;

const KTY_EC2: i64 = 2;
const KTY_RSA: i64 = 3;
const CRV_P256: i64 = 1;

/// A credential public key ready for signature verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum VerifyingKey {
    /// Uncompressed SEC1 point (0x04 || x || y)
    Es256(Vec<u8>),
    Rs256 { n: Vec<u8>, e: Vec<u8> },
}

impl VerifyingKey {
    pub(crate) fn from_cose(cose_key: &[u8]) -> Result<Self, PasskeyError> {
        let value: CborValue = ciborium::de::from_reader(cose_key)
            .map_err(|e| PasskeyError::Format(format!("Invalid COSE key CBOR: {e}")))?;
        let CborValue::Map(map) = value else {
            return Err(PasskeyError::Format("COSE key is not a map".to_string()));
        };

        let alg = get_int(&map, LABEL_ALG)?;
        let algorithm = CoseAlgorithm::from_id(alg)
            .ok_or_else(|| PasskeyError::UnsupportedAlgorithm(alg.to_string()))?;
        let kty = get_int(&map, LABEL_KTY)?;

        match (algorithm, kty) {
            (CoseAlgorithm::Es256, KTY_EC2) => {
                let crv = get_int(&map, LABEL_CRV)?;
                if crv != CRV_P256 {
                    return Err(PasskeyError::UnsupportedAlgorithm(format!(
                        "ES256 with curve {crv}"
                    )));
                }
                let x = get_bytes(&map, LABEL_X)?;
                let y = get_bytes(&map, LABEL_Y)?;
                if x.len() != 32 || y.len() != 32 {
                    return Err(PasskeyError::Format(format!(
                        "Invalid P-256 coordinate lengths: x={}, y={}",
                        x.len(),
                        y.len()
                    )));
                }
                let mut point = Vec::with_capacity(65);
                point.push(0x04);
                point.extend_from_slice(x);
                point.extend_from_slice(y);
                Ok(Self::Es256(point))
            }
            (CoseAlgorithm::Rs256, KTY_RSA) => Ok(Self::Rs256 {
                n: get_bytes(&map, LABEL_N)?.to_vec(),
                e: get_bytes(&map, LABEL_E)?.to_vec(),
            }),
            (algorithm, kty) => Err(PasskeyError::Format(format!(
                "Key type {kty} does not match algorithm {algorithm}"
            ))),
        }
    }

    pub(crate) fn algorithm(&self) -> CoseAlgorithm {
        match self {
            Self::Es256(_) => CoseAlgorithm::Es256,
            Self::Rs256 { .. } => CoseAlgorithm::Rs256,
        }
    }

    /// Verifies `sig` over `message` with this key.
    ///
    /// ES256 signatures are ASN.1 DER encoded as WebAuthn authenticators emit them.
    pub(crate) fn verify(&self, message: &[u8], sig: &[u8]) -> Result<(), PasskeyError> {
        let result = match self {
            Self::Es256(point) => {
                UnparsedPublicKey::new(&signature::ECDSA_P256_SHA256_ASN1, point)
                    .verify(message, sig)
            }
            Self::Rs256 { n, e } => RsaPublicKeyComponents { n, e }.verify(
                &signature::RSA_PKCS1_2048_8192_SHA256,
                message,
                sig,
            ),
        };
        result.map_err(|_| PasskeyError::SignatureInvalid)
    }
}

fn find<'a>(map: &'a [(CborValue, CborValue)], label: i64) -> Option<&'a CborValue> {
    map.iter().find_map(|(k, v)| match k {
        CborValue::Integer(i) if i64::try_from(*i).ok() == Some(label) => Some(v),
        _ => None,
    })
}

fn get_int(map: &[(CborValue, CborValue)], label: i64) -> Result<i64, PasskeyError> {
    match find(map, label) {
        Some(CborValue::Integer(i)) => i64::try_from(*i)
            .map_err(|_| PasskeyError::Format(format!("COSE label {label} out of range"))),
        _ => Err(PasskeyError::Format(format!(
            "Missing or invalid COSE label {label}"
        ))),
    }
}

fn get_bytes(map: &[(CborValue, CborValue)], label: i64) -> Result<&[u8], PasskeyError> {
    match find(map, label) {
        Some(CborValue::Bytes(b)) => Ok(b),
        _ => Err(PasskeyError::Format(format!(
            "Missing or invalid COSE label {label}"
        ))),
    }
}

#[cfg(any(test, feature = "testing"))]
fn encode_map(entries: Vec<(i64, CborValue)>) -> Vec<u8> {
    let map = CborValue::Map(
        entries
            .into_iter()
            .map(|(k, v)| (CborValue::Integer(Integer::from(k)), v))
            .collect(),
    );
    let mut out = Vec::new();
    // Writing into a Vec cannot fail
    let _ = ciborium::ser::into_writer(&map, &mut out);
    out
}

/// Encodes a P-256 public key (x, y coordinates) as an ES256 COSE_Key.
#[cfg(any(test, feature = "testing"))]
pub(crate) fn encode_es256(x: &[u8], y: &[u8]) -> Vec<u8> {
    encode_map(vec![
        (LABEL_KTY, CborValue::Integer(Integer::from(KTY_EC2))),
        (
            LABEL_ALG,
            CborValue::Integer(Integer::from(CoseAlgorithm::Es256.id())),
        ),
        (LABEL_CRV, CborValue::Integer(Integer::from(CRV_P256))),
        (LABEL_X, CborValue::Bytes(x.to_vec())),
        (LABEL_Y, CborValue::Bytes(y.to_vec())),
    ])
}

/// Encodes an RSA public key (modulus, exponent) as an RS256 COSE_Key.
#[cfg(any(test, feature = "testing"))]
pub(crate) fn encode_rs256(n: &[u8], e: &[u8]) -> Vec<u8> {
    encode_map(vec![
        (LABEL_KTY, CborValue::Integer(Integer::from(KTY_RSA))),
        (
            LABEL_ALG,
            CborValue::Integer(Integer::from(CoseAlgorithm::Rs256.id())),
        ),
        (LABEL_N, CborValue::Bytes(n.to_vec())),
        (LABEL_E, CborValue::Bytes(e.to_vec())),
    ])
}
