use ciborium::value::Value as CborValue;

use crate::errors::PasskeyError;

use super::auth_data::AuthenticatorData;
use super::cose::VerifyingKey;

/// The decoded `attestationObject` of a registration response.
#[derive(Debug, Clone)]
pub struct AttestationObject {
    pub fmt: String,
    pub auth_data: Vec<u8>,
    pub att_stmt: Vec<(CborValue, CborValue)>,
}

impl AttestationObject {
    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self, PasskeyError> {
        let value: CborValue = ciborium::de::from_reader(bytes)
            .map_err(|e| PasskeyError::Format(format!("Invalid CBOR data: {e}")))?;

        let CborValue::Map(map) = value else {
            return Err(PasskeyError::Format(
                "Invalid attestation format".to_string(),
            ));
        };

        let mut fmt = None;
        let mut auth_data = None;
        let mut att_stmt = None;

        for (key, value) in map {
            if let CborValue::Text(k) = key {
                match (k.as_str(), value) {
                    ("fmt", CborValue::Text(f)) => fmt = Some(f),
                    ("authData", CborValue::Bytes(d)) => auth_data = Some(d),
                    ("attStmt", CborValue::Map(s)) => att_stmt = Some(s),
                    _ => {}
                }
            }
        }

        tracing::debug!("Attestation format: {:?}", fmt);

        match (fmt, auth_data, att_stmt) {
            (Some(fmt), Some(auth_data), Some(att_stmt)) => Ok(Self {
                fmt,
                auth_data,
                att_stmt,
            }),
            _ => Err(PasskeyError::Format(
                "Missing required attestation data".to_string(),
            )),
        }
    }

    fn statement_value(&self, name: &str) -> Option<&CborValue> {
        self.att_stmt.iter().find_map(|(k, v)| match k {
            CborValue::Text(t) if t == name => Some(v),
            _ => None,
        })
    }
}

/// Extension point for checking attestation statements.
///
/// Runs after the client data and authenticator data checks have passed.
/// `client_data_hash` is SHA-256 of the raw `clientDataJSON`.
pub trait AttestationVerifier: Send + Sync + 'static {
    fn verify(
        &self,
        attestation: &AttestationObject,
        client_data_hash: &[u8],
    ) -> Result<(), PasskeyError>;
}

/// Checks `none` and packed self attestation; other statements are accepted
/// without trust path validation.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAttestationVerifier;

impl AttestationVerifier for DefaultAttestationVerifier {
    fn verify(
        &self,
        attestation: &AttestationObject,
        client_data_hash: &[u8],
    ) -> Result<(), PasskeyError> {
        match attestation.fmt.as_str() {
            "none" => {
                if !attestation.att_stmt.is_empty() {
                    return Err(PasskeyError::Attestation(
                        "attStmt must be empty for none attestation".to_string(),
                    ));
                }
                Ok(())
            }
            "packed" if attestation.statement_value("x5c").is_none() => {
                verify_packed_self_attestation(attestation, client_data_hash)
            }
            other => {
                tracing::warn!(
                    "Accepting '{}' attestation without trust path validation",
                    other
                );
                Ok(())
            }
        }
    }
}

/// Self attestation: the credential key signs `authData || clientDataHash`.
fn verify_packed_self_attestation(
    attestation: &AttestationObject,
    client_data_hash: &[u8],
) -> Result<(), PasskeyError> {
    let alg = match attestation.statement_value("alg") {
        Some(CborValue::Integer(i)) => i64::try_from(*i)
            .map_err(|_| PasskeyError::Attestation("alg out of range".to_string()))?,
        _ => {
            return Err(PasskeyError::Attestation(
                "Missing alg in packed attestation".to_string(),
            ));
        }
    };
    let sig = match attestation.statement_value("sig") {
        Some(CborValue::Bytes(sig)) => sig,
        _ => {
            return Err(PasskeyError::Attestation(
                "Missing sig in packed attestation".to_string(),
            ));
        }
    };

    let auth_data = AuthenticatorData::parse(&attestation.auth_data)?;
    let attested = auth_data.attested.ok_or_else(|| {
        PasskeyError::Attestation("No attested credential data".to_string())
    })?;
    let key = VerifyingKey::from_cose(&attested.cose_key)?;

    if key.algorithm().id() != alg {
        return Err(PasskeyError::Attestation(format!(
            "Statement alg {} does not match credential key {}",
            alg,
            key.algorithm()
        )));
    }

    let mut signed_data = Vec::with_capacity(attestation.auth_data.len() + client_data_hash.len());
    signed_data.extend_from_slice(&attestation.auth_data);
    signed_data.extend_from_slice(client_data_hash);

    key.verify(&signed_data, sig).map_err(|_| {
        PasskeyError::Attestation("Self attestation signature invalid".to_string())
    })?;

    tracing::debug!("Packed self attestation verified");
    Ok(())
}
