use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::encoding::{base64url_decode, base64url_encode};
use crate::errors::PasskeyError;

/// Opaque, stable identifier of a user.
///
/// The handle is sent to authenticators as the WebAuthn `user.id` (its UTF-8
/// bytes, base64url encoded) and comes back as `userHandle` in assertions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserHandle(String);

impl UserHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reconstructs a handle from the base64url `userHandle` of an assertion.
    pub fn from_base64url(encoded: &str) -> Result<Self, PasskeyError> {
        let bytes = base64url_decode(encoded)?;
        let handle = String::from_utf8(bytes)
            .map_err(|e| PasskeyError::Format(format!("User handle is not UTF-8: {e}")))?;
        Ok(Self(handle))
    }

    pub fn to_base64url(&self) -> String {
        base64url_encode(self.0.as_bytes())
    }
}

impl fmt::Display for UserHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw credential id bytes, unique across the whole system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CredentialId(#[serde(with = "crate::encoding::base64url")] Vec<u8>);

impl CredentialId {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn from_base64url(encoded: &str) -> Result<Self, PasskeyError> {
        Ok(Self(base64url_decode(encoded)?))
    }

    pub fn to_base64url(&self) -> String {
        base64url_encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64url())
    }
}

/// The user a ceremony is performed for: handle plus human readable name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntity {
    pub handle: UserHandle,
    pub display_name: String,
}

impl UserEntity {
    pub fn new(handle: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            handle: UserHandle::new(handle),
            display_name: display_name.into(),
        }
    }
}

/// A registered user and the credentials they own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub handle: UserHandle,
    pub display_name: String,
    pub credentials: Vec<Credential>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn entity(&self) -> UserEntity {
        UserEntity {
            handle: self.handle.clone(),
            display_name: self.display_name.clone(),
        }
    }

    pub fn credential_ids(&self) -> Vec<CredentialId> {
        self.credentials
            .iter()
            .map(|c| c.credential_id.clone())
            .collect()
    }
}

/// A public-key credential created by a successful registration.
///
/// Only `sign_count` and `last_used_at` change after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub credential_id: CredentialId,
    pub user_handle: UserHandle,
    pub public_key: PublicKey,
    pub transports: Vec<AuthenticatorTransport>,
    pub sign_count: u32,
    /// AAGUID of the authenticator model, hyphenated
    pub aaguid: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// A credential public key as the authenticator reported it.
///
/// `cose_key` holds the COSE_Key bytes verbatim; `algorithm` is the decoded
/// `alg` parameter so stores can be queried without re-parsing CBOR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKey {
    pub algorithm: CoseAlgorithm,
    #[serde(with = "crate::encoding::base64url")]
    pub cose_key: Vec<u8>,
}

/// COSE algorithm identifiers supported for credential keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i64", try_from = "i64")]
pub enum CoseAlgorithm {
    /// ECDSA w/ SHA-256 on P-256
    Es256,
    /// RSASSA-PKCS1-v1_5 w/ SHA-256
    Rs256,
}

impl CoseAlgorithm {
    pub const fn id(self) -> i64 {
        match self {
            Self::Es256 => -7,
            Self::Rs256 => -257,
        }
    }

    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            -7 => Some(Self::Es256),
            -257 => Some(Self::Rs256),
            _ => None,
        }
    }
}

impl From<CoseAlgorithm> for i64 {
    fn from(alg: CoseAlgorithm) -> Self {
        alg.id()
    }
}

impl TryFrom<i64> for CoseAlgorithm {
    type Error = String;

    fn try_from(id: i64) -> Result<Self, Self::Error> {
        Self::from_id(id).ok_or_else(|| format!("unsupported COSE algorithm {id}"))
    }
}

impl fmt::Display for CoseAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Es256 => write!(f, "ES256 ({})", self.id()),
            Self::Rs256 => write!(f, "RS256 ({})", self.id()),
        }
    }
}

/// Transport hints reported by the authenticator. Advisory only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthenticatorTransport {
    Usb,
    Nfc,
    Ble,
    SmartCard,
    Hybrid,
    Internal,
}

impl AuthenticatorTransport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usb => "usb",
            Self::Nfc => "nfc",
            Self::Ble => "ble",
            Self::SmartCard => "smart-card",
            Self::Hybrid => "hybrid",
            Self::Internal => "internal",
        }
    }

    /// Parses transport strings, silently skipping values this crate does not know.
    pub fn parse_all<S: AsRef<str>>(values: &[S]) -> Vec<Self> {
        values
            .iter()
            .filter_map(|v| v.as_ref().parse().ok())
            .collect()
    }
}

impl FromStr for AuthenticatorTransport {
    type Err = PasskeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "usb" => Ok(Self::Usb),
            "nfc" => Ok(Self::Nfc),
            "ble" => Ok(Self::Ble),
            "smart-card" => Ok(Self::SmartCard),
            "hybrid" => Ok(Self::Hybrid),
            "internal" => Ok(Self::Internal),
            other => Err(PasskeyError::Format(format!("Unknown transport: {other}"))),
        }
    }
}

/// Which ceremony a challenge was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CeremonyKind {
    Registration,
    Authentication,
}

impl fmt::Display for CeremonyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registration => f.write_str("registration"),
            Self::Authentication => f.write_str("authentication"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_handle_base64url() {
        let handle = UserHandle::new("alice");
        let encoded = handle.to_base64url();
        assert_eq!(encoded, "YWxpY2U");
        assert_eq!(UserHandle::from_base64url(&encoded).unwrap(), handle);
    }

    #[test]
    fn test_user_handle_rejects_non_utf8() {
        let encoded = base64url_encode(&[0xff, 0xfe]);
        assert!(matches!(
            UserHandle::from_base64url(&encoded),
            Err(PasskeyError::Format(_))
        ));
    }

    #[test]
    fn test_credential_id_serializes_as_text() {
        let id = CredentialId::new(vec![0xfb, 0xff, 0x00]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, r#""-_8A""#);
        let back: CredentialId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_cose_algorithm_ids() {
        assert_eq!(CoseAlgorithm::Es256.id(), -7);
        assert_eq!(CoseAlgorithm::Rs256.id(), -257);
        assert_eq!(CoseAlgorithm::from_id(-7), Some(CoseAlgorithm::Es256));
        assert_eq!(CoseAlgorithm::from_id(-8), None);

        let json = serde_json::to_string(&CoseAlgorithm::Rs256).unwrap();
        assert_eq!(json, "-257");
        assert!(serde_json::from_str::<CoseAlgorithm>("-8").is_err());
    }

    #[test]
    fn test_transport_parsing_skips_unknown() {
        let parsed = AuthenticatorTransport::parse_all(&["usb", "carrier-pigeon", "hybrid"]);
        assert_eq!(
            parsed,
            vec![AuthenticatorTransport::Usb, AuthenticatorTransport::Hybrid]
        );
        assert_eq!(
            serde_json::to_string(&AuthenticatorTransport::SmartCard).unwrap(),
            r#""smart-card""#
        );
    }

    #[test]
    fn test_credential_serialization_preserves_binary_fields() {
        let credential = Credential {
            credential_id: CredentialId::new(vec![1, 2, 0, 0]),
            user_handle: UserHandle::new("alice"),
            public_key: PublicKey {
                algorithm: CoseAlgorithm::Es256,
                cose_key: vec![0xa5, 0x00, 0x00],
            },
            transports: vec![AuthenticatorTransport::Internal],
            sign_count: 42,
            aaguid: "00000000-0000-0000-0000-000000000000".to_string(),
            created_at: Utc::now(),
            last_used_at: None,
        };

        let json = serde_json::to_string(&credential).unwrap();
        let back: Credential = serde_json::from_str(&json).unwrap();
        assert_eq!(back, credential);
        assert!(json.contains(r#""signCount":42"#));
    }
}
