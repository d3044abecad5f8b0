use ring::digest;
use serde::Deserialize;

use crate::config::RelyingPartyConfig;
use crate::encoding::base64url_decode;
use crate::errors::PasskeyError;

pub(crate) const TYPE_CREATE: &str = "webauthn.create";
pub(crate) const TYPE_GET: &str = "webauthn.get";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CollectedClientData {
    #[serde(rename = "type")]
    type_: String,
    challenge: String,
    origin: String,
    #[serde(default)]
    cross_origin: Option<bool>,
}

/// Client data collected by the browser, with the raw bytes kept for hashing.
#[derive(Debug)]
pub(crate) struct ParsedClientData {
    pub(crate) type_: String,
    /// Decoded challenge bytes echoed by the client
    pub(crate) challenge: Vec<u8>,
    pub(crate) origin: String,
    pub(crate) cross_origin: bool,
    pub(crate) raw: Vec<u8>,
}

impl ParsedClientData {
    pub(crate) fn from_base64(client_data_json: &str) -> Result<Self, PasskeyError> {
        let raw = base64url_decode(client_data_json)?;
        let data: CollectedClientData = serde_json::from_slice(&raw)
            .map_err(|e| PasskeyError::ClientData(format!("Invalid JSON: {e}")))?;

        let challenge = base64url_decode(&data.challenge)?;

        tracing::debug!(
            "Client data: type={}, origin={}, cross_origin={:?}",
            data.type_,
            data.origin,
            data.cross_origin
        );

        Ok(Self {
            type_: data.type_,
            challenge,
            origin: data.origin,
            cross_origin: data.cross_origin.unwrap_or(false),
            raw,
        })
    }

    /// Checks the ceremony type and that the page origin belongs to this RP.
    pub(crate) fn verify(
        &self,
        config: &RelyingPartyConfig,
        expected_type: &str,
    ) -> Result<(), PasskeyError> {
        if self.type_ != expected_type {
            return Err(PasskeyError::ClientData(format!(
                "Invalid type. Expected '{}', Got: {}",
                expected_type, self.type_
            )));
        }

        if !config.is_allowed_origin(&self.origin) {
            tracing::warn!(
                "Origin mismatch. Expected one of {:?}, Got: {}",
                config.allowed_origins(),
                self.origin
            );
            return Err(PasskeyError::OriginMismatch(self.origin.clone()));
        }

        if self.cross_origin {
            return Err(PasskeyError::ClientData(
                "Cross-origin ceremonies are not accepted".to_string(),
            ));
        }

        Ok(())
    }

    pub(crate) fn hash(&self) -> Vec<u8> {
        digest::digest(&digest::SHA256, &self.raw).as_ref().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::base64url_encode;

    fn encode(json: &str) -> String {
        base64url_encode(json.as_bytes())
    }

    fn config() -> RelyingPartyConfig {
        RelyingPartyConfig::new("http://localhost:3000").unwrap()
    }

    #[test]
    fn test_parse_client_data() {
        let json = format!(
            r#"{{"type":"webauthn.get","challenge":"{}","origin":"http://localhost:3000","crossOrigin":false}}"#,
            base64url_encode(&[1, 2, 3])
        );
        let parsed = ParsedClientData::from_base64(&encode(&json)).unwrap();

        assert_eq!(parsed.type_, TYPE_GET);
        assert_eq!(parsed.challenge, vec![1, 2, 3]);
        assert_eq!(parsed.origin, "http://localhost:3000");
        assert!(!parsed.cross_origin);
        assert_eq!(parsed.raw, json.as_bytes());
        assert!(parsed.verify(&config(), TYPE_GET).is_ok());
    }

    #[test]
    fn test_wrong_type() {
        let json = r#"{"type":"webauthn.get","challenge":"AQID","origin":"http://localhost:3000"}"#;
        let parsed = ParsedClientData::from_base64(&encode(json)).unwrap();
        assert!(matches!(
            parsed.verify(&config(), TYPE_CREATE),
            Err(PasskeyError::ClientData(_))
        ));
    }

    #[test]
    fn test_origin_mismatch() {
        let json =
            r#"{"type":"webauthn.create","challenge":"AQID","origin":"https://evil.example.com"}"#;
        let parsed = ParsedClientData::from_base64(&encode(json)).unwrap();
        match parsed.verify(&config(), TYPE_CREATE) {
            Err(PasskeyError::OriginMismatch(origin)) => {
                assert_eq!(origin, "https://evil.example.com")
            }
            other => panic!("Expected OriginMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_cross_origin_rejected() {
        let json = r#"{"type":"webauthn.create","challenge":"AQID","origin":"http://localhost:3000","crossOrigin":true}"#;
        let parsed = ParsedClientData::from_base64(&encode(json)).unwrap();
        assert!(matches!(
            parsed.verify(&config(), TYPE_CREATE),
            Err(PasskeyError::ClientData(_))
        ));
    }

    #[test]
    fn test_malformed_client_data() {
        assert!(matches!(
            ParsedClientData::from_base64("not base64!"),
            Err(PasskeyError::InvalidEncoding(_))
        ));
        assert!(matches!(
            ParsedClientData::from_base64(&encode("{}")),
            Err(PasskeyError::ClientData(_))
        ));
        let bad_challenge = r#"{"type":"webauthn.get","challenge":"AQ==","origin":"x"}"#;
        assert!(matches!(
            ParsedClientData::from_base64(&encode(bad_challenge)),
            Err(PasskeyError::InvalidEncoding(_))
        ));
    }
}
