use serde::{Deserialize, Serialize};
use std::{env, time::Duration};

use crate::errors::PasskeyError;
use crate::types::CoseAlgorithm;

const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_CHALLENGE_TTL_SECS: u64 = 60;

/// Attestation conveyance preference sent to the authenticator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttestationConveyance {
    #[default]
    None,
    Indirect,
    Direct,
    Enterprise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthenticatorAttachment {
    #[default]
    Platform,
    CrossPlatform,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResidentKeyRequirement {
    Discouraged,
    Preferred,
    #[default]
    Required,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserVerificationRequirement {
    Discouraged,
    #[default]
    Preferred,
    Required,
}

/// Relying party settings shared by every ceremony.
///
/// Built once at startup and never mutated afterwards; ceremonies only read it.
#[derive(Debug, Clone)]
pub struct RelyingPartyConfig {
    rp_id: String,
    rp_name: String,
    origin: String,
    additional_origins: Vec<String>,
    algorithms: Vec<CoseAlgorithm>,
    timeout: Duration,
    challenge_ttl: Duration,
    attestation: AttestationConveyance,
    authenticator_attachment: Option<AuthenticatorAttachment>,
    resident_key: ResidentKeyRequirement,
    user_verification: UserVerificationRequirement,
}

impl RelyingPartyConfig {
    /// Creates a configuration for `origin`, deriving the RP ID from its host.
    pub fn new(origin: &str) -> Result<Self, PasskeyError> {
        let origin = normalize_origin(origin);
        let rp_id = rp_id_from_origin(&origin)?;
        Ok(Self {
            rp_name: origin.clone(),
            rp_id,
            origin,
            additional_origins: Vec::new(),
            algorithms: vec![CoseAlgorithm::Es256, CoseAlgorithm::Rs256],
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            challenge_ttl: Duration::from_secs(DEFAULT_CHALLENGE_TTL_SECS),
            attestation: AttestationConveyance::default(),
            authenticator_attachment: Some(AuthenticatorAttachment::default()),
            resident_key: ResidentKeyRequirement::default(),
            user_verification: UserVerificationRequirement::default(),
        })
    }

    /// Reads the configuration from the process environment.
    ///
    /// `ORIGIN` is required. Enumerated settings with unknown values fall back
    /// to their default and log a warning.
    pub fn from_env() -> Result<Self, PasskeyError> {
        let origin = env::var("ORIGIN")
            .map_err(|_| PasskeyError::Config("ORIGIN must be set".to_string()))?;
        let mut config = Self::new(&origin)?;

        if let Ok(rp_id) = env::var("PASSKEY_RP_ID") {
            config = config.with_rp_id(rp_id);
        }
        if let Ok(rp_name) = env::var("PASSKEY_RP_NAME") {
            config = config.with_rp_name(rp_name);
        }
        if let Ok(origins) = env::var("WEBAUTHN_ADDITIONAL_ORIGINS") {
            config = config.with_additional_origins(parse_origin_list(&origins));
        }

        config.timeout = Duration::from_secs(env_secs("PASSKEY_TIMEOUT", DEFAULT_TIMEOUT_SECS));
        config.challenge_ttl = Duration::from_secs(env_secs(
            "PASSKEY_CHALLENGE_TIMEOUT",
            DEFAULT_CHALLENGE_TTL_SECS,
        ));

        if let Ok(v) = env::var("PASSKEY_ATTESTATION") {
            config.attestation = match v.to_lowercase().as_str() {
                "none" => AttestationConveyance::None,
                "indirect" => AttestationConveyance::Indirect,
                "direct" => AttestationConveyance::Direct,
                "enterprise" => AttestationConveyance::Enterprise,
                invalid => {
                    tracing::warn!("Invalid attestation: {}. Using default 'none'", invalid);
                    AttestationConveyance::default()
                }
            };
        }

        if let Ok(v) = env::var("PASSKEY_AUTHENTICATOR_ATTACHMENT") {
            config.authenticator_attachment = match v.to_lowercase().as_str() {
                "platform" => Some(AuthenticatorAttachment::Platform),
                "cross-platform" => Some(AuthenticatorAttachment::CrossPlatform),
                "none" => None,
                invalid => {
                    tracing::warn!(
                        "Invalid authenticator attachment: {}. Using default 'platform'",
                        invalid
                    );
                    Some(AuthenticatorAttachment::default())
                }
            };
        }

        if let Ok(v) = env::var("PASSKEY_RESIDENT_KEY") {
            config.resident_key = match v.to_lowercase().as_str() {
                "required" => ResidentKeyRequirement::Required,
                "preferred" => ResidentKeyRequirement::Preferred,
                "discouraged" => ResidentKeyRequirement::Discouraged,
                invalid => {
                    tracing::warn!("Invalid resident key: {}. Using default 'required'", invalid);
                    ResidentKeyRequirement::default()
                }
            };
        }

        if let Ok(v) = env::var("PASSKEY_USER_VERIFICATION") {
            config.user_verification = match v.to_lowercase().as_str() {
                "required" => UserVerificationRequirement::Required,
                "preferred" => UserVerificationRequirement::Preferred,
                "discouraged" => UserVerificationRequirement::Discouraged,
                invalid => {
                    tracing::warn!(
                        "Invalid user verification: {}. Using default 'preferred'",
                        invalid
                    );
                    UserVerificationRequirement::default()
                }
            };
        }

        tracing::debug!(?config, "Loaded relying party configuration");
        Ok(config)
    }

    pub fn with_rp_id(mut self, rp_id: impl Into<String>) -> Self {
        self.rp_id = rp_id.into();
        self
    }

    pub fn with_rp_name(mut self, rp_name: impl Into<String>) -> Self {
        self.rp_name = rp_name.into();
        self
    }

    pub fn with_additional_origins(mut self, origins: Vec<String>) -> Self {
        self.additional_origins = origins.iter().map(|o| normalize_origin(o)).collect();
        self
    }

    /// Sets the offered algorithms in preference order.
    ///
    /// The list must contain at least one ECDSA and one RSA algorithm.
    pub fn with_algorithms(
        mut self,
        algorithms: Vec<CoseAlgorithm>,
    ) -> Result<Self, PasskeyError> {
        let has_ecdsa = algorithms.contains(&CoseAlgorithm::Es256);
        let has_rsa = algorithms.contains(&CoseAlgorithm::Rs256);
        if !has_ecdsa || !has_rsa {
            return Err(PasskeyError::Config(format!(
                "Algorithm list must include an ECDSA and an RSA algorithm, got {algorithms:?}"
            )));
        }
        self.algorithms = algorithms;
        Ok(self)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_challenge_ttl(mut self, ttl: Duration) -> Self {
        self.challenge_ttl = ttl;
        self
    }

    pub fn with_attestation(mut self, attestation: AttestationConveyance) -> Self {
        self.attestation = attestation;
        self
    }

    pub fn with_authenticator_attachment(
        mut self,
        attachment: Option<AuthenticatorAttachment>,
    ) -> Self {
        self.authenticator_attachment = attachment;
        self
    }

    pub fn with_resident_key(mut self, resident_key: ResidentKeyRequirement) -> Self {
        self.resident_key = resident_key;
        self
    }

    pub fn with_user_verification(mut self, uv: UserVerificationRequirement) -> Self {
        self.user_verification = uv;
        self
    }

    pub fn rp_id(&self) -> &str {
        &self.rp_id
    }

    pub fn rp_name(&self) -> &str {
        &self.rp_name
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn algorithms(&self) -> &[CoseAlgorithm] {
        &self.algorithms
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn challenge_ttl(&self) -> Duration {
        self.challenge_ttl
    }

    pub fn attestation(&self) -> AttestationConveyance {
        self.attestation
    }

    pub fn authenticator_attachment(&self) -> Option<AuthenticatorAttachment> {
        self.authenticator_attachment
    }

    pub fn resident_key(&self) -> ResidentKeyRequirement {
        self.resident_key
    }

    pub fn user_verification(&self) -> UserVerificationRequirement {
        self.user_verification
    }

    /// The primary origin followed by any additional related origins.
    pub fn allowed_origins(&self) -> Vec<String> {
        let mut origins = vec![self.origin.clone()];
        origins.extend(self.additional_origins.iter().cloned());
        origins
    }

    pub fn is_allowed_origin(&self, origin: &str) -> bool {
        origin == self.origin || self.additional_origins.iter().any(|o| o == origin)
    }

    pub fn requires_user_verification(&self) -> bool {
        self.user_verification == UserVerificationRequirement::Required
    }

    /// Document served at `/.well-known/webauthn` listing related origins.
    pub fn related_origin_json(&self) -> Result<String, PasskeyError> {
        let doc = RelatedOrigins {
            rp_id: &self.rp_id,
            origins: self.allowed_origins(),
        };
        Ok(serde_json::to_string_pretty(&doc)?)
    }
}

#[derive(Serialize)]
struct RelatedOrigins<'a> {
    rp_id: &'a str,
    origins: Vec<String>,
}

fn normalize_origin(origin: &str) -> String {
    origin.trim().trim_end_matches('/').to_string()
}

fn rp_id_from_origin(origin: &str) -> Result<String, PasskeyError> {
    let url = url::Url::parse(origin)
        .map_err(|e| PasskeyError::Config(format!("Invalid origin '{origin}': {e}")))?;
    url.host_str()
        .map(|h| h.to_string())
        .ok_or_else(|| PasskeyError::Config(format!("Origin '{origin}' has no host")))
}

fn parse_origin_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn env_secs(name: &str, default: u64) -> u64 {
    match env::var(name) {
        Ok(v) => v.parse::<u64>().unwrap_or_else(|_| {
            tracing::warn!("Invalid {}: {}. Using default {}", name, v, default);
            default
        }),
        Err(_) => default,
    }
}
