//! Ceremony parameter sets sent to the client.
//!
//! Both builders are pure: they only combine the relying party configuration,
//! the issued challenge and the caller supplied user or credential list.

use serde::{Deserialize, Serialize};

use crate::challenge::PendingChallenge;
use crate::config::{
    AttestationConveyance, AuthenticatorAttachment, RelyingPartyConfig, ResidentKeyRequirement,
    UserVerificationRequirement,
};
use crate::encoding::base64url_encode;
use crate::types::{AuthenticatorTransport, CoseAlgorithm, CredentialId, UserEntity};

const PUBLIC_KEY_TYPE: &str = "public-key";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelyingPartyEntity {
    pub name: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyUserEntity {
    /// base64url of the user handle's UTF-8 bytes
    pub id: String,
    pub name: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PubKeyCredParam {
    #[serde(rename = "type")]
    pub type_: String,
    pub alg: CoseAlgorithm,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatorSelection {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub authenticator_attachment: Option<AuthenticatorAttachment>,
    pub resident_key: ResidentKeyRequirement,
    pub require_resident_key: bool,
    pub user_verification: UserVerificationRequirement,
}

/// A credential reference used in allow and exclude lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialDescriptor {
    #[serde(rename = "type")]
    pub type_: String,
    /// base64url credential id
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub transports: Option<Vec<AuthenticatorTransport>>,
}

impl CredentialDescriptor {
    fn public_key(id: &CredentialId) -> Self {
        Self {
            type_: PUBLIC_KEY_TYPE.to_string(),
            id: id.to_base64url(),
            transports: None,
        }
    }
}

/// Parameters for a registration (credential creation) ceremony.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationOptions {
    pub(crate) challenge: String,
    pub(crate) rp: RelyingPartyEntity,
    pub(crate) user: PublicKeyUserEntity,
    pub(crate) pub_key_cred_params: Vec<PubKeyCredParam>,
    /// Milliseconds
    pub(crate) timeout: u64,
    pub(crate) attestation: AttestationConveyance,
    pub(crate) authenticator_selection: AuthenticatorSelection,
    #[serde(default)]
    pub(crate) exclude_credentials: Vec<CredentialDescriptor>,
}

impl RegistrationOptions {
    /// Lists credentials the authenticator must not create a duplicate for.
    pub fn with_exclude_credentials(mut self, ids: &[CredentialId]) -> Self {
        self.exclude_credentials = ids.iter().map(CredentialDescriptor::public_key).collect();
        self
    }

    pub fn challenge(&self) -> &str {
        &self.challenge
    }

    pub fn rp(&self) -> &RelyingPartyEntity {
        &self.rp
    }

    pub fn user(&self) -> &PublicKeyUserEntity {
        &self.user
    }

    pub fn algorithms(&self) -> Vec<CoseAlgorithm> {
        self.pub_key_cred_params.iter().map(|p| p.alg).collect()
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout
    }

    pub fn authenticator_selection(&self) -> &AuthenticatorSelection {
        &self.authenticator_selection
    }

    pub fn exclude_credentials(&self) -> &[CredentialDescriptor] {
        &self.exclude_credentials
    }
}

/// Parameters for an authentication (assertion) ceremony.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationOptions {
    pub(crate) challenge: String,
    pub(crate) rp_id: String,
    /// Milliseconds
    pub(crate) timeout: u64,
    pub(crate) user_verification: UserVerificationRequirement,
    #[serde(default)]
    pub(crate) allow_credentials: Vec<CredentialDescriptor>,
}

impl AuthenticationOptions {
    pub fn challenge(&self) -> &str {
        &self.challenge
    }

    pub fn rp_id(&self) -> &str {
        &self.rp_id
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout
    }

    pub fn user_verification(&self) -> UserVerificationRequirement {
        self.user_verification
    }

    /// Empty means any discoverable credential for the RP may answer.
    pub fn allow_credentials(&self) -> &[CredentialDescriptor] {
        &self.allow_credentials
    }
}

pub fn build_registration(
    config: &RelyingPartyConfig,
    user: &UserEntity,
    challenge: &PendingChallenge,
) -> RegistrationOptions {
    let pub_key_cred_params = config
        .algorithms()
        .iter()
        .map(|alg| PubKeyCredParam {
            type_: PUBLIC_KEY_TYPE.to_string(),
            alg: *alg,
        })
        .collect();

    let options = RegistrationOptions {
        challenge: base64url_encode(&challenge.value),
        rp: RelyingPartyEntity {
            name: config.rp_name().to_string(),
            id: config.rp_id().to_string(),
        },
        user: PublicKeyUserEntity {
            id: user.handle.to_base64url(),
            name: user.handle.to_string(),
            display_name: user.display_name.clone(),
        },
        pub_key_cred_params,
        timeout: timeout_ms(config),
        attestation: config.attestation(),
        authenticator_selection: AuthenticatorSelection {
            authenticator_attachment: config.authenticator_attachment(),
            resident_key: config.resident_key(),
            require_resident_key: config.resident_key() == ResidentKeyRequirement::Required,
            user_verification: config.user_verification(),
        },
        exclude_credentials: Vec::new(),
    };

    tracing::debug!("Registration options: {:?}", options);
    options
}

pub fn build_authentication(
    config: &RelyingPartyConfig,
    challenge: &PendingChallenge,
    allow_credentials: &[CredentialId],
) -> AuthenticationOptions {
    let options = AuthenticationOptions {
        challenge: base64url_encode(&challenge.value),
        rp_id: config.rp_id().to_string(),
        timeout: timeout_ms(config),
        user_verification: config.user_verification(),
        allow_credentials: allow_credentials
            .iter()
            .map(CredentialDescriptor::public_key)
            .collect(),
    };

    tracing::debug!("Authentication options: {:?}", options);
    options
}

/// The client may not keep prompting past the point the challenge expires.
fn timeout_ms(config: &RelyingPartyConfig) -> u64 {
    let timeout = config.timeout().min(config.challenge_ttl());
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}
