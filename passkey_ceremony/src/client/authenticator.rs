use async_trait::async_trait;
use thiserror::Error;

use crate::encoding::base64url_encode;
use crate::options::{AuthenticationOptions, RegistrationOptions};
use crate::response::{
    AssertionResponse, AttestationResponse, AuthenticationResponse, RegistrationResponse,
};
use crate::types::AuthenticatorTransport;

const PUBLIC_KEY_TYPE: &str = "public-key";

/// What the platform reports it can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// A user-verifying platform authenticator is available
    pub platform_authenticator: bool,
    /// Passkey autofill (conditional mediation) is available
    pub conditional_mediation: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthenticatorFailure {
    #[error("No authenticator available")]
    Unavailable,
    #[error("{0}")]
    Other(String),
}

/// Raw output of a successful credential creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedCredential {
    pub credential_id: Vec<u8>,
    pub client_data_json: Vec<u8>,
    pub attestation_object: Vec<u8>,
    pub transports: Vec<AuthenticatorTransport>,
}

impl AttestedCredential {
    pub fn into_response(self) -> RegistrationResponse {
        let id = base64url_encode(&self.credential_id);
        RegistrationResponse {
            id: id.clone(),
            raw_id: id,
            type_: PUBLIC_KEY_TYPE.to_string(),
            response: AttestationResponse {
                client_data_json: base64url_encode(&self.client_data_json),
                attestation_object: base64url_encode(&self.attestation_object),
                transports: self
                    .transports
                    .iter()
                    .map(|t| t.as_str().to_string())
                    .collect(),
            },
        }
    }
}

/// Raw output of a successful assertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assertion {
    pub credential_id: Vec<u8>,
    pub client_data_json: Vec<u8>,
    pub authenticator_data: Vec<u8>,
    pub signature: Vec<u8>,
    pub user_handle: Option<Vec<u8>>,
}

impl Assertion {
    pub fn into_response(self) -> AuthenticationResponse {
        let id = base64url_encode(&self.credential_id);
        AuthenticationResponse {
            id: id.clone(),
            raw_id: id,
            type_: PUBLIC_KEY_TYPE.to_string(),
            response: AssertionResponse {
                client_data_json: base64url_encode(&self.client_data_json),
                authenticator_data: base64url_encode(&self.authenticator_data),
                signature: base64url_encode(&self.signature),
                user_handle: self.user_handle.as_deref().map(base64url_encode),
            },
        }
    }
}

/// The platform credential API.
///
/// `Ok(None)` means the user dismissed the prompt or no credential answered.
#[async_trait]
pub trait Authenticator: Send + Sync + 'static {
    async fn capabilities(&self) -> Result<Capabilities, AuthenticatorFailure>;

    async fn make_credential(
        &self,
        options: &RegistrationOptions,
    ) -> Result<Option<AttestedCredential>, AuthenticatorFailure>;

    async fn get_assertion(
        &self,
        options: &AuthenticationOptions,
    ) -> Result<Option<Assertion>, AuthenticatorFailure>;
}
