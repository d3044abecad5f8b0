//! A software authenticator for exercising ceremonies without a browser.
//!
//! Enabled for this crate's tests and, through the `testing` feature, for other
//! crates' integration tests.

use async_trait::async_trait;
use ciborium::value::{Integer, Value as CborValue};
use ring::digest;
use ring::rand::SystemRandom;
use ring::signature::{
    ECDSA_P256_SHA256_ASN1_SIGNING, EcdsaKeyPair, KeyPair, RSA_PKCS1_SHA256, RsaKeyPair,
    RsaPublicKeyComponents,
};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::client::{
    Assertion, AttestedCredential, Authenticator, AuthenticatorFailure, Capabilities,
};
use crate::encoding::{base64url_decode, gen_random_bytes};
use crate::errors::PasskeyError;
use crate::options::{AuthenticationOptions, RegistrationOptions};
use crate::types::{AuthenticatorTransport, CoseAlgorithm};
use crate::verify::auth_data::auth_data_flags;
use crate::verify::cose::{encode_es256, encode_rs256};

/// Builds raw authenticator data for `rp_id`.
///
/// `attested` carries `(credential_id, cose_key)` and is appended after a zero
/// AAGUID when present. The flags byte is used as given.
pub fn build_auth_data(
    rp_id: &str,
    flags: u8,
    counter: u32,
    attested: Option<(&[u8], &[u8])>,
) -> Vec<u8> {
    let mut data = digest::digest(&digest::SHA256, rp_id.as_bytes())
        .as_ref()
        .to_vec();
    data.push(flags);
    data.extend_from_slice(&counter.to_be_bytes());
    if let Some((credential_id, cose_key)) = attested {
        data.extend_from_slice(&[0u8; 16]);
        data.extend_from_slice(&(credential_id.len() as u16).to_be_bytes());
        data.extend_from_slice(credential_id);
        data.extend_from_slice(cose_key);
    }
    data
}

/// Encodes an attestation object map.
pub fn build_attestation_object(
    fmt: &str,
    auth_data: &[u8],
    att_stmt: Vec<(CborValue, CborValue)>,
) -> Vec<u8> {
    let map = CborValue::Map(vec![
        (
            CborValue::Text("fmt".to_string()),
            CborValue::Text(fmt.to_string()),
        ),
        (
            CborValue::Text("attStmt".to_string()),
            CborValue::Map(att_stmt),
        ),
        (
            CborValue::Text("authData".to_string()),
            CborValue::Bytes(auth_data.to_vec()),
        ),
    ]);
    let mut out = Vec::new();
    let _ = ciborium::ser::into_writer(&map, &mut out);
    out
}

/// Serializes collected client data the way a browser does.
pub fn client_data_json(type_: &str, challenge: &str, origin: &str) -> Vec<u8> {
    serde_json::json!({
        "type": type_,
        "challenge": challenge,
        "origin": origin,
        "crossOrigin": false,
    })
    .to_string()
    .into_bytes()
}

/// How the next prompts are answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SoftMode {
    #[default]
    Normal,
    /// The user closes the prompt
    Dismiss,
    /// No authenticator is reachable
    Unavailable,
}

enum SoftKey {
    Es256(EcdsaKeyPair),
    Rs256(Arc<RsaKeyPair>),
}

impl SoftKey {
    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, AuthenticatorFailure> {
        let rng = SystemRandom::new();
        match self {
            Self::Es256(key) => key
                .sign(&rng, message)
                .map(|sig| sig.as_ref().to_vec())
                .map_err(|_| AuthenticatorFailure::Other("ECDSA signing failed".to_string())),
            Self::Rs256(key) => {
                let mut sig = vec![0u8; key.public().modulus_len()];
                key.sign(&RSA_PKCS1_SHA256, &rng, message, &mut sig)
                    .map_err(|_| AuthenticatorFailure::Other("RSA signing failed".to_string()))?;
                Ok(sig)
            }
        }
    }

    fn cose_key(&self) -> Vec<u8> {
        match self {
            Self::Es256(key) => {
                let point = key.public_key().as_ref();
                encode_es256(&point[1..33], &point[33..65])
            }
            Self::Rs256(key) => {
                let public = RsaPublicKeyComponents::<Vec<u8>>::from(key.public());
                encode_rs256(&public.n, &public.e)
            }
        }
    }
}

struct SoftCredential {
    id: Vec<u8>,
    rp_id: String,
    user_handle: Vec<u8>,
    key: SoftKey,
    counter: u32,
}

struct SoftState {
    origin: String,
    mode: SoftMode,
    capabilities: Capabilities,
    next_credential_id: Option<Vec<u8>>,
    next_sign_count: Option<u32>,
    credentials: Vec<SoftCredential>,
}

/// An in-process authenticator that creates real ES256 or RS256 credentials.
///
/// Registration answers with `none` attestation (or packed self attestation),
/// a zero counter and flags UP|UV|AT. Each assertion increments the
/// credential's counter and signs with flags UP|UV.
pub struct SoftAuthenticator {
    algorithm: CoseAlgorithm,
    rsa_key: Option<Arc<RsaKeyPair>>,
    packed_attestation: bool,
    state: Mutex<SoftState>,
}

impl SoftAuthenticator {
    /// Creates an ES256 authenticator that reports `origin` in client data.
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            algorithm: CoseAlgorithm::Es256,
            rsa_key: None,
            packed_attestation: false,
            state: Mutex::new(SoftState {
                origin: origin.into(),
                mode: SoftMode::default(),
                capabilities: Capabilities {
                    platform_authenticator: true,
                    conditional_mediation: true,
                },
                next_credential_id: None,
                next_sign_count: None,
                credentials: Vec::new(),
            }),
        }
    }

    /// Switches to RS256, using the given PKCS#8 RSA key for every credential.
    pub fn with_rsa_key(mut self, pkcs8: &[u8]) -> Result<Self, PasskeyError> {
        let key = RsaKeyPair::from_pkcs8(pkcs8)
            .map_err(|e| PasskeyError::Crypto(format!("Invalid RSA key: {e}")))?;
        self.algorithm = CoseAlgorithm::Rs256;
        self.rsa_key = Some(Arc::new(key));
        Ok(self)
    }

    /// Answers registrations with packed self attestation instead of `none`.
    pub fn with_packed_attestation(mut self) -> Self {
        self.packed_attestation = true;
        self
    }

    pub fn algorithm(&self) -> CoseAlgorithm {
        self.algorithm
    }

    pub async fn set_mode(&self, mode: SoftMode) {
        self.state.lock().await.mode = mode;
    }

    pub async fn set_origin(&self, origin: impl Into<String>) {
        self.state.lock().await.origin = origin.into();
    }

    pub async fn set_capabilities(&self, capabilities: Capabilities) {
        self.state.lock().await.capabilities = capabilities;
    }

    /// Uses `id` for the next created credential.
    pub async fn set_next_credential_id(&self, id: Vec<u8>) {
        self.state.lock().await.next_credential_id = Some(id);
    }

    /// Reports `count` in the next assertion instead of incrementing.
    pub async fn set_next_sign_count(&self, count: u32) {
        self.state.lock().await.next_sign_count = Some(count);
    }

    pub async fn credential_ids(&self) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .await
            .credentials
            .iter()
            .map(|c| c.id.clone())
            .collect()
    }

    fn new_key(&self) -> Result<SoftKey, AuthenticatorFailure> {
        match &self.rsa_key {
            Some(key) => Ok(SoftKey::Rs256(key.clone())),
            None => {
                let rng = SystemRandom::new();
                let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng)
                    .map_err(|_| AuthenticatorFailure::Other("Key generation failed".to_string()))?;
                EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8.as_ref(), &rng)
                    .map(SoftKey::Es256)
                    .map_err(|_| AuthenticatorFailure::Other("Key generation failed".to_string()))
            }
        }
    }
}

fn check_mode(mode: SoftMode) -> Result<bool, AuthenticatorFailure> {
    match mode {
        SoftMode::Normal => Ok(true),
        SoftMode::Dismiss => Ok(false),
        SoftMode::Unavailable => Err(AuthenticatorFailure::Unavailable),
    }
}

fn signed_data(auth_data: &[u8], client_data: &[u8]) -> Vec<u8> {
    let mut data = auth_data.to_vec();
    data.extend_from_slice(digest::digest(&digest::SHA256, client_data).as_ref());
    data
}

#[async_trait]
impl Authenticator for SoftAuthenticator {
    async fn capabilities(&self) -> Result<Capabilities, AuthenticatorFailure> {
        Ok(self.state.lock().await.capabilities)
    }

    async fn make_credential(
        &self,
        options: &RegistrationOptions,
    ) -> Result<Option<AttestedCredential>, AuthenticatorFailure> {
        let mut state = self.state.lock().await;
        if !check_mode(state.mode)? {
            return Ok(None);
        }

        if !options.algorithms().contains(&self.algorithm) {
            return Err(AuthenticatorFailure::Other("NotSupportedError".to_string()));
        }

        let excluded = options.exclude_credentials().iter().any(|d| {
            state
                .credentials
                .iter()
                .any(|c| base64url_decode(&d.id).is_ok_and(|id| id == c.id))
        });
        if excluded {
            return Err(AuthenticatorFailure::Other("InvalidStateError".to_string()));
        }

        let id = match state.next_credential_id.take() {
            Some(id) => id,
            None => gen_random_bytes(16).map_err(|e| AuthenticatorFailure::Other(e.to_string()))?,
        };
        let user_handle = base64url_decode(&options.user().id)
            .map_err(|e| AuthenticatorFailure::Other(e.to_string()))?;
        let key = self.new_key()?;

        let client_data = client_data_json("webauthn.create", options.challenge(), &state.origin);
        let auth_data = build_auth_data(
            &options.rp().id,
            auth_data_flags::UP | auth_data_flags::UV | auth_data_flags::AT,
            0,
            Some((&id, &key.cose_key())),
        );

        let attestation_object = if self.packed_attestation {
            let sig = key.sign(&signed_data(&auth_data, &client_data))?;
            build_attestation_object(
                "packed",
                &auth_data,
                vec![
                    (
                        CborValue::Text("alg".to_string()),
                        CborValue::Integer(Integer::from(self.algorithm.id())),
                    ),
                    (CborValue::Text("sig".to_string()), CborValue::Bytes(sig)),
                ],
            )
        } else {
            build_attestation_object("none", &auth_data, vec![])
        };

        state.credentials.push(SoftCredential {
            id: id.clone(),
            rp_id: options.rp().id.clone(),
            user_handle,
            key,
            counter: 0,
        });

        Ok(Some(AttestedCredential {
            credential_id: id,
            client_data_json: client_data,
            attestation_object,
            transports: vec![AuthenticatorTransport::Internal, AuthenticatorTransport::Hybrid],
        }))
    }

    async fn get_assertion(
        &self,
        options: &AuthenticationOptions,
    ) -> Result<Option<Assertion>, AuthenticatorFailure> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        if !check_mode(state.mode)? {
            return Ok(None);
        }

        let allowed: Vec<Vec<u8>> = options
            .allow_credentials()
            .iter()
            .filter_map(|d| base64url_decode(&d.id).ok())
            .collect();

        let Some(credential) = state.credentials.iter_mut().find(|c| {
            c.rp_id == options.rp_id() && (allowed.is_empty() || allowed.contains(&c.id))
        }) else {
            return Ok(None);
        };

        credential.counter = match state.next_sign_count.take() {
            Some(count) => count,
            None => credential.counter.wrapping_add(1),
        };

        let client_data = client_data_json("webauthn.get", options.challenge(), &state.origin);
        let auth_data = build_auth_data(
            options.rp_id(),
            auth_data_flags::UP | auth_data_flags::UV,
            credential.counter,
            None,
        );
        let signature = credential.key.sign(&signed_data(&auth_data, &client_data))?;

        Ok(Some(Assertion {
            credential_id: credential.id.clone(),
            client_data_json: client_data,
            authenticator_data: auth_data,
            signature,
            user_handle: Some(credential.user_handle.clone()),
        }))
    }
}
