//! Passkey (WebAuthn) ceremony engine.
//!
//! Issues single-use challenges, builds registration and authentication
//! options, drives the authenticator on the client side and verifies its
//! responses before credentials are trusted and persisted.

mod challenge;
mod client;
mod config;
mod encoding;
mod errors;
mod options;
mod relying_party;
mod response;
mod store;
mod types;
mod verify;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

#[cfg(test)]
mod test_utils;

pub use challenge::{
    CHALLENGE_LEN, ChallengeStore, InMemoryChallengeStore, PendingChallenge, RedisChallengeStore,
    challenge_store_from_env,
};
pub use client::{
    ActionId, Assertion, AttestedCredential, Authenticator, AuthenticatorFailure, Capabilities,
    CeremonyOrchestrator, CeremonyOutcome, CeremonyRequest,
};
pub use config::{
    AttestationConveyance, AuthenticatorAttachment, RelyingPartyConfig, ResidentKeyRequirement,
    UserVerificationRequirement,
};
pub use encoding::{base64url_decode, base64url_encode};
pub use errors::PasskeyError;
pub use options::{
    AuthenticationOptions, AuthenticatorSelection, CredentialDescriptor, PubKeyCredParam,
    PublicKeyUserEntity, RegistrationOptions, RelyingPartyEntity, build_authentication,
    build_registration,
};
pub use relying_party::RelyingParty;
pub use response::{
    AssertionResponse, AttestationResponse, AuthenticationResponse, CeremonyResult,
    RegistrationResponse,
};
pub use store::{
    CredentialStore, DB_TABLE_PREFIX, InMemoryCredentialStore, SqliteCredentialStore,
    check_sign_count, credential_store_from_env,
};
pub use types::{
    AuthenticatorTransport, CeremonyKind, CoseAlgorithm, Credential, CredentialId, PublicKey,
    User, UserEntity, UserHandle,
};
pub use verify::{AttestationObject, AttestationVerifier, DefaultAttestationVerifier};
