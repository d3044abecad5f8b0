//! Server-side verification of authenticator responses.

mod attestation;
pub(crate) mod auth_data;
mod auth;
pub(crate) mod client_data;
pub(crate) mod cose;
mod register;

pub use attestation::{AttestationObject, AttestationVerifier, DefaultAttestationVerifier};
