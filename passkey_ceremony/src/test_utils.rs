use chrono::Utc;
use ring::rand::SystemRandom;
use ring::signature::{ECDSA_P256_SHA256_ASN1_SIGNING, EcdsaKeyPair, KeyPair};

use crate::types::{
    AuthenticatorTransport, CoseAlgorithm, Credential, CredentialId, PublicKey, UserHandle,
};
use crate::verify::cose::encode_es256;

pub(crate) use crate::testing::{build_attestation_object, build_auth_data};

/// A freshly generated ES256 public key in COSE form.
pub(crate) fn sample_cose_key() -> Vec<u8> {
    let rng = SystemRandom::new();
    let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng).unwrap();
    let key_pair =
        EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8.as_ref(), &rng).unwrap();
    let point = key_pair.public_key().as_ref();
    encode_es256(&point[1..33], &point[33..65])
}

pub(crate) fn sample_credential(id: &[u8], user_handle: &str, sign_count: u32) -> Credential {
    Credential {
        credential_id: CredentialId::new(id.to_vec()),
        user_handle: UserHandle::new(user_handle),
        public_key: PublicKey {
            algorithm: CoseAlgorithm::Es256,
            cose_key: sample_cose_key(),
        },
        transports: vec![AuthenticatorTransport::Internal],
        sign_count,
        aaguid: "00000000-0000-0000-0000-000000000000".to_string(),
        created_at: Utc::now(),
        last_used_at: None,
    }
}
