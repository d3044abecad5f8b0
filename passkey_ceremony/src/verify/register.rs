use chrono::Utc;

use crate::encoding::base64url_decode;
use crate::errors::PasskeyError;
use crate::relying_party::RelyingParty;
use crate::response::RegistrationResponse;
use crate::types::{
    AuthenticatorTransport, CeremonyKind, Credential, CredentialId, PublicKey, UserEntity,
};

use super::attestation::AttestationObject;
use super::auth_data::AuthenticatorData;
use super::client_data::{ParsedClientData, TYPE_CREATE};
use super::cose::VerifyingKey;

impl RelyingParty {
    /// Verifies a registration response and builds the credential to persist.
    ///
    /// Consumes the pending challenge, so the same response can never be
    /// verified twice. Nothing is written to the credential store.
    pub async fn verify_registration(
        &self,
        response: &RegistrationResponse,
    ) -> Result<(UserEntity, Credential), PasskeyError> {
        let client_data = ParsedClientData::from_base64(&response.response.client_data_json)?;

        let challenge = self.challenges.consume(&client_data.challenge).await?;
        if challenge.kind != CeremonyKind::Registration {
            tracing::warn!(kind = %challenge.kind, "Challenge issued for another ceremony");
            return Err(PasskeyError::ChallengeNotFound);
        }
        let Some(user) = challenge.subject_user else {
            tracing::warn!("Registration challenge without a subject user");
            return Err(PasskeyError::ChallengeNotFound);
        };

        client_data.verify(&self.config, TYPE_CREATE)?;

        let attestation_bytes = base64url_decode(&response.response.attestation_object)?;
        let attestation = AttestationObject::from_bytes(&attestation_bytes)?;
        let auth_data = AuthenticatorData::parse(&attestation.auth_data)?;
        auth_data.verify(&self.config)?;

        let attested = auth_data.attested.as_ref().ok_or_else(|| {
            PasskeyError::AuthenticatorData("Attested credential data missing".to_string())
        })?;

        let raw_id = base64url_decode(&response.raw_id)?;
        if attested.credential_id != raw_id || response.id != response.raw_id {
            return Err(PasskeyError::Format(
                "Credential id does not match rawId".to_string(),
            ));
        }

        let key = VerifyingKey::from_cose(&attested.cose_key)?;
        if !self.config.algorithms().contains(&key.algorithm()) {
            tracing::warn!(algorithm = %key.algorithm(), "Credential uses an algorithm not offered");
            return Err(PasskeyError::UnsupportedAlgorithm(
                key.algorithm().to_string(),
            ));
        }

        self.attestation.verify(&attestation, &client_data.hash())?;

        let credential = Credential {
            credential_id: CredentialId::new(raw_id),
            user_handle: user.handle.clone(),
            public_key: PublicKey {
                algorithm: key.algorithm(),
                cose_key: attested.cose_key.clone(),
            },
            transports: AuthenticatorTransport::parse_all(&response.response.transports),
            sign_count: auth_data.counter,
            aaguid: attested.aaguid_string(),
            created_at: Utc::now(),
            last_used_at: None,
        };

        tracing::debug!(
            user = %user.handle,
            credential_id = %credential.credential_id,
            fmt = %attestation.fmt,
            "Registration response verified"
        );

        Ok((user, credential))
    }
}
