use crate::encoding::base64url_decode;
use crate::errors::PasskeyError;
use crate::relying_party::RelyingParty;
use crate::response::AuthenticationResponse;
use crate::types::{CeremonyKind, CredentialId, User, UserHandle};

use super::auth_data::AuthenticatorData;
use super::client_data::{ParsedClientData, TYPE_GET};
use super::cose::VerifyingKey;

impl RelyingParty {
    /// Verifies an assertion and records its sign count.
    ///
    /// `allowed` restricts which credentials may answer. `None` or an empty
    /// list accepts any credential; a challenge bound to a user additionally
    /// requires the credential to belong to that user.
    pub async fn verify_authentication(
        &self,
        response: &AuthenticationResponse,
        allowed: Option<&[CredentialId]>,
    ) -> Result<User, PasskeyError> {
        let client_data = ParsedClientData::from_base64(&response.response.client_data_json)?;

        let challenge = self.challenges.consume(&client_data.challenge).await?;
        if challenge.kind != CeremonyKind::Authentication {
            tracing::warn!(kind = %challenge.kind, "Challenge issued for another ceremony");
            return Err(PasskeyError::ChallengeNotFound);
        }

        client_data.verify(&self.config, TYPE_GET)?;

        let auth_data_bytes = base64url_decode(&response.response.authenticator_data)?;
        let auth_data = AuthenticatorData::parse(&auth_data_bytes)?;
        auth_data.verify(&self.config)?;

        let credential_id = CredentialId::from_base64url(&response.raw_id)?;
        let (user, credential) = self.credentials.find_credential(&credential_id).await?;

        if let Some(subject) = &challenge.subject_user {
            if subject.handle != user.handle {
                tracing::warn!(
                    expected = %subject.handle,
                    owner = %user.handle,
                    "Credential belongs to another user"
                );
                return Err(PasskeyError::CredentialNotAllowed);
            }
        }

        if let Some(allowed) = allowed.filter(|ids| !ids.is_empty()) {
            if !allowed.contains(&credential_id) {
                tracing::warn!(credential_id = %credential_id, "Credential not in allow list");
                return Err(PasskeyError::CredentialNotAllowed);
            }
        }

        if let Some(handle) = &response.response.user_handle {
            let handle = UserHandle::from_base64url(handle)?;
            if handle != user.handle {
                tracing::warn!(
                    returned = %handle,
                    owner = %user.handle,
                    "User handle does not match credential owner"
                );
                return Err(PasskeyError::UserHandleMismatch);
            }
        }

        let signature = base64url_decode(&response.response.signature)?;
        let key = VerifyingKey::from_cose(&credential.public_key.cose_key)?;

        let mut signed_data = auth_data.raw.clone();
        signed_data.extend_from_slice(&client_data.hash());
        key.verify(&signed_data, &signature).inspect_err(|_| {
            tracing::warn!(credential_id = %credential_id, "Assertion signature invalid");
        })?;

        self.credentials
            .update_sign_count(&credential_id, auth_data.counter)
            .await?;

        tracing::debug!(
            user = %user.handle,
            credential_id = %credential_id,
            counter = auth_data.counter,
            "Authentication response verified"
        );

        Ok(user)
    }
}
