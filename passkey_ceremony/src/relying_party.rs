use std::sync::Arc;

use crate::challenge::{ChallengeStore, challenge_store_from_env};
use crate::config::RelyingPartyConfig;
use crate::errors::PasskeyError;
use crate::options::{
    AuthenticationOptions, RegistrationOptions, build_authentication, build_registration,
};
use crate::response::{AuthenticationResponse, CeremonyResult, RegistrationResponse};
use crate::store::{CredentialStore, credential_store_from_env};
use crate::types::{CeremonyKind, UserEntity, UserHandle};
use crate::verify::{AttestationVerifier, DefaultAttestationVerifier};

/// Server side of both ceremonies.
///
/// Owns an immutable configuration and the stores it issues challenges into
/// and persists credentials to. Cheap to share behind an `Arc`.
pub struct RelyingParty {
    pub(crate) config: RelyingPartyConfig,
    pub(crate) challenges: Arc<dyn ChallengeStore>,
    pub(crate) credentials: Arc<dyn CredentialStore>,
    pub(crate) attestation: Arc<dyn AttestationVerifier>,
}

impl RelyingParty {
    pub fn new(
        config: RelyingPartyConfig,
        challenges: Arc<dyn ChallengeStore>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            config,
            challenges,
            credentials,
            attestation: Arc::new(DefaultAttestationVerifier),
        }
    }

    /// Replaces the default attestation verifier.
    pub fn with_attestation_verifier(mut self, verifier: Arc<dyn AttestationVerifier>) -> Self {
        self.attestation = verifier;
        self
    }

    /// Builds the configuration and both stores from environment variables.
    pub async fn from_env() -> Result<Self, PasskeyError> {
        let config = RelyingPartyConfig::from_env()?;
        let challenges = challenge_store_from_env(config.challenge_ttl()).await?;
        let credentials = credential_store_from_env().await?;
        tracing::info!(
            rp_id = config.rp_id(),
            origin = config.origin(),
            "Relying party initialized"
        );
        Ok(Self::new(config, challenges, credentials))
    }

    pub fn config(&self) -> &RelyingPartyConfig {
        &self.config
    }

    pub fn challenge_store(&self) -> &Arc<dyn ChallengeStore> {
        &self.challenges
    }

    pub fn credential_store(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    /// Issues a registration challenge for a new user and the options to send.
    ///
    /// This is the unauthenticated sign-up path, so a handle that already
    /// exists is refused with `UserAlreadyExists`. Adding a passkey to an
    /// existing account goes through [`RelyingParty::start_add_credential`].
    pub async fn start_registration(
        &self,
        user: UserEntity,
    ) -> Result<RegistrationOptions, PasskeyError> {
        match self.credentials.get_user(&user.handle).await {
            Ok(_) => {
                tracing::warn!(user = %user.handle, "Registration refused, user already exists");
                return Err(PasskeyError::UserAlreadyExists);
            }
            Err(PasskeyError::UserNotFound) => {}
            Err(e) => return Err(e),
        }

        let challenge = self
            .challenges
            .issue(CeremonyKind::Registration, Some(user.clone()))
            .await?;

        tracing::debug!(user = %user.handle, "Issued registration challenge");

        Ok(build_registration(&self.config, &user, &challenge))
    }

    /// Issues a registration challenge that adds a passkey to an existing user.
    ///
    /// Only call this for a user the application has already authenticated.
    /// Credentials the user owns are listed in `excludeCredentials`.
    pub async fn start_add_credential(
        &self,
        user_handle: &UserHandle,
    ) -> Result<RegistrationOptions, PasskeyError> {
        let user = self.credentials.get_user(user_handle).await?;
        let existing = user.credential_ids();
        let entity = user.entity();
        let challenge = self
            .challenges
            .issue(CeremonyKind::Registration, Some(entity.clone()))
            .await?;

        tracing::debug!(
            user = %entity.handle,
            existing = existing.len(),
            "Issued add-credential challenge"
        );

        Ok(build_registration(&self.config, &entity, &challenge)
            .with_exclude_credentials(&existing))
    }

    /// Issues an authentication challenge.
    ///
    /// With a user handle the allow list holds that user's credentials; without
    /// one any discoverable credential for this RP may answer.
    pub async fn start_authentication(
        &self,
        user_handle: Option<&UserHandle>,
    ) -> Result<AuthenticationOptions, PasskeyError> {
        let (subject, allow) = match user_handle {
            Some(handle) => {
                let user = self.credentials.get_user(handle).await?;
                let ids = user.credential_ids();
                (Some(user.entity()), ids)
            }
            None => (None, Vec::new()),
        };

        let challenge = self
            .challenges
            .issue(CeremonyKind::Authentication, subject)
            .await?;

        tracing::debug!(allow = allow.len(), "Issued authentication challenge");

        Ok(build_authentication(&self.config, &challenge, &allow))
    }

    /// Verifies a registration response and creates the user it was issued for.
    ///
    /// Fails with `UserAlreadyExists` when the handle was taken in the
    /// meantime, including by a challenge from `start_add_credential`.
    pub async fn finish_registration(
        &self,
        response: &RegistrationResponse,
    ) -> Result<UserHandle, PasskeyError> {
        let (user, credential) = self.verify_registration(response).await?;
        let credential_id = credential.credential_id.clone();

        self.credentials
            .create_user(&user, credential)
            .await
            .inspect_err(log_store_failure)?;

        tracing::info!(
            user = %user.handle,
            credential_id = %credential_id,
            "Passkey registered"
        );
        Ok(user.handle)
    }

    /// Verifies a registration response issued by `start_add_credential` and
    /// attaches the credential to `authenticated`.
    ///
    /// The challenge must have been issued for that same user.
    pub async fn finish_add_credential(
        &self,
        response: &RegistrationResponse,
        authenticated: &UserHandle,
    ) -> Result<UserHandle, PasskeyError> {
        let (user, credential) = self.verify_registration(response).await?;
        if &user.handle != authenticated {
            tracing::warn!(
                challenge_user = %user.handle,
                session_user = %authenticated,
                "Add-credential challenge belongs to another user"
            );
            return Err(PasskeyError::UserHandleMismatch);
        }
        // add_credential would otherwise recreate a user removed since
        self.credentials.get_user(&user.handle).await?;

        let credential_id = credential.credential_id.clone();
        self.credentials
            .add_credential(&user, credential)
            .await
            .inspect_err(log_store_failure)?;

        tracing::info!(
            user = %user.handle,
            credential_id = %credential_id,
            "Passkey added to existing user"
        );
        Ok(user.handle)
    }

    /// Verifies an assertion, returning the authenticated user's handle.
    ///
    /// A challenge issued for a specific user only accepts that user's
    /// credentials.
    pub async fn finish_authentication(
        &self,
        response: &AuthenticationResponse,
    ) -> Result<UserHandle, PasskeyError> {
        let user = self.verify_authentication(response, None).await?;
        tracing::info!(user = %user.handle, "Passkey authentication succeeded");
        Ok(user.handle)
    }

    /// Dispatches on the ceremony the client performed.
    pub async fn finish(&self, result: &CeremonyResult) -> Result<UserHandle, PasskeyError> {
        match result {
            CeremonyResult::Registration(response) => self.finish_registration(response).await,
            CeremonyResult::Authentication(response) => {
                self.finish_authentication(response).await
            }
        }
    }
}

fn log_store_failure(e: &PasskeyError) {
    match e {
        PasskeyError::Storage(_) => tracing::error!("Failed to store credential: {e}"),
        _ => tracing::warn!("Credential not stored: {e}"),
    }
}
