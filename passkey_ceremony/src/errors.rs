use thiserror::Error;

/// Errors that can occur during passkey ceremonies.
///
/// Verification failures are terminal for the ceremony attempt and are never
/// retried automatically. `UserCancelled` and `AuthenticatorUnavailable` are
/// expected outcomes on the client side; see [`PasskeyError::is_recoverable`].
#[derive(Debug, Error)]
pub enum PasskeyError {
    /// No pending challenge matches the value echoed by the client
    #[error("Challenge not found")]
    ChallengeNotFound,

    /// The pending challenge outlived its TTL before it was consumed
    #[error("Challenge has expired")]
    ChallengeExpired,

    /// The origin in the collected client data is not one of the allowed origins
    #[error("Origin mismatch: {0}")]
    OriginMismatch(String),

    /// The authenticator data was produced for a different relying party
    #[error("RP ID mismatch")]
    RpIdMismatch,

    /// The credential public key uses an algorithm the relying party did not offer
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// A credential with the same id is already registered (for any user)
    #[error("Duplicate credential id")]
    DuplicateCredentialId,

    /// Registration without an authenticated session named a handle that is already taken
    #[error("User already exists")]
    UserAlreadyExists,

    /// No user exists with the given handle
    #[error("User not found")]
    UserNotFound,

    /// No credential exists with the given id
    #[error("Credential not found")]
    CredentialNotFound,

    /// The credential is known but not in the allow-list for this ceremony
    #[error("Credential not allowed")]
    CredentialNotAllowed,

    /// The user handle returned by the authenticator does not match the credential owner
    #[error("User handle mismatch")]
    UserHandleMismatch,

    /// The assertion signature does not verify against the stored public key
    #[error("Signature verification failed")]
    SignatureInvalid,

    /// The reported sign count did not increase; the authenticator may have been cloned
    #[error("Sign count regression: stored {stored}, received {received}")]
    SignCountRegression { stored: u32, received: u32 },

    /// Malformed base64url text
    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    /// The user dismissed the authenticator prompt or no result was produced
    #[error("User cancelled the ceremony")]
    UserCancelled,

    /// No platform authenticator is available on this client
    #[error("Authenticator unavailable")]
    AuthenticatorUnavailable,

    /// A ceremony for the same action is still outstanding
    #[error("Ceremony already in progress for action: {0}")]
    CeremonyInProgress(String),

    /// The authenticator call failed for a reason other than cancellation
    #[error("Authenticator error: {0}")]
    Authenticator(String),

    /// Error validating the collected client data
    #[error("Invalid client data: {0}")]
    ClientData(String),

    /// Error parsing or validating the authenticator data structure
    #[error("Invalid authenticator data: {0}")]
    AuthenticatorData(String),

    /// Error checking the attestation statement
    #[error("Attestation error: {0}")]
    Attestation(String),

    /// Error with improperly formatted data
    #[error("Invalid format: {0}")]
    Format(String),

    /// Error related to relying party configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error accessing or modifying stored data
    #[error("Storage error: {0}")]
    Storage(String),

    /// Error in cryptographic operations other than signature verification
    #[error("Crypto error: {0}")]
    Crypto(String),
}

impl PasskeyError {
    /// Whether the UI may simply re-offer the action after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::UserCancelled | Self::AuthenticatorUnavailable)
    }
}

impl From<redis::RedisError> for PasskeyError {
    fn from(err: redis::RedisError) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<sqlx::Error> for PasskeyError {
    fn from(err: sqlx::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for PasskeyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Format(err.to_string())
    }
}
