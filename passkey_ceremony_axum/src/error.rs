use http::StatusCode;
use passkey_ceremony::PasskeyError;

/// Helper trait for converting errors to a standard response error format
pub trait IntoResponseError<T> {
    fn into_response_error(self) -> Result<T, (StatusCode, String)>;
}

fn status_for(e: &PasskeyError) -> StatusCode {
    match e {
        PasskeyError::InvalidEncoding(_)
        | PasskeyError::Format(_)
        | PasskeyError::ClientData(_)
        | PasskeyError::AuthenticatorData(_)
        | PasskeyError::UnsupportedAlgorithm(_)
        | PasskeyError::UserCancelled
        | PasskeyError::AuthenticatorUnavailable => StatusCode::BAD_REQUEST,
        PasskeyError::ChallengeNotFound
        | PasskeyError::ChallengeExpired
        | PasskeyError::OriginMismatch(_)
        | PasskeyError::RpIdMismatch
        | PasskeyError::CredentialNotAllowed
        | PasskeyError::UserHandleMismatch
        | PasskeyError::SignatureInvalid
        | PasskeyError::SignCountRegression { .. }
        | PasskeyError::Attestation(_) => StatusCode::UNAUTHORIZED,
        PasskeyError::UserNotFound | PasskeyError::CredentialNotFound => StatusCode::NOT_FOUND,
        PasskeyError::DuplicateCredentialId
        | PasskeyError::UserAlreadyExists
        | PasskeyError::CeremonyInProgress(_) => StatusCode::CONFLICT,
        PasskeyError::Authenticator(_)
        | PasskeyError::Config(_)
        | PasskeyError::Storage(_)
        | PasskeyError::Crypto(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl<T> IntoResponseError<T> for Result<T, PasskeyError> {
    fn into_response_error(self) -> Result<T, (StatusCode, String)> {
        self.map_err(|e| {
            let status = status_for(&e);
            if status.is_server_error() {
                tracing::error!("Ceremony failed: {}", e);
            } else {
                tracing::warn!("Ceremony rejected ({}): {}", status, e);
            }
            (status, e.to_string())
        })
    }
}

/// Implementation for http::Error (used by Response::builder())
impl<T> IntoResponseError<T> for http::Result<T> {
    fn into_response_error(self) -> Result<T, (StatusCode, String)> {
        self.map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
    }
}
