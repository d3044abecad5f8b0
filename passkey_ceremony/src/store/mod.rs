mod config;
mod memory;
mod sqlite;

use async_trait::async_trait;

use crate::errors::PasskeyError;
use crate::types::{Credential, CredentialId, User, UserEntity, UserHandle};

pub use config::{DB_TABLE_PREFIX, credential_store_from_env};
pub use memory::InMemoryCredentialStore;
pub use sqlite::SqliteCredentialStore;

/// Persistent users and their credentials.
///
/// `create_user`, `add_credential` and `update_sign_count` are atomic
/// check-and-write operations; a caller never observes a half applied change.
#[async_trait]
pub trait CredentialStore: Send + Sync + 'static {
    /// Creates `user` with its first credential.
    ///
    /// Fails with `UserAlreadyExists` when the handle is taken and with
    /// `DuplicateCredentialId` when the id already belongs to any user.
    async fn create_user(&self, user: &UserEntity, credential: Credential)
    -> Result<(), PasskeyError>;

    /// Stores a new credential, creating the user on first registration and
    /// refreshing the display name otherwise.
    ///
    /// Fails with `DuplicateCredentialId` when the id already belongs to any user.
    async fn add_credential(&self, user: &UserEntity, credential: Credential)
    -> Result<(), PasskeyError>;

    async fn get_user(&self, handle: &UserHandle) -> Result<User, PasskeyError>;

    /// Looks up a credential together with the user that owns it.
    async fn find_credential(&self, id: &CredentialId) -> Result<(User, Credential), PasskeyError>;

    /// Records the sign count from a verified assertion and stamps `last_used_at`.
    async fn update_sign_count(&self, id: &CredentialId, new_count: u32)
    -> Result<(), PasskeyError>;

    /// Credential ids owned by `handle`, empty for unknown users.
    async fn list_credential_ids(&self, handle: &UserHandle)
    -> Result<Vec<CredentialId>, PasskeyError>;
}

/// Checks that a reported sign count moves forward.
///
/// A stored count of zero means the authenticator does not implement a
/// counter, so any value is accepted. Otherwise the new count must be strictly
/// greater, which also rejects a drop back to zero.
pub fn check_sign_count(stored: u32, received: u32) -> Result<(), PasskeyError> {
    if stored != 0 && received <= stored {
        tracing::warn!(
            stored,
            received,
            "Sign count did not increase, authenticator may be cloned"
        );
        return Err(PasskeyError::SignCountRegression { stored, received });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_sign_count() {
        // Authenticators without a counter always report zero
        assert!(check_sign_count(0, 0).is_ok());
        assert!(check_sign_count(0, 5).is_ok());

        assert!(check_sign_count(5, 6).is_ok());
        assert!(matches!(
            check_sign_count(5, 5),
            Err(PasskeyError::SignCountRegression {
                stored: 5,
                received: 5
            })
        ));
        assert!(matches!(
            check_sign_count(5, 3),
            Err(PasskeyError::SignCountRegression { .. })
        ));
        assert!(matches!(
            check_sign_count(5, 0),
            Err(PasskeyError::SignCountRegression { .. })
        ));
    }
}
