use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::errors::PasskeyError;
use crate::types::{Credential, CredentialId, User, UserEntity, UserHandle};

use super::{CredentialStore, check_sign_count};

#[derive(Default)]
struct Inner {
    users: HashMap<UserHandle, User>,
    /// credential id -> owning user
    owners: HashMap<CredentialId, UserHandle>,
}

/// Credential store held in process memory.
///
/// Users and the credential index sit behind one lock so that duplicate checks
/// and inserts happen as a single step.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    inner: RwLock<Inner>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        tracing::info!("Creating new in-memory credential store");
        Self::default()
    }
}

impl Inner {
    fn check_unique(&self, credential: &Credential) -> Result<(), PasskeyError> {
        if self.owners.contains_key(&credential.credential_id) {
            tracing::warn!(
                credential_id = %credential.credential_id,
                "Rejected duplicate credential id"
            );
            return Err(PasskeyError::DuplicateCredentialId);
        }
        Ok(())
    }

    fn insert(&mut self, user: &UserEntity, credential: Credential) {
        let mut credential = credential;
        credential.user_handle = user.handle.clone();

        self.owners
            .insert(credential.credential_id.clone(), user.handle.clone());
        let entry = self
            .users
            .entry(user.handle.clone())
            .or_insert_with(|| User {
                handle: user.handle.clone(),
                display_name: user.display_name.clone(),
                credentials: Vec::new(),
                created_at: Utc::now(),
            });
        entry.display_name = user.display_name.clone();
        entry.credentials.push(credential);
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn create_user(
        &self,
        user: &UserEntity,
        credential: Credential,
    ) -> Result<(), PasskeyError> {
        let mut inner = self.inner.write().await;

        if inner.users.contains_key(&user.handle) {
            tracing::warn!(user = %user.handle, "Rejected registration for existing user");
            return Err(PasskeyError::UserAlreadyExists);
        }
        inner.check_unique(&credential)?;
        inner.insert(user, credential);
        Ok(())
    }

    async fn add_credential(
        &self,
        user: &UserEntity,
        credential: Credential,
    ) -> Result<(), PasskeyError> {
        let mut inner = self.inner.write().await;
        inner.check_unique(&credential)?;
        inner.insert(user, credential);
        Ok(())
    }

    async fn get_user(&self, handle: &UserHandle) -> Result<User, PasskeyError> {
        self.inner
            .read()
            .await
            .users
            .get(handle)
            .cloned()
            .ok_or(PasskeyError::UserNotFound)
    }

    async fn find_credential(
        &self,
        id: &CredentialId,
    ) -> Result<(User, Credential), PasskeyError> {
        let inner = self.inner.read().await;
        let user = inner
            .owners
            .get(id)
            .and_then(|handle| inner.users.get(handle))
            .ok_or(PasskeyError::CredentialNotFound)?;
        let credential = user
            .credentials
            .iter()
            .find(|c| &c.credential_id == id)
            .ok_or(PasskeyError::CredentialNotFound)?;
        Ok((user.clone(), credential.clone()))
    }

    async fn update_sign_count(
        &self,
        id: &CredentialId,
        new_count: u32,
    ) -> Result<(), PasskeyError> {
        let mut inner = self.inner.write().await;
        let handle = inner
            .owners
            .get(id)
            .cloned()
            .ok_or(PasskeyError::CredentialNotFound)?;
        let credential = inner
            .users
            .get_mut(&handle)
            .and_then(|u| u.credentials.iter_mut().find(|c| &c.credential_id == id))
            .ok_or(PasskeyError::CredentialNotFound)?;

        check_sign_count(credential.sign_count, new_count)?;
        credential.sign_count = new_count;
        credential.last_used_at = Some(Utc::now());
        Ok(())
    }

    async fn list_credential_ids(
        &self,
        handle: &UserHandle,
    ) -> Result<Vec<CredentialId>, PasskeyError> {
        Ok(self
            .inner
            .read()
            .await
            .users
            .get(handle)
            .map(User::credential_ids)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_credential;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_add_creates_user_and_credential() {
        // Given an empty store
        let store = InMemoryCredentialStore::new();
        let user = UserEntity::new("alice", "Alice");

        // When adding a credential for a new user
        store
            .add_credential(&user, sample_credential(&[1, 2, 3], "alice", 0))
            .await
            .unwrap();

        // Then the user exists and owns exactly that credential
        let stored = store.get_user(&user.handle).await.unwrap();
        assert_eq!(stored.display_name, "Alice");
        assert_eq!(stored.credentials.len(), 1);

        let (owner, credential) = store
            .find_credential(&CredentialId::new(vec![1, 2, 3]))
            .await
            .unwrap();
        assert_eq!(owner.handle, user.handle);
        assert_eq!(credential.user_handle, user.handle);
    }

    #[tokio::test]
    async fn test_second_registration_updates_display_name() {
        let store = InMemoryCredentialStore::new();
        store
            .add_credential(
                &UserEntity::new("alice", "Alice"),
                sample_credential(&[1], "alice", 0),
            )
            .await
            .unwrap();
        store
            .add_credential(
                &UserEntity::new("alice", "Alice L."),
                sample_credential(&[2], "alice", 0),
            )
            .await
            .unwrap();

        let user = store.get_user(&UserHandle::new("alice")).await.unwrap();
        assert_eq!(user.display_name, "Alice L.");
        assert_eq!(user.credentials.len(), 2);
        assert_eq!(
            store
                .list_credential_ids(&UserHandle::new("alice"))
                .await
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn test_create_user_rejects_taken_handle() {
        // Given alice registered with one credential
        let store = InMemoryCredentialStore::new();
        store
            .create_user(
                &UserEntity::new("alice", "Alice"),
                sample_credential(&[1], "alice", 0),
            )
            .await
            .unwrap();

        // When someone else tries to create alice again
        let result = store
            .create_user(
                &UserEntity::new("alice", "Mallory"),
                sample_credential(&[2], "alice", 0),
            )
            .await;

        // Then nothing about alice changes
        assert!(matches!(result, Err(PasskeyError::UserAlreadyExists)));
        let user = store.get_user(&UserHandle::new("alice")).await.unwrap();
        assert_eq!(user.display_name, "Alice");
        assert_eq!(user.credential_ids(), vec![CredentialId::new(vec![1])]);
        assert!(matches!(
            store.find_credential(&CredentialId::new(vec![2])).await,
            Err(PasskeyError::CredentialNotFound)
        ));
    }

    #[tokio::test]
    async fn test_duplicate_credential_id_across_users() {
        // Given a credential registered by alice
        let store = InMemoryCredentialStore::new();
        store
            .add_credential(
                &UserEntity::new("alice", "Alice"),
                sample_credential(&[9, 9], "alice", 0),
            )
            .await
            .unwrap();

        // When bob registers a credential with the same id
        let result = store
            .add_credential(
                &UserEntity::new("bob", "Bob"),
                sample_credential(&[9, 9], "bob", 0),
            )
            .await;

        // Then it is rejected and alice keeps the credential
        assert!(matches!(result, Err(PasskeyError::DuplicateCredentialId)));
        let (owner, _) = store
            .find_credential(&CredentialId::new(vec![9, 9]))
            .await
            .unwrap();
        assert_eq!(owner.handle, UserHandle::new("alice"));
        assert!(matches!(
            store.get_user(&UserHandle::new("bob")).await,
            Err(PasskeyError::UserNotFound)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_inserts() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let handle = format!("user{i}");
                store
                    .add_credential(
                        &UserEntity::new(handle.clone(), "User"),
                        sample_credential(&[7, 7, 7], &handle, 0),
                    )
                    .await
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn test_unknown_lookups() {
        let store = InMemoryCredentialStore::new();
        assert!(matches!(
            store.get_user(&UserHandle::new("nobody")).await,
            Err(PasskeyError::UserNotFound)
        ));
        assert!(matches!(
            store.find_credential(&CredentialId::new(vec![0])).await,
            Err(PasskeyError::CredentialNotFound)
        ));
        assert!(matches!(
            store.update_sign_count(&CredentialId::new(vec![0]), 1).await,
            Err(PasskeyError::CredentialNotFound)
        ));
        assert!(
            store
                .list_credential_ids(&UserHandle::new("nobody"))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_update_sign_count_monotonic() {
        // Given a credential with a stored count of 5
        let store = InMemoryCredentialStore::new();
        let id = CredentialId::new(vec![4, 2]);
        store
            .add_credential(
                &UserEntity::new("alice", "Alice"),
                sample_credential(&[4, 2], "alice", 5),
            )
            .await
            .unwrap();

        // When a lower count is reported, it is rejected and nothing changes
        assert!(matches!(
            store.update_sign_count(&id, 3).await,
            Err(PasskeyError::SignCountRegression {
                stored: 5,
                received: 3
            })
        ));
        let (_, credential) = store.find_credential(&id).await.unwrap();
        assert_eq!(credential.sign_count, 5);
        assert!(credential.last_used_at.is_none());

        // When a higher count is reported, it is stored
        store.update_sign_count(&id, 6).await.unwrap();
        let (_, credential) = store.find_credential(&id).await.unwrap();
        assert_eq!(credential.sign_count, 6);
        assert!(credential.last_used_at.is_some());
    }

    #[tokio::test]
    async fn test_zero_counter_is_exempt() {
        let store = InMemoryCredentialStore::new();
        let id = CredentialId::new(vec![0, 0]);
        store
            .add_credential(
                &UserEntity::new("alice", "Alice"),
                sample_credential(&[0, 0], "alice", 0),
            )
            .await
            .unwrap();

        store.update_sign_count(&id, 0).await.unwrap();
        store.update_sign_count(&id, 0).await.unwrap();
    }
}
