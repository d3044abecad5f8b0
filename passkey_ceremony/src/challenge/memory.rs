use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::encoding::base64url_encode;
use crate::errors::PasskeyError;
use crate::types::{CeremonyKind, UserEntity};

use super::types::{
    ChallengeStore, InMemoryChallengeStore, PendingChallenge, check_expiry, new_pending,
};

/// Minimum time between two sweeps of stale entries during `issue`.
const PRUNE_INTERVAL_SECS: i64 = 30;

/// Entries this many minutes past their expiry are dropped by the sweep.
const PRUNE_AFTER_MINUTES: i64 = 5;

impl InMemoryChallengeStore {
    pub fn new(ttl: Duration) -> Self {
        tracing::info!("Creating new in-memory challenge store");
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            next_prune_at: AtomicI64::new(Utc::now().timestamp() + PRUNE_INTERVAL_SECS),
        }
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[async_trait]
impl ChallengeStore for InMemoryChallengeStore {
    async fn issue(
        &self,
        kind: CeremonyKind,
        subject_user: Option<UserEntity>,
    ) -> Result<PendingChallenge, PasskeyError> {
        let challenge = new_pending(kind, subject_user, self.ttl)?;
        let key = base64url_encode(&challenge.value);

        let mut entries = self.entries.lock().await;
        let now = Utc::now();
        if now.timestamp() >= self.next_prune_at.load(Ordering::Relaxed) {
            self.next_prune_at
                .store(now.timestamp() + PRUNE_INTERVAL_SECS, Ordering::Relaxed);
            let cutoff = now - chrono::Duration::minutes(PRUNE_AFTER_MINUTES);
            let before = entries.len();
            entries.retain(|_, c| c.expires_at > cutoff);
            tracing::debug!(removed = before - entries.len(), "Pruned expired challenges");
        }
        entries.insert(key, challenge.clone());

        tracing::debug!(kind = %kind, "Issued challenge");
        Ok(challenge)
    }

    async fn consume(&self, value: &[u8]) -> Result<PendingChallenge, PasskeyError> {
        let key = base64url_encode(value);
        let removed = self.entries.lock().await.remove(&key);
        match removed {
            Some(challenge) => check_expiry(challenge),
            None => Err(PasskeyError::ChallengeNotFound),
        }
    }

    async fn purge_expired(&self) -> Result<usize, PasskeyError> {
        let now = Utc::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, c| !c.is_expired_at(now));
        Ok(before - entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_issue_and_consume() {
        // Given an in-memory store and an issued challenge
        let store = InMemoryChallengeStore::new(Duration::from_secs(60));
        let user = UserEntity::new("alice", "Alice");
        let issued = store
            .issue(CeremonyKind::Registration, Some(user.clone()))
            .await
            .unwrap();

        // When consuming it
        let consumed = store.consume(&issued.value).await.unwrap();

        // Then the same challenge comes back with its binding intact
        assert_eq!(consumed, issued);
        assert_eq!(consumed.subject_user, Some(user));
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_consume_is_single_use() {
        let store = InMemoryChallengeStore::new(Duration::from_secs(60));
        let issued = store
            .issue(CeremonyKind::Authentication, None)
            .await
            .unwrap();

        assert!(store.consume(&issued.value).await.is_ok());
        assert!(matches!(
            store.consume(&issued.value).await,
            Err(PasskeyError::ChallengeNotFound)
        ));
    }

    #[tokio::test]
    async fn test_consume_unknown_value() {
        let store = InMemoryChallengeStore::new(Duration::from_secs(60));
        assert!(matches!(
            store.consume(&[0u8; 32]).await,
            Err(PasskeyError::ChallengeNotFound)
        ));
    }

    #[tokio::test]
    async fn test_expired_challenge_is_rejected_and_removed() {
        // Given a store whose challenges expire immediately
        let store = InMemoryChallengeStore::new(Duration::ZERO);
        let issued = store
            .issue(CeremonyKind::Registration, None)
            .await
            .unwrap();

        // When consuming the challenge
        let first = store.consume(&issued.value).await;

        // Then it is reported as expired, and is gone afterwards
        assert!(matches!(first, Err(PasskeyError::ChallengeExpired)));
        assert!(matches!(
            store.consume(&issued.value).await,
            Err(PasskeyError::ChallengeNotFound)
        ));
    }

    #[tokio::test]
    async fn test_challenge_values_are_unique() {
        let store = InMemoryChallengeStore::new(Duration::from_secs(60));
        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            let issued = store
                .issue(CeremonyKind::Authentication, None)
                .await
                .unwrap();
            assert!(seen.insert(issued.value));
        }
        assert_eq!(store.len().await, 100);
    }

    #[tokio::test]
    async fn test_issue_prunes_at_most_once_per_interval() {
        // Given two long expired entries, one just expired, and a sweep that is due
        let store = InMemoryChallengeStore::new(Duration::ZERO);
        for _ in 0..3 {
            store.issue(CeremonyKind::Authentication, None).await.unwrap();
        }
        let recent = {
            let mut entries = store.entries.lock().await;
            let mut keys: Vec<String> = entries.keys().cloned().collect();
            let recent = keys.pop().unwrap();
            for key in keys {
                entries.get_mut(&key).unwrap().expires_at =
                    Utc::now() - chrono::Duration::minutes(10);
            }
            recent
        };
        store.next_prune_at.store(0, Ordering::Relaxed);

        // When the next challenge is issued, only the stale ones are swept
        store.issue(CeremonyKind::Authentication, None).await.unwrap();
        assert_eq!(store.len().await, 2);
        assert!(store.entries.lock().await.contains_key(&recent));

        // And further issues within the interval leave the map alone
        {
            let mut entries = store.entries.lock().await;
            for challenge in entries.values_mut() {
                challenge.expires_at = Utc::now() - chrono::Duration::minutes(10);
            }
        }
        store.issue(CeremonyKind::Authentication, None).await.unwrap();
        assert_eq!(store.len().await, 3);
        assert!(store.next_prune_at.load(Ordering::Relaxed) > Utc::now().timestamp());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = InMemoryChallengeStore::new(Duration::ZERO);
        store.issue(CeremonyKind::Registration, None).await.unwrap();
        store.issue(CeremonyKind::Registration, None).await.unwrap();

        assert_eq!(store.purge_expired().await.unwrap(), 2);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_consume_succeeds_once() {
        // Given one issued challenge shared by many tasks
        let store = Arc::new(InMemoryChallengeStore::new(Duration::from_secs(60)));
        let issued = store
            .issue(CeremonyKind::Authentication, None)
            .await
            .unwrap();

        // When they all try to consume it at once
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            let value = issued.value.clone();
            handles.push(tokio::spawn(async move { store.consume(&value).await }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                successes += 1;
            }
        }

        // Then exactly one wins
        assert_eq!(successes, 1);
    }
}
