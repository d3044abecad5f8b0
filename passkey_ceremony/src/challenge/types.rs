use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::AtomicI64;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::errors::PasskeyError;
use crate::types::{CeremonyKind, UserEntity};

/// Number of random bytes in every issued challenge.
pub const CHALLENGE_LEN: usize = 32;

/// A challenge that has been handed to a client and not yet consumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingChallenge {
    #[serde(with = "crate::encoding::base64url")]
    pub value: Vec<u8>,
    pub kind: CeremonyKind,
    /// The user this ceremony is bound to; `None` for a bare login
    pub subject_user: Option<UserEntity>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PendingChallenge {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Issues single-use challenges and redeems them exactly once.
///
/// Implementations must make `consume` an atomic remove-and-return so that two
/// concurrent redemptions of one value cannot both succeed.
#[async_trait]
pub trait ChallengeStore: Send + Sync + 'static {
    /// Creates and records a fresh challenge.
    async fn issue(
        &self,
        kind: CeremonyKind,
        subject_user: Option<UserEntity>,
    ) -> Result<PendingChallenge, PasskeyError>;

    /// Removes the challenge and returns it.
    ///
    /// Returns `ChallengeNotFound` for unknown (or already consumed) values and
    /// `ChallengeExpired` for values past their TTL. An expired entry is removed
    /// as well.
    async fn consume(&self, value: &[u8]) -> Result<PendingChallenge, PasskeyError>;

    /// Drops every expired entry, returning how many were removed.
    async fn purge_expired(&self) -> Result<usize, PasskeyError>;
}

pub struct InMemoryChallengeStore {
    pub(super) entries: Mutex<HashMap<String, PendingChallenge>>,
    pub(super) ttl: Duration,
    /// Unix seconds after which the next `issue` sweeps expired entries
    pub(super) next_prune_at: AtomicI64,
}

pub struct RedisChallengeStore {
    pub(super) client: redis::Client,
    pub(super) ttl: Duration,
}

/// Builds a new pending challenge with a random value.
pub(super) fn new_pending(
    kind: CeremonyKind,
    subject_user: Option<UserEntity>,
    ttl: Duration,
) -> Result<PendingChallenge, PasskeyError> {
    let value = crate::encoding::gen_random_bytes(CHALLENGE_LEN)?;
    let ttl = chrono::Duration::from_std(ttl)
        .map_err(|e| PasskeyError::Config(format!("Invalid challenge TTL: {e}")))?;
    let issued_at = Utc::now();
    Ok(PendingChallenge {
        value,
        kind,
        subject_user,
        issued_at,
        expires_at: issued_at + ttl,
    })
}

/// Splits a removed entry into the found or expired outcome.
pub(super) fn check_expiry(challenge: PendingChallenge) -> Result<PendingChallenge, PasskeyError> {
    if challenge.is_expired_at(Utc::now()) {
        tracing::warn!(
            kind = %challenge.kind,
            expires_at = %challenge.expires_at,
            "Rejected expired challenge"
        );
        return Err(PasskeyError::ChallengeExpired);
    }
    Ok(challenge)
}
