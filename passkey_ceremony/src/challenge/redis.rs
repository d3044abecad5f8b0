use async_trait::async_trait;
use redis::AsyncCommands;
use std::time::Duration;

use crate::encoding::base64url_encode;
use crate::errors::PasskeyError;
use crate::types::{CeremonyKind, UserEntity};

use super::types::{
    ChallengeStore, PendingChallenge, RedisChallengeStore, check_expiry, new_pending,
};

const CACHE_PREFIX: &str = "cache";
const CHALLENGE_PREFIX: &str = "challenge";

/// Extra lifetime of the Redis key past the logical TTL, so that a late
/// redemption is reported as expired rather than unknown.
const EXPIRY_GRACE_SECS: u64 = 60;

impl RedisChallengeStore {
    pub async fn connect(url: &str, ttl: Duration) -> Result<Self, PasskeyError> {
        let client = redis::Client::open(url)?;
        let store = Self { client, ttl };
        // Fail fast when the server is unreachable
        let _conn = store.client.get_multiplexed_async_connection().await?;
        tracing::info!("Connected to Redis challenge store");
        Ok(store)
    }

    fn make_key(value: &[u8]) -> String {
        format!(
            "{CACHE_PREFIX}:{CHALLENGE_PREFIX}:{}",
            base64url_encode(value)
        )
    }
}

#[async_trait]
impl ChallengeStore for RedisChallengeStore {
    async fn issue(
        &self,
        kind: CeremonyKind,
        subject_user: Option<UserEntity>,
    ) -> Result<PendingChallenge, PasskeyError> {
        let challenge = new_pending(kind, subject_user, self.ttl)?;
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let key = Self::make_key(&challenge.value);
        let value = serde_json::to_string(&challenge)?;
        let _: () = conn
            .set_ex(&key, value, self.ttl.as_secs() + EXPIRY_GRACE_SECS)
            .await?;

        tracing::debug!(kind = %kind, "Issued challenge");
        Ok(challenge)
    }

    async fn consume(&self, value: &[u8]) -> Result<PendingChallenge, PasskeyError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let key = Self::make_key(value);
        let stored: Option<String> = redis::cmd("GETDEL")
            .arg(&key)
            .query_async(&mut conn)
            .await?;

        match stored {
            Some(json) => check_expiry(serde_json::from_str(&json)?),
            None => Err(PasskeyError::ChallengeNotFound),
        }
    }

    async fn purge_expired(&self) -> Result<usize, PasskeyError> {
        // Redis evicts keys on its own once the grace period has passed
        Ok(0)
    }
}
