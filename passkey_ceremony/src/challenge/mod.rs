mod memory;
mod redis;
mod types;

use std::{env, sync::Arc, time::Duration};

use crate::errors::PasskeyError;

pub use types::{
    CHALLENGE_LEN, ChallengeStore, InMemoryChallengeStore, PendingChallenge, RedisChallengeStore,
};

/// Creates the challenge store selected by `GENERIC_CACHE_STORE_TYPE`.
///
/// `memory` (the default) keeps challenges in process; `redis` connects to
/// `GENERIC_CACHE_STORE_URL`.
pub async fn challenge_store_from_env(
    ttl: Duration,
) -> Result<Arc<dyn ChallengeStore>, PasskeyError> {
    let store_type = env::var("GENERIC_CACHE_STORE_TYPE").unwrap_or_else(|_| "memory".to_string());

    tracing::info!("Initializing challenge store with type: {}", store_type);

    match store_type.as_str() {
        "memory" => Ok(Arc::new(InMemoryChallengeStore::new(ttl))),
        "redis" => {
            let url = env::var("GENERIC_CACHE_STORE_URL").map_err(|_| {
                PasskeyError::Config("GENERIC_CACHE_STORE_URL must be set for redis".to_string())
            })?;
            Ok(Arc::new(RedisChallengeStore::connect(&url, ttl).await?))
        }
        t => Err(PasskeyError::Config(format!(
            "Unsupported cache store type: {t}. Supported types are 'memory' and 'redis'"
        ))),
    }
}
