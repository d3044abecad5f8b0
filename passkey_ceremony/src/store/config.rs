use std::{env, sync::Arc, sync::LazyLock};

use crate::errors::PasskeyError;

use super::{CredentialStore, InMemoryCredentialStore, SqliteCredentialStore};

/// Prefix for the SQLite table names.
pub static DB_TABLE_PREFIX: LazyLock<String> =
    LazyLock::new(|| env::var("DB_TABLE_PREFIX").unwrap_or_else(|_| "pk_".to_string()));

/// Creates the credential store selected by `GENERIC_DATA_STORE_TYPE`.
///
/// `memory` (the default) keeps everything in process; `sqlite` opens
/// `GENERIC_DATA_STORE_URL`.
pub async fn credential_store_from_env() -> Result<Arc<dyn CredentialStore>, PasskeyError> {
    let store_type = env::var("GENERIC_DATA_STORE_TYPE").unwrap_or_else(|_| "memory".to_string());

    tracing::info!("Initializing credential store with type: {}", store_type);

    match store_type.as_str() {
        "memory" => Ok(Arc::new(InMemoryCredentialStore::new())),
        "sqlite" => {
            let url = env::var("GENERIC_DATA_STORE_URL").map_err(|_| {
                PasskeyError::Config("GENERIC_DATA_STORE_URL must be set for sqlite".to_string())
            })?;
            let store = SqliteCredentialStore::connect(&url, &DB_TABLE_PREFIX).await?;
            Ok(Arc::new(store))
        }
        t => Err(PasskeyError::Config(format!(
            "Unsupported data store type: {t}. Supported types are 'memory' and 'sqlite'"
        ))),
    }
}
