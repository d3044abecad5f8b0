use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite, Transaction};
use std::str::FromStr;

use crate::encoding::{base64url_decode, base64url_encode};
use crate::errors::PasskeyError;
use crate::types::{
    AuthenticatorTransport, CoseAlgorithm, Credential, CredentialId, PublicKey, User, UserEntity,
    UserHandle,
};

use super::{CredentialStore, check_sign_count};

/// Credential store backed by SQLite through sqlx.
///
/// The `credential_id` primary key enforces global uniqueness, and sign count
/// updates are a single conditional `UPDATE`.
pub struct SqliteCredentialStore {
    pool: Pool<Sqlite>,
    users_table: String,
    credentials_table: String,
}

impl SqliteCredentialStore {
    /// Opens (creating if missing) the database at `url` and ensures the tables exist.
    pub async fn connect(url: &str, table_prefix: &str) -> Result<Self, PasskeyError> {
        let opts = SqliteConnectOptions::from_str(url)
            .map_err(|e| PasskeyError::Config(format!("Invalid SQLite URL '{url}': {e}")))?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to an in-memory database sees its own empty database,
        // so the single connection must never be recycled
        let pool_options = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options.connect_with(opts).await?;

        let store = Self {
            pool,
            users_table: format!("{table_prefix}users"),
            credentials_table: format!("{table_prefix}credentials"),
        };
        store.create_tables().await?;

        tracing::info!(
            "Connected to SQLite credential store: users={}, credentials={}",
            store.users_table,
            store.credentials_table
        );
        Ok(store)
    }

    async fn create_tables(&self) -> Result<(), PasskeyError> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                handle TEXT PRIMARY KEY NOT NULL,
                display_name TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL
            )
            "#,
            self.users_table
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                credential_id TEXT PRIMARY KEY NOT NULL,
                user_handle TEXT NOT NULL REFERENCES {}(handle),
                algorithm INTEGER NOT NULL,
                public_key TEXT NOT NULL,
                transports TEXT NOT NULL,
                sign_count INTEGER NOT NULL DEFAULT 0,
                aaguid TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL,
                last_used_at TIMESTAMP
            )
            "#,
            self.credentials_table, self.users_table
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{0}_user_handle ON {0}(user_handle)",
            self.credentials_table
        ))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn credentials_for(&self, handle: &UserHandle) -> Result<Vec<Credential>, PasskeyError> {
        let rows = sqlx::query(&format!(
            "SELECT * FROM {} WHERE user_handle = ? ORDER BY created_at, rowid",
            self.credentials_table
        ))
        .bind(handle.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(credential_from_row).collect()
    }

    /// Inserts the credential row inside `tx`, mapping a primary key clash to
    /// `DuplicateCredentialId`.
    async fn insert_credential(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        user: &UserEntity,
        credential: &Credential,
    ) -> Result<(), PasskeyError> {
        let transports = serde_json::to_string(&credential.transports)?;
        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO {}
            (credential_id, user_handle, algorithm, public_key, transports, sign_count, aaguid, created_at, last_used_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            self.credentials_table
        ))
        .bind(credential.credential_id.to_base64url())
        .bind(user.handle.as_str())
        .bind(credential.public_key.algorithm.id())
        .bind(base64url_encode(&credential.public_key.cose_key))
        .bind(transports)
        .bind(i64::from(credential.sign_count))
        .bind(&credential.aaguid)
        .bind(credential.created_at)
        .bind(credential.last_used_at)
        .execute(&mut **tx)
        .await;

        match inserted {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                tracing::warn!(
                    credential_id = %credential.credential_id,
                    "Rejected duplicate credential id"
                );
                Err(PasskeyError::DuplicateCredentialId)
            }
            Err(e) => {
                tracing::error!("Failed to store credential: {}", e);
                Err(e.into())
            }
        }
    }
}

fn credential_from_row(row: &SqliteRow) -> Result<Credential, PasskeyError> {
    let credential_id: String = row.try_get("credential_id")?;
    let user_handle: String = row.try_get("user_handle")?;
    let algorithm: i64 = row.try_get("algorithm")?;
    let public_key: String = row.try_get("public_key")?;
    let transports: String = row.try_get("transports")?;
    let sign_count: i64 = row.try_get("sign_count")?;
    let aaguid: String = row.try_get("aaguid")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let last_used_at: Option<DateTime<Utc>> = row.try_get("last_used_at")?;

    let algorithm = CoseAlgorithm::from_id(algorithm).ok_or_else(|| {
        PasskeyError::Storage(format!("Stored credential has unknown algorithm {algorithm}"))
    })?;
    let transports: Vec<AuthenticatorTransport> = serde_json::from_str(&transports)?;
    let sign_count = u32::try_from(sign_count)
        .map_err(|_| PasskeyError::Storage(format!("Stored sign count out of range: {sign_count}")))?;

    Ok(Credential {
        credential_id: CredentialId::new(base64url_decode(&credential_id)?),
        user_handle: UserHandle::new(user_handle),
        public_key: PublicKey {
            algorithm,
            cose_key: base64url_decode(&public_key)?,
        },
        transports,
        sign_count,
        aaguid,
        created_at,
        last_used_at,
    })
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn create_user(
        &self,
        user: &UserEntity,
        credential: Credential,
    ) -> Result<(), PasskeyError> {
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query(&format!(
            "INSERT INTO {} (handle, display_name, created_at) VALUES (?, ?, ?)",
            self.users_table
        ))
        .bind(user.handle.as_str())
        .bind(&user.display_name)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await;

        match created {
            Ok(_) => {}
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                tracing::warn!(user = %user.handle, "Rejected registration for existing user");
                return Err(PasskeyError::UserAlreadyExists);
            }
            Err(e) => return Err(e.into()),
        }

        // Dropping the transaction on error rolls back the new user
        self.insert_credential(&mut tx, user, &credential).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn add_credential(
        &self,
        user: &UserEntity,
        credential: Credential,
    ) -> Result<(), PasskeyError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            r#"
            INSERT INTO {} (handle, display_name, created_at) VALUES (?, ?, ?)
            ON CONFLICT(handle) DO UPDATE SET display_name = excluded.display_name
            "#,
            self.users_table
        ))
        .bind(user.handle.as_str())
        .bind(&user.display_name)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        self.insert_credential(&mut tx, user, &credential).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_user(&self, handle: &UserHandle) -> Result<User, PasskeyError> {
        let row = sqlx::query(&format!(
            "SELECT handle, display_name, created_at FROM {} WHERE handle = ?",
            self.users_table
        ))
        .bind(handle.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(PasskeyError::UserNotFound)?;

        let display_name: String = row.try_get("display_name")?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;

        Ok(User {
            handle: handle.clone(),
            display_name,
            credentials: self.credentials_for(handle).await?,
            created_at,
        })
    }

    async fn find_credential(
        &self,
        id: &CredentialId,
    ) -> Result<(User, Credential), PasskeyError> {
        let row = sqlx::query(&format!(
            "SELECT * FROM {} WHERE credential_id = ?",
            self.credentials_table
        ))
        .bind(id.to_base64url())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(PasskeyError::CredentialNotFound)?;

        let credential = credential_from_row(&row)?;
        let user = self.get_user(&credential.user_handle).await?;
        Ok((user, credential))
    }

    async fn update_sign_count(
        &self,
        id: &CredentialId,
        new_count: u32,
    ) -> Result<(), PasskeyError> {
        let new_count = i64::from(new_count);
        let result = sqlx::query(&format!(
            r#"
            UPDATE {}
            SET sign_count = ?, last_used_at = ?
            WHERE credential_id = ? AND (sign_count = 0 OR sign_count < ?)
            "#,
            self.credentials_table
        ))
        .bind(new_count)
        .bind(Utc::now())
        .bind(id.to_base64url())
        .bind(new_count)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        // Nothing updated: either the credential is unknown or the count regressed
        let stored: Option<i64> = sqlx::query_scalar(&format!(
            "SELECT sign_count FROM {} WHERE credential_id = ?",
            self.credentials_table
        ))
        .bind(id.to_base64url())
        .fetch_optional(&self.pool)
        .await?;

        let stored = stored.ok_or(PasskeyError::CredentialNotFound)?;
        let stored = u32::try_from(stored)
            .map_err(|_| PasskeyError::Storage(format!("Stored sign count out of range: {stored}")))?;
        let received = u32::try_from(new_count).unwrap_or(u32::MAX);
        check_sign_count(stored, received)?;

        // The count was acceptable but a concurrent writer got there first
        Err(PasskeyError::SignCountRegression { stored, received })
    }

    async fn list_credential_ids(
        &self,
        handle: &UserHandle,
    ) -> Result<Vec<CredentialId>, PasskeyError> {
        let ids: Vec<String> = sqlx::query_scalar(&format!(
            "SELECT credential_id FROM {} WHERE user_handle = ? ORDER BY created_at, rowid",
            self.credentials_table
        ))
        .bind(handle.as_str())
        .fetch_all(&self.pool)
        .await?;

        ids.iter()
            .map(|id| CredentialId::from_base64url(id))
            .collect()
    }
}
