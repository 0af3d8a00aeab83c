//! Persistent response cache backed by embedded SQLite (via SQLx).
//!
//! One logical table per (provider, call-shape): a video lookup and a
//! catalog song lookup cache the same external id under different tables
//! because the id means different things to each call. Tables are created
//! lazily on first use with a fixed schema of key column(s) plus one
//! payload column.
//!
//! Payloads are the raw remote responses, base64-of-JSON encoded, not the
//! mapped [`crate::model::MediaItem`] - if mapping logic changes, nothing
//! needs re-fetching.
//!
//! A store-wide enabled flag, when false, makes every lookup miss (forcing
//! live fetches) while still committing writes, so a refresh run updates
//! the cache instead of abandoning it.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;

/// Payload decoding failure: the row existed but was not valid
/// base64-of-JSON for the expected shape.
#[derive(Debug, thiserror::Error)]
#[error("Malformed cache payload in {table}: {message}")]
pub struct PayloadError {
    pub table: &'static str,
    pub message: String,
}

/// Handle to the cache database; cheap to clone.
#[derive(Clone)]
pub struct CacheStore {
    pool: SqlitePool,
    enabled: bool,
}

impl CacheStore {
    /// Open (creating if missing) the cache database at the given path.
    pub async fn open(path: &Path, enabled: bool) -> sqlx::Result<Self> {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let db_url = format!("sqlite:{}", path.display());
        if !sqlx::Sqlite::database_exists(&db_url).await.unwrap_or(false) {
            sqlx::Sqlite::create_database(&db_url).await?;
        }

        // Single connection: all access is sequential, and immediate commits
        // mean a crash mid-run loses at most the in-flight item.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&db_url)
            .await?;

        Ok(Self { pool, enabled })
    }

    /// In-memory store for tests.
    #[cfg(test)]
    pub async fn in_memory(enabled: bool) -> sqlx::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Ok(Self { pool, enabled })
    }

    /// Get a handle to a named cache table, creating it if needed.
    pub async fn table(
        &self,
        name: &'static str,
        key_columns: &'static [&'static str],
    ) -> sqlx::Result<CacheTable> {
        let cols = key_columns
            .iter()
            .map(|c| format!("{} TEXT NOT NULL", c))
            .collect::<Vec<_>>()
            .join(", ");
        let create = format!(
            "CREATE TABLE IF NOT EXISTS {} ({}, payload TEXT NOT NULL, PRIMARY KEY ({}))",
            name,
            cols,
            key_columns.join(", ")
        );
        sqlx::query(&create).execute(&self.pool).await?;

        Ok(CacheTable {
            pool: self.pool.clone(),
            name,
            key_columns,
            enabled: self.enabled,
        })
    }
}

/// Handle to one logical cache table.
#[derive(Clone)]
pub struct CacheTable {
    pool: SqlitePool,
    name: &'static str,
    key_columns: &'static [&'static str],
    enabled: bool,
}

impl CacheTable {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether a row exists for the key. Always false when the store is
    /// disabled, regardless of stored rows.
    pub async fn contains(&self, key: &[&str]) -> sqlx::Result<bool> {
        if !self.enabled {
            return Ok(false);
        }
        Ok(self.select(key).await?.is_some())
    }

    /// Fetch the raw payload for a key. None when missing or when the
    /// store is disabled.
    pub async fn get(&self, key: &[&str]) -> sqlx::Result<Option<String>> {
        if !self.enabled {
            return Ok(None);
        }
        self.select(key).await
    }

    /// Insert or update the payload for a key. Writes go through even when
    /// the store is disabled, so a forced-refresh run still repopulates.
    pub async fn upsert(&self, key: &[&str], payload: &str) -> sqlx::Result<()> {
        debug_assert_eq!(key.len(), self.key_columns.len());
        let placeholders = vec!["?"; self.key_columns.len() + 1].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}, payload) VALUES ({}) \
             ON CONFLICT({}) DO UPDATE SET payload = excluded.payload",
            self.name,
            self.key_columns.join(", "),
            placeholders,
            self.key_columns.join(", ")
        );
        let mut query = sqlx::query(&sql);
        for part in key {
            query = query.bind(*part);
        }
        query = query.bind(payload);
        query.execute(&self.pool).await?;
        Ok(())
    }

    /// Fetch and decode a cached value in one step.
    pub async fn get_decoded<T: DeserializeOwned>(
        &self,
        key: &[&str],
    ) -> sqlx::Result<Option<Result<T, PayloadError>>> {
        Ok(self.get(key).await?.map(|payload| {
            decode_payload(&payload).map_err(|message| PayloadError {
                table: self.name,
                message,
            })
        }))
    }

    /// Encode and store a value in one step.
    pub async fn put_encoded<T: Serialize>(&self, key: &[&str], value: &T) -> sqlx::Result<()> {
        self.upsert(key, &encode_payload(value)).await
    }

    async fn select(&self, key: &[&str]) -> sqlx::Result<Option<String>> {
        debug_assert_eq!(key.len(), self.key_columns.len());
        let filter = self
            .key_columns
            .iter()
            .map(|c| format!("{} = ?", c))
            .collect::<Vec<_>>()
            .join(" AND ");
        let sql = format!("SELECT payload FROM {} WHERE {}", self.name, filter);
        let mut query = sqlx::query_as::<_, (String,)>(&sql);
        for part in key {
            query = query.bind(*part);
        }
        Ok(query
            .fetch_optional(&self.pool)
            .await?
            .map(|(payload,)| payload))
    }
}

/// Encode a raw response as base64-of-JSON for storage.
pub fn encode_payload<T: Serialize>(value: &T) -> String {
    let json = serde_json::to_vec(value).expect("serializing a response cannot fail");
    BASE64.encode(json)
}

/// Decode a stored payload back into the raw response shape.
pub fn decode_payload<T: DeserializeOwned>(payload: &str) -> Result<T, String> {
    let bytes = BASE64.decode(payload).map_err(|e| e.to_string())?;
    serde_json::from_slice(&bytes).map_err(|e| e.to_string())
}
