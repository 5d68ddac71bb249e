//! `SQLite` cache store.
//!
//! One row per `(session_id, cache_key)` with the payload stored as JSON text.

#![allow(clippy::missing_errors_doc)]

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use super::CacheKey;
use crate::error::CacheError;
use crate::traits::CacheStore;

/// `SQLite`-backed [`CacheStore`].
#[derive(Debug, Clone)]
pub struct SqliteCacheStore {
    pool: SqlitePool,
}

impl SqliteCacheStore {
    /// Open (or create) a cache database file.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::ConnectionFailed`] if the connection fails.
    pub async fn new(database_path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = database_path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::ConnectionFailed {
                message: format!("Failed to create database directory: {e}"),
            })?;
        }

        let options =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", path.display()))
                .map_err(|e| CacheError::ConnectionFailed {
                    message: format!("Invalid database path: {e}"),
                })?
                .journal_mode(SqliteJournalMode::Wal)
                .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| CacheError::ConnectionFailed {
                message: format!("Failed to connect to database: {e}"),
            })?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Create an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::ConnectionFailed`] if the connection fails.
    pub async fn new_in_memory() -> Result<Self, CacheError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| CacheError::ConnectionFailed {
                message: format!("Invalid memory database options: {e}"),
            })?
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| CacheError::ConnectionFailed {
                message: format!("Failed to create in-memory database: {e}"),
            })?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), CacheError> {
        let schema_001 = include_str!("../../migrations/001_session_cache.sql");
        sqlx::raw_sql(schema_001)
            .execute(&self.pool)
            .await
            .map_err(|e| CacheError::MigrationFailed {
                version: "001".to_string(),
                message: format!("Failed to run migration 001: {e}"),
            })?;
        Ok(())
    }

    /// Keys stored for a session, in pipeline order.
    pub async fn keys(&self, session_id: &str) -> Result<Vec<CacheKey>, CacheError> {
        let rows = sqlx::query("SELECT cache_key FROM session_cache WHERE session_id = ?")
            .bind(session_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Self::query_error("SELECT session_cache keys", format!("{e}")))?;

        let mut keys: Vec<CacheKey> = rows
            .iter()
            .filter_map(|row| {
                let name: String = row.get("cache_key");
                CacheKey::parse(&name)
            })
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Session ids with at least one stored entry.
    pub async fn sessions(&self) -> Result<Vec<String>, CacheError> {
        let rows = sqlx::query(
            "SELECT DISTINCT session_id FROM session_cache ORDER BY session_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Self::query_error("SELECT session_cache sessions", format!("{e}")))?;

        Ok(rows.iter().map(|row| row.get("session_id")).collect())
    }

    fn query_error(query: &str, message: String) -> CacheError {
        CacheError::QueryFailed {
            query: query.to_string(),
            message,
        }
    }
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn save_entry(
        &self,
        session_id: &str,
        key: CacheKey,
        payload: &serde_json::Value,
    ) -> Result<(), CacheError> {
        let body = serde_json::to_string(payload).map_err(|e| CacheError::Serialization {
            key: key.to_string(),
            message: e.to_string(),
        })?;

        sqlx::query(
            "INSERT INTO session_cache (session_id, cache_key, payload, updated_at) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT(session_id, cache_key) DO UPDATE SET \
             payload = excluded.payload, updated_at = excluded.updated_at",
        )
        .bind(session_id)
        .bind(key.as_str())
        .bind(&body)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| Self::query_error("UPSERT session_cache", format!("{e}")))?;

        Ok(())
    }

    async fn load_entry(
        &self,
        session_id: &str,
        key: CacheKey,
    ) -> Result<Option<serde_json::Value>, CacheError> {
        let row = sqlx::query(
            "SELECT payload FROM session_cache WHERE session_id = ? AND cache_key = ?",
        )
        .bind(session_id)
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Self::query_error("SELECT session_cache", format!("{e}")))?;

        match row {
            Some(row) => {
                let body: String = row.get("payload");
                serde_json::from_str(&body)
                    .map(Some)
                    .map_err(|e| CacheError::Serialization {
                        key: key.to_string(),
                        message: e.to_string(),
                    })
            }
            None => Ok(None),
        }
    }

    async fn remove_entry(&self, session_id: &str, key: CacheKey) -> Result<(), CacheError> {
        sqlx::query("DELETE FROM session_cache WHERE session_id = ? AND cache_key = ?")
            .bind(session_id)
            .bind(key.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| Self::query_error("DELETE session_cache entry", format!("{e}")))?;
        Ok(())
    }

    async fn clear_session(&self, session_id: &str) -> Result<(), CacheError> {
        sqlx::query("DELETE FROM session_cache WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(|e| Self::query_error("DELETE session_cache", format!("{e}")))?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn test_store() -> SqliteCacheStore {
        SqliteCacheStore::new_in_memory()
            .await
            .expect("Failed to create test store")
    }

    #[tokio::test]
    async fn test_new_in_memory() {
        assert!(SqliteCacheStore::new_in_memory().await.is_ok());
    }

    #[tokio::test]
    async fn test_new_with_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.db");

        let store = SqliteCacheStore::new(&path).await.unwrap();
        store
            .save_entry("s1", CacheKey::InitMatrix, &json!([1, 2]))
            .await
            .unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let store = test_store().await;
        let payload = json!({"matrix": [[0.5, 1.0]], "headers": ["price", "area"], "rowIds": [1]});
        store
            .save_entry("s1", CacheKey::NormalizedMatrix, &payload)
            .await
            .unwrap();

        let loaded = store
            .load_entry("s1", CacheKey::NormalizedMatrix)
            .await
            .unwrap();
        assert_eq!(loaded, Some(payload));
    }

    #[tokio::test]
    async fn test_load_missing() {
        let store = test_store().await;
        assert!(store.load_entry("nope", CacheKey::Result).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_overwrites_existing_key() {
        let store = test_store().await;
        store.save_entry("s1", CacheKey::Result, &json!(1)).await.unwrap();
        store.save_entry("s1", CacheKey::Result, &json!(2)).await.unwrap();

        assert_eq!(
            store.load_entry("s1", CacheKey::Result).await.unwrap(),
            Some(json!(2))
        );
        assert_eq!(store.keys("s1").await.unwrap(), vec![CacheKey::Result]);
    }

    #[tokio::test]
    async fn test_keys_in_pipeline_order() {
        let store = test_store().await;
        for key in [CacheKey::WeightedMatrix, CacheKey::InitMatrix, CacheKey::DecisionMatrix] {
            store.save_entry("s1", key, &json!(null)).await.unwrap();
        }
        assert_eq!(
            store.keys("s1").await.unwrap(),
            vec![
                CacheKey::InitMatrix,
                CacheKey::DecisionMatrix,
                CacheKey::WeightedMatrix
            ]
        );
    }

    #[tokio::test]
    async fn test_remove_entry() {
        let store = test_store().await;
        store.save_entry("s1", CacheKey::WeightedMatrix, &json!(1)).await.unwrap();
        store.save_entry("s1", CacheKey::Result, &json!(2)).await.unwrap();

        store.remove_entry("s1", CacheKey::Result).await.unwrap();

        assert_eq!(store.keys("s1").await.unwrap(), vec![CacheKey::WeightedMatrix]);
    }

    #[tokio::test]
    async fn test_clear_session() {
        let store = test_store().await;
        store.save_entry("s1", CacheKey::Result, &json!(1)).await.unwrap();
        store.save_entry("s2", CacheKey::Result, &json!(2)).await.unwrap();

        store.clear_session("s1").await.unwrap();

        assert!(store.keys("s1").await.unwrap().is_empty());
        assert_eq!(store.keys("s2").await.unwrap(), vec![CacheKey::Result]);
    }

    #[tokio::test]
    async fn test_sessions_lists_distinct_ids() {
        let store = test_store().await;
        store.save_entry("b", CacheKey::InitMatrix, &json!(1)).await.unwrap();
        store.save_entry("b", CacheKey::Result, &json!(2)).await.unwrap();
        store.save_entry("a", CacheKey::Result, &json!(3)).await.unwrap();

        assert_eq!(store.sessions().await.unwrap(), vec!["a".to_string(), "b".to_string()]);

        store.clear_session("a").await.unwrap();
        assert_eq!(store.sessions().await.unwrap(), vec!["b".to_string()]);
    }
}
