//! In-memory cache store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::CacheKey;
use crate::error::CacheError;
use crate::traits::CacheStore;

/// Process-local [`CacheStore`]. Entries are lost on exit.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<(String, CacheKey), serde_json::Value>>,
}

impl MemoryCacheStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries across all sessions.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns true if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn save_entry(
        &self,
        session_id: &str,
        key: CacheKey,
        payload: &serde_json::Value,
    ) -> Result<(), CacheError> {
        self.entries
            .write()
            .await
            .insert((session_id.to_string(), key), payload.clone());
        Ok(())
    }

    async fn load_entry(
        &self,
        session_id: &str,
        key: CacheKey,
    ) -> Result<Option<serde_json::Value>, CacheError> {
        Ok(self
            .entries
            .read()
            .await
            .get(&(session_id.to_string(), key))
            .cloned())
    }

    async fn remove_entry(&self, session_id: &str, key: CacheKey) -> Result<(), CacheError> {
        self.entries
            .write()
            .await
            .remove(&(session_id.to_string(), key));
        Ok(())
    }

    async fn clear_session(&self, session_id: &str) -> Result<(), CacheError> {
        self.entries
            .write()
            .await
            .retain(|(session, _), _| session != session_id);
        Ok(())
    }
}
