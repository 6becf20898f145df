//! Recent route lookup history.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::domain::RouteKey;
use crate::storage::KvStore;

use super::FavouriteError;

/// Storage blob holding the lookup history.
pub const LAST_LOOKUPS_BLOB: &str = "last_lookups";

/// Upper bound on remembered lookups.
pub const MAX_LOOKUPS: usize = 50;

/// Most-recent-first route keys the user has opened, feeding the
/// recent-first sort mode.
pub struct LastLookups {
    entries: RwLock<VecDeque<RouteKey>>,
    storage: Arc<dyn KvStore>,
}

impl LastLookups {
    /// Load the persisted history, once at process start.
    pub fn load(storage: Arc<dyn KvStore>) -> Result<Self, FavouriteError> {
        let entries: VecDeque<RouteKey> = match storage.get(LAST_LOOKUPS_BLOB)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| FavouriteError::Corrupt(e.to_string()))?,
            None => VecDeque::new(),
        };
        Ok(Self {
            entries: RwLock::new(entries),
            storage,
        })
    }

    /// Record a lookup, moving it to the front. Resolves once persisted.
    pub async fn record(&self, route_key: RouteKey) -> Result<(), FavouriteError> {
        let mut guard = self.entries.write().await;
        guard.retain(|k| *k != route_key);
        guard.push_front(route_key);
        guard.truncate(MAX_LOOKUPS);
        self.persist(&guard).await
    }

    /// The history, most recent first.
    pub async fn list(&self) -> Vec<RouteKey> {
        self.entries.read().await.iter().cloned().collect()
    }

    /// Position of a key in the history, 0 = most recent.
    pub async fn rank(&self, route_key: &str) -> Option<usize> {
        self.entries.read().await.iter().position(|k| k == route_key)
    }

    /// Forget everything. Resolves once persisted.
    pub async fn clear(&self) -> Result<(), FavouriteError> {
        let mut guard = self.entries.write().await;
        guard.clear();
        self.persist(&guard).await
    }

    async fn persist(&self, entries: &VecDeque<RouteKey>) -> Result<(), FavouriteError> {
        let bytes =
            serde_json::to_vec(entries).map_err(|e| FavouriteError::Corrupt(e.to_string()))?;
        let storage = Arc::clone(&self.storage);
        tokio::task::spawn_blocking(move || storage.put(LAST_LOOKUPS_BLOB, &bytes))
            .await
            .map_err(|_| FavouriteError::PersistAborted)??;
        Ok(())
    }
}
