//! Per-context sort mode preferences and route sorting.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::domain::{Coordinates, RouteKey, RouteSearchResultEntry};
use crate::storage::KvStore;

use super::FavouriteError;

/// Storage blob holding the per-context sort preferences.
pub const SORT_PREFS_BLOB: &str = "sort_prefs";

/// The list contexts that remember a sort preference independently.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RouteListType {
    Normal,
    Recent,
    Favourite,
    Nearby,
}

/// How a route list is ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteSortMode {
    /// Deterministic route-key order.
    Normal,
    /// Recently looked-up routes first.
    Recent,
    /// Closest first; requires a query origin.
    Proximity,
}

impl RouteSortMode {
    /// The mode a repeated toggle advances to.
    pub fn next_mode(&self) -> Self {
        match self {
            RouteSortMode::Normal => RouteSortMode::Recent,
            RouteSortMode::Recent => RouteSortMode::Proximity,
            RouteSortMode::Proximity => RouteSortMode::Normal,
        }
    }
}

/// Persisted per-context sort preference map.
pub struct SortPreferences {
    prefs: RwLock<BTreeMap<RouteListType, RouteSortMode>>,
    storage: Arc<dyn KvStore>,
}

impl SortPreferences {
    /// Load the persisted preferences, once at process start.
    pub fn load(storage: Arc<dyn KvStore>) -> Result<Self, FavouriteError> {
        let prefs = match storage.get(SORT_PREFS_BLOB)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| FavouriteError::Corrupt(e.to_string()))?,
            None => BTreeMap::new(),
        };
        Ok(Self {
            prefs: RwLock::new(prefs),
            storage,
        })
    }

    /// The preferred mode for a context, defaulting to Normal.
    pub async fn get(&self, context: RouteListType) -> RouteSortMode {
        self.prefs
            .read()
            .await
            .get(&context)
            .copied()
            .unwrap_or(RouteSortMode::Normal)
    }

    /// Remember a context's mode. Resolves once persisted.
    pub async fn set(
        &self,
        context: RouteListType,
        mode: RouteSortMode,
    ) -> Result<(), FavouriteError> {
        let mut guard = self.prefs.write().await;
        guard.insert(context, mode);

        let bytes =
            serde_json::to_vec(&*guard).map_err(|e| FavouriteError::Corrupt(e.to_string()))?;
        let storage = Arc::clone(&self.storage);
        tokio::task::spawn_blocking(move || storage.put(SORT_PREFS_BLOB, &bytes))
            .await
            .map_err(|_| FavouriteError::PersistAborted)??;
        Ok(())
    }
}

/// Stable in-place sort of search entries.
///
/// Proximity mode needs `origin`; calling it without one is a programming
/// error and panics. `recents` is the lookup history, most recent first,
/// for Recent mode.
pub fn sort_routes(
    entries: &mut [RouteSearchResultEntry],
    mode: RouteSortMode,
    origin: Option<&Coordinates>,
    recents: &[RouteKey],
) {
    match mode {
        RouteSortMode::Normal => {
            entries.sort_by(|a, b| a.route_key.cmp(&b.route_key));
        }
        RouteSortMode::Recent => {
            entries.sort_by_key(|entry| {
                recents
                    .iter()
                    .position(|key| *key == entry.route_key)
                    .unwrap_or(usize::MAX)
            });
        }
        RouteSortMode::Proximity => {
            let origin = origin.expect("proximity sort requires an origin");
            entries.sort_by(|a, b| {
                distance_of(a, origin)
                    .partial_cmp(&distance_of(b, origin))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
    }
}

fn distance_of(entry: &RouteSearchResultEntry, origin: &Coordinates) -> f64 {
    match &entry.stop_info {
        Some(stop_info) => stop_info
            .data
            .as_ref()
            .map(|stop| origin.distance_to(&stop.location))
            .unwrap_or(stop_info.distance),
        None => f64::MAX,
    }
}
