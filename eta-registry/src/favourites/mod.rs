//! Slot-indexed favourite route-stops.
//!
//! Favourites live in memory behind a lock and are rewritten to durable
//! storage on every mutation; the mutation future resolves only once the
//! blob is on disk, so an awaited `set`/`clear` is the flush point tests
//! and callers rely on.

mod history;
mod sort;

pub use history::{LAST_LOOKUPS_BLOB, LastLookups, MAX_LOOKUPS};
pub use sort::{RouteListType, RouteSortMode, SORT_PREFS_BLOB, SortPreferences, sort_routes};

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::directory::DataSheet;
use crate::domain::{Coordinates, Operator, Route, RouteKey, Stop};
use crate::geo;
use crate::storage::{KvStore, StorageError};

/// Storage blob holding the favourites table.
pub const FAVOURITES_BLOB: &str = "favourites";

/// How a favourite resolves its stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FavouriteStopMode {
    /// Always the stored stop.
    Fixed = 0,
    /// Whichever stop on the route is closest to the user right now.
    Closest = 1,
}

impl FavouriteStopMode {
    /// Whether resolving needs a location fix.
    pub fn requires_location(&self) -> bool {
        matches!(self, FavouriteStopMode::Closest)
    }
}

/// A pinned (route, stop) pair in one favourite slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FavouriteRouteStop {
    pub stop_id: String,
    pub operator: Operator,
    /// Position of the stop along the route branch, 1-based.
    pub stop_index: u32,
    pub stop: Stop,
    pub route_key: RouteKey,
    pub route: Route,
    pub mode: FavouriteStopMode,
}

/// The (stop id, index, stop) triple a favourite resolves to.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedFavourite {
    pub stop_id: String,
    pub stop_index: u32,
    pub stop: Stop,
}

/// Errors from the favourites store.
#[derive(Debug, thiserror::Error)]
pub enum FavouriteError {
    #[error("favourite slot {slot} out of range 1..={max}")]
    SlotOutOfRange { slot: u8, max: u8 },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("corrupt favourites blob: {0}")]
    Corrupt(String),

    #[error("persist task aborted")]
    PersistAborted,
}

/// Configuration for the favourites store.
#[derive(Debug, Clone)]
pub struct FavouritesConfig {
    /// Highest usable slot index.
    pub max_slots: u8,
}

impl Default for FavouritesConfig {
    fn default() -> Self {
        Self { max_slots: 8 }
    }
}

/// In-memory favourites table with write-through persistence.
pub struct FavouritesStore {
    slots: RwLock<BTreeMap<u8, FavouriteRouteStop>>,
    storage: Arc<dyn KvStore>,
    max_slots: u8,
}

impl FavouritesStore {
    /// Load the persisted table, once at process start.
    pub fn load(config: FavouritesConfig, storage: Arc<dyn KvStore>) -> Result<Self, FavouriteError> {
        let slots = match storage.get(FAVOURITES_BLOB)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| FavouriteError::Corrupt(e.to_string()))?,
            None => BTreeMap::new(),
        };
        Ok(Self {
            slots: RwLock::new(slots),
            storage,
            max_slots: config.max_slots,
        })
    }

    pub fn max_slots(&self) -> u8 {
        self.max_slots
    }

    fn check_slot(&self, slot: u8) -> Result<(), FavouriteError> {
        if slot == 0 || slot > self.max_slots {
            return Err(FavouriteError::SlotOutOfRange {
                slot,
                max: self.max_slots,
            });
        }
        Ok(())
    }

    pub async fn get(&self, slot: u8) -> Option<FavouriteRouteStop> {
        self.slots.read().await.get(&slot).cloned()
    }

    pub async fn all(&self) -> BTreeMap<u8, FavouriteRouteStop> {
        self.slots.read().await.clone()
    }

    pub async fn is_favourite(&self, slot: u8) -> bool {
        self.slots.read().await.contains_key(&slot)
    }

    /// Pin a favourite into a slot, overwriting unconditionally.
    ///
    /// Resolves once the table is durably persisted.
    pub async fn set_favourite(
        &self,
        slot: u8,
        favourite: FavouriteRouteStop,
    ) -> Result<(), FavouriteError> {
        self.check_slot(slot)?;
        let mut guard = self.slots.write().await;
        guard.insert(slot, favourite);
        self.persist(&guard).await
    }

    /// Clear a slot. Clearing an empty slot is not an error.
    pub async fn clear_favourite(&self, slot: u8) -> Result<(), FavouriteError> {
        self.check_slot(slot)?;
        let mut guard = self.slots.write().await;
        guard.remove(&slot);
        self.persist(&guard).await
    }

    /// Resolve the (stop id, index, stop) a slot currently stands for.
    ///
    /// Fixed favourites return their stored triple, provided the stored
    /// route still exists in the snapshot and still serves the stop.
    /// Closest favourites re-evaluate the route's full stop sequence
    /// against the coordinate from `origin_provider`, which is only
    /// invoked when actually needed. A favourite whose route or stop has
    /// vanished from the dataset resolves to `None`.
    ///
    /// Pure with respect to store state: calling this twice with the same
    /// snapshot and origin yields equal results.
    pub async fn resolve(
        &self,
        slot: u8,
        sheet: &DataSheet,
        origin_provider: impl FnOnce() -> Option<Coordinates>,
    ) -> Option<ResolvedFavourite> {
        let favourite = self.get(slot).await?;
        resolve_favourite(&favourite, sheet, origin_provider)
    }

    /// Persist while holding the write guard, so persisted states follow
    /// mutation order.
    async fn persist(
        &self,
        slots: &BTreeMap<u8, FavouriteRouteStop>,
    ) -> Result<(), FavouriteError> {
        let bytes =
            serde_json::to_vec(slots).map_err(|e| FavouriteError::Corrupt(e.to_string()))?;
        let storage = Arc::clone(&self.storage);
        tokio::task::spawn_blocking(move || storage.put(FAVOURITES_BLOB, &bytes))
            .await
            .map_err(|_| FavouriteError::PersistAborted)??;
        Ok(())
    }
}

/// Resolve one favourite against a dataset snapshot.
pub fn resolve_favourite(
    favourite: &FavouriteRouteStop,
    sheet: &DataSheet,
    origin_provider: impl FnOnce() -> Option<Coordinates>,
) -> Option<ResolvedFavourite> {
    match favourite.mode {
        FavouriteStopMode::Fixed => {
            let route = sheet.route(&favourite.route_key)?;
            route.serves_stop(&favourite.stop_id)?;
            Some(ResolvedFavourite {
                stop_id: favourite.stop_id.clone(),
                stop_index: favourite.stop_index,
                stop: favourite.stop.clone(),
            })
        }
        FavouriteStopMode::Closest => {
            let bound_id = favourite.route.id_bound(&favourite.operator)?.to_string();
            let stops = sheet.route_stops(
                &favourite.route.route_number,
                &favourite.operator,
                &bound_id,
            );
            if stops.is_empty() {
                return None;
            }
            // Without a fix the stored stop stays in effect.
            let Some(origin) = origin_provider() else {
                return Some(ResolvedFavourite {
                    stop_id: favourite.stop_id.clone(),
                    stop_index: favourite.stop_index,
                    stop: favourite.stop.clone(),
                });
            };
            let (index, _) = geo::nearest_stop(&origin, &stops, |e| &e.stop.location)?;
            let entry = &stops[index];
            Some(ResolvedFavourite {
                stop_id: entry.stop_id.clone(),
                stop_index: index as u32 + 1,
                stop: entry.stop.clone(),
            })
        }
    }
}
