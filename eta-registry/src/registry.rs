//! The registry service object.
//!
//! One `Registry` is constructed at process start and passed by reference
//! to every consumer; there is no global instance. It owns the directory
//! loader, the ETA dispatcher, and the favourites stores, and exposes the
//! read operations the presentation layer is allowed to see.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::directory::{
    DirectoryError, DirectoryLoader, DirectorySource, LoadState, Snapshot,
};
use crate::domain::{Coordinates, Operator, RouteSearchResultEntry};
use crate::eta::{EtaAdapter, EtaDispatcher, EtaDispatcherConfig, EtaError, EtaQueryResult, EtaRequest};
use crate::favourites::{
    FavouriteError, FavouritesConfig, FavouritesStore, LastLookups, ResolvedFavourite,
    SortPreferences,
};
use crate::geo::{self, NearbyRoutesResult};
use crate::search::{self, NextChars, RoutePredicate};
use crate::storage::KvStore;

/// Errors surfaced by registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error(transparent)]
    Favourites(#[from] FavouriteError),

    #[error(transparent)]
    Eta(#[from] EtaError),

    #[error("route key {0} not found in the current dataset")]
    UnknownRouteKey(String),
}

/// Configuration for the registry.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Bound on how long a first-time reader waits for the initial load.
    pub first_load_wait: Duration,

    pub favourites: FavouritesConfig,
    pub eta: EtaDispatcherConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            first_load_wait: Duration::from_secs(30),
            favourites: FavouritesConfig::default(),
            eta: EtaDispatcherConfig::default(),
        }
    }
}

/// Process-wide transit data registry.
pub struct Registry {
    loader: Arc<DirectoryLoader>,
    eta: EtaDispatcher,
    favourites: FavouritesStore,
    sort_prefs: SortPreferences,
    lookups: LastLookups,
    first_load_wait: Duration,
}

impl Registry {
    /// Wire up a registry from its collaborators.
    ///
    /// Loads the persisted favourites, sort preferences, and lookup
    /// history synchronously; the dataset itself loads lazily on first
    /// access (or eagerly after [`Registry::warm_up`]).
    pub fn new(
        config: RegistryConfig,
        source: Arc<dyn DirectorySource>,
        storage: Arc<dyn KvStore>,
        adapters: Vec<Arc<dyn EtaAdapter>>,
    ) -> Result<Arc<Self>, RegistryError> {
        let loader = DirectoryLoader::new(source, storage.clone());
        let favourites = FavouritesStore::load(config.favourites, storage.clone())?;
        let sort_prefs = SortPreferences::load(storage.clone())?;
        let lookups = LastLookups::load(storage)?;
        Ok(Arc::new(Self {
            loader,
            eta: EtaDispatcher::new(config.eta, adapters),
            favourites,
            sort_prefs,
            lookups,
            first_load_wait: config.first_load_wait,
        }))
    }

    /// Start the initial dataset load without waiting for it.
    pub fn warm_up(&self) {
        self.loader.trigger_load();
    }

    /// Current load state.
    pub fn state(&self) -> LoadState {
        self.loader.state()
    }

    /// Subscribe to load state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<LoadState> {
        self.loader.subscribe()
    }

    /// The current snapshot, waiting (bounded) for the first load.
    pub async fn snapshot(&self) -> Result<Arc<Snapshot>, RegistryError> {
        Ok(self.loader.ensure_snapshot(self.first_load_wait).await?)
    }

    /// Probe the remote dataset version and refresh when it moved.
    pub async fn refresh(&self) {
        self.loader.refresh_if_stale().await;
    }

    /// Recover from a failed initial load (user-triggered).
    pub async fn reload(&self) {
        self.loader.reload().await;
    }

    /// Keypad continuations for a route-number prefix.
    pub async fn next_chars(&self, prefix: &str) -> Result<NextChars, RegistryError> {
        let snapshot = self.snapshot().await?;
        Ok(snapshot.route_index().next_chars(prefix))
    }

    /// Route search by number.
    pub async fn find_routes(
        &self,
        input: &str,
        exact: bool,
        predicate: Option<&RoutePredicate>,
    ) -> Result<Vec<RouteSearchResultEntry>, RegistryError> {
        let snapshot = self.snapshot().await?;
        Ok(search::find_routes(snapshot.sheet(), input, exact, predicate))
    }

    /// Routes near a coordinate, or the closest miss.
    pub async fn nearby_routes(
        &self,
        origin: Coordinates,
        exclude_route_keys: &HashSet<String>,
        interchange_from: Option<&str>,
    ) -> Result<NearbyRoutesResult, RegistryError> {
        let snapshot = self.snapshot().await?;
        Ok(geo::nearby_routes(
            snapshot.sheet(),
            origin,
            exclude_route_keys,
            interchange_from,
        ))
    }

    /// Real-time arrivals for one (stop, route) pair.
    ///
    /// The route is resolved by key from the current snapshot, so ETA
    /// queries keep working across background refreshes.
    pub async fn eta(
        &self,
        stop_id: &str,
        stop_index: u32,
        operator: Operator,
        route_key: &str,
    ) -> Result<Arc<EtaQueryResult>, RegistryError> {
        let snapshot = self.snapshot().await?;
        let route = snapshot
            .sheet()
            .route(route_key)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownRouteKey(route_key.to_string()))?;
        let stop = snapshot.sheet().stop(stop_id).cloned();

        let request = EtaRequest {
            stop_id: stop_id.to_string(),
            stop_index,
            operator,
            route_key: route_key.to_string(),
            route,
            stop,
        };
        Ok(self.eta.query(request).await?)
    }

    /// Resolve what a favourite slot currently points at.
    pub async fn resolve_favourite(
        &self,
        slot: u8,
        origin_provider: impl FnOnce() -> Option<Coordinates>,
    ) -> Result<Option<ResolvedFavourite>, RegistryError> {
        let snapshot = self.snapshot().await?;
        Ok(self
            .favourites
            .resolve(slot, snapshot.sheet(), origin_provider)
            .await)
    }

    /// Record that the user opened a route.
    pub async fn record_lookup(&self, route_key: &str) -> Result<(), RegistryError> {
        Ok(self.lookups.record(route_key.to_string()).await?)
    }

    pub fn favourites(&self) -> &FavouritesStore {
        &self.favourites
    }

    pub fn sort_preferences(&self) -> &SortPreferences {
        &self.sort_prefs
    }

    pub fn last_lookups(&self) -> &LastLookups {
        &self.lookups
    }

    /// Operators with a registered ETA adapter.
    pub fn eta_operators(&self) -> Vec<Operator> {
        self.eta.operators()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::mock::{MockDirectorySource, sample_sheet};
    use crate::eta::mock::MockEtaAdapter;
    use crate::favourites::{FavouriteRouteStop, FavouriteStopMode};
    use crate::storage::MemoryKvStore;

    fn registry_with(
        source: Arc<MockDirectorySource>,
        adapter: Arc<MockEtaAdapter>,
    ) -> Arc<Registry> {
        Registry::new(
            RegistryConfig::default(),
            source,
            Arc::new(MemoryKvStore::new()),
            vec![adapter],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn first_eta_query_drives_the_loader_to_ready() {
        let source = Arc::new(MockDirectorySource::new("v1", sample_sheet()));
        let adapter = Arc::new(MockEtaAdapter::new(Operator::Kmb));
        let registry = registry_with(source, adapter);

        assert_eq!(registry.state(), LoadState::Uninitialized);

        let result = registry
            .eta("AAAA000000000001", 1, Operator::Kmb, "1+1+kmb+O")
            .await
            .unwrap();

        assert_eq!(registry.state(), LoadState::Ready);
        assert_eq!(result.next_countdown_minutes(), Some(5));
    }

    #[tokio::test]
    async fn unknown_route_key_is_an_error() {
        let source = Arc::new(MockDirectorySource::new("v1", sample_sheet()));
        let adapter = Arc::new(MockEtaAdapter::new(Operator::Kmb));
        let registry = registry_with(source, adapter);

        let err = registry
            .eta("AAAA000000000001", 1, Operator::Kmb, "nope")
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::UnknownRouteKey(_)));
    }

    #[tokio::test]
    async fn search_operations_share_the_snapshot() {
        let source = Arc::new(MockDirectorySource::new("v1", sample_sheet()));
        let adapter = Arc::new(MockEtaAdapter::new(Operator::Kmb));
        let registry = registry_with(source.clone(), adapter);

        let next = registry.next_chars("").await.unwrap();
        assert_eq!(next.characters.iter().collect::<Vec<_>>(), [&'1', &'2']);

        let routes = registry.find_routes("1", false, None).await.unwrap();
        assert_eq!(routes.len(), 2);

        // Both operations used one load.
        assert_eq!(source.sheet_calls(), 1);
    }

    #[tokio::test]
    async fn refresh_swaps_the_snapshot_under_readers() {
        let source = Arc::new(MockDirectorySource::new("v1", sample_sheet()));
        let adapter = Arc::new(MockEtaAdapter::new(Operator::Kmb));
        let registry = registry_with(source.clone(), adapter);

        let before = registry.snapshot().await.unwrap();
        source.publish("v2", sample_sheet());
        registry.refresh().await;

        let after = registry.snapshot().await.unwrap();
        assert_eq!(before.generation(), 1);
        assert_eq!(after.generation(), 2);
        assert_eq!(registry.state(), LoadState::Ready);
    }

    #[tokio::test]
    async fn favourites_resolve_through_the_registry() {
        let source = Arc::new(MockDirectorySource::new("v1", sample_sheet()));
        let adapter = Arc::new(MockEtaAdapter::new(Operator::Kmb));
        let registry = registry_with(source, adapter);

        let sheet = sample_sheet();
        let route_key = "1+1+kmb+O".to_string();
        registry
            .favourites()
            .set_favourite(
                1,
                FavouriteRouteStop {
                    stop_id: "AAAA000000000001".to_string(),
                    operator: Operator::Kmb,
                    stop_index: 1,
                    stop: sheet.stop("AAAA000000000001").unwrap().clone(),
                    route_key: route_key.clone(),
                    route: sheet.route(&route_key).unwrap().clone(),
                    mode: FavouriteStopMode::Closest,
                },
            )
            .await
            .unwrap();

        let resolved = registry
            .resolve_favourite(1, || Some(Coordinates::new(22.3099, 114.17)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.stop_id, "AAAA000000000003");
    }

    #[tokio::test]
    async fn lookups_are_recorded_most_recent_first() {
        let source = Arc::new(MockDirectorySource::new("v1", sample_sheet()));
        let adapter = Arc::new(MockEtaAdapter::new(Operator::Kmb));
        let registry = registry_with(source, adapter);

        registry.record_lookup("1+1+kmb+O").await.unwrap();
        registry.record_lookup("2+1+ctb+O").await.unwrap();
        assert_eq!(
            registry.last_lookups().list().await,
            ["2+1+ctb+O", "1+1+kmb+O"]
        );
    }
}
