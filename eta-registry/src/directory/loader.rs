//! Dataset load/refresh state machine.
//!
//! The loader owns the published [`Snapshot`] and the rules for replacing
//! it: reads are served from the current snapshot regardless of freshness
//! (stale-while-revalidate), refreshes happen on a background task with at
//! most one in flight, and a new snapshot is only swapped in after it has
//! fully deserialized and passed validation. Failure of the very first
//! load is terminal until an explicit [`DirectoryLoader::reload`]; failure
//! of a background refresh keeps the old snapshot serving.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;

use crate::storage::KvStore;

use super::client::DirectorySource;
use super::error::DirectoryError;
use super::sheet::{DataSheet, Snapshot};

/// Storage blob holding the cached dataset payload.
pub const SHEET_BLOB: &str = "directory.sheet";

/// Storage blob holding the version string the cached payload came from.
pub const VERSION_BLOB: &str = "directory.version";

/// Observable loader state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    /// No load attempted yet.
    Uninitialized,
    /// First load in progress; no snapshot to serve.
    Loading,
    /// Background refresh in progress; old snapshot still serving.
    Updating,
    /// A snapshot is published.
    Ready,
    /// The initial load failed; explicit reload required.
    Error,
}

/// Owns the dataset snapshot and its refresh lifecycle.
pub struct DirectoryLoader {
    source: Arc<dyn DirectorySource>,
    storage: Arc<dyn KvStore>,
    snapshot: RwLock<Option<Arc<Snapshot>>>,
    version: RwLock<Option<String>>,
    state: watch::Sender<LoadState>,
    refresh_gate: tokio::sync::Mutex<()>,
    generation: AtomicU64,
    /// Self-reference for handing owned clones to background tasks.
    weak: Weak<DirectoryLoader>,
}

impl DirectoryLoader {
    pub fn new(source: Arc<dyn DirectorySource>, storage: Arc<dyn KvStore>) -> Arc<Self> {
        let (state, _) = watch::channel(LoadState::Uninitialized);
        Arc::new_cyclic(|weak| Self {
            source,
            storage,
            snapshot: RwLock::new(None),
            version: RwLock::new(None),
            state,
            refresh_gate: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
            weak: weak.clone(),
        })
    }

    /// Current state of the load machine.
    pub fn state(&self) -> LoadState {
        *self.state.borrow()
    }

    /// Subscribe to state transitions.
    pub fn subscribe(&self) -> watch::Receiver<LoadState> {
        self.state.subscribe()
    }

    /// The current snapshot, if any has ever been published.
    ///
    /// Never blocks; returns the snapshot regardless of its freshness.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.snapshot.read().unwrap().clone()
    }

    /// Get a snapshot, loading on demand.
    ///
    /// If a snapshot exists it is returned immediately and an opportunistic
    /// freshness check is kicked off in the background. Otherwise a load is
    /// triggered and the call waits, bounded by `wait`, for it to settle.
    pub async fn ensure_snapshot(
        &self,
        wait: Duration,
    ) -> Result<Arc<Snapshot>, DirectoryError> {
        if let Some(snapshot) = self.snapshot() {
            if let Some(this) = self.weak.upgrade() {
                tokio::spawn(async move { this.refresh_if_stale().await });
            }
            return Ok(snapshot);
        }

        if self.state() == LoadState::Error {
            return Err(DirectoryError::Unavailable);
        }

        self.trigger_load();

        let mut rx = self.state.subscribe();
        let settled = tokio::time::timeout(wait, async {
            loop {
                match *rx.borrow_and_update() {
                    LoadState::Ready => return Ok(()),
                    LoadState::Error => return Err(DirectoryError::Unavailable),
                    _ => {}
                }
                if rx.changed().await.is_err() {
                    return Err(DirectoryError::Unavailable);
                }
            }
        })
        .await;

        match settled {
            Ok(Ok(())) => self.snapshot().ok_or(DirectoryError::Unavailable),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(DirectoryError::LoadTimeout),
        }
    }

    /// Kick off a load/refresh on a background task.
    pub fn trigger_load(&self) {
        if let Some(this) = self.weak.upgrade() {
            tokio::spawn(async move { this.run_load().await });
        }
    }

    /// Probe the remote version and refresh if it moved.
    pub async fn refresh_if_stale(&self) {
        if self.state() != LoadState::Ready {
            return;
        }
        let Ok(remote) = self.source.fetch_version().await else {
            return;
        };
        let current = self.version.read().unwrap().clone();
        if current.as_deref() != Some(remote.as_str()) {
            tracing::info!("dataset version changed, refreshing");
            self.run_load().await;
        }
    }

    /// User-triggered recovery from a failed initial load.
    pub async fn reload(&self) {
        self.run_load().await;
    }

    /// Run one load/refresh cycle. Returns without doing anything if
    /// another cycle is already in flight.
    pub async fn run_load(&self) {
        let Ok(_guard) = self.refresh_gate.try_lock() else {
            return;
        };

        let had_snapshot = self.snapshot().is_some();
        self.set_state(if had_snapshot {
            LoadState::Updating
        } else {
            LoadState::Loading
        });

        match self.load_inner(had_snapshot).await {
            Ok(()) => self.set_state(LoadState::Ready),
            Err(e) if had_snapshot => {
                tracing::warn!("background refresh failed, keeping current snapshot: {e}");
                self.set_state(LoadState::Ready);
            }
            Err(e) => {
                tracing::error!("initial dataset load failed: {e}");
                self.set_state(LoadState::Error);
            }
        }
    }

    async fn load_inner(&self, had_snapshot: bool) -> Result<(), DirectoryError> {
        let remote_version = match self.source.fetch_version().await {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("dataset version check failed: {e}");
                None
            }
        };

        // Already serving this exact version: nothing to do.
        if had_snapshot
            && remote_version.is_some()
            && remote_version.as_deref() == self.version.read().unwrap().as_deref()
        {
            return Ok(());
        }

        // First load: prefer the locally cached payload when it is current,
        // or whenever the remote is unreachable.
        if !had_snapshot {
            let cached_version = self
                .storage
                .get(VERSION_BLOB)?
                .map(|b| String::from_utf8_lossy(&b).into_owned());
            let cache_usable = match (&remote_version, &cached_version) {
                (Some(remote), Some(cached)) => remote == cached,
                (None, Some(_)) => true,
                _ => false,
            };
            if cache_usable
                && let Some(bytes) = self.storage.get(SHEET_BLOB)?
            {
                match serde_json::from_slice::<DataSheet>(&bytes) {
                    Ok(sheet) => match sheet.validate() {
                        Ok(()) => {
                            self.publish(sheet, cached_version);
                            return Ok(());
                        }
                        Err(e) => {
                            tracing::warn!("cached dataset failed validation, refetching: {e}")
                        }
                    },
                    Err(e) => tracing::warn!("cached dataset unreadable, refetching: {e}"),
                }
            }
        }

        // Fetch a fresh payload. Without a version we cannot record what we
        // fetched, and the version probe already failed anyway.
        let Some(remote_version) = remote_version else {
            return Err(DirectoryError::Offline);
        };

        let sheet = self.source.fetch_sheet().await?;
        sheet.validate()?;

        let encoded =
            serde_json::to_vec(&sheet).map_err(|e| DirectoryError::Malformed(e.to_string()))?;
        self.storage.put(SHEET_BLOB, &encoded)?;
        self.storage.put(VERSION_BLOB, remote_version.as_bytes())?;

        self.publish(sheet, Some(remote_version));
        Ok(())
    }

    fn publish(&self, sheet: DataSheet, version: Option<String>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = Arc::new(Snapshot::new(generation, sheet));
        *self.snapshot.write().unwrap() = Some(snapshot);
        *self.version.write().unwrap() = version;
        tracing::info!(generation, "published dataset snapshot");
    }

    fn set_state(&self, state: LoadState) {
        self.state.send_replace(state);
    }
}
