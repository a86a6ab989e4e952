/// Domain values: pixels, identities and connection ids.
pub mod canvas;
/// Injectable time source.
pub mod clock;
/// Live connection registry.
pub mod hub;
/// Keyed async locks.
pub mod stripes;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig,
    dao::kv_store::KeyValueStore,
    error::ServiceError,
    services::{
        broadcast_service::BroadcastEngine, notify_service::PlacementNotifier,
        rate_limiter::RateLimiter,
    },
};

use self::{
    clock::{Clock, SystemClock},
    hub::ConnectionHub,
    stripes::LockStripes,
};

const CELL_LOCK_STRIPES: usize = 256;

/// Handle cloned into every request and connection task.
pub type SharedState = Arc<AppState>;

/// Central application state: live connections, the broadcast queue and the store handle.
pub struct AppState {
    config: Arc<AppConfig>,
    store: RwLock<Option<Arc<dyn KeyValueStore>>>,
    degraded: watch::Sender<bool>,
    hub: Arc<ConnectionHub>,
    broadcaster: BroadcastEngine,
    rate_limiter: RateLimiter,
    cell_locks: LockStripes,
    notifier: Option<PlacementNotifier>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// Spawns the broadcast engine, so it must be called from within a Tokio runtime. The
    /// application starts in degraded mode until a store is installed.
    pub fn new(config: AppConfig, notifier: Option<PlacementNotifier>) -> SharedState {
        Self::with_clock(config, notifier, Arc::new(SystemClock))
    }

    /// Same as [`AppState::new`] with an explicit time source for cooldown bookkeeping.
    pub fn with_clock(
        config: AppConfig,
        notifier: Option<PlacementNotifier>,
        clock: Arc<dyn Clock>,
    ) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let hub = Arc::new(ConnectionHub::new(config.delivery_buffer));
        let (broadcaster, _engine) = BroadcastEngine::spawn(hub.clone());
        let rate_limiter = RateLimiter::new(&config, clock);

        Arc::new(Self {
            config: Arc::new(config),
            store: RwLock::new(None),
            degraded: degraded_tx,
            hub,
            broadcaster,
            rate_limiter,
            cell_locks: LockStripes::new(CELL_LOCK_STRIPES),
            notifier,
        })
    }

    /// Immutable configuration loaded at startup.
    pub fn config(&self) -> Arc<AppConfig> {
        self.config.clone()
    }

    /// Obtain a handle to the current store, if one is installed.
    pub async fn store(&self) -> Option<Arc<dyn KeyValueStore>> {
        let guard = self.store.read().await;
        guard.as_ref().cloned()
    }

    /// Store handle for an operation that cannot proceed without one.
    pub async fn require_store(&self) -> Result<Arc<dyn KeyValueStore>, ServiceError> {
        if self.is_degraded() {
            return Err(ServiceError::Degraded);
        }
        self.store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new store implementation and leave degraded mode.
    pub async fn install_store(&self, store: Arc<dyn KeyValueStore>) {
        {
            let mut guard = self.store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current store and enter degraded mode.
    pub async fn clear_store(&self) {
        {
            let mut guard = self.store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    #[cfg(test)]
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Registry of live WebSocket connections.
    pub fn hub(&self) -> &ConnectionHub {
        &self.hub
    }

    /// Queue feeding the fan-out task.
    pub fn broadcaster(&self) -> &BroadcastEngine {
        &self.broadcaster
    }

    /// Cooldown bookkeeping shared by placements and snapshots.
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Per-cell locks keeping the store write and the broadcast order of one cell in step.
    pub fn cell_locks(&self) -> &LockStripes {
        &self.cell_locks
    }

    /// Hook called after every accepted placement, when configured.
    pub fn notifier(&self) -> Option<&PlacementNotifier> {
        self.notifier.as_ref()
    }
}
