//! Application state shared across handlers.
//!
//! # Change Channel
//!
//! Committed writes are announced on the [`QueryEngine`]'s broadcast channel,
//! sized by `server.broadcast_buffer` (default: 100). Senders never block; a
//! subscriber that falls behind re-queries once instead of replaying every
//! missed change.
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8080"
//! broadcast_buffer = 200
//! ```

use std::sync::Arc;

use sunshine_core::ForecastSource;
use sunshine_store::Store;
use tokio::sync::{Mutex, RwLock};

use crate::config::Config;
use crate::query::{QueryEngine, SharedStore};
use crate::scheduler::SyncScheduler;
use crate::sync::{SyncJob, SyncSettings};

/// Shared application state.
pub struct AppState {
    /// The data store, shared with the query engine and sync jobs.
    pub store: SharedStore,
    /// Configuration (RwLock for runtime updates).
    pub config: RwLock<Config>,
    /// Observable read side.
    pub query: QueryEngine,
    /// Sync scheduling.
    pub scheduler: SyncScheduler,
}

impl AppState {
    /// Create new application state.
    ///
    /// Sync jobs fetch from `source` with the settings in `config.sync`.
    pub fn new(store: Store, config: Config, source: Arc<dyn ForecastSource>) -> Arc<Self> {
        let store: SharedStore = Arc::new(Mutex::new(store));
        let query = QueryEngine::new(Arc::clone(&store), config.server.broadcast_buffer);
        let job = SyncJob::new(source, query.clone(), SyncSettings::from(&config.sync));
        let scheduler = SyncScheduler::new(job, Arc::clone(&store));

        Arc::new(Self {
            store,
            config: RwLock::new(config),
            query,
            scheduler,
        })
    }

    /// The configured preferred location.
    pub async fn preferred_location(&self) -> String {
        self.config.read().await.sync.location.clone()
    }

    /// Arm periodic syncs for the preferred location.
    pub async fn start_sync(&self) {
        let (location, interval) = {
            let config = self.config.read().await;
            (config.sync.location.clone(), config.sync.interval())
        };
        self.scheduler.arm(&location, interval).await;
    }
}
