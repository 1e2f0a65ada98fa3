//! Forecast sync service and HTTP API for Sunshine.
//!
//! This crate provides a service that:
//! - Syncs the preferred location's forecast on a schedule and on demand
//! - Stores daily rows in the local database
//! - Serves forecast queries over REST
//! - Streams live forecast snapshots over WebSocket
//!
//! # REST API Endpoints
//!
//! - `GET /api/health` - Service health check
//! - `GET /api/location` - Preferred location and its sync status
//! - `PUT /api/location` - Change the preferred location and sync it
//! - `GET /api/locations` - List all known locations
//! - `GET /api/forecast` - Preferred location's forecast from today
//! - `GET /api/locations/{id}/forecast` - Forecast range for a location
//! - `GET /api/locations/{id}/forecast/{date}` - One day for a location
//! - `POST /api/sync` - Trigger a sync now
//! - `GET /api/sync/status` - Persisted sync state
//! - `WS /api/ws/locations/{id}` - Live forecast snapshots
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/sunshine/server.toml`:
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8080"
//!
//! [storage]
//! path = "~/.local/share/sunshine/data.db"
//!
//! [sync]
//! location = "94043"
//! units = "metric"
//! days = 14
//! interval_secs = 10800
//!
//! [api]
//! base_url = "https://api.openweathermap.org/data/2.5"
//! # key = "..."  # or set SUNSHINE_API_KEY
//! ```

pub mod api;
pub mod config;
pub mod query;
pub mod scheduler;
pub mod state;
pub mod sync;
pub mod ws;

pub use config::{
    ApiConfig, Config, ConfigError, ServerConfig, StorageConfig, SyncConfig, ValidationError,
};
pub use query::{ChangeEvent, QueryEngine, SharedStore, Subscription};
pub use scheduler::{SyncEvent, SyncScheduler, TriggerOutcome};
pub use state::AppState;
pub use sync::{ErrorKind, SyncError, SyncJob, SyncReport, SyncSettings};
