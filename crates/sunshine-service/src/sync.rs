//! One end-to-end forecast sync.
//!
//! A [`SyncJob`] runs the pipeline for a single location:
//!
//! 1. fetch the raw payload from the [`ForecastSource`]
//! 2. parse it into city info and day records
//! 3. resolve the location row
//! 4. upsert day rows, one store lock per row
//! 5. prune rows dated before today
//! 6. notify [`QueryEngine`] subscribers
//!
//! Any failing stage aborts the rest. Rows already written stay written,
//! and subscribers are still notified for them.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sunshine_core::{ForecastSource, parse_forecast};
use sunshine_types::{LocationId, Units, today_utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::query::{QueryEngine, SharedStore};

/// Classification of a failed sync, persisted in the sync state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Transport failure, timeout, or unexpected HTTP status.
    Network,
    /// Provider rejected the request rate or key.
    RateLimited,
    /// Provider does not know the location.
    InvalidLocation,
    /// Payload could not be decoded.
    MalformedPayload,
    /// Local database write failed.
    StoreWrite,
    /// The location changed while the job was running.
    Cancelled,
}

impl ErrorKind {
    /// Stable snake_case name, as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::InvalidLocation => "invalid_location",
            ErrorKind::MalformedPayload => "malformed_payload",
            ErrorKind::StoreWrite => "store_write",
            ErrorKind::Cancelled => "cancelled",
        }
    }

    /// Whether the next scheduled run may succeed without a config change.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::Network | ErrorKind::RateLimited | ErrorKind::StoreWrite
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from a sync run.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Fetch failed: {0}")]
    Fetch(#[source] sunshine_core::Error),
    #[error("Parse failed: {0}")]
    Parse(#[source] sunshine_core::Error),
    #[error("Store write failed after {written} row(s): {source}")]
    Store {
        written: usize,
        #[source]
        source: sunshine_store::Error,
    },
    #[error("Sync cancelled after {written} row(s)")]
    Cancelled { written: usize },
}

impl SyncError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Fetch(e) => match e {
                sunshine_core::Error::RateLimited { .. } => ErrorKind::RateLimited,
                sunshine_core::Error::InvalidLocation { .. } => ErrorKind::InvalidLocation,
                sunshine_core::Error::MalformedPayload(_) => ErrorKind::MalformedPayload,
                _ => ErrorKind::Network,
            },
            SyncError::Parse(_) => ErrorKind::MalformedPayload,
            SyncError::Store { .. } => ErrorKind::StoreWrite,
            SyncError::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Rows committed before the failure.
    pub fn rows_written(&self) -> usize {
        match self {
            SyncError::Store { written, .. } | SyncError::Cancelled { written } => *written,
            _ => 0,
        }
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    /// Resolved location row.
    pub location_id: LocationId,
    /// City name reported by the provider.
    pub city_name: String,
    /// Day rows written.
    pub rows_written: usize,
    /// Past rows removed.
    pub rows_pruned: usize,
}

/// Per-run parameters taken from the sync configuration.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Forecast horizon in days.
    pub days: u8,
    /// Unit system recorded on the location row.
    pub units: Units,
    /// Deadline for the provider request.
    pub timeout: Duration,
}

impl From<&crate::config::SyncConfig> for SyncSettings {
    fn from(config: &crate::config::SyncConfig) -> Self {
        Self {
            days: config.days,
            units: config.units,
            timeout: config.timeout(),
        }
    }
}

/// Fetch, parse, persist, and notify for one location.
#[derive(Clone)]
pub struct SyncJob {
    source: Arc<dyn ForecastSource>,
    store: SharedStore,
    query: QueryEngine,
    settings: SyncSettings,
}

impl SyncJob {
    /// Create a job. The store is taken from `query`.
    pub fn new(source: Arc<dyn ForecastSource>, query: QueryEngine, settings: SyncSettings) -> Self {
        Self {
            source,
            store: Arc::clone(query.store()),
            query,
            settings,
        }
    }

    /// Run the pipeline for `location`.
    ///
    /// `cancel` is raced against the fetch and checked before every write.
    #[instrument(skip(self, cancel))]
    pub async fn run(
        &self,
        location: &str,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        debug!("Fetching {} day(s)", self.settings.days);
        let payload = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SyncError::Cancelled { written: 0 }),
            result = self.source.fetch(location, self.settings.days, self.settings.timeout) => {
                result.map_err(SyncError::Fetch)?
            }
        };

        let forecast = parse_forecast(&payload).map_err(SyncError::Parse)?;
        debug!("Parsed {} day(s) for '{}'", forecast.days.len(), forecast.city.name);

        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled { written: 0 });
        }

        let location_id = {
            let store = self.store.lock().await;
            store
                .resolve_location(
                    location,
                    forecast.city.coord,
                    self.settings.units,
                    &forecast.city.name,
                )
                .map_err(|source| SyncError::Store { written: 0, source })?
        };

        let mut written = 0;
        for record in &forecast.days {
            if cancel.is_cancelled() {
                self.notify_partial(location_id, written);
                return Err(SyncError::Cancelled { written });
            }

            // Lock per row so readers interleave with the batch.
            let result = {
                let store = self.store.lock().await;
                store.upsert_day(location_id, record)
            };
            if let Err(source) = result {
                self.notify_partial(location_id, written);
                return Err(SyncError::Store { written, source });
            }
            written += 1;
        }

        let pruned = {
            let store = self.store.lock().await;
            store.prune_before(location_id, today_utc())
        };
        let rows_pruned = match pruned {
            Ok(n) => n,
            Err(source) => {
                self.notify_partial(location_id, written);
                return Err(SyncError::Store { written, source });
            }
        };

        self.query.notify(location_id);

        info!(
            "Synced {} day(s) for '{}' (location {}, pruned {})",
            written, location, location_id, rows_pruned
        );

        Ok(SyncReport {
            location_id,
            city_name: forecast.city.name,
            rows_written: written,
            rows_pruned,
        })
    }

    fn notify_partial(&self, location_id: LocationId, written: usize) {
        if written > 0 {
            self.query.notify(location_id);
        }
    }
}
