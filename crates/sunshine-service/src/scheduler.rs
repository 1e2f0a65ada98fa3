//! Periodic and on-demand sync scheduling.
//!
//! Each location has a slot with at most one running [`SyncJob`]. Triggers
//! that arrive while a job is running are dropped and reported as
//! [`TriggerOutcome::Debounced`].
//!
//! After every job the scheduler persists the next [`SyncState`] and
//! publishes a [`SyncEvent`]. Armed locations fire again after the sync
//! interval times the backoff multiplier from that state, so a restart
//! resumes the schedule instead of syncing immediately.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use sunshine_store::SyncState;
use sunshine_types::LocationId;
use time::OffsetDateTime;
use tokio::sync::{Mutex, broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::query::SharedStore;
use crate::sync::{ErrorKind, SyncError, SyncJob, SyncReport};

/// Upper bound on the rate-limit backoff multiplier.
pub const MAX_BACKOFF_MULTIPLIER: u32 = 8;

/// Shortest delay between two periodic fires.
const MIN_RESCHEDULE: Duration = Duration::from_secs(1);

/// Largest fraction added to a periodic delay.
const JITTER: f64 = 0.05;

/// Result of a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOutcome {
    /// A job was spawned.
    Started,
    /// A job for this location was already running.
    Debounced,
}

/// Published when a job finishes.
#[derive(Debug, Clone, Serialize)]
pub struct SyncEvent {
    pub location: String,
    pub location_id: Option<LocationId>,
    pub rows_written: usize,
    pub error_kind: Option<ErrorKind>,
    pub error: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub finished_at: OffsetDateTime,
}

impl SyncEvent {
    /// Whether the job succeeded.
    pub fn is_success(&self) -> bool {
        self.error_kind.is_none()
    }
}

/// A job in flight. `done` flips to true once its state is saved.
struct RunningJob {
    cancel: CancellationToken,
    done: watch::Receiver<bool>,
}

#[derive(Default)]
struct Slot {
    running: Option<RunningJob>,
    timer: Option<CancellationToken>,
    parked: bool,
}

struct Inner {
    job: SyncJob,
    store: SharedStore,
    slots: Mutex<HashMap<String, Slot>>,
    events: broadcast::Sender<SyncEvent>,
}

/// Runs [`SyncJob`]s per location with debounce and backoff.
#[derive(Clone)]
pub struct SyncScheduler {
    inner: Arc<Inner>,
}

impl SyncScheduler {
    /// Create a scheduler running `job`. Sync state is kept in the job's store.
    pub fn new(job: SyncJob, store: SharedStore) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                job,
                store,
                slots: Mutex::new(HashMap::new()),
                events,
            }),
        }
    }

    /// Start a job for `location` unless one is already running.
    ///
    /// Returns as soon as the job is spawned.
    pub async fn trigger(&self, location: &str) -> TriggerOutcome {
        self.inner.trigger(location).await
    }

    /// Schedule periodic syncs for `location` every `interval`.
    ///
    /// Replaces any previous timer for the location and clears parking. The
    /// first fire is computed from persisted sync state: immediately if the
    /// location was never synced or is overdue, otherwise when the last
    /// attempt's interval (times backoff) elapses.
    ///
    /// Returns the outcome of the immediate first run, if there was one.
    pub async fn arm(&self, location: &str, interval: Duration) -> Option<TriggerOutcome> {
        let state = self.inner.load_state(location).await;
        let delay = initial_delay(state.as_ref(), interval, OffsetDateTime::now_utc());

        let timer = CancellationToken::new();
        {
            let mut slots = self.inner.slots.lock().await;
            let slot = slots.entry(location.to_string()).or_default();
            slot.parked = false;
            if let Some(old) = slot.timer.replace(timer.clone()) {
                old.cancel();
            }
        }

        let first = if delay.is_zero() {
            Some(self.inner.start(location).await)
        } else {
            None
        };

        info!(
            "Armed sync for '{}' every {}s, first run in {}s",
            location,
            interval.as_secs(),
            delay.as_secs()
        );

        let outcome = first.as_ref().map(|(outcome, _)| *outcome);
        let pending = first.map(|(_, done)| done);
        let inner = Arc::clone(&self.inner);
        let location = location.to_string();
        tokio::spawn(async move {
            inner.run_timer(location, interval, delay, pending, timer).await;
        });

        outcome
    }

    /// Stop the timer and any running job for `location`.
    pub async fn cancel(&self, location: &str) {
        let mut slots = self.inner.slots.lock().await;
        if let Some(slot) = slots.get_mut(location) {
            if let Some(timer) = slot.timer.take() {
                timer.cancel();
            }
            if let Some(running) = &slot.running {
                running.cancel.cancel();
            }
            info!("Cancelled sync for '{}'", location);
        }
    }

    /// Whether a job for `location` is in flight.
    pub async fn is_running(&self, location: &str) -> bool {
        self.inner.is_running(location).await
    }

    /// Whether periodic syncs for `location` are suspended.
    pub async fn is_parked(&self, location: &str) -> bool {
        self.inner.is_parked(location).await
    }

    /// Locations with a job in flight.
    pub async fn running_locations(&self) -> Vec<String> {
        let slots = self.inner.slots.lock().await;
        let mut locations: Vec<_> = slots
            .iter()
            .filter(|(_, slot)| slot.running.is_some())
            .map(|(location, _)| location.clone())
            .collect();
        locations.sort();
        locations
    }

    /// Receive completion events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }
}

impl Inner {
    async fn trigger(self: &Arc<Self>, location: &str) -> TriggerOutcome {
        self.start(location).await.0
    }

    /// Start a job unless one is running. Either way, returns a handle that
    /// resolves when the job now in flight has finished.
    async fn start(self: &Arc<Self>, location: &str) -> (TriggerOutcome, watch::Receiver<bool>) {
        let (token, done_tx, done) = {
            let mut slots = self.slots.lock().await;
            let slot = slots.entry(location.to_string()).or_default();
            if let Some(running) = &slot.running {
                debug!("Sync for '{}' already running, trigger dropped", location);
                return (TriggerOutcome::Debounced, running.done.clone());
            }
            let token = CancellationToken::new();
            let (done_tx, done) = watch::channel(false);
            slot.running = Some(RunningJob {
                cancel: token.clone(),
                done: done.clone(),
            });
            (token, done_tx, done)
        };

        let inner = Arc::clone(self);
        let location = location.to_string();
        tokio::spawn(async move {
            inner.run_job(location, token, done_tx).await;
        });

        (TriggerOutcome::Started, done)
    }

    async fn run_job(&self, location: String, token: CancellationToken, done: watch::Sender<bool>) {
        debug!("Starting sync for '{}'", location);
        let result = self.job.run(&location, &token).await;
        let finished_at = OffsetDateTime::now_utc();

        let previous = self.load_state(&location).await;
        let state = next_sync_state(previous, &location, &result, finished_at);
        {
            let store = self.store.lock().await;
            if let Err(e) = store.save_sync_state(&state) {
                warn!("Failed to save sync state for '{}': {}", location, e);
            }
        }

        let event = match &result {
            Ok(report) => SyncEvent {
                location: location.clone(),
                location_id: Some(report.location_id),
                rows_written: report.rows_written,
                error_kind: None,
                error: None,
                finished_at,
            },
            Err(e) => {
                log_failure(&location, e, &state);
                SyncEvent {
                    location: location.clone(),
                    location_id: None,
                    rows_written: e.rows_written(),
                    error_kind: Some(e.kind()),
                    error: Some(e.to_string()),
                    finished_at,
                }
            }
        };

        {
            let mut slots = self.slots.lock().await;
            let slot = slots.entry(location.clone()).or_default();
            slot.running = None;
            if event.error_kind == Some(ErrorKind::InvalidLocation) {
                warn!("Location '{}' is unknown to the provider, parking it", location);
                slot.parked = true;
            }
        }

        let _ = self.events.send(event);
        done.send_replace(true);
    }

    async fn run_timer(
        self: Arc<Self>,
        location: String,
        interval: Duration,
        mut delay: Duration,
        mut pending: Option<watch::Receiver<bool>>,
        timer: CancellationToken,
    ) {
        loop {
            // The next delay must see the state saved by the job this timer
            // started or joined, not any other job's.
            if let Some(done) = pending.take() {
                tokio::select! {
                    biased;
                    _ = timer.cancelled() => break,
                    _ = finished(done) => {}
                }
                let state = self.load_state(&location).await;
                let due = initial_delay(state.as_ref(), interval, OffsetDateTime::now_utc());
                delay = jittered(due).max(MIN_RESCHEDULE);
            }

            tokio::select! {
                biased;
                _ = timer.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            if self.is_parked(&location).await {
                debug!("Skipping parked location '{}'", location);
                delay = jittered(interval);
                continue;
            }

            let (outcome, done) = self.start(&location).await;
            if outcome == TriggerOutcome::Debounced {
                debug!("Periodic sync for '{}' joined a running job", location);
            }
            pending = Some(done);
        }

        debug!("Timer for '{}' stopped", location);
    }

    async fn load_state(&self, location: &str) -> Option<SyncState> {
        let store = self.store.lock().await;
        match store.get_sync_state(location) {
            Ok(state) => state,
            Err(e) => {
                warn!("Failed to load sync state for '{}': {}", location, e);
                None
            }
        }
    }

    async fn is_running(&self, location: &str) -> bool {
        let slots = self.slots.lock().await;
        slots.get(location).is_some_and(|slot| slot.running.is_some())
    }

    async fn is_parked(&self, location: &str) -> bool {
        let slots = self.slots.lock().await;
        slots.get(location).is_some_and(|slot| slot.parked)
    }
}

async fn finished(mut done: watch::Receiver<bool>) {
    // A dropped sender means the job task is gone; treat it as finished.
    let _ = done.wait_for(|finished| *finished).await;
}

fn log_failure(location: &str, error: &SyncError, state: &SyncState) {
    let failures = state.consecutive_failures;
    if error.kind() == ErrorKind::Cancelled {
        info!("Sync for '{}' cancelled", location);
    } else if failures <= 3 {
        warn!(
            "Sync for '{}' failed: {} (attempt {})",
            location, error, failures
        );
    } else if failures == 4 {
        error!(
            "Sync for '{}' failed {} times in a row, will keep retrying quietly",
            location, failures
        );
    } else {
        debug!("Sync for '{}' failed: {}", location, error);
    }
}

/// Delay until the next sync is due.
///
/// Zero when there is no recorded attempt or the attempt is older than
/// `interval` times the backoff multiplier.
pub fn initial_delay(state: Option<&SyncState>, interval: Duration, now: OffsetDateTime) -> Duration {
    let Some(last_attempt) = state.and_then(|s| s.last_attempt_at) else {
        return Duration::ZERO;
    };
    let multiplier = state.map_or(1, |s| s.backoff_multiplier.clamp(1, MAX_BACKOFF_MULTIPLIER));
    let due = last_attempt + interval * multiplier;
    if due <= now {
        Duration::ZERO
    } else {
        (due - now).unsigned_abs()
    }
}

/// Sync state after a job finished with `result` at `now`.
pub fn next_sync_state(
    previous: Option<SyncState>,
    location: &str,
    result: &Result<SyncReport, SyncError>,
    now: OffsetDateTime,
) -> SyncState {
    let mut state = previous.unwrap_or_else(|| SyncState::new(location));

    match result {
        Ok(_) => {
            state.last_attempt_at = Some(now);
            state.last_success_at = Some(now);
            state.last_error_kind = None;
            state.last_error = None;
            state.consecutive_failures = 0;
            state.backoff_multiplier = 1;
        }
        // A cancelled run leaves the schedule where it was.
        Err(e) if e.kind() == ErrorKind::Cancelled => {}
        Err(e) => {
            let kind = e.kind();
            state.last_attempt_at = Some(now);
            state.last_error_kind = Some(kind.as_str().to_string());
            state.last_error = Some(e.to_string());
            state.consecutive_failures = state.consecutive_failures.saturating_add(1);
            if kind == ErrorKind::RateLimited {
                state.backoff_multiplier = state
                    .backoff_multiplier
                    .saturating_mul(2)
                    .clamp(1, MAX_BACKOFF_MULTIPLIER);
            }
        }
    }

    state
}

fn jittered(delay: Duration) -> Duration {
    delay.mul_f64(1.0 + rand::rng().random::<f64>() * JITTER)
}
