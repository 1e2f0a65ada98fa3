//! Mock forecast source for testing.
//!
//! This module provides a forecast source that serves a canned payload
//! without touching the network.
//!
//! The [`MockForecastSource`] implements the [`ForecastSource`] trait, allowing
//! it to be used interchangeably with [`crate::OpenWeatherClient`] in generic code.
//!
//! # Features
//!
//! - **Failure injection**: fail the next N fetches, or every fetch, with a chosen error
//! - **Latency simulation**: add an artificial delay that counts against the deadline
//! - **Gating**: hold fetches until the test releases them, to observe in-flight state

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use sunshine_types::{Coord, day_start_timestamp};
use time::Date;
use tokio::sync::{RwLock, watch};

use crate::client::RawPayload;
use crate::error::{Error, NetworkFailure, Result};
use crate::traits::{ForecastSource, clamp_days};

/// Failure modes a [`MockForecastSource`] can inject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Transport error.
    Network,
    /// HTTP 429.
    RateLimited,
    /// Provider does not know the location.
    InvalidLocation,
}

impl MockFailure {
    fn to_error(self, location: &str) -> Error {
        match self {
            MockFailure::Network => Error::Network(NetworkFailure::Transport(
                "mock connection refused".to_string(),
            )),
            MockFailure::RateLimited => Error::RateLimited { status: 429 },
            MockFailure::InvalidLocation => Error::invalid_location(location),
        }
    }
}

/// A mock forecast provider for testing.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use sunshine_core::{ForecastSource, MockForecastSource, sample_payload};
/// use sunshine_types::Coord;
/// use time::macros::date;
///
/// #[tokio::main]
/// async fn main() {
///     let source = MockForecastSource::new(sample_payload(
///         "Mountain View",
///         Coord::new(37.39, -122.08),
///         date!(2024 - 01 - 15),
///         3,
///     ));
///     let payload = source.fetch("94043", 3, Duration::from_secs(1)).await.unwrap();
///     assert!(payload.as_str().contains("Mountain View"));
///     assert_eq!(source.fetch_count(), 1);
/// }
/// ```
pub struct MockForecastSource {
    payload: RwLock<RawPayload>,
    fetch_count: AtomicU32,
    latency_ms: AtomicU64,
    remaining_failures: AtomicU32,
    failure: RwLock<Option<MockFailure>>,
    always_fail: RwLock<Option<MockFailure>>,
    gate: watch::Sender<bool>,
    last_request: RwLock<Option<(String, u8)>>,
}

impl std::fmt::Debug for MockForecastSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockForecastSource")
            .field("fetch_count", &self.fetch_count.load(Ordering::Relaxed))
            .field("latency_ms", &self.latency_ms.load(Ordering::Relaxed))
            .finish()
    }
}

impl MockForecastSource {
    /// Create a mock that answers every fetch with `payload`.
    pub fn new(payload: RawPayload) -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            payload: RwLock::new(payload),
            fetch_count: AtomicU32::new(0),
            latency_ms: AtomicU64::new(0),
            remaining_failures: AtomicU32::new(0),
            failure: RwLock::new(None),
            always_fail: RwLock::new(None),
            gate,
            last_request: RwLock::new(None),
        }
    }

    /// Replace the payload served by subsequent fetches.
    pub async fn set_payload(&self, payload: RawPayload) {
        *self.payload.write().await = payload;
    }

    /// Add artificial latency to every fetch.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Fail the next `count` fetches with `failure`, then succeed again.
    pub async fn fail_next(&self, count: u32, failure: MockFailure) {
        *self.failure.write().await = Some(failure);
        self.remaining_failures.store(count, Ordering::Relaxed);
    }

    /// Fail every fetch with `failure` (or stop failing with `None`).
    pub async fn set_always_fail(&self, failure: Option<MockFailure>) {
        *self.always_fail.write().await = failure;
    }

    /// Hold all fetches at their start until [`release`](Self::release) is called.
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    /// Let held fetches continue.
    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    /// Number of fetches that have started.
    pub fn fetch_count(&self) -> u32 {
        self.fetch_count.load(Ordering::SeqCst)
    }

    /// Location and (clamped) day count of the most recent fetch.
    pub async fn last_request(&self) -> Option<(String, u8)> {
        self.last_request.read().await.clone()
    }

    async fn respond(&self, location: &str) -> Result<RawPayload> {
        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        // Check for transient failures first
        if self.remaining_failures.load(Ordering::Relaxed) > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            if let Some(failure) = *self.failure.read().await {
                return Err(failure.to_error(location));
            }
        }

        if let Some(failure) = *self.always_fail.read().await {
            return Err(failure.to_error(location));
        }

        Ok(self.payload.read().await.clone())
    }
}

#[async_trait]
impl ForecastSource for MockForecastSource {
    async fn fetch(&self, location: &str, days: u8, deadline: Duration) -> Result<RawPayload> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        *self.last_request.write().await = Some((location.to_string(), clamp_days(days)));

        match tokio::time::timeout(deadline, self.respond(location)).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout(deadline)),
        }
    }
}

/// Build a provider-shaped payload with `days` consecutive days starting at `first_day`.
///
/// Day `i` has max `20 + i`, min `10 + i`, condition 800 "Clear", and all
/// optional fields present.
pub fn sample_payload(city: &str, coord: Coord, first_day: Date, days: usize) -> RawPayload {
    let list: Vec<_> = (0..days)
        .map(|i| {
            let date = first_day + time::Duration::days(i as i64);
            // Noon, so the entry is unambiguously inside its UTC day.
            let dt = day_start_timestamp(date) + 12 * 3600;
            json!({
                "dt": dt,
                "temp": { "day": 15.0 + i as f64, "min": 10.0 + i as f64, "max": 20.0 + i as f64 },
                "pressure": 1013.0,
                "humidity": 60,
                "weather": [{ "id": 800, "main": "Clear", "description": "clear sky", "icon": "01d" }],
                "speed": 4.5,
                "deg": 270,
            })
        })
        .collect();

    let body = json!({
        "city": {
            "name": city,
            "coord": { "lat": coord.lat, "lon": coord.lon },
            "country": "US",
        },
        "cod": "200",
        "cnt": days,
        "list": list,
    });

    RawPayload::new(body.to_string())
}
