//! Trait abstractions for forecast providers.
//!
//! This module provides the [`ForecastSource`] trait that abstracts over the
//! real HTTP client and the mock source used in tests.

use std::time::Duration;

use async_trait::async_trait;

use crate::client::RawPayload;
use crate::error::Result;

/// Smallest forecast horizon a provider is asked for.
pub const MIN_FORECAST_DAYS: u8 = 1;
/// Largest forecast horizon a provider is asked for.
pub const MAX_FORECAST_DAYS: u8 = 16;

/// Trait abstracting a remote daily-forecast provider.
///
/// Implementations perform exactly one request per call. Retry policy
/// belongs to the caller.
///
/// # Example
///
/// ```ignore
/// use sunshine_core::{ForecastSource, parse_forecast};
///
/// async fn days_for<S: ForecastSource>(source: &S) -> sunshine_core::Result<usize> {
///     let payload = source.fetch("94043", 7, Duration::from_secs(10)).await?;
///     Ok(parse_forecast(&payload)?.days.len())
/// }
/// ```
#[async_trait]
pub trait ForecastSource: Send + Sync {
    /// Fetch the raw forecast payload for `location` covering `days` days.
    ///
    /// `days` is clamped to [`MIN_FORECAST_DAYS`]..=[`MAX_FORECAST_DAYS`].
    /// Exceeding `deadline` fails with a timeout network error.
    async fn fetch(&self, location: &str, days: u8, deadline: Duration) -> Result<RawPayload>;
}

/// Clamp a requested horizon into the supported range.
pub fn clamp_days(days: u8) -> u8 {
    days.clamp(MIN_FORECAST_DAYS, MAX_FORECAST_DAYS)
}
