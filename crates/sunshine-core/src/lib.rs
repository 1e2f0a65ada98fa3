//! Forecast provider client and payload parser for Sunshine.
//!
//! This crate talks to a remote daily-forecast provider and turns its JSON
//! payload into normalized [`DayRecord`](sunshine_types::DayRecord) rows.
//!
//! # Features
//!
//! - **Provider client**: one HTTP request per call, bounded by a caller deadline
//! - **Error classification**: rate limiting, unknown location, network, malformed payload
//! - **Pure parsing**: required/optional field contract with documented defaults
//! - **Mock source**: failure injection and latency for tests
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use sunshine_core::{ClientConfig, ForecastSource, OpenWeatherClient, parse_forecast};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = OpenWeatherClient::new(ClientConfig {
//!         api_key: std::env::var("SUNSHINE_API_KEY").ok(),
//!         ..Default::default()
//!     })?;
//!
//!     let payload = client.fetch("94043", 14, Duration::from_secs(30)).await?;
//!     let forecast = parse_forecast(&payload)?;
//!     for day in &forecast.days {
//!         println!("{} {} {:.1}/{:.1}", day.date, day.description, day.max_temp, day.min_temp);
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod mock;
pub mod parser;
pub mod traits;

// Re-export the shared value types
pub use sunshine_types as types;

pub use client::{ClientConfig, DEFAULT_BASE_URL, OpenWeatherClient, RawPayload};
pub use error::{Error, NetworkFailure, Result};
pub use mock::{MockFailure, MockForecastSource, sample_payload};
pub use parser::{ParsedForecast, parse_forecast};
pub use traits::{ForecastSource, MAX_FORECAST_DAYS, MIN_FORECAST_DAYS, clamp_days};
