//! Data models for stored data.

use serde::{Deserialize, Serialize};
use sunshine_types::{Coord, DayRecord, LocationId, Units};
use time::{Date, OffsetDateTime};

/// A location stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredLocation {
    /// Database row ID.
    pub id: LocationId,
    /// Location setting string the user configured (unique).
    pub location_setting: String,
    /// City name reported by the provider.
    pub city_name: String,
    /// Coordinate reported by the provider.
    pub coord: Coord,
    /// Unit system the weather rows were fetched in.
    pub units: Units,
    /// When this location was first stored.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// When the metadata last changed.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// A daily weather row stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredWeatherDay {
    /// Database row ID.
    pub id: i64,
    /// Owning location.
    pub location_id: LocationId,
    /// UTC calendar day.
    pub date: Date,
    /// Short description, e.g. "Clear".
    pub description: String,
    /// Provider condition code (0 when unknown).
    pub condition_code: i32,
    /// Maximum temperature in the location's unit system.
    pub max_temp: f64,
    /// Minimum temperature in the location's unit system.
    pub min_temp: f64,
    /// Relative humidity in percent.
    pub humidity: Option<f64>,
    /// Pressure in hPa.
    pub pressure: Option<f64>,
    /// Wind speed.
    pub wind_speed: Option<f64>,
    /// Wind direction in degrees.
    pub wind_degrees: Option<f64>,
}

impl StoredWeatherDay {
    /// Convert back to a [`DayRecord`].
    pub fn to_record(&self) -> DayRecord {
        DayRecord {
            date: self.date,
            description: self.description.clone(),
            condition_code: self.condition_code,
            max_temp: self.max_temp,
            min_temp: self.min_temp,
            humidity: self.humidity,
            pressure: self.pressure,
            wind_speed: self.wind_speed,
            wind_degrees: self.wind_degrees,
        }
    }
}

/// A weather row joined with its location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    /// Location setting string.
    pub location_setting: String,
    /// City name reported by the provider.
    pub city_name: String,
    /// Location coordinate.
    pub coord: Coord,
    /// Unit system of the temperatures.
    pub units: Units,
    /// The weather row.
    #[serde(flatten)]
    pub day: StoredWeatherDay,
}

/// Sync bookkeeping for one location setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    /// Location setting string.
    pub location: String,
    /// Last successful sync.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_success_at: Option<OffsetDateTime>,
    /// Last attempt, successful or not.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_attempt_at: Option<OffsetDateTime>,
    /// Kind of the last error, cleared on success.
    pub last_error_kind: Option<String>,
    /// Message of the last error, cleared on success.
    pub last_error: Option<String>,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// Multiplier applied to the sync interval.
    pub backoff_multiplier: u32,
}

impl SyncState {
    /// Empty state for a location that has never been synced.
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            last_success_at: None,
            last_attempt_at: None,
            last_error_kind: None,
            last_error: None,
            consecutive_failures: 0,
            backoff_multiplier: 1,
        }
    }
}
