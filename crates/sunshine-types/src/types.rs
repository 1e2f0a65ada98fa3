//! Core types for forecast data.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::error::{ParseError, ParseResult};

/// Stable identifier of a stored location row.
pub type LocationId = i64;

/// Unit system that temperatures and wind speeds are reported in.
///
/// The provider converts values server-side, so the unit system is part of
/// the location's identity for display purposes and is stored alongside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Units {
    /// Celsius, meters per second.
    #[default]
    Metric,
    /// Fahrenheit, miles per hour.
    Imperial,
    /// Kelvin, meters per second.
    Standard,
}

impl Units {
    /// The name used on the wire and in the database.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Metric => "metric",
            Units::Imperial => "imperial",
            Units::Standard => "standard",
        }
    }

    /// Short temperature suffix for display.
    #[must_use]
    pub fn temperature_suffix(&self) -> &'static str {
        match self {
            Units::Metric => "°C",
            Units::Imperial => "°F",
            Units::Standard => "K",
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Units {
    type Err = ParseError;

    /// Parse a unit system name (case-insensitive).
    ///
    /// # Examples
    ///
    /// ```
    /// use sunshine_types::Units;
    ///
    /// assert_eq!("metric".parse::<Units>(), Ok(Units::Metric));
    /// assert_eq!("Imperial".parse::<Units>(), Ok(Units::Imperial));
    /// assert!("furlongs".parse::<Units>().is_err());
    /// ```
    fn from_str(s: &str) -> ParseResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "metric" => Ok(Units::Metric),
            "imperial" => Ok(Units::Imperial),
            "standard" => Ok(Units::Standard),
            other => Err(ParseError::UnknownUnits(other.to_string())),
        }
    }
}

/// Geographic coordinate of a location.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Coord {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

impl Coord {
    /// Create a coordinate from latitude and longitude.
    #[must_use]
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// City block reported by the forecast provider.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CityInfo {
    /// City name as reported by the provider (may be empty).
    pub name: String,
    /// City coordinate. Missing components are 0.0.
    pub coord: Coord,
    /// ISO country code, if reported.
    pub country: Option<String>,
}

/// One normalized day of forecast data.
///
/// Temperatures are in the unit system the forecast was requested with.
/// Optional fields are `None` when the provider did not report them.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DayRecord {
    /// Calendar day (UTC).
    pub date: Date,
    /// Short description, e.g. "Clear".
    pub description: String,
    /// Provider condition code, 0 when unknown.
    pub condition_code: i32,
    /// Maximum temperature.
    pub max_temp: f64,
    /// Minimum temperature.
    pub min_temp: f64,
    /// Relative humidity in percent.
    pub humidity: Option<f64>,
    /// Atmospheric pressure in hPa.
    pub pressure: Option<f64>,
    /// Wind speed.
    pub wind_speed: Option<f64>,
    /// Wind direction in meteorological degrees.
    pub wind_degrees: Option<f64>,
}

impl DayRecord {
    /// Create a record with only the required fields set.
    #[must_use]
    pub fn new(
        date: Date,
        description: impl Into<String>,
        condition_code: i32,
        max_temp: f64,
        min_temp: f64,
    ) -> Self {
        Self {
            date,
            description: description.into(),
            condition_code,
            max_temp,
            min_temp,
            humidity: None,
            pressure: None,
            wind_speed: None,
            wind_degrees: None,
        }
    }
}

/// Convert epoch seconds to the UTC calendar day containing that instant.
///
/// # Examples
///
/// ```
/// use sunshine_types::utc_day;
/// use time::macros::date;
///
/// assert_eq!(utc_day(1_700_000_000), Ok(date!(2023 - 11 - 14)));
/// assert_eq!(utc_day(0), Ok(date!(1970 - 01 - 01)));
/// ```
pub fn utc_day(epoch_secs: i64) -> ParseResult<Date> {
    OffsetDateTime::from_unix_timestamp(epoch_secs)
        .map(|t| t.date())
        .map_err(|_| ParseError::TimestampOutOfRange(epoch_secs))
}

/// Unix timestamp of UTC midnight at the start of `date`.
#[must_use]
pub fn day_start_timestamp(date: Date) -> i64 {
    date.midnight().assume_utc().unix_timestamp()
}

/// The current UTC calendar day.
#[must_use]
pub fn today_utc() -> Date {
    OffsetDateTime::now_utc().date()
}
