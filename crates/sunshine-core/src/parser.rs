//! Forecast payload parsing.
//!
//! Turns the provider's JSON envelope into a [`CityInfo`] and a list of
//! [`DayRecord`]s. Parsing is pure: it never touches storage or the network.
//!
//! # Field Contract
//!
//! Required (a missing or non-numeric value fails the whole parse with
//! [`Error::MalformedPayload`]):
//!
//! - `list` (array)
//! - `list[].dt` (integer epoch seconds)
//! - `list[].temp.max`, `list[].temp.min` (numbers)
//!
//! Optional, with the value used when absent or of the wrong type:
//!
//! | Field | Default |
//! |-------|---------|
//! | `list[].weather[0].id` | `0` |
//! | `list[].weather[0].main` | `""` |
//! | `list[].humidity` | `None` |
//! | `list[].pressure` | `None` |
//! | `list[].speed` | `None` |
//! | `list[].deg` | `None` |
//! | `city.name` | `""` |
//! | `city.country` | `None` |
//! | `city.coord.lat` | `0.0` |
//! | `city.coord.lon` | `0.0` |
//!
//! `lat` and `lon` default independently. A defaulted coordinate is logged at
//! `warn` because it may hide an upstream API change.
//!
//! # Example
//!
//! ```
//! use sunshine_core::{RawPayload, parse_forecast};
//!
//! let payload = RawPayload::from(
//!     r#"{"city":{"coord":{"lat":40.7,"lon":-74.0}},
//!         "list":[{"dt":1700000000,"temp":{"max":20.1,"min":10.2},
//!                  "weather":[{"id":800,"main":"Clear"}]}]}"#,
//! );
//! let forecast = parse_forecast(&payload)?;
//! assert_eq!(forecast.days.len(), 1);
//! assert_eq!(forecast.days[0].description, "Clear");
//! # Ok::<(), sunshine_core::Error>(())
//! ```

use serde_json::{Map, Value};
use sunshine_types::{CityInfo, Coord, DayRecord, utc_day};
use tracing::{debug, warn};

use crate::client::RawPayload;
use crate::error::{Error, Result};

/// Decoded forecast: provider city block plus one record per day.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedForecast {
    /// City information.
    pub city: CityInfo,
    /// Daily records, in ascending date order with unique dates.
    pub days: Vec<DayRecord>,
}

/// Parse a raw payload.
pub fn parse_forecast(payload: &RawPayload) -> Result<ParsedForecast> {
    let root: Value = serde_json::from_str(payload.as_str())
        .map_err(|e| Error::malformed(format!("invalid JSON: {}", e)))?;
    let root = root
        .as_object()
        .ok_or_else(|| Error::malformed("top-level value is not an object"))?;

    let city = parse_city(root.get("city"));

    let list = root
        .get("list")
        .ok_or_else(|| Error::malformed("missing `list`"))?
        .as_array()
        .ok_or_else(|| Error::malformed("`list` is not an array"))?;

    let mut days = Vec::with_capacity(list.len());
    for (index, entry) in list.iter().enumerate() {
        days.push(parse_day(index, entry)?);
    }

    // Stable sort keeps payload order among equal dates, so dedup_by
    // (which keeps the first of a run) must see them reversed to keep the last.
    days.reverse();
    days.sort_by_key(|d| d.date);
    days.dedup_by_key(|d| d.date);

    debug!(
        "Parsed forecast for '{}' with {} day(s)",
        city.name,
        days.len()
    );

    Ok(ParsedForecast { city, days })
}

fn parse_city(value: Option<&Value>) -> CityInfo {
    let Some(city) = value.and_then(Value::as_object) else {
        warn!("Forecast payload has no `city` object; coordinate defaults to (0.0, 0.0)");
        return CityInfo::default();
    };

    let name = city
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let country = city
        .get("country")
        .and_then(Value::as_str)
        .map(str::to_string);

    let coord = city.get("coord").and_then(Value::as_object);
    let lat = coord.and_then(|c| c.get("lat")).and_then(Value::as_f64);
    let lon = coord.and_then(|c| c.get("lon")).and_then(Value::as_f64);
    if lat.is_none() || lon.is_none() {
        warn!(
            "Forecast city '{}' is missing lat={} lon={}; defaulting to 0.0",
            name,
            lat.is_none(),
            lon.is_none()
        );
    }

    CityInfo {
        name,
        coord: Coord::new(lat.unwrap_or(0.0), lon.unwrap_or(0.0)),
        country,
    }
}

fn parse_day(index: usize, entry: &Value) -> Result<DayRecord> {
    let entry = entry
        .as_object()
        .ok_or_else(|| Error::malformed(format!("list[{}] is not an object", index)))?;

    let dt = entry
        .get("dt")
        .ok_or_else(|| Error::malformed(format!("list[{}].dt is missing", index)))?
        .as_i64()
        .ok_or_else(|| Error::malformed(format!("list[{}].dt is not an integer", index)))?;
    let date = utc_day(dt).map_err(|e| Error::malformed(format!("list[{}].dt: {}", index, e)))?;

    let temp = entry
        .get("temp")
        .ok_or_else(|| Error::malformed(format!("list[{}].temp is missing", index)))?
        .as_object()
        .ok_or_else(|| Error::malformed(format!("list[{}].temp is not an object", index)))?;
    let max_temp = required_number(temp, "max", index)?;
    let min_temp = required_number(temp, "min", index)?;

    let condition = entry
        .get("weather")
        .and_then(Value::as_array)
        .and_then(|w| w.first())
        .and_then(Value::as_object);
    let condition_code = condition
        .and_then(|c| c.get("id"))
        .and_then(Value::as_i64)
        .and_then(|id| i32::try_from(id).ok())
        .unwrap_or(0);
    let description = condition
        .and_then(|c| c.get("main"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Ok(DayRecord {
        date,
        description,
        condition_code,
        max_temp,
        min_temp,
        humidity: optional_number(entry, "humidity"),
        pressure: optional_number(entry, "pressure"),
        wind_speed: optional_number(entry, "speed"),
        wind_degrees: optional_number(entry, "deg"),
    })
}

fn required_number(object: &Map<String, Value>, key: &str, index: usize) -> Result<f64> {
    object
        .get(key)
        .ok_or_else(|| Error::malformed(format!("list[{}].temp.{} is missing", index, key)))?
        .as_f64()
        .ok_or_else(|| Error::malformed(format!("list[{}].temp.{} is not a number", index, key)))
}

fn optional_number(object: &Map<String, Value>, key: &str) -> Option<f64> {
    object.get(key).and_then(Value::as_f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use time::macros::date;

    fn parse(json: &str) -> Result<ParsedForecast> {
        parse_forecast(&RawPayload::from(json))
    }

    #[test]
    fn test_parse_minimal_scenario() {
        let forecast = parse(
            r#"{"city":{"coord":{"lat":40.7,"lon":-74.0}},
                "list":[{"dt":1700000000,"temp":{"max":20.1,"min":10.2},
                         "weather":[{"id":800,"main":"Clear"}]}]}"#,
        )
        .unwrap();

        assert_eq!(forecast.city.coord, Coord::new(40.7, -74.0));
        assert_eq!(forecast.city.name, "");
        assert_eq!(forecast.days.len(), 1);

        let day = &forecast.days[0];
        assert_eq!(day.date, date!(2023 - 11 - 14));
        assert_eq!(day.description, "Clear");
        assert_eq!(day.condition_code, 800);
        assert_eq!(day.max_temp, 20.1);
        assert_eq!(day.min_temp, 10.2);
        assert_eq!(day.humidity, None);
        assert_eq!(day.pressure, None);
        assert_eq!(day.wind_speed, None);
        assert_eq!(day.wind_degrees, None);
    }

    #[test]
    fn test_parse_full_entry() {
        let forecast = parse(
            r#"{"city":{"id":5375480,"name":"Mountain View","coord":{"lon":-122.0838,"lat":37.3861},"country":"US"},
                "cod":"200",
                "list":[{"dt":1700049600,"temp":{"day":18.0,"min":9.5,"max":19.8,"night":10.0},
                         "pressure":1018.5,"humidity":62,"weather":[{"id":500,"main":"Rain","description":"light rain"}],
                         "speed":3.4,"deg":250,"clouds":40}]}"#,
        )
        .unwrap();

        assert_eq!(forecast.city.name, "Mountain View");
        assert_eq!(forecast.city.country.as_deref(), Some("US"));
        assert_eq!(forecast.city.coord.lat, 37.3861);

        let day = &forecast.days[0];
        assert_eq!(day.condition_code, 500);
        assert_eq!(day.description, "Rain");
        assert_eq!(day.humidity, Some(62.0));
        assert_eq!(day.pressure, Some(1018.5));
        assert_eq!(day.wind_speed, Some(3.4));
        assert_eq!(day.wind_degrees, Some(250.0));
    }

    #[test]
    fn test_missing_temp_is_malformed() {
        let err = parse(r#"{"list":[{"dt":1700000000,"weather":[{"id":800}]}]}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedPayload(_)));
        assert!(err.to_string().contains("temp"));
    }

    #[test]
    fn test_missing_min_is_malformed() {
        let err = parse(r#"{"list":[{"dt":1700000000,"temp":{"max":3.0}}]}"#).unwrap_err();
        assert!(err.to_string().contains("temp.min"));
    }

    #[test]
    fn test_non_numeric_temp_is_malformed() {
        let err = parse(r#"{"list":[{"dt":1700000000,"temp":{"max":"hot","min":1.0}}]}"#)
            .unwrap_err();
        assert!(err.to_string().contains("not a number"));
    }

    #[test]
    fn test_missing_or_bad_dt_is_malformed() {
        let err = parse(r#"{"list":[{"temp":{"max":1.0,"min":0.0}}]}"#).unwrap_err();
        assert!(err.to_string().contains("dt is missing"));

        let err = parse(r#"{"list":[{"dt":"yesterday","temp":{"max":1.0,"min":0.0}}]}"#)
            .unwrap_err();
        assert!(err.to_string().contains("not an integer"));
    }

    #[test]
    fn test_missing_list_is_malformed() {
        assert!(matches!(
            parse(r#"{"city":{}}"#),
            Err(Error::MalformedPayload(_))
        ));
        assert!(matches!(parse("<html>"), Err(Error::MalformedPayload(_))));
        assert!(matches!(parse("[]"), Err(Error::MalformedPayload(_))));
    }

    #[test]
    fn test_empty_list_is_valid() {
        let forecast = parse(r#"{"list":[]}"#).unwrap();
        assert!(forecast.days.is_empty());
        assert_eq!(forecast.city, CityInfo::default());
    }

    #[test]
    fn test_coordinates_default_independently() {
        let forecast = parse(r#"{"city":{"coord":{"lat":51.5}},"list":[]}"#).unwrap();
        assert_eq!(forecast.city.coord, Coord::new(51.5, 0.0));

        let forecast = parse(r#"{"city":{"coord":{"lon":-0.12}},"list":[]}"#).unwrap();
        assert_eq!(forecast.city.coord, Coord::new(0.0, -0.12));

        let forecast = parse(r#"{"city":{"name":"Nowhere"},"list":[]}"#).unwrap();
        assert_eq!(forecast.city.coord, Coord::new(0.0, 0.0));
    }

    #[test]
    fn test_optional_fields_with_wrong_type_are_absent() {
        let forecast = parse(
            r#"{"list":[{"dt":1700000000,"temp":{"max":1.0,"min":0.0},
                         "humidity":"damp","weather":[{"id":"x","main":7}]}]}"#,
        )
        .unwrap();
        let day = &forecast.days[0];
        assert_eq!(day.humidity, None);
        assert_eq!(day.condition_code, 0);
        assert_eq!(day.description, "");
    }

    #[test]
    fn test_missing_weather_defaults() {
        let forecast = parse(r#"{"list":[{"dt":1700000000,"temp":{"max":1,"min":-1}}]}"#).unwrap();
        let day = &forecast.days[0];
        assert_eq!(day.condition_code, 0);
        assert_eq!(day.description, "");
        assert_eq!(day.max_temp, 1.0);
        assert_eq!(day.min_temp, -1.0);
    }

    #[test]
    fn test_days_sorted_and_deduplicated_last_wins() {
        let forecast = parse(
            r#"{"list":[
                {"dt":1700092800,"temp":{"max":5.0,"min":1.0}},
                {"dt":1700000000,"temp":{"max":2.0,"min":0.0}},
                {"dt":1700005000,"temp":{"max":9.0,"min":4.0}}
            ]}"#,
        )
        .unwrap();

        assert_eq!(forecast.days.len(), 2);
        assert_eq!(forecast.days[0].date, date!(2023 - 11 - 14));
        assert_eq!(forecast.days[0].max_temp, 9.0);
        assert_eq!(forecast.days[1].date, date!(2023 - 11 - 16));
    }

    proptest! {
        #[test]
        fn prop_required_fields_always_parse(
            dt in 0i64..4_102_444_800,
            max_tenths in -800i32..600,
            min_tenths in -800i32..600,
        ) {
            let max = f64::from(max_tenths) / 10.0;
            let min = f64::from(min_tenths) / 10.0;
            let json = format!(
                r#"{{"list":[{{"dt":{},"temp":{{"max":{},"min":{}}}}}]}}"#,
                dt, max, min
            );
            let forecast = parse(&json).unwrap();
            prop_assert_eq!(forecast.days.len(), 1);
            prop_assert_eq!(forecast.days[0].date, utc_day(dt).unwrap());
            prop_assert!((forecast.days[0].max_temp - max).abs() < 1e-9);
            prop_assert!((forecast.days[0].min_temp - min).abs() < 1e-9);
        }

        #[test]
        fn prop_parser_never_panics(input in ".{0,200}") {
            let _ = parse(&input);
        }
    }
}
