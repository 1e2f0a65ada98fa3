//! Platform-agnostic types for the Sunshine forecast pipeline.
//!
//! This crate provides the value types shared by the API client
//! (sunshine-core), the local store (sunshine-store), and the sync
//! service (sunshine-service).
//!
//! # Features
//!
//! - Normalized forecast rows ([`DayRecord`]) and provider city info
//! - Unit system handling
//! - UTC day conversion helpers
//!
//! # Example
//!
//! ```
//! use sunshine_types::{DayRecord, Units, utc_day};
//!
//! let date = utc_day(1_700_000_000).unwrap();
//! let day = DayRecord::new(date, "Clear", 800, 20.1, 10.2);
//! assert_eq!(Units::default(), Units::Metric);
//! assert_eq!(day.condition_code, 800);
//! ```

pub mod error;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use types::{
    CityInfo, Coord, DayRecord, LocationId, Units, day_start_timestamp, today_utc, utc_day,
};
