//! Local data persistence for Sunshine forecast data.
//!
//! This crate provides SQLite-based storage for locations, daily forecast
//! rows, and sync bookkeeping.
//!
//! # Features
//!
//! - One location row per location setting string, with stable IDs
//! - One weather row per (location, date), last write wins
//! - Range, single-day, and "from today" queries plus a location join
//! - Per-location sync state that survives restarts
//!
//! # Example
//!
//! ```no_run
//! use sunshine_store::{Store, WeatherQuery};
//! use sunshine_types::today_utc;
//!
//! let store = Store::open_default()?;
//!
//! if let Some(location) = store.find_location("94043")? {
//!     let days = store.query_from(location.id, today_utc())?;
//!     println!("{} upcoming day(s)", days.len());
//! }
//! # Ok::<(), sunshine_store::Error>(())
//! ```

mod error;
mod models;
mod queries;
mod schema;
mod store;

pub use error::{Error, Result};
pub use models::{ForecastRow, StoredLocation, StoredWeatherDay, SyncState};
pub use queries::WeatherQuery;
pub use store::Store;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/sunshine/data.db`
/// - macOS: `~/Library/Application Support/sunshine/data.db`
/// - Windows: `C:\Users\<user>\AppData\Local\sunshine\data.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("sunshine")
        .join("data.db")
}
