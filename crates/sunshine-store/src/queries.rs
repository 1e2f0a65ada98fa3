//! Query builder for weather rows.
//!
//! [`WeatherQuery`] follows the builder pattern; every filter is optional.
//! Dates are inclusive on both ends.
//!
//! # Example
//!
//! ```
//! use sunshine_store::{Store, WeatherQuery};
//! use time::macros::date;
//!
//! let store = Store::open_in_memory()?;
//!
//! // One week for a location, oldest first
//! let query = WeatherQuery::new()
//!     .location(1)
//!     .since(date!(2024 - 01 - 15))
//!     .until(date!(2024 - 01 - 21));
//!
//! let days = store.query_weather(&query)?;
//! assert!(days.is_empty());
//! # Ok::<(), sunshine_store::Error>(())
//! ```

use sunshine_types::{LocationId, day_start_timestamp};
use time::Date;

/// Fluent query builder for weather rows.
///
/// By default, queries return results ordered by date ascending.
#[derive(Debug, Default, Clone)]
pub struct WeatherQuery {
    /// Filter by location ID.
    pub location_id: Option<LocationId>,
    /// Filter to rows on or after this date.
    pub since: Option<Date>,
    /// Filter to rows on or before this date.
    pub until: Option<Date>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Order by date descending.
    pub newest_first: bool,
}

impl WeatherQuery {
    /// Create a new query: all locations, all dates, oldest first.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by location ID.
    pub fn location(mut self, location_id: LocationId) -> Self {
        self.location_id = Some(location_id);
        self
    }

    /// Filter to rows dated on or after `date`.
    pub fn since(mut self, date: Date) -> Self {
        self.since = Some(date);
        self
    }

    /// Filter to rows dated on or before `date`.
    pub fn until(mut self, date: Date) -> Self {
        self.until = Some(date);
        self
    }

    /// Limit the maximum number of results returned.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Order results by newest date first.
    pub fn newest_first(mut self) -> Self {
        self.newest_first = true;
        self
    }

    /// Build the SQL WHERE clause and parameters.
    pub(crate) fn build_where(&self) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(location_id) = self.location_id {
            conditions.push("location_id = ?");
            params.push(Box::new(location_id));
        }

        if let Some(since) = self.since {
            conditions.push("date >= ?");
            params.push(Box::new(day_start_timestamp(since)));
        }

        if let Some(until) = self.until {
            conditions.push("date <= ?");
            params.push(Box::new(day_start_timestamp(until)));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    /// Build the full SQL query.
    pub(crate) fn build_sql(&self) -> String {
        let (where_clause, _) = self.build_where();
        let order = if self.newest_first { "DESC" } else { "ASC" };

        let mut sql = format!(
            "SELECT {} FROM weather {} ORDER BY date {}",
            crate::store::WEATHER_COLUMNS,
            where_clause,
            order
        );

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        sql
    }
}
