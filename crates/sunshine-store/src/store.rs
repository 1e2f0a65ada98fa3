//! Main store implementation.

use std::path::Path;

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use sunshine_types::{Coord, DayRecord, LocationId, Units, day_start_timestamp, utc_day};
use time::{Date, OffsetDateTime};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::{ForecastRow, StoredLocation, StoredWeatherDay, SyncState};
use crate::queries::WeatherQuery;
use crate::schema;

/// Column list shared by every weather SELECT, in [`weather_from_row`] order.
pub(crate) const WEATHER_COLUMNS: &str = "id, location_id, date, description, condition_code, \
     max_temp, min_temp, humidity, pressure, wind_speed, wind_degrees";

const LOCATION_COLUMNS: &str =
    "id, location_setting, city_name, coord_lat, coord_lon, units, created_at, updated_at";

/// SQLite-based store for locations, forecast rows, and sync state.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }
}

// Location operations
impl Store {
    /// Resolve a location setting to its ID, inserting it on first use.
    ///
    /// An existing row keeps its ID; its city name, coordinate, and units are
    /// rewritten only when they differ from the stored values.
    pub fn resolve_location(
        &self,
        location_setting: &str,
        coord: Coord,
        units: Units,
        city_name: &str,
    ) -> Result<LocationId> {
        let now = OffsetDateTime::now_utc().unix_timestamp();

        // RETURNING yields nothing when the conflict update is skipped.
        let changed: Option<LocationId> = self
            .conn
            .query_row(
                "INSERT INTO locations
                    (location_setting, city_name, coord_lat, coord_lon, units, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT(location_setting) DO UPDATE SET
                    city_name = excluded.city_name,
                    coord_lat = excluded.coord_lat,
                    coord_lon = excluded.coord_lon,
                    units = excluded.units,
                    updated_at = excluded.updated_at
                 WHERE city_name IS NOT excluded.city_name
                    OR coord_lat IS NOT excluded.coord_lat
                    OR coord_lon IS NOT excluded.coord_lon
                    OR units IS NOT excluded.units
                 RETURNING id",
                rusqlite::params![
                    location_setting,
                    city_name,
                    coord.lat,
                    coord.lon,
                    units.as_str(),
                    now
                ],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(id) = changed {
            debug!("Location '{}' stored as id {}", location_setting, id);
            return Ok(id);
        }

        let id = self.conn.query_row(
            "SELECT id FROM locations WHERE location_setting = ?",
            [location_setting],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Get a location by ID.
    pub fn get_location(&self, id: LocationId) -> Result<Option<StoredLocation>> {
        let sql = format!("SELECT {} FROM locations WHERE id = ?", LOCATION_COLUMNS);
        let location = self
            .conn
            .query_row(&sql, [id], location_from_row)
            .optional()?;
        Ok(location)
    }

    /// Get a location by its setting string.
    pub fn find_location(&self, location_setting: &str) -> Result<Option<StoredLocation>> {
        let sql = format!(
            "SELECT {} FROM locations WHERE location_setting = ?",
            LOCATION_COLUMNS
        );
        let location = self
            .conn
            .query_row(&sql, [location_setting], location_from_row)
            .optional()?;
        Ok(location)
    }

    /// List all locations, most recently updated first.
    pub fn list_locations(&self) -> Result<Vec<StoredLocation>> {
        let sql = format!(
            "SELECT {} FROM locations ORDER BY updated_at DESC, id DESC",
            LOCATION_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let locations = stmt
            .query_map([], location_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(locations)
    }
}

// Weather operations
impl Store {
    /// Insert or overwrite the row for (`location_id`, `record.date`).
    pub fn upsert_day(&self, location_id: LocationId, record: &DayRecord) -> Result<()> {
        validate_record(record)?;

        self.conn.execute(
            "INSERT INTO weather (location_id, date, description, condition_code,
                max_temp, min_temp, humidity, pressure, wind_speed, wind_degrees)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(location_id, date) DO UPDATE SET
                description = excluded.description,
                condition_code = excluded.condition_code,
                max_temp = excluded.max_temp,
                min_temp = excluded.min_temp,
                humidity = excluded.humidity,
                pressure = excluded.pressure,
                wind_speed = excluded.wind_speed,
                wind_degrees = excluded.wind_degrees",
            rusqlite::params![
                location_id,
                day_start_timestamp(record.date),
                &record.description,
                record.condition_code,
                record.max_temp,
                record.min_temp,
                record.humidity,
                record.pressure,
                record.wind_speed,
                record.wind_degrees,
            ],
        )?;

        Ok(())
    }

    /// Upsert a batch of records, one statement per row.
    ///
    /// Rows are committed independently. On failure the error is
    /// [`Error::PartialUpsert`] and the rows before the failing one stay.
    pub fn upsert_weather(&self, location_id: LocationId, records: &[DayRecord]) -> Result<usize> {
        for (written, record) in records.iter().enumerate() {
            if let Err(e) = self.upsert_day(location_id, record) {
                return Err(Error::PartialUpsert {
                    written,
                    source: Box::new(e),
                });
            }
        }

        info!(
            "Upserted {} weather row(s) for location {}",
            records.len(),
            location_id
        );
        Ok(records.len())
    }

    /// Query weather rows with filters.
    pub fn query_weather(&self, query: &WeatherQuery) -> Result<Vec<StoredWeatherDay>> {
        let sql = query.build_sql();
        let (_, params) = query.build_where();

        debug!("Executing query: {}", sql);

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let days = stmt
            .query_map(params_ref.as_slice(), weather_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(days)
    }

    /// Rows for a location in `from..=to`, ascending by date.
    pub fn query_range(
        &self,
        location_id: LocationId,
        from: Date,
        to: Date,
    ) -> Result<Vec<StoredWeatherDay>> {
        self.query_weather(&WeatherQuery::new().location(location_id).since(from).until(to))
    }

    /// Rows for a location dated `today` or later, ascending by date.
    pub fn query_from(&self, location_id: LocationId, today: Date) -> Result<Vec<StoredWeatherDay>> {
        self.query_weather(&WeatherQuery::new().location(location_id).since(today))
    }

    /// The row for a single day, if stored.
    pub fn query_single(
        &self,
        location_id: LocationId,
        date: Date,
    ) -> Result<Option<StoredWeatherDay>> {
        let query = WeatherQuery::new()
            .location(location_id)
            .since(date)
            .until(date)
            .limit(1);
        Ok(self.query_weather(&query)?.pop())
    }

    /// Delete rows for a location dated strictly before `date`.
    pub fn prune_before(&self, location_id: LocationId, date: Date) -> Result<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM weather WHERE location_id = ?1 AND date < ?2",
            rusqlite::params![location_id, day_start_timestamp(date)],
        )?;
        if deleted > 0 {
            debug!(
                "Pruned {} row(s) before {} for location {}",
                deleted, date, location_id
            );
        }
        Ok(deleted)
    }

    /// Count weather rows, optionally for one location.
    pub fn count_weather(&self, location_id: Option<LocationId>) -> Result<u64> {
        let count: i64 = match location_id {
            Some(id) => self.conn.query_row(
                "SELECT COUNT(*) FROM weather WHERE location_id = ?",
                [id],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM weather", [], |row| row.get(0))?,
        };

        Ok(count as u64)
    }

    /// Weather joined with its location for a setting string, from `today` on.
    pub fn forecast_for_setting(
        &self,
        location_setting: &str,
        today: Date,
    ) -> Result<Vec<ForecastRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT w.id, w.location_id, w.date, w.description, w.condition_code,
                    w.max_temp, w.min_temp, w.humidity, w.pressure, w.wind_speed, w.wind_degrees,
                    l.location_setting, l.city_name, l.coord_lat, l.coord_lon, l.units
             FROM weather w
             INNER JOIN locations l ON w.location_id = l.id
             WHERE l.location_setting = ?1 AND w.date >= ?2
             ORDER BY w.date ASC",
        )?;

        let rows = stmt
            .query_map(
                rusqlite::params![location_setting, day_start_timestamp(today)],
                |row| {
                    Ok(ForecastRow {
                        day: weather_from_row(row)?,
                        location_setting: row.get(11)?,
                        city_name: row.get(12)?,
                        coord: Coord::new(row.get(13)?, row.get(14)?),
                        units: units_from_row(row, 15)?,
                    })
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }
}

// Sync state operations
impl Store {
    /// Get sync state for a location setting.
    pub fn get_sync_state(&self, location: &str) -> Result<Option<SyncState>> {
        let state = self
            .conn
            .query_row(
                "SELECT location_setting, last_success_at, last_attempt_at, last_error_kind,
                        last_error, consecutive_failures, backoff_multiplier
                 FROM sync_state WHERE location_setting = ?",
                [location],
                sync_state_from_row,
            )
            .optional()?;
        Ok(state)
    }

    /// List sync state for every location that has been attempted.
    pub fn list_sync_states(&self) -> Result<Vec<SyncState>> {
        let mut stmt = self.conn.prepare(
            "SELECT location_setting, last_success_at, last_attempt_at, last_error_kind,
                    last_error, consecutive_failures, backoff_multiplier
             FROM sync_state ORDER BY location_setting",
        )?;
        let states = stmt
            .query_map([], sync_state_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(states)
    }

    /// Insert or replace the sync state for `state.location`.
    pub fn save_sync_state(&self, state: &SyncState) -> Result<()> {
        self.conn.execute(
            "INSERT INTO sync_state (location_setting, last_success_at, last_attempt_at,
                last_error_kind, last_error, consecutive_failures, backoff_multiplier)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(location_setting) DO UPDATE SET
                last_success_at = excluded.last_success_at,
                last_attempt_at = excluded.last_attempt_at,
                last_error_kind = excluded.last_error_kind,
                last_error = excluded.last_error,
                consecutive_failures = excluded.consecutive_failures,
                backoff_multiplier = excluded.backoff_multiplier",
            rusqlite::params![
                &state.location,
                state.last_success_at.map(|t| t.unix_timestamp()),
                state.last_attempt_at.map(|t| t.unix_timestamp()),
                &state.last_error_kind,
                &state.last_error,
                state.consecutive_failures,
                state.backoff_multiplier,
            ],
        )?;
        Ok(())
    }
}

fn validate_record(record: &DayRecord) -> Result<()> {
    let invalid = |reason: &str| Error::InvalidRecord {
        date: record.date,
        reason: reason.to_string(),
    };

    if !record.max_temp.is_finite() || !record.min_temp.is_finite() {
        return Err(invalid("temperature is not a finite number"));
    }
    let optionals = [
        record.humidity,
        record.pressure,
        record.wind_speed,
        record.wind_degrees,
    ];
    if optionals.iter().flatten().any(|v| !v.is_finite()) {
        return Err(invalid("optional measurement is not a finite number"));
    }
    Ok(())
}

fn conversion_error(
    idx: usize,
    ty: Type,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(err))
}

fn date_from_row(row: &Row<'_>, idx: usize) -> rusqlite::Result<Date> {
    let ts: i64 = row.get(idx)?;
    utc_day(ts).map_err(|e| conversion_error(idx, Type::Integer, e))
}

fn timestamp_from_row(row: &Row<'_>, idx: usize) -> rusqlite::Result<OffsetDateTime> {
    let ts: i64 = row.get(idx)?;
    OffsetDateTime::from_unix_timestamp(ts).map_err(|e| conversion_error(idx, Type::Integer, e))
}

fn optional_timestamp_from_row(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<OffsetDateTime>> {
    match row.get::<_, Option<i64>>(idx)? {
        Some(_) => timestamp_from_row(row, idx).map(Some),
        None => Ok(None),
    }
}

fn units_from_row(row: &Row<'_>, idx: usize) -> rusqlite::Result<Units> {
    let units: String = row.get(idx)?;
    units
        .parse()
        .map_err(|e| conversion_error(idx, Type::Text, e))
}

fn location_from_row(row: &Row<'_>) -> rusqlite::Result<StoredLocation> {
    Ok(StoredLocation {
        id: row.get(0)?,
        location_setting: row.get(1)?,
        city_name: row.get(2)?,
        coord: Coord::new(row.get(3)?, row.get(4)?),
        units: units_from_row(row, 5)?,
        created_at: timestamp_from_row(row, 6)?,
        updated_at: timestamp_from_row(row, 7)?,
    })
}

fn weather_from_row(row: &Row<'_>) -> rusqlite::Result<StoredWeatherDay> {
    Ok(StoredWeatherDay {
        id: row.get(0)?,
        location_id: row.get(1)?,
        date: date_from_row(row, 2)?,
        description: row.get(3)?,
        condition_code: row.get(4)?,
        max_temp: row.get(5)?,
        min_temp: row.get(6)?,
        humidity: row.get(7)?,
        pressure: row.get(8)?,
        wind_speed: row.get(9)?,
        wind_degrees: row.get(10)?,
    })
}

fn sync_state_from_row(row: &Row<'_>) -> rusqlite::Result<SyncState> {
    Ok(SyncState {
        location: row.get(0)?,
        last_success_at: optional_timestamp_from_row(row, 1)?,
        last_attempt_at: optional_timestamp_from_row(row, 2)?,
        last_error_kind: row.get(3)?,
        last_error: row.get(4)?,
        consecutive_failures: row.get(5)?,
        backoff_multiplier: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn day(date: Date, max: f64) -> DayRecord {
        let mut record = DayRecord::new(date, "Clear", 800, max, max - 10.0);
        record.humidity = Some(55.0);
        record
    }

    fn week(start: Date) -> Vec<DayRecord> {
        (0..7)
            .map(|i| day(start + time::Duration::days(i), 20.0 + i as f64))
            .collect()
    }

    fn new_york(store: &Store) -> LocationId {
        store
            .resolve_location("New York", Coord::new(40.7, -74.0), Units::Metric, "New York")
            .unwrap()
    }

    #[test]
    fn test_open_in_memory() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.list_locations().unwrap().is_empty());
        assert_eq!(store.count_weather(None).unwrap(), 0);
    }

    #[test]
    fn test_resolve_location_reuses_id_and_updates_metadata() {
        let store = Store::open_in_memory().unwrap();

        let first = new_york(&store);
        assert_eq!(new_york(&store), first);

        let moved = store
            .resolve_location("New York", Coord::new(40.8, -73.9), Units::Imperial, "NYC")
            .unwrap();
        assert_eq!(moved, first);

        let location = store.get_location(first).unwrap().unwrap();
        assert_eq!(location.location_setting, "New York");
        assert_eq!(location.city_name, "NYC");
        assert_eq!(location.coord, Coord::new(40.8, -73.9));
        assert_eq!(location.units, Units::Imperial);
        assert_eq!(store.list_locations().unwrap().len(), 1);
    }

    #[test]
    fn test_resolve_distinct_locations() {
        let store = Store::open_in_memory().unwrap();
        let a = new_york(&store);
        let b = store
            .resolve_location("London", Coord::new(51.5, -0.1), Units::Metric, "London")
            .unwrap();
        assert_ne!(a, b);
        assert_eq!(
            store.find_location("London").unwrap().map(|l| l.id),
            Some(b)
        );
        assert!(store.find_location("Paris").unwrap().is_none());
    }

    #[test]
    fn test_upsert_and_query_range_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let id = new_york(&store);

        let records = week(date!(2024 - 01 - 15));
        // Insert out of order; queries still come back ascending.
        let mut shuffled = records.clone();
        shuffled.reverse();
        assert_eq!(store.upsert_weather(id, &shuffled).unwrap(), 7);

        let stored = store
            .query_range(id, date!(2024 - 01 - 15), date!(2024 - 01 - 21))
            .unwrap();
        let round_trip: Vec<DayRecord> = stored.iter().map(StoredWeatherDay::to_record).collect();
        assert_eq!(round_trip, records);

        let inner = store
            .query_range(id, date!(2024 - 01 - 17), date!(2024 - 01 - 18))
            .unwrap();
        assert_eq!(inner.len(), 2);
        assert_eq!(inner[0].date, date!(2024 - 01 - 17));
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        let id = new_york(&store);
        let records = week(date!(2024 - 01 - 15));

        store.upsert_weather(id, &records).unwrap();
        let before = store.query_weather(&WeatherQuery::new()).unwrap();
        store.upsert_weather(id, &records).unwrap();
        let after = store.query_weather(&WeatherQuery::new()).unwrap();

        assert_eq!(before, after);
        assert_eq!(store.count_weather(Some(id)).unwrap(), 7);
    }

    #[test]
    fn test_upsert_overwrites_same_day() {
        let store = Store::open_in_memory().unwrap();
        let id = new_york(&store);

        store.upsert_day(id, &day(date!(2024 - 01 - 15), 20.0)).unwrap();
        let mut newer = day(date!(2024 - 01 - 15), 25.0);
        newer.description = "Rain".to_string();
        newer.humidity = None;
        store.upsert_day(id, &newer).unwrap();

        let stored = store.query_single(id, date!(2024 - 01 - 15)).unwrap().unwrap();
        assert_eq!(stored.max_temp, 25.0);
        assert_eq!(stored.description, "Rain");
        assert_eq!(stored.humidity, None);
        assert_eq!(store.count_weather(None).unwrap(), 1);
    }

    #[test]
    fn test_partial_upsert_keeps_written_rows() {
        let store = Store::open_in_memory().unwrap();
        let id = new_york(&store);

        let mut records = week(date!(2024 - 01 - 15));
        records[3].max_temp = f64::NAN;

        let err = store.upsert_weather(id, &records).unwrap_err();
        assert_eq!(err.rows_written(), 3);
        assert!(matches!(
            err,
            Error::PartialUpsert { written: 3, ref source } if matches!(**source, Error::InvalidRecord { .. })
        ));

        let stored = store
            .query_range(id, date!(2024 - 01 - 01), date!(2024 - 12 - 31))
            .unwrap();
        let dates: Vec<Date> = stored.iter().map(|d| d.date).collect();
        assert_eq!(
            dates,
            vec![date!(2024 - 01 - 15), date!(2024 - 01 - 16), date!(2024 - 01 - 17)]
        );
    }

    #[test]
    fn test_upsert_unknown_location_fails() {
        let store = Store::open_in_memory().unwrap();
        let err = store
            .upsert_weather(42, &[day(date!(2024 - 01 - 15), 20.0)])
            .unwrap_err();
        assert!(matches!(err, Error::PartialUpsert { written: 0, .. }));
        assert_eq!(store.count_weather(None).unwrap(), 0);
    }

    #[test]
    fn test_query_from_and_single() {
        let store = Store::open_in_memory().unwrap();
        let id = new_york(&store);
        store.upsert_weather(id, &week(date!(2024 - 01 - 15))).unwrap();

        let upcoming = store.query_from(id, date!(2024 - 01 - 19)).unwrap();
        assert_eq!(upcoming.len(), 3);
        assert_eq!(upcoming[0].date, date!(2024 - 01 - 19));

        assert!(store.query_single(id, date!(2024 - 01 - 14)).unwrap().is_none());
        let single = store.query_single(id, date!(2024 - 01 - 16)).unwrap().unwrap();
        assert_eq!(single.max_temp, 21.0);
    }

    #[test]
    fn test_queries_are_location_scoped() {
        let store = Store::open_in_memory().unwrap();
        let ny = new_york(&store);
        let london = store
            .resolve_location("London", Coord::new(51.5, -0.1), Units::Metric, "London")
            .unwrap();

        store.upsert_weather(ny, &week(date!(2024 - 01 - 15))).unwrap();
        store
            .upsert_weather(london, &[day(date!(2024 - 01 - 15), 8.0)])
            .unwrap();

        assert_eq!(store.query_from(ny, date!(2024 - 01 - 01)).unwrap().len(), 7);
        let london_days = store.query_from(london, date!(2024 - 01 - 01)).unwrap();
        assert_eq!(london_days.len(), 1);
        assert_eq!(london_days[0].max_temp, 8.0);
    }

    #[test]
    fn test_prune_before() {
        let store = Store::open_in_memory().unwrap();
        let id = new_york(&store);
        store.upsert_weather(id, &week(date!(2024 - 01 - 15))).unwrap();

        assert_eq!(store.prune_before(id, date!(2024 - 01 - 18)).unwrap(), 3);
        assert_eq!(store.count_weather(Some(id)).unwrap(), 4);
        assert_eq!(store.prune_before(id, date!(2024 - 01 - 18)).unwrap(), 0);
    }

    #[test]
    fn test_forecast_for_setting_joins_location() {
        let store = Store::open_in_memory().unwrap();
        let id = new_york(&store);
        store.upsert_weather(id, &week(date!(2024 - 01 - 15))).unwrap();

        let rows = store
            .forecast_for_setting("New York", date!(2024 - 01 - 20))
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].location_setting, "New York");
        assert_eq!(rows[0].coord, Coord::new(40.7, -74.0));
        assert_eq!(rows[0].units, Units::Metric);
        assert_eq!(rows[0].day.date, date!(2024 - 01 - 20));
        assert_eq!(rows[1].day.location_id, id);

        assert!(
            store
                .forecast_for_setting("Nowhere", date!(2024 - 01 - 01))
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_sync_state() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.get_sync_state("New York").unwrap().is_none());

        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let mut state = SyncState::new("New York");
        state.last_attempt_at = Some(now);
        state.last_error_kind = Some("rate_limited".to_string());
        state.last_error = Some("Rate limited by provider (HTTP 429)".to_string());
        state.consecutive_failures = 1;
        state.backoff_multiplier = 2;
        store.save_sync_state(&state).unwrap();

        assert_eq!(store.get_sync_state("New York").unwrap(), Some(state.clone()));

        state.last_success_at = Some(now);
        state.last_error_kind = None;
        state.last_error = None;
        state.consecutive_failures = 0;
        state.backoff_multiplier = 1;
        store.save_sync_state(&state).unwrap();

        let states = store.list_sync_states().unwrap();
        assert_eq!(states, vec![state]);
    }
}
