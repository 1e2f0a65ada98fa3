//! Database schema and versioning.

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
pub fn initialize(conn: &Connection) -> Result<()> {
    let version = get_schema_version(conn)?;

    if version == 0 {
        // Fresh database - create all tables
        create_schema_v1(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    }

    Ok(())
}

/// Get the current schema version.
fn get_schema_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 =
        conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0))?;

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?)",
        [version],
    )?;
    Ok(())
}

/// Create the initial schema (version 1).
///
/// Dates are stored as the unix timestamp of their UTC midnight.
fn create_schema_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        );

        -- One row per location setting string
        CREATE TABLE IF NOT EXISTS locations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            location_setting TEXT NOT NULL UNIQUE,
            city_name TEXT NOT NULL DEFAULT '',
            coord_lat REAL NOT NULL,
            coord_lon REAL NOT NULL,
            units TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- Daily forecast rows, last write wins per (location, date)
        CREATE TABLE IF NOT EXISTS weather (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            location_id INTEGER NOT NULL REFERENCES locations(id),
            date INTEGER NOT NULL,
            description TEXT NOT NULL,
            condition_code INTEGER NOT NULL,
            max_temp REAL NOT NULL,
            min_temp REAL NOT NULL,
            humidity REAL,
            pressure REAL,
            wind_speed REAL,
            wind_degrees REAL,
            UNIQUE(location_id, date)
        );
        CREATE INDEX IF NOT EXISTS idx_weather_location_date
            ON weather(location_id, date);

        -- Scheduler bookkeeping, keyed by location setting
        CREATE TABLE IF NOT EXISTS sync_state (
            location_setting TEXT PRIMARY KEY,
            last_success_at INTEGER,
            last_attempt_at INTEGER,
            last_error_kind TEXT,
            last_error TEXT,
            consecutive_failures INTEGER NOT NULL DEFAULT 0,
            backoff_multiplier INTEGER NOT NULL DEFAULT 1
        );
        "#,
    )?;

    Ok(())
}
