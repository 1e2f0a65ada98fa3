//! REST API endpoints for the sunshine-service.
//!
//! This module exposes stored forecasts, the preferred location, and sync
//! control over HTTP.
//!
//! # Lock Acquisition
//!
//! - **`state.config`** (RwLock): read lock for `GET` endpoints, write lock
//!   when the preferred location changes.
//! - **`state.store`** (Mutex): held only for the duration of one query.
//!
//! When both are needed, take `config` first and release it before touching
//! the store.
//!
//! ## Error Handling
//!
//! All endpoints return structured JSON errors via [`AppError`]. Store errors
//! return HTTP 500. Client errors (not found, bad request) return 4xx codes.
//!
//! # Example
//!
//! ```ignore
//! use sunshine_service::api;
//!
//! let app = api::router().with_state(state);
//! ```

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use sunshine_store::{ForecastRow, StoredLocation, StoredWeatherDay, SyncState, WeatherQuery};
use sunshine_types::{LocationId, Units, today_utc};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use tracing::info;

use crate::scheduler::TriggerOutcome;
use crate::state::AppState;

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/health", get(health))
        // Preferred location
        .route("/api/location", get(get_location).put(update_location))
        // Data endpoints
        .route("/api/locations", get(list_locations))
        .route("/api/forecast", get(get_forecast))
        .route("/api/locations/{id}/forecast", get(get_location_forecast))
        .route("/api/locations/{id}/forecast/{date}", get(get_forecast_day))
        // Sync control
        .route("/api/sync", post(trigger_sync))
        .route("/api/sync/status", get(sync_status))
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
    })
}

/// The preferred location and how it is synced.
#[derive(Debug, Serialize)]
pub struct LocationResponse {
    pub location: String,
    pub units: Units,
    pub days: u8,
    pub interval_secs: u64,
    pub running: bool,
    pub parked: bool,
}

/// Get the preferred location.
async fn get_location(State(state): State<Arc<AppState>>) -> Json<LocationResponse> {
    let (location, units, days, interval_secs) = {
        let config = state.config.read().await;
        (
            config.sync.location.clone(),
            config.sync.units,
            config.sync.days,
            config.sync.interval_secs,
        )
    };
    let running = state.scheduler.is_running(&location).await;
    let parked = state.scheduler.is_parked(&location).await;

    Json(LocationResponse {
        location,
        units,
        days,
        interval_secs,
        running,
        parked,
    })
}

/// Request to change the preferred location.
#[derive(Debug, Deserialize)]
pub struct UpdateLocationRequest {
    pub location: String,
}

/// Response to a sync trigger.
#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub location: String,
    pub outcome: TriggerOutcome,
}

/// Change the preferred location.
///
/// This is the location-changed signal: the previous location's timer and
/// running job are cancelled, and the new location is armed and synced
/// right away.
///
/// # Errors
///
/// - Returns [`AppError::BadRequest`] if the location is empty
async fn update_location(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UpdateLocationRequest>,
) -> Result<(StatusCode, Json<TriggerResponse>), AppError> {
    let location = request.location.trim().to_string();

    let (previous, interval) = {
        let mut config = state.config.write().await;
        let mut updated = config.clone();
        updated.sync.location = location.clone();
        updated
            .validate()
            .map_err(|e| AppError::BadRequest(format!("Invalid location: {}", e)))?;

        let previous = std::mem::replace(&mut *config, updated).sync.location;
        (previous, config.sync.interval())
    };

    if previous != location {
        info!("Preferred location changed from '{}' to '{}'", previous, location);
        state.scheduler.cancel(&previous).await;
    }
    // Arming an unsynced or overdue location starts its first run.
    let outcome = match state.scheduler.arm(&location, interval).await {
        Some(outcome) => outcome,
        None => state.scheduler.trigger(&location).await,
    };

    Ok((StatusCode::ACCEPTED, Json(TriggerResponse { location, outcome })))
}

/// List all known locations.
async fn list_locations(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<StoredLocation>>, AppError> {
    let store = state.store.lock().await;
    Ok(Json(store.list_locations()?))
}

/// Forecast for the preferred location.
#[derive(Debug, Serialize)]
pub struct ForecastResponse {
    pub location: String,
    pub count: usize,
    pub days: Vec<ForecastRow>,
}

/// Get the preferred location's forecast from today, joined with its location.
///
/// Returns an empty list before the first successful sync.
async fn get_forecast(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ForecastResponse>, AppError> {
    let location = state.preferred_location().await;
    let days = {
        let store = state.store.lock().await;
        store.forecast_for_setting(&location, today_utc())?
    };

    Ok(Json(ForecastResponse {
        location,
        count: days.len(),
        days,
    }))
}

/// Query parameters for a forecast range.
#[derive(Debug, Default, Deserialize)]
pub struct ForecastRangeQuery {
    /// First date (`YYYY-MM-DD`, inclusive). Defaults to today.
    pub since: Option<String>,
    /// Last date (`YYYY-MM-DD`, inclusive).
    pub until: Option<String>,
    /// Maximum number of days to return.
    pub limit: Option<u32>,
}

impl ForecastRangeQuery {
    fn to_weather_query(&self, location_id: LocationId) -> Result<WeatherQuery, AppError> {
        let since = match &self.since {
            Some(s) => parse_date("since", s)?,
            None => today_utc(),
        };
        let until = self
            .until
            .as_deref()
            .map(|s| parse_date("until", s))
            .transpose()?;

        if let Some(until) = until
            && since > until
        {
            return Err(AppError::BadRequest(format!(
                "'since' ({}) must not be after 'until' ({})",
                since, until
            )));
        }

        let mut query = WeatherQuery::new().location(location_id).since(since);
        if let Some(until) = until {
            query = query.until(until);
        }
        if let Some(limit) = self.limit {
            query = query.limit(limit);
        }
        Ok(query)
    }
}

/// Get stored days for a location.
///
/// # Query Parameters
///
/// - `since`: first date, inclusive (default: today)
/// - `until`: last date, inclusive
/// - `limit`: maximum number of days
///
/// # Errors
///
/// - Returns [`AppError::BadRequest`] for unparseable dates or `since > until`
/// - Returns [`AppError::NotFound`] if the location does not exist
async fn get_location_forecast(
    State(state): State<Arc<AppState>>,
    Path(id): Path<LocationId>,
    Query(params): Query<ForecastRangeQuery>,
) -> Result<Json<Vec<StoredWeatherDay>>, AppError> {
    let query = params.to_weather_query(id)?;

    let store = state.store.lock().await;
    if store.get_location(id)?.is_none() {
        return Err(AppError::NotFound(format!("Location not found: {}", id)));
    }
    Ok(Json(store.query_weather(&query)?))
}

/// Get a single stored day for a location.
///
/// # Errors
///
/// - Returns [`AppError::BadRequest`] for an unparseable date
/// - Returns [`AppError::NotFound`] if no row exists for that day
async fn get_forecast_day(
    State(state): State<Arc<AppState>>,
    Path((id, date)): Path<(LocationId, String)>,
) -> Result<Json<StoredWeatherDay>, AppError> {
    let date = parse_date("date", &date)?;

    let store = state.store.lock().await;
    store
        .query_single(id, date)?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No forecast for location {} on {}", id, date)))
}

/// Trigger a sync of the preferred location.
///
/// Returns 202 immediately; the job runs in the background.
async fn trigger_sync(State(state): State<Arc<AppState>>) -> (StatusCode, Json<TriggerResponse>) {
    let location = state.preferred_location().await;
    let outcome = state.scheduler.trigger(&location).await;
    (StatusCode::ACCEPTED, Json(TriggerResponse { location, outcome }))
}

/// Sync state of one location.
#[derive(Debug, Serialize)]
pub struct SyncStatusEntry {
    #[serde(flatten)]
    pub state: SyncState,
    pub running: bool,
}

/// Sync status across locations.
#[derive(Debug, Serialize)]
pub struct SyncStatusResponse {
    pub location: String,
    pub running: Vec<String>,
    pub states: Vec<SyncStatusEntry>,
}

/// Get persisted sync state for every location.
async fn sync_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SyncStatusResponse>, AppError> {
    let location = state.preferred_location().await;
    let running = state.scheduler.running_locations().await;
    let states = {
        let store = state.store.lock().await;
        store.list_sync_states()?
    };

    let states = states
        .into_iter()
        .map(|s| SyncStatusEntry {
            running: running.contains(&s.location),
            state: s,
        })
        .collect();

    Ok(Json(SyncStatusResponse {
        location,
        running,
        states,
    }))
}

fn parse_date(field: &str, value: &str) -> Result<Date, AppError> {
    Date::parse(value, DATE_FORMAT).map_err(|e| {
        AppError::BadRequest(format!(
            "Invalid '{}' date '{}' (expected YYYY-MM-DD): {}",
            field, value, e
        ))
    })
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Store(sunshine_store::Error),
}

impl From<sunshine_store::Error> for AppError {
    fn from(e: sunshine_store::Error) -> Self {
        AppError::Store(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use std::time::Duration;
    use sunshine_core::{MockFailure, MockForecastSource, sample_payload};
    use sunshine_types::{Coord, DayRecord};
    use tower::ServiceExt;

    use crate::config::Config;

    fn create_test_state() -> (Arc<AppState>, Arc<MockForecastSource>) {
        let source = Arc::new(MockForecastSource::new(sample_payload(
            "Mountain View",
            Coord::new(37.39, -122.08),
            today_utc(),
            5,
        )));
        let store = sunshine_store::Store::open_in_memory().unwrap();
        let state = AppState::new(store, Config::default(), source.clone());
        (state, source)
    }

    async fn seed(state: &AppState, setting: &str, days: i64) -> LocationId {
        let store = state.store.lock().await;
        let id = store
            .resolve_location(setting, Coord::new(37.39, -122.08), Units::Metric, "Mountain View")
            .unwrap();
        let today = today_utc();
        let records: Vec<_> = (0..days)
            .map(|i| DayRecord::new(today + time::Duration::days(i), "Clear", 800, 20.0, 10.0))
            .collect();
        store.upsert_weather(id, &records).unwrap();
        id
    }

    async fn get(state: &Arc<AppState>, uri: &str) -> axum::response::Response {
        router()
            .with_state(Arc::clone(state))
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn response_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (state, _) = create_test_state();
        let response = get(&state, "/api/health").await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = response_json(response).await;
        assert_eq!(json["status"], "ok");
        assert!(json["version"].is_string());
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_get_location_defaults() {
        let (state, _) = create_test_state();
        let json = response_json(get(&state, "/api/location").await).await;
        assert_eq!(json["location"], "94043");
        assert_eq!(json["units"], "metric");
        assert_eq!(json["days"], 14);
        assert_eq!(json["running"], false);
    }

    #[tokio::test]
    async fn test_list_locations_empty() {
        let (state, _) = create_test_state();
        let response = get(&state, "/api/locations").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response_json(response).await, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_forecast_for_preferred_location() {
        let (state, _) = create_test_state();
        seed(&state, "94043", 3).await;
        seed(&state, "Paris", 2).await;

        let json = response_json(get(&state, "/api/forecast").await).await;
        assert_eq!(json["location"], "94043");
        assert_eq!(json["count"], 3);
        let first = &json["days"][0];
        assert_eq!(first["location_setting"], "94043");
        assert_eq!(first["units"], "metric");
        assert_eq!(first["date"], today_utc().to_string());
    }

    #[tokio::test]
    async fn test_location_forecast_range() {
        let (state, _) = create_test_state();
        let id = seed(&state, "94043", 5).await;
        let today = today_utc();
        let until = today + time::Duration::days(2);

        let uri = format!("/api/locations/{}/forecast?until={}", id, until);
        let json = response_json(get(&state, &uri).await).await;
        let days = json.as_array().unwrap();
        assert_eq!(days.len(), 3);
        assert_eq!(days[0]["date"], today.to_string());
        assert_eq!(days[2]["date"], until.to_string());

        let uri = format!("/api/locations/{}/forecast?limit=1", id);
        let json = response_json(get(&state, &uri).await).await;
        assert_eq!(json.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_location_forecast_rejects_inverted_range() {
        let (state, _) = create_test_state();
        let id = seed(&state, "94043", 1).await;

        let uri = format!(
            "/api/locations/{}/forecast?since=2024-02-10&until=2024-02-01",
            id
        );
        let response = get(&state, &uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response_json(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_location_forecast_bad_date() {
        let (state, _) = create_test_state();
        let id = seed(&state, "94043", 1).await;
        let response = get(&state, &format!("/api/locations/{}/forecast?since=tomorrow", id)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_location_forecast_unknown_location() {
        let (state, _) = create_test_state();
        let response = get(&state, "/api/locations/42/forecast").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_forecast_day() {
        let (state, _) = create_test_state();
        let id = seed(&state, "94043", 2).await;
        let tomorrow = today_utc() + time::Duration::days(1);

        let response = get(&state, &format!("/api/locations/{}/forecast/{}", id, tomorrow)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = response_json(response).await;
        assert_eq!(json["date"], tomorrow.to_string());
        assert_eq!(json["condition_code"], 800);

        let response = get(&state, &format!("/api/locations/{}/forecast/2001-01-01", id)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = get(&state, &format!("/api/locations/{}/forecast/01-01-2001", id)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_trigger_sync_and_status() {
        let (state, source) = create_test_state();
        let mut events = state.scheduler.subscribe();

        let response = router()
            .with_state(Arc::clone(&state))
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/sync")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let json = response_json(response).await;
        assert_eq!(json["location"], "94043");
        assert_eq!(json["outcome"], "started");

        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(event.is_success());
        assert_eq!(source.fetch_count(), 1);

        let json = response_json(get(&state, "/api/sync/status").await).await;
        assert_eq!(json["running"], serde_json::json!([]));
        let entry = &json["states"][0];
        assert_eq!(entry["location"], "94043");
        assert_eq!(entry["consecutive_failures"], 0);
        assert_eq!(entry["running"], false);
        assert!(entry["last_success_at"].is_string());

        let json = response_json(get(&state, "/api/forecast").await).await;
        assert_eq!(json["count"], 5);
    }

    #[tokio::test]
    async fn test_sync_status_reports_failure_kind() {
        let (state, source) = create_test_state();
        source.fail_next(1, MockFailure::RateLimited).await;
        let mut events = state.scheduler.subscribe();

        state.scheduler.trigger("94043").await;
        events.recv().await.unwrap();

        let json = response_json(get(&state, "/api/sync/status").await).await;
        let entry = &json["states"][0];
        assert_eq!(entry["last_error_kind"], "rate_limited");
        assert_eq!(entry["backoff_multiplier"], 2);
    }

    #[tokio::test]
    async fn test_update_location_switches_and_syncs() {
        let (state, source) = create_test_state();
        let mut events = state.scheduler.subscribe();

        let response = router()
            .with_state(Arc::clone(&state))
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/api/location")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"location":" Paris "}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let json = response_json(response).await;
        assert_eq!(json["location"], "Paris");
        assert_eq!(json["outcome"], "started");

        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.location, "Paris");
        assert_eq!(state.preferred_location().await, "Paris");
        assert_eq!(source.last_request().await.unwrap().0, "Paris");
        assert_eq!(source.fetch_count(), 1);

        state.scheduler.cancel("Paris").await;
    }

    #[tokio::test]
    async fn test_update_location_rejects_empty() {
        let (state, source) = create_test_state();

        let response = router()
            .with_state(Arc::clone(&state))
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri("/api/location")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"location":"   "}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.preferred_location().await, "94043");
        assert_eq!(source.fetch_count(), 0);
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("since", "2024-01-15").unwrap(),
            time::macros::date!(2024 - 01 - 15)
        );
        assert!(parse_date("since", "2024-13-01").is_err());
        assert!(parse_date("since", "").is_err());
    }
}
