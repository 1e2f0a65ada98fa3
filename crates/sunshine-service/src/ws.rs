//! WebSocket handler for live forecast updates.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use sunshine_store::StoredWeatherDay;
use sunshine_types::LocationId;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// Create the WebSocket router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/ws/locations/{id}", get(ws_handler))
}

/// One forecast snapshot pushed to a client.
#[derive(Debug, Serialize)]
pub struct ForecastSnapshot {
    pub location_id: LocationId,
    pub count: usize,
    pub days: Vec<StoredWeatherDay>,
}

impl ForecastSnapshot {
    fn new(location_id: LocationId, days: Vec<StoredWeatherDay>) -> Self {
        Self {
            location_id,
            count: days.len(),
            days,
        }
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(id): Path<LocationId>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, id))
}

/// Stream "from today" snapshots for one location until the client leaves.
///
/// The first message is the current forecast, possibly empty; each later
/// message follows a committed sync for the location.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, location_id: LocationId) {
    let (mut sender, mut receiver) = socket.split();
    let mut subscription = state.query.subscribe(location_id);

    info!("WebSocket client subscribed to location {}", location_id);

    let mut send_task = tokio::spawn(async move {
        while let Some(days) = subscription.next().await {
            let json = match serde_json::to_string(&ForecastSnapshot::new(location_id, days)) {
                Ok(j) => j,
                Err(e) => {
                    warn!("Failed to serialize snapshot: {}", e);
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
        // Dropping the subscription stops its query task.
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Close(_)) => break,
                Ok(Message::Ping(_)) => debug!("Received ping"),
                Ok(_) => {}
                Err(e) => {
                    warn!("WebSocket receive error: {}", e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        },
        _ = &mut recv_task => {
            send_task.abort();
        },
    }

    info!("WebSocket client for location {} disconnected", location_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use sunshine_store::Store;
    use sunshine_types::{Coord, DayRecord, Units, today_utc};

    #[test]
    fn test_snapshot_serialization() {
        let store = Store::open_in_memory().unwrap();
        let id = store
            .resolve_location("Paris", Coord::new(48.85, 2.35), Units::Metric, "Paris")
            .unwrap();
        let today = today_utc();
        store
            .upsert_day(id, &DayRecord::new(today, "Clear", 800, 21.5, 12.0))
            .unwrap();
        let days = store.query_from(id, today).unwrap();

        let json = serde_json::to_value(ForecastSnapshot::new(id, days)).unwrap();
        assert_eq!(json["location_id"], id);
        assert_eq!(json["count"], 1);
        assert_eq!(json["days"][0]["date"], today.to_string());
        assert_eq!(json["days"][0]["max_temp"], 21.5);
    }

    #[test]
    fn test_empty_snapshot() {
        let json = serde_json::to_value(ForecastSnapshot::new(7, Vec::new())).unwrap();
        assert_eq!(json["count"], 0);
        assert_eq!(json["days"], serde_json::json!([]));
    }
}
