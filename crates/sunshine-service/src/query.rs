//! Observable forecast queries.
//!
//! [`QueryEngine`] answers "forecast from today" and "single day" queries
//! against the shared store and lets callers subscribe to them. A
//! subscription emits one snapshot immediately and one more after every
//! committed change for its location.
//!
//! # Delivery
//!
//! - Writers call [`QueryEngine::notify`], which sends on a `broadcast`
//!   channel and never waits for subscribers.
//! - Each subscription owns a background task that re-runs its query and
//!   pushes the snapshot into an unbounded `mpsc` channel.
//! - A subscriber that lags behind the broadcast buffer re-queries once;
//!   snapshots are idempotent so skipped notifications lose nothing.
//! - Dropping the subscription stops its task.
//!
//! # Example
//!
//! ```ignore
//! let mut forecast = engine.subscribe(location_id);
//! while let Some(days) = forecast.next().await {
//!     render(&days);
//! }
//! ```

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::stream::Stream;
use sunshine_store::{Store, StoredWeatherDay};
use sunshine_types::{LocationId, today_utc};
use time::Date;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// The store shared by the query engine, the sync job, and the API.
pub type SharedStore = Arc<Mutex<Store>>;

/// A committed change to one location's weather rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ChangeEvent {
    /// The location whose rows changed.
    pub location_id: LocationId,
}

/// Read-side access to forecast data with change notification.
#[derive(Clone)]
pub struct QueryEngine {
    store: SharedStore,
    changes: broadcast::Sender<ChangeEvent>,
}

impl QueryEngine {
    /// Create an engine over `store` with a change buffer of `buffer` events.
    pub fn new(store: SharedStore, buffer: usize) -> Self {
        let (changes, _) = broadcast::channel(buffer.max(1));
        Self { store, changes }
    }

    /// The underlying store.
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Signal that rows for `location_id` were committed.
    pub fn notify(&self, location_id: LocationId) {
        // No receivers is fine: nobody is watching.
        let receivers = self.changes.send(ChangeEvent { location_id }).unwrap_or(0);
        debug!(
            "Change for location {} sent to {} subscriber(s)",
            location_id, receivers
        );
    }

    /// Receive raw change events.
    pub fn changes(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }

    /// Rows for a location dated today (UTC) or later, ascending by date.
    pub async fn forecast(
        &self,
        location_id: LocationId,
    ) -> sunshine_store::Result<Vec<StoredWeatherDay>> {
        let store = self.store.lock().await;
        store.query_from(location_id, today_utc())
    }

    /// The row for a single day, if stored.
    pub async fn day(
        &self,
        location_id: LocationId,
        date: Date,
    ) -> sunshine_store::Result<Option<StoredWeatherDay>> {
        let store = self.store.lock().await;
        store.query_single(location_id, date)
    }

    /// Subscribe to the "from today" forecast for a location.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe(&self, location_id: LocationId) -> Subscription<Vec<StoredWeatherDay>> {
        self.spawn_subscription(location_id, move |store| {
            store.query_from(location_id, today_utc())
        })
    }

    /// Subscribe to a single day for a location.
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe_single(
        &self,
        location_id: LocationId,
        date: Date,
    ) -> Subscription<Option<StoredWeatherDay>> {
        self.spawn_subscription(location_id, move |store| {
            store.query_single(location_id, date)
        })
    }

    fn spawn_subscription<T, F>(&self, location_id: LocationId, query: F) -> Subscription<T>
    where
        T: Send + 'static,
        F: Fn(&Store) -> sunshine_store::Result<T> + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();
        let task_token = cancel_token.clone();
        let store = Arc::clone(&self.store);
        // Subscribe before the first query so no commit falls in between.
        let mut changes = self.changes.subscribe();

        tokio::spawn(async move {
            if !emit(&store, &query, &tx).await {
                return;
            }

            loop {
                let event = tokio::select! {
                    _ = task_token.cancelled() => break,
                    event = changes.recv() => event,
                };

                match event {
                    Ok(change) if change.location_id == location_id => {}
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(
                            "Subscriber for location {} lagged by {} event(s), re-querying",
                            location_id, skipped
                        );
                    }
                    Err(RecvError::Closed) => break,
                }

                if !emit(&store, &query, &tx).await {
                    break;
                }
            }

            debug!("Subscription for location {} stopped", location_id);
        });

        Subscription {
            receiver: rx,
            cancel_token,
        }
    }
}

/// Run the query and push its result. Returns `false` once the receiver is gone.
async fn emit<T, F>(store: &Mutex<Store>, query: &F, tx: &mpsc::UnboundedSender<T>) -> bool
where
    F: Fn(&Store) -> sunshine_store::Result<T>,
{
    let result = {
        let store = store.lock().await;
        query(&*store)
    };

    match result {
        Ok(snapshot) => tx.send(snapshot).is_ok(),
        Err(e) => {
            // Keep the subscription alive; the next change re-queries.
            warn!("Subscription query failed: {}", e);
            !tx.is_closed()
        }
    }
}

/// A live query. Yields a snapshot now and after each relevant change.
pub struct Subscription<T> {
    receiver: mpsc::UnboundedReceiver<T>,
    cancel_token: CancellationToken,
}

impl<T> Subscription<T> {
    /// Wait for the next snapshot. `None` once the subscription has stopped.
    pub async fn next(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Take an already delivered snapshot without waiting.
    pub fn try_next(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    /// Stop receiving updates.
    pub fn unsubscribe(self) {
        self.cancel_token.cancel();
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use sunshine_types::{Coord, DayRecord, Units};

    fn engine() -> QueryEngine {
        let store = Store::open_in_memory().unwrap();
        QueryEngine::new(Arc::new(Mutex::new(store)), 16)
    }

    async fn location(engine: &QueryEngine, name: &str) -> LocationId {
        engine
            .store()
            .lock()
            .await
            .resolve_location(name, Coord::new(1.0, 2.0), Units::Metric, name)
            .unwrap()
    }

    fn days_from_today(count: i64) -> Vec<DayRecord> {
        let today = today_utc();
        (0..count)
            .map(|i| {
                DayRecord::new(
                    today + time::Duration::days(i),
                    "Clear",
                    800,
                    20.0 + i as f64,
                    10.0,
                )
            })
            .collect()
    }

    async fn next<T>(subscription: &mut Subscription<T>) -> T {
        tokio::time::timeout(Duration::from_secs(5), subscription.next())
            .await
            .expect("snapshot in time")
            .expect("subscription open")
    }

    #[tokio::test]
    async fn test_subscribe_emits_immediately_then_on_change() {
        let engine = engine();
        let id = location(&engine, "Paris").await;

        let mut sub = engine.subscribe(id);
        assert!(next(&mut sub).await.is_empty());

        {
            let store = engine.store().lock().await;
            store.upsert_weather(id, &days_from_today(5)).unwrap();
        }
        engine.notify(id);

        let days = next(&mut sub).await;
        assert_eq!(days.len(), 5);
        assert!(days.windows(2).all(|w| w[0].date < w[1].date));
        assert_eq!(days[0].date, today_utc());
    }

    #[tokio::test]
    async fn test_past_rows_are_filtered() {
        let engine = engine();
        let id = location(&engine, "Paris").await;
        {
            let store = engine.store().lock().await;
            let yesterday = today_utc() - time::Duration::days(1);
            store
                .upsert_day(id, &DayRecord::new(yesterday, "Rain", 500, 5.0, 1.0))
                .unwrap();
            store.upsert_weather(id, &days_from_today(2)).unwrap();
        }

        assert_eq!(engine.forecast(id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_changes_for_other_locations_are_ignored() {
        let engine = engine();
        let paris = location(&engine, "Paris").await;
        let rome = location(&engine, "Rome").await;

        let mut sub = engine.subscribe(paris);
        assert!(next(&mut sub).await.is_empty());

        engine.notify(rome);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(sub.try_next().is_none());

        engine.notify(paris);
        assert!(next(&mut sub).await.is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_single() {
        let engine = engine();
        let id = location(&engine, "Paris").await;
        let tomorrow = today_utc() + time::Duration::days(1);

        let mut sub = engine.subscribe_single(id, tomorrow);
        assert!(next(&mut sub).await.is_none());

        {
            let store = engine.store().lock().await;
            store.upsert_weather(id, &days_from_today(3)).unwrap();
        }
        engine.notify(id);

        let day = next(&mut sub).await.unwrap();
        assert_eq!(day.date, tomorrow);
        assert_eq!(day.max_temp, 21.0);
        assert_eq!(engine.day(id, tomorrow).await.unwrap(), Some(day));
    }

    #[tokio::test]
    async fn test_subscribers_are_independent() {
        let engine = engine();
        let id = location(&engine, "Paris").await;

        let mut first = engine.subscribe(id);
        let mut second = engine.subscribe(id);
        next(&mut first).await;
        next(&mut second).await;

        second.unsubscribe();
        engine.notify(id);
        assert!(next(&mut first).await.is_empty());
    }

    #[tokio::test]
    async fn test_lagged_subscriber_requeries_once() {
        let store = Store::open_in_memory().unwrap();
        let engine = QueryEngine::new(Arc::new(Mutex::new(store)), 1);
        let id = location(&engine, "Paris").await;

        let mut sub = engine.subscribe(id);
        next(&mut sub).await;

        // Hold the store so the task cannot drain while we overflow the buffer.
        let guard = engine.store().lock().await;
        for _ in 0..5 {
            engine.notify(id);
        }
        drop(guard);

        // At least one re-query arrives; the store did not change, so it is empty.
        assert!(next(&mut sub).await.is_empty());
    }

    #[tokio::test]
    async fn test_drop_stops_task() {
        let engine = engine();
        let id = location(&engine, "Paris").await;
        let mut changes = engine.changes();

        let sub = engine.subscribe(id);
        assert_eq!(engine.changes.receiver_count(), 2);
        drop(sub);

        // The task exits on its next wakeup and releases its receiver.
        engine.notify(id);
        assert_eq!(changes.recv().await.unwrap().location_id, id);
        for _ in 0..50 {
            if engine.changes.receiver_count() == 1 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("subscription task did not stop");
    }
}
