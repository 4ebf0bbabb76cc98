use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;

use gazette_core::prelude::*;

/// The in-memory data store.
#[derive(Debug, Default)]
struct EventStoreData {
    events: Vec<Event>,
    snapshots: Vec<Snapshot>,
    last_event_id: i64,
    last_snapshot_id: i64,
}

/// An in-memory event store.
///
/// This event store is useful for testing and development purposes. It is not recommended for
/// production use, as it does not persist events to any durable storage.
#[derive(Clone, Debug, Default)]
pub struct InMemoryEventStore {
    data: Arc<Mutex<EventStoreData>>,
}

impl InMemoryEventStore {
    /// Creates a new `InMemoryEventStore`.
    pub fn new() -> Self {
        log::debug!("Creating a new InMemoryEventStore");
        Self::default()
    }

    /// Number of events in the log.
    pub async fn event_count(&self) -> usize {
        self.data.lock().await.events.len()
    }

    /// Number of snapshots stored.
    pub async fn snapshot_count(&self) -> usize {
        self.data.lock().await.snapshots.len()
    }

    async fn aggregate_events(
        &self,
        aggregate_type: AggregateType,
        aggregate_id: i64,
        after_event_id: Option<i64>,
    ) -> Vec<Event> {
        let data = self.data.lock().await;
        let mut events: Vec<Event> = data
            .events
            .iter()
            .filter(|e| e.aggregate_type == aggregate_type && e.aggregate_id == aggregate_id)
            .filter(|e| after_event_id.is_none_or(|id| e.id > id))
            .cloned()
            .collect();
        // The log is kept in id order and the sort is stable, so ties fall back to the id.
        events.sort_by_key(|e| (e.created_at, e.version));
        log::debug!(
            "Read {} events for {} {}",
            events.len(),
            aggregate_type,
            aggregate_id
        );
        events
    }
}

/// Errors returned by the InMemoryEventStore. It cannot fail.
#[derive(Debug, thiserror::Error)]
pub enum InMemoryEventStoreError {}

#[async_trait]
impl EventStoreBackend for InMemoryEventStore {
    type Error = InMemoryEventStoreError;

    async fn save_event(&self, event: NewEvent) -> Result<i64, Self::Error> {
        let mut data = self.data.lock().await;
        data.last_event_id += 1;
        let id = data.last_event_id;
        log::debug!(
            "save_event: id: {}, type: {}, aggregate: {} {}, version: {}",
            id,
            event.event_type,
            event.aggregate_type,
            event.aggregate_id,
            event.version
        );
        data.events.push(Event::from_new(id, Utc::now(), event));
        Ok(id)
    }

    async fn get_events_by_aggregate(
        &self,
        aggregate_type: AggregateType,
        aggregate_id: i64,
    ) -> Result<Vec<Event>, Self::Error> {
        Ok(self
            .aggregate_events(aggregate_type, aggregate_id, None)
            .await)
    }

    async fn get_events_by_aggregate_after(
        &self,
        aggregate_type: AggregateType,
        aggregate_id: i64,
        after_event_id: i64,
    ) -> Result<Vec<Event>, Self::Error> {
        Ok(self
            .aggregate_events(aggregate_type, aggregate_id, Some(after_event_id))
            .await)
    }

    async fn get_events_by_type(
        &self,
        event_type: EventType,
        limit: u32,
    ) -> Result<Vec<Event>, Self::Error> {
        let data = self.data.lock().await;
        Ok(data
            .events
            .iter()
            .filter(|e| e.event_type == event_type)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn get_events_since(&self, cursor: i64, limit: u32) -> Result<Vec<Event>, Self::Error> {
        log::debug!("Reading up to {} events after id {}", limit, cursor);
        let data = self.data.lock().await;
        // Ids are assigned in push order, so the log is sorted by id.
        let start = data.events.partition_point(|e| e.id <= cursor);
        Ok(data.events[start..]
            .iter()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn save_snapshot(&self, snapshot: NewSnapshot) -> Result<i64, Self::Error> {
        let mut data = self.data.lock().await;
        data.last_snapshot_id += 1;
        let id = data.last_snapshot_id;
        log::debug!(
            "save_snapshot: id: {}, aggregate: {} {}, version: {}, last event: {}",
            id,
            snapshot.aggregate_type,
            snapshot.aggregate_id,
            snapshot.version,
            snapshot.last_event_id
        );
        data.snapshots
            .push(Snapshot::from_new(id, Utc::now(), snapshot));
        Ok(id)
    }

    async fn get_latest_snapshot(
        &self,
        aggregate_type: AggregateType,
        aggregate_id: i64,
    ) -> Result<Option<Snapshot>, Self::Error> {
        let data = self.data.lock().await;
        Ok(data
            .snapshots
            .iter()
            .filter(|s| s.aggregate_type == aggregate_type && s.aggregate_id == aggregate_id)
            .max_by_key(|s| (s.version, s.last_event_id, s.id))
            .cloned())
    }
}
