//! This module defines the `EventStoreBackend` trait, the interface every storage backend of the
//! event log implements. A backend owns two append-only collections: the events and the snapshots.
//! It never updates or deletes a row in either of them.

use crate::event::{AggregateType, Event, EventType, NewEvent};
use crate::snapshot::{NewSnapshot, Snapshot};
use async_trait::async_trait;

/// A trait that defines the behavior of a storage backend.
///
/// Every call is one unit of work: writes commit before returning, reads see only committed rows.
/// Backends do not check `version` for conflicts.
#[async_trait]
pub trait EventStoreBackend: Send + Sync {
    /// The error when an event store operation fails
    type Error: std::error::Error + Send + Sync + 'static;

    /// Appends an event to the log and returns the id the store assigned to it.
    async fn save_event(&self, event: NewEvent) -> Result<i64, Self::Error>;

    /// Fetches every event of one aggregate, ordered by `(created_at, version)`.
    async fn get_events_by_aggregate(
        &self,
        aggregate_type: AggregateType,
        aggregate_id: i64,
    ) -> Result<Vec<Event>, Self::Error>;

    /// Fetches the events of one aggregate whose id is greater than `after_event_id`, in the
    /// same order as [`EventStoreBackend::get_events_by_aggregate`].
    ///
    /// Ids are store-assigned and increasing, so this is the part of the history appended after
    /// that event, whatever versions the producers wrote.
    async fn get_events_by_aggregate_after(
        &self,
        aggregate_type: AggregateType,
        aggregate_id: i64,
        after_event_id: i64,
    ) -> Result<Vec<Event>, Self::Error>;

    /// Fetches up to `limit` events of one type across all aggregates, ordered by id.
    async fn get_events_by_type(
        &self,
        event_type: EventType,
        limit: u32,
    ) -> Result<Vec<Event>, Self::Error>;

    /// Fetches up to `limit` events with an id greater than `cursor`, ordered by id.
    async fn get_events_since(&self, cursor: i64, limit: u32) -> Result<Vec<Event>, Self::Error>;

    /// Persists a snapshot and returns the id the store assigned to it.
    async fn save_snapshot(&self, snapshot: NewSnapshot) -> Result<i64, Self::Error>;

    /// Fetches the snapshot with the highest version for one aggregate.
    async fn get_latest_snapshot(
        &self,
        aggregate_type: AggregateType,
        aggregate_id: i64,
    ) -> Result<Option<Snapshot>, Self::Error>;
}
