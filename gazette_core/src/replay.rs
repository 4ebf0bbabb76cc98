//! The `EventLog` service: a storage backend plus the fold rules used to rebuild aggregate state.

use crate::config::EventLogConfig;
use crate::event::{AggregateType, Event, EventType, NewEvent};
use crate::event_store::EventStoreBackend;
use crate::fold::{FoldError, FoldRegistry};
use crate::snapshot::{AggregateState, NewSnapshot, Snapshot};
use log::debug;

/// Errors returned by the `EventLog`.
#[derive(Debug, thiserror::Error)]
pub enum EventLogError<E>
where
    E: std::error::Error,
{
    /// The storage backend failed
    #[error("Event store error: {0}")]
    Store(E),
    /// An event could not be folded
    #[error("Fold error: {0}")]
    Fold(#[from] FoldError),
}

/// Appends events, reads them back and replays them into aggregate state.
#[derive(Debug, Clone)]
pub struct EventLog<B>
where
    B: EventStoreBackend,
{
    backend: B,
    registry: FoldRegistry,
    config: EventLogConfig,
}

impl<B> EventLog<B>
where
    B: EventStoreBackend,
{
    /// Creates an `EventLog` with the built-in fold rules and the default configuration.
    pub fn new(backend: B) -> Self {
        Self::with_registry(backend, FoldRegistry::default(), EventLogConfig::default())
    }

    /// Creates an `EventLog` with custom fold rules and configuration.
    pub fn with_registry(backend: B, registry: FoldRegistry, config: EventLogConfig) -> Self {
        log::debug!("Creating a new EventLog");
        Self {
            backend,
            registry,
            config,
        }
    }

    /// Exposes the storage backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Exposes the fold rules
    pub fn registry(&self) -> &FoldRegistry {
        &self.registry
    }

    /// Exposes the configuration
    pub fn config(&self) -> &EventLogConfig {
        &self.config
    }

    /// Appends an event and returns its id.
    pub async fn save_event(&self, event: NewEvent) -> Result<i64, EventLogError<B::Error>> {
        self.backend
            .save_event(event)
            .await
            .map_err(EventLogError::Store)
    }

    /// Every event of one aggregate, oldest first.
    pub async fn get_events_by_aggregate(
        &self,
        aggregate_type: AggregateType,
        aggregate_id: i64,
    ) -> Result<Vec<Event>, EventLogError<B::Error>> {
        self.backend
            .get_events_by_aggregate(aggregate_type, aggregate_id)
            .await
            .map_err(EventLogError::Store)
    }

    /// Up to `limit` events of one type, by ascending id. `limit` is clamped to `max_batch_size`.
    pub async fn get_events_by_type(
        &self,
        event_type: EventType,
        limit: u32,
    ) -> Result<Vec<Event>, EventLogError<B::Error>> {
        self.backend
            .get_events_by_type(event_type, self.config.clamp_limit(limit))
            .await
            .map_err(EventLogError::Store)
    }

    /// Up to `limit` events after `cursor` in the global log. `limit` is clamped to
    /// `max_batch_size`.
    pub async fn get_events_since(
        &self,
        cursor: i64,
        limit: u32,
    ) -> Result<Vec<Event>, EventLogError<B::Error>> {
        self.backend
            .get_events_since(cursor, self.config.clamp_limit(limit))
            .await
            .map_err(EventLogError::Store)
    }

    /// Persists a snapshot and returns its id.
    pub async fn save_snapshot(
        &self,
        snapshot: NewSnapshot,
    ) -> Result<i64, EventLogError<B::Error>> {
        self.backend
            .save_snapshot(snapshot)
            .await
            .map_err(EventLogError::Store)
    }

    /// The snapshot with the highest version, if any.
    pub async fn get_latest_snapshot(
        &self,
        aggregate_type: AggregateType,
        aggregate_id: i64,
    ) -> Result<Option<Snapshot>, EventLogError<B::Error>> {
        self.backend
            .get_latest_snapshot(aggregate_type, aggregate_id)
            .await
            .map_err(EventLogError::Store)
    }

    /// Reconstructs the current state of an aggregate.
    ///
    /// With snapshots enabled, replay starts from the latest snapshot and folds only the events
    /// appended after the last one it covers. Otherwise the whole history is folded.
    /// An aggregate without events nor snapshots replays to an empty state.
    pub async fn replay_events(
        &self,
        aggregate_type: AggregateType,
        aggregate_id: i64,
    ) -> Result<AggregateState, EventLogError<B::Error>> {
        if !self.config.use_snapshots {
            return self.rebuild_state(aggregate_type, aggregate_id).await;
        }

        let Some(snapshot) = self.get_latest_snapshot(aggregate_type, aggregate_id).await? else {
            return self.rebuild_state(aggregate_type, aggregate_id).await;
        };

        let events = self
            .backend
            .get_events_by_aggregate_after(aggregate_type, aggregate_id, snapshot.last_event_id)
            .await
            .map_err(EventLogError::Store)?;
        debug!(
            "Replaying {} {}: snapshot {} up to event {} plus {} events",
            aggregate_type,
            aggregate_id,
            snapshot.id,
            snapshot.last_event_id,
            events.len()
        );
        Ok(self
            .registry
            .fold(snapshot.state, &events, self.config.unknown_event_policy)?)
    }

    /// Reconstructs the state of an aggregate from its full history, ignoring snapshots.
    pub async fn rebuild_state(
        &self,
        aggregate_type: AggregateType,
        aggregate_id: i64,
    ) -> Result<AggregateState, EventLogError<B::Error>> {
        let events = self
            .get_events_by_aggregate(aggregate_type, aggregate_id)
            .await?;
        debug!(
            "Replaying {} {} from scratch: {} events",
            aggregate_type,
            aggregate_id,
            events.len()
        );
        Ok(self.registry.fold(
            AggregateState::new(),
            &events,
            self.config.unknown_event_policy,
        )?)
    }

    /// Rebuilds the state of an aggregate and stores it as a snapshot covering every event read.
    /// Returns the snapshot id, or `None` when the aggregate has no events.
    ///
    /// The snapshot's `version` is the highest version seen and `last_event_id` the highest id.
    pub async fn checkpoint(
        &self,
        aggregate_type: AggregateType,
        aggregate_id: i64,
    ) -> Result<Option<i64>, EventLogError<B::Error>> {
        let events = self
            .get_events_by_aggregate(aggregate_type, aggregate_id)
            .await?;
        let Some(last_event_id) = events.iter().map(|e| e.id).max() else {
            debug!(
                "Nothing to checkpoint for {} {}: no events",
                aggregate_type, aggregate_id
            );
            return Ok(None);
        };
        let version = events.iter().map(|e| e.version).max().unwrap_or_default();
        let state = self.registry.fold(
            AggregateState::new(),
            &events,
            self.config.unknown_event_policy,
        )?;
        let id = self
            .save_snapshot(NewSnapshot {
                aggregate_type,
                aggregate_id,
                state,
                version,
                last_event_id,
            })
            .await?;
        debug!(
            "Checkpointed {} {} up to event {} as snapshot {}",
            aggregate_type, aggregate_id, last_event_id, id
        );
        Ok(Some(id))
    }
}
