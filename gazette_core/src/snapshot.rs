//! Snapshot definitions

use crate::event::AggregateType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The flat field mapping produced by folding an aggregate's events.
pub type AggregateState = Map<String, Value>;

/// A snapshot that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSnapshot {
    /// The kind of entity the state belongs to
    pub aggregate_type: AggregateType,
    /// The id of the entity the state belongs to
    pub aggregate_id: i64,
    /// The materialized state
    pub state: AggregateState,
    /// The highest event version folded into `state`
    pub version: u64,
    /// The id of the last event folded into `state`. Replay resumes after it.
    pub last_event_id: i64,
}

/// A materialized aggregate state at a given event version.
///
/// Several snapshots may exist for one aggregate. The one with the highest `version` wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Snapshot ID, assigned by the store
    pub id: i64,
    /// The kind of entity the state belongs to
    pub aggregate_type: AggregateType,
    /// The id of the entity the state belongs to
    pub aggregate_id: i64,
    /// The materialized state
    pub state: AggregateState,
    /// The highest event version folded into `state`
    pub version: u64,
    /// The id of the last event folded into `state`. Replay resumes after it.
    pub last_event_id: i64,
    /// When the snapshot was persisted
    pub created_at: DateTime<Utc>,
}

impl Snapshot {
    /// Turns a `NewSnapshot` into its persisted form.
    pub fn from_new(id: i64, created_at: DateTime<Utc>, snapshot: NewSnapshot) -> Self {
        Snapshot {
            id,
            aggregate_type: snapshot.aggregate_type,
            aggregate_id: snapshot.aggregate_id,
            state: snapshot.state,
            version: snapshot.version,
            last_event_id: snapshot.last_event_id,
            created_at,
        }
    }
}
