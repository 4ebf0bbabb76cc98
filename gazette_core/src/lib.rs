//! # Gazette
//!
//! The event log of the news reader backend. Producers append typed events about articles and
//! users, consumers read them back by aggregate, by type or by cursor, and [`EventLog`] folds an
//! aggregate's events into its current state, optionally starting from a snapshot.

#![deny(missing_docs)]

/// Configuration of the event log
pub mod config;
/// Event definitions
pub mod event;
/// The storage backend trait
pub mod event_store;
/// Fold rules and the registry mapping event types to them
pub mod fold;
/// The replay service
pub mod replay;
/// Snapshot definitions
pub mod snapshot;

pub use replay::EventLog;

pub mod prelude {
    //! The prelude module for the `gazette_core` crate.
    pub use super::config::{EventLogConfig, UnknownEventPolicy};
    pub use super::event::{
        AggregateType, Event, EventBuilder, EventBuilderError, EventType, NewEvent,
        ParseAggregateTypeError, ParseEventTypeError,
    };
    pub use super::event_store::EventStoreBackend;
    pub use super::fold::{FoldError, FoldRegistry, FoldRule};
    pub use super::replay::{EventLog, EventLogError};
    pub use super::snapshot::{AggregateState, NewSnapshot, Snapshot};
}
