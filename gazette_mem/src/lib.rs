//! # Gazette memory store
//!
//! In-memory implementation of gazette's storage backend, primarily for testing.
//!
//! ```ignore
//! use gazette_core::prelude::*;
//! use gazette_mem::InMemoryEventStore;
//!
//! let log = EventLog::new(InMemoryEventStore::new());
//! log.save_event(NewEvent::article_created(42, json!({"title": "A"})).version(1).build()?)
//!     .await?;
//! let state = log.replay_events(AggregateType::Article, 42).await?;
//! ```

#![deny(missing_docs)]

mod event_store;

pub use event_store::*;
