//! # Gazette postgres store

#![deny(missing_docs)]

/// The event_store module exports the EventStoreBackend implementation for postgres
pub mod event_store;

/// Database migrations for gazette_pg schema management
pub mod migrations;

pub use event_store::*;
pub use migrations::{AppliedMigration, Migration, MigrationError, Migrator};
