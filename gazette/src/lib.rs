//! # Gazette
//!
//! Event log of the news reader backend: typed article and user events, by-aggregate and
//! cursor reads, and snapshot-aware state replay. Storage backends are enabled with features.

#![deny(missing_docs)]

pub use gazette_core::*;

#[cfg(feature = "in-memory")]
/// In-memory storage backend.
pub mod mem {
    //! Contains the in-memory backend, mostly useful for tests.
    pub use gazette_mem::*;
}

#[cfg(feature = "postgres")]
/// Postgres storage backend.
pub mod pg {
    //! Contains the postgres backend and its migrations.
    pub use gazette_pg::*;
}

pub mod prelude {
    //! The prelude module for the `gazette` crate.
    pub use gazette_core::prelude::*;

    #[cfg(feature = "in-memory")]
    pub use super::mem::InMemoryEventStore;
    #[cfg(feature = "postgres")]
    pub use super::pg::{Migrator, PgEventStore};
}
