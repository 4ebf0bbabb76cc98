//! Migration 001: Create the events table.
//!
//! The append-only log itself. Payloads are stored as JSON text.

use super::Migration;

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS events (
        id BIGSERIAL PRIMARY KEY,
        event_type VARCHAR(64) NOT NULL,
        aggregate_type VARCHAR(32) NOT NULL,
        aggregate_id BIGINT NOT NULL,
        event_data TEXT NOT NULL,
        metadata TEXT,
        user_id BIGINT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        version BIGINT NOT NULL
    )
    "#,
    // Replay reads one aggregate at a time
    r#"
    CREATE INDEX IF NOT EXISTS idx_events_aggregate
    ON events(aggregate_type, aggregate_id, id)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_events_event_type
    ON events(event_type, id)
    "#,
];

/// Creates the events table and its lookup indexes.
pub struct CreateEventsTable;

impl Migration for CreateEventsTable {
    fn version(&self) -> i64 {
        1
    }

    fn name(&self) -> &'static str {
        "create_events_table"
    }

    fn statements(&self) -> &'static [&'static str] {
        STATEMENTS
    }
}
