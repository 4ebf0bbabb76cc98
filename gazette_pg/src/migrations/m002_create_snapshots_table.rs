//! Migration 002: Create the snapshots table.

use super::Migration;

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS snapshots (
        id BIGSERIAL PRIMARY KEY,
        aggregate_type VARCHAR(32) NOT NULL,
        aggregate_id BIGINT NOT NULL,
        state TEXT NOT NULL,
        version BIGINT NOT NULL,
        last_event_id BIGINT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_snapshots_aggregate_version
    ON snapshots(aggregate_type, aggregate_id, version DESC, last_event_id DESC)
    "#,
];

/// Creates the snapshots table. Rows are never updated; the highest version wins.
pub struct CreateSnapshotsTable;

impl Migration for CreateSnapshotsTable {
    fn version(&self) -> i64 {
        2
    }

    fn name(&self) -> &'static str {
        "create_snapshots_table"
    }

    fn statements(&self) -> &'static [&'static str] {
        STATEMENTS
    }
}
