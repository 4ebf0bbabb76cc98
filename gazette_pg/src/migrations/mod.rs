//! Database migration system for gazette_pg.
//!
//! Migrations are versioned, checksummed, and tracked in the `_gazette_migrations` table.
//!
//! # Usage
//!
//! ```rust,ignore
//! use gazette_pg::migrations::Migrator;
//! use sqlx::PgPool;
//!
//! let pool = PgPool::connect("postgres://...").await?;
//! let migrator = Migrator::new(pool);
//!
//! // Run all pending migrations
//! let applied = migrator.run().await?;
//! println!("Applied {} migrations", applied);
//!
//! // Check current version
//! println!("Current version: {}", migrator.current_version().await?);
//! ```
//!
//! # Adding New Migrations
//!
//! 1. Create a new file `mXXX_description.rs` in this directory
//! 2. Implement the `Migration` trait
//! 3. Add the migration to the `MIGRATIONS` array in this file

mod m001_create_events_table;
mod m002_create_snapshots_table;

use m001_create_events_table::CreateEventsTable;
use m002_create_snapshots_table::CreateSnapshotsTable;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::collections::HashSet;

/// All migrations in order. Add new migrations to the end.
///
/// Migrations only go forward: there is no `down()`. Fix a bad migration with a new one.
const MIGRATIONS: &[&dyn Migration] = &[&CreateEventsTable, &CreateSnapshotsTable];

/// Errors that can occur during migration operations.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// An applied migration no longer matches the code that describes it.
    #[error("Migration {version} ({name}) checksum mismatch: recorded {recorded}, computed {computed}")]
    ChecksumMismatch {
        /// The version of the migration.
        version: i64,
        /// The name of the migration.
        name: String,
        /// The checksum stored when the migration was applied.
        recorded: String,
        /// The checksum of the migration in this build.
        computed: String,
    },

    /// A migration failed to execute.
    #[error("Migration {version} ({name}) failed: {reason}")]
    MigrationFailed {
        /// The version of the migration that failed.
        version: i64,
        /// The name of the migration.
        name: String,
        /// The reason for the failure.
        reason: String,
    },
}

/// A single schema change.
///
/// ```rust,ignore
/// pub struct AddEventsUserIndex;
///
/// impl Migration for AddEventsUserIndex {
///     fn version(&self) -> i64 { 3 }
///
///     fn name(&self) -> &'static str { "add_events_user_index" }
///
///     fn statements(&self) -> &'static [&'static str] {
///         &["CREATE INDEX IF NOT EXISTS idx_events_user ON events(user_id)"]
///     }
/// }
/// ```
#[async_trait]
pub trait Migration: Send + Sync {
    /// Unique, increasing version number.
    fn version(&self) -> i64;

    /// Human-readable name, e.g. `create_events_table`.
    fn name(&self) -> &'static str;

    /// The SQL statements of the change, run in order.
    fn statements(&self) -> &'static [&'static str];

    /// Applies the change inside `tx`. The `Migrator` commits it.
    async fn up<'a>(&self, tx: &mut Transaction<'a, Postgres>) -> Result<(), MigrationError> {
        for statement in self.statements() {
            sqlx::query(*statement).execute(&mut **tx).await?;
        }
        Ok(())
    }

    /// SHA-256 of version, name and statements, recorded when the migration is applied. Editing
    /// an applied migration's SQL changes it.
    fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.version().to_le_bytes());
        hasher.update(self.name().as_bytes());
        for statement in self.statements() {
            hasher.update(statement.as_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Record of a migration that has been applied.
#[derive(Debug, Clone)]
pub struct AppliedMigration {
    /// The version number of the migration.
    pub version: i64,
    /// The name of the migration.
    pub name: String,
    /// When the migration was applied.
    pub applied_at: chrono::DateTime<chrono::Utc>,
    /// The checksum recorded when the migration was applied.
    pub checksum: String,
}

/// Applies the gazette schema, each migration exactly once and in order.
#[derive(Debug, Clone)]
pub struct Migrator {
    pool: PgPool,
}

impl Migrator {
    /// Creates a new migrator with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn ensure_tracking_table(&self) -> Result<(), MigrationError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _gazette_migrations (
                version BIGINT PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                checksum VARCHAR(64) NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn verify_checksums(applied: &[AppliedMigration]) -> Result<(), MigrationError> {
        for record in applied {
            let Some(migration) = MIGRATIONS.iter().find(|m| m.version() == record.version) else {
                continue;
            };
            let computed = migration.checksum();
            if computed != record.checksum {
                return Err(MigrationError::ChecksumMismatch {
                    version: record.version,
                    name: record.name.clone(),
                    recorded: record.checksum.clone(),
                    computed,
                });
            }
        }
        Ok(())
    }

    async fn apply(&self, migration: &dyn Migration) -> Result<(), MigrationError> {
        let mut tx = self.pool.begin().await?;

        migration.up(&mut tx).await.map_err(|e| match e {
            MigrationError::Database(db_err) => MigrationError::MigrationFailed {
                version: migration.version(),
                name: migration.name().to_string(),
                reason: db_err.to_string(),
            },
            other => other,
        })?;

        sqlx::query(
            r#"
            INSERT INTO _gazette_migrations (version, name, checksum)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(migration.version())
        .bind(migration.name())
        .bind(migration.checksum())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Runs all pending migrations and returns how many were applied.
    ///
    /// Each migration commits in its own transaction, so a failure leaves the earlier ones in
    /// place.
    pub async fn run(&self) -> Result<usize, MigrationError> {
        let applied = self.applied().await?;
        Self::verify_checksums(&applied)?;

        let applied_versions: HashSet<i64> = applied.iter().map(|m| m.version).collect();
        let mut count = 0;
        for migration in MIGRATIONS {
            if applied_versions.contains(&migration.version()) {
                log::debug!(
                    "Migration {} ({}) already applied",
                    migration.version(),
                    migration.name()
                );
                continue;
            }

            log::info!(
                "Applying migration {} ({})",
                migration.version(),
                migration.name()
            );
            self.apply(*migration).await?;
            count += 1;
        }

        if count > 0 {
            log::info!("Applied {} migrations", count);
        }
        Ok(count)
    }

    /// Returns the current migration version (0 if no migrations applied).
    pub async fn current_version(&self) -> Result<i64, MigrationError> {
        self.ensure_tracking_table().await?;

        let (version,): (i64,) =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM _gazette_migrations")
                .fetch_one(&self.pool)
                .await?;

        Ok(version)
    }

    /// Returns the migrations not applied yet.
    pub async fn pending(&self) -> Result<Vec<&'static dyn Migration>, MigrationError> {
        let applied_versions: HashSet<i64> =
            self.applied().await?.iter().map(|m| m.version).collect();

        Ok(MIGRATIONS
            .iter()
            .filter(|m| !applied_versions.contains(&m.version()))
            .copied()
            .collect())
    }

    /// Returns the applied migrations, oldest first.
    pub async fn applied(&self) -> Result<Vec<AppliedMigration>, MigrationError> {
        self.ensure_tracking_table().await?;

        let rows = sqlx::query(
            r#"
            SELECT version, name, applied_at, checksum
            FROM _gazette_migrations
            ORDER BY version ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| AppliedMigration {
                version: row.get("version"),
                name: row.get("name"),
                applied_at: row.get("applied_at"),
                checksum: row.get("checksum"),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn migration_checksum_is_deterministic() {
        assert_eq!(CreateEventsTable.checksum(), CreateEventsTable.checksum());
        assert_eq!(CreateEventsTable.checksum().len(), 64);
    }

    #[test]
    fn different_migrations_have_different_checksums() {
        assert_ne!(CreateEventsTable.checksum(), CreateSnapshotsTable.checksum());
    }

    struct EditedEventsTable;

    impl Migration for EditedEventsTable {
        fn version(&self) -> i64 {
            CreateEventsTable.version()
        }

        fn name(&self) -> &'static str {
            CreateEventsTable.name()
        }

        fn statements(&self) -> &'static [&'static str] {
            &["CREATE TABLE IF NOT EXISTS events (id BIGSERIAL PRIMARY KEY)"]
        }
    }

    #[test]
    fn editing_statements_changes_checksum() {
        assert_eq!(CreateEventsTable.version(), EditedEventsTable.version());
        assert_eq!(CreateEventsTable.name(), EditedEventsTable.name());
        assert_ne!(CreateEventsTable.checksum(), EditedEventsTable.checksum());
    }

    #[test]
    fn migrations_are_in_order_with_unique_names() {
        let versions: Vec<i64> = MIGRATIONS.iter().map(|m| m.version()).collect();
        assert!(versions.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(versions.first(), Some(&1));

        let names: HashSet<&str> = MIGRATIONS.iter().map(|m| m.name()).collect();
        assert_eq!(names.len(), MIGRATIONS.len());
    }

    fn record(migration: &dyn Migration, checksum: String) -> AppliedMigration {
        AppliedMigration {
            version: migration.version(),
            name: migration.name().to_string(),
            applied_at: Utc::now(),
            checksum,
        }
    }

    #[test]
    fn verify_checksums_accepts_matching_records() {
        let applied = vec![
            record(&CreateEventsTable, CreateEventsTable.checksum()),
            record(&CreateSnapshotsTable, CreateSnapshotsTable.checksum()),
        ];
        assert!(Migrator::verify_checksums(&applied).is_ok());
    }

    #[test]
    fn verify_checksums_rejects_tampered_records() {
        let applied = vec![record(&CreateSnapshotsTable, "0".repeat(64))];
        match Migrator::verify_checksums(&applied) {
            Err(MigrationError::ChecksumMismatch { version, name, .. }) => {
                assert_eq!(version, 2);
                assert_eq!(name, "create_snapshots_table");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
