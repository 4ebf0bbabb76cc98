use async_trait::async_trait;
use gazette_core::prelude::*;
use sqlx::{FromRow, PgPool};

use crate::migrations::{MigrationError, Migrator};

const EVENT_COLUMNS: &str = "id, event_type, aggregate_type, aggregate_id, event_data, metadata, \
                             user_id, created_at, version";

/// A postgres based event store.
///
/// Owns the `events` and `snapshots` tables. Rows are only ever inserted.
#[derive(Clone, Debug)]
pub struct PgEventStore {
    postgres: PgPool,
}

impl PgEventStore {
    /// Creates a new `PgEventStore`.
    pub fn new(postgres: PgPool) -> Self {
        log::debug!("Creating a new PgEventStore");
        Self { postgres }
    }

    /// Exposes the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.postgres
    }

    /// Initializes the event store, applying any pending migration. Returns how many were applied.
    pub async fn initialize(&self) -> Result<usize, MigrationError> {
        Migrator::new(self.postgres.clone()).run().await
    }
}

fn into_events(rows: Vec<PgDBEvent>) -> Result<Vec<Event>, PgEventStoreError> {
    rows.into_iter().map(Event::try_from).collect()
}

/// Postgres representation of the event
#[derive(Debug, FromRow)]
pub struct PgDBEvent {
    /// The id of the event
    pub id: i64,
    /// The type of the event
    pub event_type: String,
    /// The kind of aggregate this event belongs to
    pub aggregate_type: String,
    /// The aggregate this event belongs to
    pub aggregate_id: i64,
    /// The payload, as JSON text
    pub event_data: String,
    /// The provenance metadata, as JSON text
    pub metadata: Option<String>,
    /// Who caused the event
    pub user_id: Option<i64>,
    /// When the event was persisted
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// The producer supplied version
    pub version: i64,
}

impl TryFrom<PgDBEvent> for Event {
    type Error = PgEventStoreError;

    fn try_from(row: PgDBEvent) -> Result<Self, Self::Error> {
        Ok(Event {
            id: row.id,
            event_type: row.event_type.parse()?,
            aggregate_type: row.aggregate_type.parse()?,
            aggregate_id: row.aggregate_id,
            event_data: serde_json::from_str(&row.event_data)
                .map_err(PgEventStoreError::DeserializeError)?,
            metadata: row
                .metadata
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .map_err(PgEventStoreError::DeserializeError)?,
            user_id: row.user_id,
            created_at: row.created_at,
            version: stored_version(row.version)?,
        })
    }
}

/// Postgres representation of a snapshot
#[derive(Debug, FromRow)]
pub struct PgDBSnapshot {
    /// The id of the snapshot
    pub id: i64,
    /// The kind of aggregate the state belongs to
    pub aggregate_type: String,
    /// The aggregate the state belongs to
    pub aggregate_id: i64,
    /// The state, as JSON text
    pub state: String,
    /// The highest event version folded into the state
    pub version: i64,
    /// The id of the last event folded into the state
    pub last_event_id: i64,
    /// When the snapshot was persisted
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<PgDBSnapshot> for Snapshot {
    type Error = PgEventStoreError;

    fn try_from(row: PgDBSnapshot) -> Result<Self, Self::Error> {
        Ok(Snapshot {
            id: row.id,
            aggregate_type: row.aggregate_type.parse()?,
            aggregate_id: row.aggregate_id,
            state: serde_json::from_str(&row.state).map_err(PgEventStoreError::DeserializeError)?,
            version: stored_version(row.version)?,
            last_event_id: row.last_event_id,
            created_at: row.created_at,
        })
    }
}

fn column_version(version: u64) -> Result<i64, PgEventStoreError> {
    i64::try_from(version).map_err(|_| PgEventStoreError::VersionOutOfRange(version))
}

fn stored_version(version: i64) -> Result<u64, PgEventStoreError> {
    u64::try_from(version).map_err(|_| PgEventStoreError::NegativeVersion(version))
}

/// Errors returned by the PgEventStore
#[derive(Debug, thiserror::Error)]
pub enum PgEventStoreError {
    /// A database error
    #[error("Database error: {0}")]
    DBError(#[from] sqlx::error::Error),
    /// Error serializing a payload before storing it
    #[error("Serialize payload error: {0}")]
    SerializeError(serde_json::Error),
    /// Error deserializing a stored payload
    #[error("Deserialize payload error: {0}")]
    DeserializeError(serde_json::Error),
    /// The stored event type is not known to this build
    #[error(transparent)]
    UnknownEventType(#[from] ParseEventTypeError),
    /// The stored aggregate type is not known to this build
    #[error(transparent)]
    UnknownAggregateType(#[from] ParseAggregateTypeError),
    /// The version doesn't fit in a BIGINT column
    #[error("Version {0} is out of range")]
    VersionOutOfRange(u64),
    /// A stored version is negative
    #[error("Stored version {0} is negative")]
    NegativeVersion(i64),
}

#[async_trait]
impl EventStoreBackend for PgEventStore {
    type Error = PgEventStoreError;

    async fn save_event(&self, event: NewEvent) -> Result<i64, Self::Error> {
        let version = column_version(event.version)?;
        let event_data =
            serde_json::to_string(&event.event_data).map_err(PgEventStoreError::SerializeError)?;
        let metadata = event
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(PgEventStoreError::SerializeError)?;

        let mut tx = self.postgres.begin().await?;
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO events (event_type, aggregate_type, aggregate_id, event_data, metadata, user_id, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(event.event_type.as_str())
        .bind(event.aggregate_type.as_str())
        .bind(event.aggregate_id)
        .bind(event_data)
        .bind(metadata)
        .bind(event.user_id)
        .bind(version)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        log::debug!(
            "Stored {} event {} for {} {}",
            event.event_type,
            id,
            event.aggregate_type,
            event.aggregate_id
        );
        Ok(id)
    }

    async fn get_events_by_aggregate(
        &self,
        aggregate_type: AggregateType,
        aggregate_id: i64,
    ) -> Result<Vec<Event>, Self::Error> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE aggregate_type = $1 AND aggregate_id = $2 \
             ORDER BY created_at ASC, version ASC, id ASC"
        );
        let rows = sqlx::query_as::<_, PgDBEvent>(&sql)
            .bind(aggregate_type.as_str())
            .bind(aggregate_id)
            .fetch_all(&self.postgres)
            .await?;
        into_events(rows)
    }

    async fn get_events_by_aggregate_after(
        &self,
        aggregate_type: AggregateType,
        aggregate_id: i64,
        after_event_id: i64,
    ) -> Result<Vec<Event>, Self::Error> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE aggregate_type = $1 AND aggregate_id = $2 AND id > $3 \
             ORDER BY created_at ASC, version ASC, id ASC"
        );
        let rows = sqlx::query_as::<_, PgDBEvent>(&sql)
            .bind(aggregate_type.as_str())
            .bind(aggregate_id)
            .bind(after_event_id)
            .fetch_all(&self.postgres)
            .await?;
        into_events(rows)
    }

    async fn get_events_by_type(
        &self,
        event_type: EventType,
        limit: u32,
    ) -> Result<Vec<Event>, Self::Error> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE event_type = $1 \
             ORDER BY id ASC \
             LIMIT $2"
        );
        let rows = sqlx::query_as::<_, PgDBEvent>(&sql)
            .bind(event_type.as_str())
            .bind(i64::from(limit))
            .fetch_all(&self.postgres)
            .await?;
        into_events(rows)
    }

    async fn get_events_since(&self, cursor: i64, limit: u32) -> Result<Vec<Event>, Self::Error> {
        log::debug!("Reading up to {} events after id {}", limit, cursor);
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE id > $1 \
             ORDER BY id ASC \
             LIMIT $2"
        );
        let rows = sqlx::query_as::<_, PgDBEvent>(&sql)
            .bind(cursor)
            .bind(i64::from(limit))
            .fetch_all(&self.postgres)
            .await?;
        into_events(rows)
    }

    async fn save_snapshot(&self, snapshot: NewSnapshot) -> Result<i64, Self::Error> {
        let version = column_version(snapshot.version)?;
        let state =
            serde_json::to_string(&snapshot.state).map_err(PgEventStoreError::SerializeError)?;

        let mut tx = self.postgres.begin().await?;
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO snapshots (aggregate_type, aggregate_id, state, version, last_event_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(snapshot.aggregate_type.as_str())
        .bind(snapshot.aggregate_id)
        .bind(state)
        .bind(version)
        .bind(snapshot.last_event_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        log::debug!(
            "Stored snapshot {} for {} {} at version {}",
            id,
            snapshot.aggregate_type,
            snapshot.aggregate_id,
            snapshot.version
        );
        Ok(id)
    }

    async fn get_latest_snapshot(
        &self,
        aggregate_type: AggregateType,
        aggregate_id: i64,
    ) -> Result<Option<Snapshot>, Self::Error> {
        let row = sqlx::query_as::<_, PgDBSnapshot>(
            r#"
            SELECT id, aggregate_type, aggregate_id, state, version, last_event_id, created_at
            FROM snapshots
            WHERE aggregate_type = $1 AND aggregate_id = $2
            ORDER BY version DESC, last_event_id DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(aggregate_type.as_str())
        .bind(aggregate_id)
        .fetch_optional(&self.postgres)
        .await?;

        row.map(Snapshot::try_from).transpose()
    }
}
