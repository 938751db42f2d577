use async_trait::async_trait;
use common::{OrderId, RecordId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    EventRecord, EventStatus, EventStoreError, NewEventRecord, Result, store::EventStore,
};

const RECORD_COLUMNS: &str =
    "id, order_id, event_type, payload, status, created_at, replayed_at";

/// PostgreSQL-backed event store implementation.
///
/// Status changes are applied with a conditional `UPDATE` so a transition
/// raced by another writer fails instead of overwriting it.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Creates a new PostgreSQL event store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_record(row: PgRow) -> Result<EventRecord> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<EventStatus>()
            .map_err(EventStoreError::UnknownStatus)?;

        Ok(EventRecord {
            id: RecordId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::new(row.try_get::<String, _>("order_id")?),
            event_type: row.try_get("event_type")?,
            payload: row.try_get("payload")?,
            status,
            created_at: row.try_get("created_at")?,
            replayed_at: row.try_get("replayed_at")?,
        })
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn append(&self, record: NewEventRecord) -> Result<EventRecord> {
        if !record.status.is_initial() {
            return Err(EventStoreError::InvalidInitialStatus(record.status));
        }

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO event_records (id, order_id, event_type, payload, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(record.id.as_uuid())
        .bind(record.order_id.as_str())
        .bind(&record.event_type)
        .bind(&record.payload)
        .bind(record.status.as_str())
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_record(row)
    }

    async fn get(&self, id: RecordId) -> Result<Option<EventRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM event_records WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn fetch_replayable(&self, limit: usize) -> Result<Vec<EventRecord>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM event_records
            WHERE status IN ('pending', 'failed')
            ORDER BY created_at ASC, seq ASC
            LIMIT $1
            "#
        ))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn transition(&self, id: RecordId, to: EventStatus) -> Result<EventRecord> {
        let allowed: Vec<String> = to
            .allowed_predecessors()
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();

        let row = sqlx::query(&format!(
            r#"
            UPDATE event_records
            SET status = $2,
                replayed_at = CASE WHEN $2 = 'completed' THEN now() ELSE replayed_at END
            WHERE id = $1 AND status = ANY($3)
            RETURNING {RECORD_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(to.as_str())
        .bind(&allowed)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Self::row_to_record(row);
        }

        // Nothing updated: either the record is missing or its status forbids the edge.
        match self.get(id).await? {
            Some(current) => Err(EventStoreError::InvalidStatusTransition {
                id,
                from: current.status,
                to,
            }),
            None => Err(EventStoreError::RecordNotFound(id)),
        }
    }

    async fn count_by_status(&self, status: EventStatus) -> Result<usize> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM event_records WHERE status = $1")
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await?;

        Ok(usize::try_from(count).unwrap_or_default())
    }
}
