//! Postgres-backed event store implementation.
//!
//! Events live in the append-only `integration_events` table (see
//! `crates/infra/migrations/`). The database assigns both identity columns:
//! `id` from a `BIGSERIAL` sequence and `occurred_at` from `clock_timestamp()`,
//! raised to the latest stored timestamp if the clock is behind it.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `EventStoreError` as follows:
//!
//! | SQLx Error | EventStoreError | Scenario |
//! |------------|-----------------|----------|
//! | PoolClosed / PoolTimedOut / Io / Tls | `Unavailable` | Database not reachable |
//! | Database (any SQLSTATE) | `Backend` | Constraint violation, permission error, ... |
//! | ColumnDecode / Decode / ColumnNotFound | `Corrupt` | Row does not match the record shape |
//! | Other | `Backend` | Anything else |
//!
//! ## Thread Safety
//!
//! `PostgresEventStore` is `Send + Sync` and cheap to clone. Reads each take
//! their own pooled connection. Inserts run in a transaction that first takes
//! a transaction-scoped advisory lock, so concurrent publishers are committed
//! one at a time and `occurred_at` never decreases in `id` order, even when
//! the server clock steps backwards.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{Span, instrument};

use civicgate_core::{EventId, EventType, ModuleName};
use civicgate_events::{EventRecord, NewEvent};

use super::query::EventFilter;
use super::r#trait::{EventRecordStore, EventStoreError};

const SCHEMA: &str = include_str!("../../migrations/0001_create_integration_events.sql");

/// Advisory lock key held by every insert transaction (`"civicgate"` in ASCII).
const INSERT_LOCK_KEY: i64 = 0x63_69_76_69_63_67_61_74;

/// Postgres-backed append-only event store.
#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Create a store over an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a fresh pool to `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, EventStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the `integration_events` table and indexes if missing.
    pub async fn ensure_schema(&self) -> Result<(), EventStoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl EventRecordStore for PostgresEventStore {
    #[instrument(
        skip(self, event),
        fields(
            event_type = %event.event_type,
            source_module = %event.source_module,
            event_id = tracing::field::Empty
        ),
        err
    )]
    async fn insert(&self, event: NewEvent) -> Result<EventRecord, EventStoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // Serialize writers so that id order and occurred_at order agree: both
        // `nextval` and the timestamp are taken while the lock is held.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(INSERT_LOCK_KEY)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("acquire_insert_lock", e))?;

        let row = sqlx::query(
            r#"
            INSERT INTO integration_events (event_type, source_module, payload, occurred_at)
            VALUES (
                $1, $2, $3,
                GREATEST(clock_timestamp(), (SELECT max(occurred_at) FROM integration_events))
            )
            RETURNING id, occurred_at
            "#,
        )
        .bind(event.event_type.as_str())
        .bind(event.source_module.as_str())
        .bind(&event.payload)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_event", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        let raw_id: i64 = row
            .try_get("id")
            .map_err(|e| map_sqlx_error("read_inserted_id", e))?;
        let occurred_at: DateTime<Utc> = row
            .try_get("occurred_at")
            .map_err(|e| map_sqlx_error("read_inserted_timestamp", e))?;
        let id = EventId::new(raw_id).map_err(|e| EventStoreError::Corrupt(e.to_string()))?;

        Span::current().record("event_id", raw_id);
        Ok(event.into_record(id, occurred_at))
    }

    #[instrument(skip(self), err)]
    async fn get_by_id(&self, id: EventId) -> Result<Option<EventRecord>, EventStoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, event_type, source_module, payload, occurred_at
            FROM integration_events
            WHERE id = $1
            "#,
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_by_id", e))?;

        row.as_ref().map(record_from_row).transpose()
    }

    #[instrument(
        skip(self, filter),
        fields(
            event_type = ?filter.event_type.as_ref().map(EventType::as_str),
            source_module = ?filter.source_module.as_ref().map(ModuleName::as_str),
            limit = filter.limit,
            result_count = tracing::field::Empty
        ),
        err
    )]
    async fn query(&self, filter: &EventFilter) -> Result<Vec<EventRecord>, EventStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, event_type, source_module, payload, occurred_at
            FROM integration_events
            WHERE ($1::text IS NULL OR event_type = $1)
                AND ($2::text IS NULL OR source_module = $2)
                AND ($3::timestamptz IS NULL OR occurred_at >= $3)
                AND ($4::timestamptz IS NULL OR occurred_at <= $4)
            ORDER BY occurred_at DESC, id DESC
            LIMIT $5
            "#,
        )
        .bind(filter.event_type.as_ref().map(EventType::as_str))
        .bind(filter.source_module.as_ref().map(ModuleName::as_str))
        .bind(filter.from)
        .bind(filter.to)
        .bind(i64::from(filter.limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("query_events", e))?;

        let records = rows
            .iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Span::current().record("result_count", records.len());
        Ok(records)
    }
}

fn record_from_row(row: &PgRow) -> Result<EventRecord, EventStoreError> {
    let raw_id: i64 = row.try_get("id").map_err(|e| map_sqlx_error("decode_row", e))?;
    let event_type: String = row
        .try_get("event_type")
        .map_err(|e| map_sqlx_error("decode_row", e))?;
    let source_module: String = row
        .try_get("source_module")
        .map_err(|e| map_sqlx_error("decode_row", e))?;
    let payload: serde_json::Value = row
        .try_get("payload")
        .map_err(|e| map_sqlx_error("decode_row", e))?;
    let timestamp: DateTime<Utc> = row
        .try_get("occurred_at")
        .map_err(|e| map_sqlx_error("decode_row", e))?;

    let corrupt = |e: civicgate_core::DomainError| {
        EventStoreError::Corrupt(format!("row {raw_id}: {e}"))
    };

    Ok(EventRecord {
        id: EventId::new(raw_id).map_err(corrupt)?,
        event_type: EventType::parse(event_type).map_err(corrupt)?,
        source_module: ModuleName::parse(source_module).map_err(corrupt)?,
        payload,
        timestamp,
    })
}

/// Map SQLx errors to EventStoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> EventStoreError {
    match err {
        sqlx::Error::PoolClosed => {
            EventStoreError::Unavailable(format!("connection pool closed in {operation}"))
        }
        sqlx::Error::PoolTimedOut => {
            EventStoreError::Unavailable(format!("connection pool timed out in {operation}"))
        }
        sqlx::Error::Io(e) => EventStoreError::Unavailable(format!("io error in {operation}: {e}")),
        sqlx::Error::Tls(e) => EventStoreError::Unavailable(format!("tls error in {operation}: {e}")),
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|c| c.to_string()).unwrap_or_default();
            EventStoreError::Backend(format!(
                "database error in {operation} [{code}]: {}",
                db_err.message()
            ))
        }
        err @ (sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::ColumnNotFound(_)) => {
            EventStoreError::Corrupt(format!("decode error in {operation}: {err}"))
        }
        other => EventStoreError::Backend(format!("sqlx error in {operation}: {other}")),
    }
}
