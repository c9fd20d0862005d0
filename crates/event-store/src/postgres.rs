use std::collections::HashMap;

use async_trait::async_trait;
use common::Issuer;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AggregateId, EventEnvelope, EventId, EventQuery, EventStoreError, Result, Version,
    store::{
        AppendOptions, EventStore, EventStream, check_append_position, validate_events_for_append,
    },
};

const SELECT_COLUMNS: &str = "sequence, id, event_type, aggregate_id, aggregate_type, version, timestamp, issuer, payload, metadata";

/// PostgreSQL-backed event store.
///
/// The `events` table carries a `unique_aggregate_version` constraint on
/// `(aggregate_id, version)`. The version check and the inserts run in one
/// transaction, and a racing writer that slips past the check is stopped by
/// the constraint, which is reported as `ConcurrencyConflict`.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Creates a new PostgreSQL event store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `database_url` and returns a store over a fresh pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_event(row: PgRow) -> Result<EventEnvelope> {
        let metadata_json: serde_json::Value = row.try_get("metadata")?;
        let metadata: HashMap<String, serde_json::Value> = serde_json::from_value(metadata_json)?;
        let issuer: Issuer = serde_json::from_value(row.try_get("issuer")?)?;

        Ok(EventEnvelope {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
            event_type: row.try_get("event_type")?,
            aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
            aggregate_type: row.try_get("aggregate_type")?,
            version: Version::new(row.try_get("version")?),
            sequence: row.try_get("sequence")?,
            timestamp: row.try_get("timestamp")?,
            issuer,
            payload: row.try_get("payload")?,
            metadata,
        })
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    #[tracing::instrument(skip(self, events), fields(count = events.len()))]
    async fn append(&self, events: Vec<EventEnvelope>, options: AppendOptions) -> Result<Version> {
        validate_events_for_append(&events)?;

        let aggregate_id = events[0].aggregate_id;
        let first_new = events[0].version;

        let mut tx = self.pool.begin().await?;

        let current: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM events WHERE aggregate_id = $1")
                .bind(aggregate_id.as_uuid())
                .fetch_one(&mut *tx)
                .await?;
        let current = Version::new(current.unwrap_or(0));

        if let Err(err) = check_append_position(aggregate_id, current, first_new, &options) {
            if err.is_conflict() {
                metrics::counter!("event_store_conflicts_total").increment(1);
            }
            return Err(err);
        }

        let mut last_version = current;
        for event in &events {
            let metadata_json = serde_json::to_value(&event.metadata)?;
            let issuer_json = serde_json::to_value(&event.issuer)?;

            sqlx::query(
                r#"
                INSERT INTO events (id, event_type, aggregate_id, aggregate_type, version, timestamp, issuer, payload, metadata)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(event.event_id.as_uuid())
            .bind(&event.event_type)
            .bind(event.aggregate_id.as_uuid())
            .bind(&event.aggregate_type)
            .bind(event.version.as_i64())
            .bind(event.timestamp)
            .bind(issuer_json)
            .bind(&event.payload)
            .bind(metadata_json)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("unique_aggregate_version")
                {
                    metrics::counter!("event_store_conflicts_total").increment(1);
                    return EventStoreError::ConcurrencyConflict {
                        aggregate_id,
                        expected: options.expected_version.unwrap_or(current),
                        actual: event.version,
                    };
                }
                EventStoreError::Database(e)
            })?;

            last_version = event.version;
        }

        tx.commit().await?;
        metrics::counter!("event_store_appends_total").increment(1);
        Ok(last_version)
    }

    async fn get_events_for_aggregate(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<EventEnvelope>> {
        self.get_events_for_aggregate_from_version(aggregate_id, Version::first())
            .await
    }

    async fn get_events_for_aggregate_from_version(
        &self,
        aggregate_id: AggregateId,
        from_version: Version,
    ) -> Result<Vec<EventEnvelope>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM events WHERE aggregate_id = $1 AND version >= $2 ORDER BY version ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(aggregate_id.as_uuid())
            .bind(from_version.as_i64())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn get_events_by_aggregate_type(
        &self,
        aggregate_type: &str,
    ) -> Result<Vec<EventEnvelope>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM events WHERE aggregate_type = $1 ORDER BY sequence ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(aggregate_type)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn query_events(&self, query: EventQuery) -> Result<Vec<EventEnvelope>> {
        let mut sql = format!("SELECT {SELECT_COLUMNS} FROM events WHERE 1=1");
        let mut param_count = 0;

        if query.aggregate_id.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND aggregate_id = ${param_count}"));
        }
        if query.aggregate_types.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND aggregate_type = ANY(${param_count})"));
        }
        if query.event_types.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND event_type = ANY(${param_count})"));
        }
        if query.after_sequence.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND sequence > ${param_count}"));
        }

        sql.push_str(" ORDER BY sequence ASC");

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);
        if let Some(id) = query.aggregate_id {
            sqlx_query = sqlx_query.bind(id.as_uuid());
        }
        if let Some(types) = query.aggregate_types {
            sqlx_query = sqlx_query.bind(types);
        }
        if let Some(types) = query.event_types {
            sqlx_query = sqlx_query.bind(types);
        }
        if let Some(after) = query.after_sequence {
            sqlx_query = sqlx_query.bind(after);
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_event).collect()
    }

    async fn stream_all_events(&self) -> Result<EventStream> {
        use futures_util::StreamExt;

        let pool = self.pool.clone();
        let stream = async_stream_rows(pool).map(|result| match result {
            Ok(row) => Self::row_to_event(row),
            Err(e) => Err(EventStoreError::Database(e)),
        });

        Ok(Box::pin(stream))
    }

    async fn get_aggregate_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM events WHERE aggregate_id = $1")
                .bind(aggregate_id.as_uuid())
                .fetch_one(&self.pool)
                .await?;

        Ok(version.map(Version::new))
    }
}

/// Streams every row of the log in commit order.
///
/// The pool is moved into the stream so it outlives the `&self` borrow of
/// [`EventStore::stream_all_events`].
fn async_stream_rows(
    pool: PgPool,
) -> impl futures_core::Stream<Item = std::result::Result<PgRow, sqlx::Error>> + Send {
    use futures_util::StreamExt;

    futures_util::stream::once(async move {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM events ORDER BY sequence ASC");
        sqlx::query(&sql).fetch_all(&pool).await
    })
    .flat_map(|result| {
        let rows: Vec<std::result::Result<PgRow, sqlx::Error>> = match result {
            Ok(rows) => rows.into_iter().map(Ok).collect(),
            Err(e) => vec![Err(e)],
        };
        futures_util::stream::iter(rows)
    })
}
