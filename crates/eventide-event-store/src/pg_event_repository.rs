//! `PostgreSQL` implementation of the `EventRepository` trait.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgConnection, PgPool, Postgres, QueryBuilder};
use tracing::{debug, instrument};

use eventide_core::error::StoreError;
use eventide_core::event::{EventId, NewEvent, StoredEvent};
use eventide_core::filter::{ReadOptions, StreamDefinition};
use eventide_core::id::IdGenerator;
use eventide_core::repository::{EventRepository, merge_streams};

use crate::config::TableConfig;
use crate::sql::{push_data_filter, push_types, read_error, write_error};

const COLUMNS: &str = "id, type, data, created_at, updated_at";

#[derive(FromRow)]
struct EventRow {
    id: String,
    #[sqlx(rename = "type")]
    event_type: String,
    data: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<EventRow> for StoredEvent {
    fn from(row: EventRow) -> Self {
        Self {
            id: EventId::new(row.id),
            event_type: row.event_type,
            data: row.data,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// PostgreSQL-backed event repository.
///
/// Ids come from [`IdGenerator::shared`] unless replaced, so every
/// repository in the process issues ids from one increasing sequence.
#[derive(Debug, Clone)]
pub struct PgEventRepository {
    pool: PgPool,
    table: TableConfig,
    ids: Arc<IdGenerator>,
}

impl PgEventRepository {
    /// Creates a repository over the default `events` table.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self::with_table(pool, TableConfig::events())
    }

    /// Creates a repository over `table`.
    #[must_use]
    pub fn with_table(pool: PgPool, table: TableConfig) -> Self {
        Self {
            pool,
            table,
            ids: IdGenerator::shared(),
        }
    }

    /// Replaces the id generator, for example with one on a fixed clock.
    #[must_use]
    pub fn with_id_generator(mut self, ids: Arc<IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// The table this repository reads and writes.
    #[must_use]
    pub fn table(&self) -> &TableConfig {
        &self.table
    }

    /// Appends one event on `conn`, which may be inside a caller-owned
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Write` if the insert is rejected.
    #[instrument(skip_all, fields(event_type = %event.event_type))]
    pub async fn append_in(
        &self,
        conn: &mut PgConnection,
        event: NewEvent,
    ) -> Result<StoredEvent, StoreError> {
        let id = match event.id {
            Some(id) => id,
            None => self.ids.next_id()?,
        };
        let sql = format!(
            "INSERT INTO {} (id, type, data) VALUES ($1, $2, $3) RETURNING {COLUMNS}",
            self.table.qualified_name()
        );
        let row = sqlx::query_as::<_, EventRow>(&sql)
            .bind(id.into_inner())
            .bind(event.event_type)
            .bind(event.data)
            .fetch_one(&mut *conn)
            .await
            .map_err(write_error)?;

        debug!(id = %row.id, "appended event");
        Ok(row.into())
    }

    /// Appends all events on `conn` in one statement, assigning fresh ids in
    /// input order.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Write` if any row is rejected; none are persisted.
    #[instrument(skip_all, fields(count = events.len()))]
    pub async fn append_batch_in(
        &self,
        conn: &mut PgConnection,
        events: Vec<NewEvent>,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        if events.is_empty() {
            return Ok(Vec::new());
        }
        let ids = self.ids.next_ids(events.len())?;

        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
            "INSERT INTO {} (id, type, data) ",
            self.table.qualified_name()
        ));
        builder.push_values(events.into_iter().zip(ids), |mut row, (event, id)| {
            row.push_bind(id.into_inner())
                .push_bind(event.event_type)
                .push_bind(event.data);
        });
        builder.push(format!(" RETURNING {COLUMNS}"));

        let mut stored: Vec<StoredEvent> = builder
            .build_query_as::<EventRow>()
            .fetch_all(&mut *conn)
            .await
            .map_err(write_error)?
            .into_iter()
            .map(StoredEvent::from)
            .collect();
        stored.sort_by(|a, b| a.id.cmp(&b.id));

        debug!(count = stored.len(), "appended event batch");
        Ok(stored)
    }

    fn select_stream(
        &self,
        types: &[&str],
        options: &ReadOptions,
        limit: Option<i64>,
    ) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::new(format!(
            "SELECT {COLUMNS} FROM {} AS e WHERE TRUE",
            self.table.qualified_name()
        ));
        push_types(&mut builder, "e", types);
        if let Some(after) = &options.after {
            builder.push(" AND e.id > ");
            builder.push_bind(after.as_str().to_owned());
        }
        push_data_filter(&mut builder, "e", &options.data);
        builder.push(" ORDER BY e.id");
        if let Some(limit) = limit {
            builder.push(" LIMIT ");
            builder.push_bind(limit);
        }
        builder
    }
}

#[async_trait]
impl EventRepository for PgEventRepository {
    async fn append(&self, event: NewEvent) -> Result<StoredEvent, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(write_error)?;
        self.append_in(&mut conn, event).await
    }

    async fn append_batch(&self, events: Vec<NewEvent>) -> Result<Vec<StoredEvent>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(write_error)?;
        self.append_batch_in(&mut conn, events).await
    }

    #[instrument(skip_all, fields(event_type = %event_type))]
    async fn latest(
        &self,
        event_type: &str,
        options: &ReadOptions,
    ) -> Result<Option<StoredEvent>, StoreError> {
        let row = self
            .select_stream(&[event_type], options, Some(1))
            .build_query_as::<EventRow>()
            .fetch_optional(&self.pool)
            .await
            .map_err(read_error)?;
        Ok(row.map(StoredEvent::from))
    }

    #[instrument(skip_all, fields(types = ?types))]
    async fn read_stream(
        &self,
        types: &[&str],
        options: &ReadOptions,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        if types.is_empty() {
            return Ok(Vec::new());
        }
        let rows = self
            .select_stream(types, options, None)
            .build_query_as::<EventRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(read_error)?;

        debug!(count = rows.len(), "read stream");
        Ok(rows.into_iter().map(StoredEvent::from).collect())
    }

    #[instrument(skip_all, fields(streams = streams.len()))]
    async fn read_streams(
        &self,
        streams: &[StreamDefinition],
        after: Option<&EventId>,
    ) -> Result<Vec<StoredEvent>, StoreError> {
        if streams.is_empty() {
            return Ok(Vec::new());
        }
        let mut tx = self.pool.begin().await.map_err(read_error)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(read_error)?;

        let mut slices: Vec<Vec<StoredEvent>> = Vec::with_capacity(streams.len());
        for stream in streams.iter().filter(|s| !s.types.is_empty()) {
            let options = stream.read_options(after);
            let rows = self
                .select_stream(&stream.type_refs(), &options, None)
                .build_query_as::<EventRow>()
                .fetch_all(&mut *tx)
                .await
                .map_err(read_error)?;
            slices.push(rows.into_iter().map(StoredEvent::from).collect());
        }
        tx.commit().await.map_err(read_error)?;

        let merged = merge_streams(slices);
        debug!(count = merged.len(), "read streams");
        Ok(merged)
    }

    #[instrument(
        skip_all,
        fields(event_type = %event.event_type, since = %since, streams = streams.len())
    )]
    async fn append_with_stream_validation(
        &self,
        event: NewEvent,
        since: &EventId,
        streams: &[StreamDefinition],
    ) -> Result<StoredEvent, StoreError> {
        let id = match event.id {
            Some(id) => id,
            None => self.ids.next_id()?,
        };
        let table = self.table.qualified_name();

        let mut tx = self.pool.begin().await.map_err(write_error)?;
        sqlx::query(&format!("LOCK TABLE {table} IN SHARE ROW EXCLUSIVE MODE"))
            .execute(&mut *tx)
            .await
            .map_err(write_error)?;

        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new(format!("INSERT INTO {table} (id, type, data) SELECT "));
        builder.push_bind(id.into_inner());
        builder.push(", ");
        builder.push_bind(event.event_type);
        builder.push(", ");
        builder.push_bind(event.data);
        builder.push(" WHERE TRUE");
        for stream in streams.iter().filter(|s| !s.types.is_empty()) {
            builder.push(format!(
                " AND NOT EXISTS (SELECT 1 FROM {table} AS e WHERE e.id > "
            ));
            builder.push_bind(since.as_str().to_owned());
            push_types(&mut builder, "e", &stream.type_refs());
            push_data_filter(&mut builder, "e", &stream.identifier);
            builder.push(")");
        }
        builder.push(format!(" RETURNING {COLUMNS}"));

        let row = builder
            .build_query_as::<EventRow>()
            .fetch_optional(&mut *tx)
            .await
            .map_err(write_error)?;

        let Some(row) = row else {
            tx.rollback().await.map_err(write_error)?;
            debug!("stream advanced; append rejected");
            return Err(StoreError::ConcurrencyConflict {
                since: since.clone(),
            });
        };
        tx.commit().await.map_err(write_error)?;

        debug!(id = %row.id, "appended validated event");
        Ok(row.into())
    }
}
