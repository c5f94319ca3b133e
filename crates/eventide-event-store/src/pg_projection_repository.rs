//! `PostgreSQL` implementation of the `ProjectionRepository` trait.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use tracing::{debug, instrument};

use eventide_core::error::StoreError;
use eventide_core::event::EventId;
use eventide_core::filter::DataFilter;
use eventide_core::repository::{
    ProjectionRecord, ProjectionRepository, SaveStatus, SavedProjection,
};

use crate::config::TableConfig;
use crate::sql::{push_data_filter, read_error, write_error};

#[derive(FromRow)]
struct ProjectionRow {
    data: Value,
    latest_event_id: String,
}

impl From<ProjectionRow> for ProjectionRecord {
    fn from(row: ProjectionRow) -> Self {
        Self {
            data: row.data,
            latest_event_id: EventId::new(row.latest_event_id),
        }
    }
}

#[derive(FromRow)]
struct SaveRow {
    status: String,
    data: Value,
    latest_event_id: String,
}

/// PostgreSQL-backed projection repository.
#[derive(Debug, Clone)]
pub struct PgProjectionRepository {
    pool: PgPool,
    table: TableConfig,
}

impl PgProjectionRepository {
    /// Creates a repository over the default `projections` table.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self::with_table(pool, TableConfig::projections())
    }

    /// Creates a repository over `table`.
    #[must_use]
    pub fn with_table(pool: PgPool, table: TableConfig) -> Self {
        Self { pool, table }
    }

    /// The table this repository reads and writes.
    #[must_use]
    pub fn table(&self) -> &TableConfig {
        &self.table
    }

    // The update branch is filtered out when the stored checkpoint is newer;
    // the second SELECT then reports the untouched row as skipped.
    fn upsert_sql(&self) -> String {
        let table = self.table.qualified_name();
        format!(
            r"
WITH upsert AS (
    INSERT INTO {table} AS p (type, id, data, latest_event_id)
    VALUES ($1, $2, $3, $4)
    ON CONFLICT (type, id) DO UPDATE
        SET data = EXCLUDED.data,
            latest_event_id = EXCLUDED.latest_event_id,
            updated_at = NOW()
        WHERE p.latest_event_id <= EXCLUDED.latest_event_id
    RETURNING (p.xmax = 0) AS inserted, p.data, p.latest_event_id
)
SELECT CASE WHEN inserted THEN 'created' ELSE 'updated' END AS status,
       data,
       latest_event_id
FROM upsert
UNION ALL
SELECT 'skipped' AS status, p.data, p.latest_event_id
FROM {table} AS p
WHERE p.type = $1 AND p.id = $2 AND NOT EXISTS (SELECT 1 FROM upsert)
"
        )
    }
}

#[async_trait]
impl ProjectionRepository for PgProjectionRepository {
    #[instrument(
        skip_all,
        fields(projection_type = %projection_type, id = %id, latest_event_id = %latest_event_id)
    )]
    async fn save(
        &self,
        projection_type: &str,
        id: &str,
        data: Value,
        latest_event_id: &EventId,
    ) -> Result<SavedProjection, StoreError> {
        let row = sqlx::query_as::<_, SaveRow>(&self.upsert_sql())
            .bind(projection_type)
            .bind(id)
            .bind(data)
            .bind(latest_event_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(write_error)?;

        let (status, record) = match row {
            Some(row) => (
                row.status.parse::<SaveStatus>()?,
                ProjectionRecord {
                    data: row.data,
                    latest_event_id: EventId::new(row.latest_event_id),
                },
            ),
            // A concurrent first insert won the conflict after our snapshot
            // was taken; its row is the one that stays.
            None => {
                let current = self.get(projection_type, id).await?.ok_or_else(|| {
                    StoreError::Write(format!(
                        "projection {projection_type}/{id} vanished during save"
                    ))
                })?;
                (SaveStatus::Skipped, current)
            }
        };

        debug!(status = %status, "saved projection");
        Ok(SavedProjection {
            status,
            projection_type: projection_type.to_owned(),
            id: id.to_owned(),
            data: record.data,
            latest_event_id: record.latest_event_id,
        })
    }

    #[instrument(skip_all, fields(projection_type = %projection_type, id = %id))]
    async fn get(
        &self,
        projection_type: &str,
        id: &str,
    ) -> Result<Option<ProjectionRecord>, StoreError> {
        let sql = format!(
            "SELECT data, latest_event_id FROM {} WHERE type = $1 AND id = $2",
            self.table.qualified_name()
        );
        let row = sqlx::query_as::<_, ProjectionRow>(&sql)
            .bind(projection_type)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(read_error)?;
        Ok(row.map(ProjectionRecord::from))
    }

    #[instrument(skip_all, fields(projection_type = %projection_type))]
    async fn query(
        &self,
        projection_type: &str,
        filter: &DataFilter,
    ) -> Result<Vec<ProjectionRecord>, StoreError> {
        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
            "SELECT p.data, p.latest_event_id FROM {} AS p WHERE p.type = ",
            self.table.qualified_name()
        ));
        builder.push_bind(projection_type.to_owned());
        push_data_filter(&mut builder, "p", filter);
        builder.push(" ORDER BY p.id");

        let rows = builder
            .build_query_as::<ProjectionRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(read_error)?;

        debug!(count = rows.len(), "queried projections");
        Ok(rows.into_iter().map(ProjectionRecord::from).collect())
    }
}
