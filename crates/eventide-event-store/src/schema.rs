//! Event and projection table DDL.
//!
//! Ids are stored with the `"C"` collation so that SQL comparison and
//! ordering are byte-wise, matching [`EventId`](eventide_core::event::EventId)
//! ordering regardless of the database's default locale.

use sqlx::PgPool;
use tracing::info;

use crate::config::TableConfig;

fn index_name(table: &TableConfig, suffix: &str) -> String {
    format!("\"idx_{}_{suffix}\"", table.name().as_str())
}

fn create_schema(table: &TableConfig) -> String {
    table
        .schema()
        .map(|schema| format!("CREATE SCHEMA IF NOT EXISTS {schema};\n"))
        .unwrap_or_default()
}

fn data_indexes(table: &TableConfig) -> String {
    let qualified = table.qualified_name();
    table
        .data_indexes()
        .iter()
        .map(|field| {
            format!(
                "\nCREATE INDEX IF NOT EXISTS {index}\n    ON {qualified} ((data ->> '{field}'));\n",
                index = index_name(table, &format!("data_{}", field.as_str())),
                field = field.as_str(),
            )
        })
        .collect()
}

fn custom_indexes(table: &TableConfig) -> String {
    let qualified = table.qualified_name();
    table
        .indexes()
        .iter()
        .map(|index| {
            format!(
                "\nCREATE INDEX IF NOT EXISTS {name}\n    ON {qualified} ({columns});\n",
                name = index.name(),
                columns = index.columns().join(", "),
            )
        })
        .collect()
}

/// Renders idempotent DDL for an event table.
#[must_use]
pub fn events_table_ddl(table: &TableConfig) -> String {
    let qualified = table.qualified_name();
    format!(
        r#"{schema}
CREATE TABLE IF NOT EXISTS {qualified} (
    id         TEXT COLLATE "C" PRIMARY KEY,
    type       TEXT NOT NULL,
    data       JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS {type_index}
    ON {qualified} (type, id);
{data}{custom}"#,
        schema = create_schema(table),
        type_index = index_name(table, "type"),
        data = data_indexes(table),
        custom = custom_indexes(table),
    )
}

/// Renders idempotent DDL for a projection table.
#[must_use]
pub fn projections_table_ddl(table: &TableConfig) -> String {
    let qualified = table.qualified_name();
    format!(
        r#"{schema}
CREATE TABLE IF NOT EXISTS {qualified} (
    type            TEXT NOT NULL,
    id              TEXT NOT NULL,
    data            JSONB NOT NULL,
    latest_event_id TEXT COLLATE "C" NOT NULL,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (type, id)
);
{data}{custom}"#,
        schema = create_schema(table),
        data = data_indexes(table),
        custom = custom_indexes(table),
    )
}

/// Creates both tables and their indexes if they do not exist.
///
/// # Errors
///
/// Returns `sqlx::Error` if any statement fails.
pub async fn create_tables(
    pool: &PgPool,
    events: &TableConfig,
    projections: &TableConfig,
) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(&events_table_ddl(events)).execute(pool).await?;
    sqlx::raw_sql(&projections_table_ddl(projections))
        .execute(pool)
        .await?;
    info!(
        events = %events.qualified_name(),
        projections = %projections.qualified_name(),
        "event store schema ready"
    );
    Ok(())
}
