//! Table and connection configuration.

use std::fmt;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

/// Longest identifier `PostgreSQL` accepts without truncation.
const MAX_IDENTIFIER_LEN: usize = 63;

/// Errors raised while building store configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("{0} environment variable must be set")]
    Missing(&'static str),

    /// An environment variable holds an unusable value.
    #[error("{var} is invalid: {reason}")]
    Invalid {
        /// The variable name.
        var: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// A schema, table, or column name is not a plain SQL identifier.
    #[error("invalid SQL identifier: {0:?}")]
    InvalidIdentifier(String),

    /// A custom index has no columns or a column that is not a single
    /// expression.
    #[error("invalid index {name}: {reason}")]
    InvalidIndex {
        /// The index name.
        name: String,
        /// Why the definition was rejected.
        reason: String,
    },
}

/// A validated, always-quoted SQL identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier(String);

impl Identifier {
    /// Validates `name` as `[A-Za-z_][A-Za-z0-9_]*` of at most 63 bytes.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidIdentifier` otherwise.
    pub fn parse(name: impl Into<String>) -> Result<Self, ConfigError> {
        let name = name.into();
        let mut chars = name.chars();
        let valid_start = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if valid_start && valid_rest && name.len() <= MAX_IDENTIFIER_LEN {
            Ok(Self(name))
        } else {
            Err(ConfigError::InvalidIdentifier(name))
        }
    }

    /// The unquoted name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.0)
    }
}

/// A named index over column names or parenthesized expressions, such as
/// `type` or `(data ->> 'listId')`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableIndex {
    name: Identifier,
    columns: Vec<String>,
}

impl TableIndex {
    /// The index name.
    #[must_use]
    pub fn name(&self) -> &Identifier {
        &self.name
    }

    /// The indexed columns, rendered verbatim.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

/// Where a table lives and which payload fields it indexes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    schema: Option<Identifier>,
    name: Identifier,
    data_indexes: Vec<Identifier>,
    indexes: Vec<TableIndex>,
}

impl TableConfig {
    /// Creates a configuration for table `name` in the search path.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidIdentifier` if `name` is not a plain
    /// identifier.
    pub fn new(name: impl Into<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            schema: None,
            name: Identifier::parse(name)?,
            data_indexes: Vec::new(),
            indexes: Vec::new(),
        })
    }

    /// The default event table, `"events"`.
    #[must_use]
    pub fn events() -> Self {
        Self::fixed("events")
    }

    /// The default projection table, `"projections"`.
    #[must_use]
    pub fn projections() -> Self {
        Self::fixed("projections")
    }

    fn fixed(name: &str) -> Self {
        Self {
            schema: None,
            name: Identifier(name.to_owned()),
            data_indexes: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Places the table in `schema`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidIdentifier` if `schema` is not a plain
    /// identifier.
    pub fn in_schema(mut self, schema: impl Into<String>) -> Result<Self, ConfigError> {
        self.schema = Some(Identifier::parse(schema)?);
        Ok(self)
    }

    /// Adds expression indexes on the given top-level `data` fields.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidIdentifier` for any field that is not a
    /// plain identifier.
    pub fn with_data_indexes<I, S>(mut self, fields: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for field in fields {
            self.data_indexes.push(Identifier::parse(field)?);
        }
        Ok(self)
    }

    /// Adds index `name` over `columns`.
    ///
    /// Columns are trusted configuration and are rendered into the DDL as
    /// written; a statement separator is refused.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidIdentifier` if `name` is not a plain
    /// identifier, or `ConfigError::InvalidIndex` if `columns` is empty or a
    /// column is blank or contains `;`.
    pub fn with_index<I, S>(
        mut self,
        name: impl Into<String>,
        columns: I,
    ) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = Identifier::parse(name)?;
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        let invalid = |reason: &str| ConfigError::InvalidIndex {
            name: name.as_str().to_owned(),
            reason: reason.to_owned(),
        };
        if columns.is_empty() {
            return Err(invalid("no columns"));
        }
        if columns.iter().any(|c| c.trim().is_empty()) {
            return Err(invalid("blank column"));
        }
        if columns.iter().any(|c| c.contains(';')) {
            return Err(invalid("column contains ';'"));
        }
        self.indexes.push(TableIndex { name, columns });
        Ok(self)
    }

    /// The schema, if one is set.
    #[must_use]
    pub fn schema(&self) -> Option<&Identifier> {
        self.schema.as_ref()
    }

    /// The table name.
    #[must_use]
    pub fn name(&self) -> &Identifier {
        &self.name
    }

    /// Fields that receive expression indexes.
    #[must_use]
    pub fn data_indexes(&self) -> &[Identifier] {
        &self.data_indexes
    }

    /// Custom indexes, in the order they were added.
    #[must_use]
    pub fn indexes(&self) -> &[TableIndex] {
        &self.indexes
    }

    /// `"schema"."table"` or `"table"`.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{schema}.{}", self.name),
            None => self.name.to_string(),
        }
    }
}

/// Connection and table settings for both stores.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// `PostgreSQL` connection string.
    pub database_url: String,
    /// Upper bound on pooled connections.
    pub max_connections: u32,
    /// Event table.
    pub events: TableConfig,
    /// Projection table.
    pub projections: TableConfig,
}

impl StoreConfig {
    /// Reads configuration from the process environment.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `DATABASE_URL` | required |
    /// | `EVENTIDE_MAX_CONNECTIONS` | `10` |
    /// | `EVENTIDE_SCHEMA` | search path |
    /// | `EVENTIDE_EVENTS_TABLE` | `events` |
    /// | `EVENTIDE_PROJECTIONS_TABLE` | `projections` |
    /// | `EVENTIDE_DATA_INDEXES` | none (comma-separated) |
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is missing or malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`from_env`](Self::from_env) with a custom variable source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is missing or malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let max_connections = match lookup("EVENTIDE_MAX_CONNECTIONS") {
            Some(raw) => raw.parse().map_err(|e| ConfigError::Invalid {
                var: "EVENTIDE_MAX_CONNECTIONS",
                reason: format!("must be a valid u32: {e}"),
            })?,
            None => 10,
        };
        let schema = lookup("EVENTIDE_SCHEMA").filter(|s| !s.is_empty());
        let indexes: Vec<String> = lookup("EVENTIDE_DATA_INDEXES")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();

        let table = |var: &str, default: &str| -> Result<TableConfig, ConfigError> {
            let name = lookup(var).unwrap_or_else(|| default.to_owned());
            let mut config = TableConfig::new(name)?.with_data_indexes(indexes.clone())?;
            if let Some(schema) = &schema {
                config = config.in_schema(schema.clone())?;
            }
            Ok(config)
        };

        Ok(Self {
            events: table("EVENTIDE_EVENTS_TABLE", "events")?,
            projections: table("EVENTIDE_PROJECTIONS_TABLE", "projections")?,
            database_url,
            max_connections,
        })
    }

    /// Opens a connection pool.
    ///
    /// # Errors
    ///
    /// Returns `sqlx::Error` if the database is unreachable.
    pub async fn connect(&self) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect(&self.database_url)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_identifiers_are_validated_and_quoted() {
        assert_eq!(Identifier::parse("listId").unwrap().to_string(), "\"listId\"");
        assert!(Identifier::parse("_private").is_ok());
        assert!(Identifier::parse("").is_err());
        assert!(Identifier::parse("1events").is_err());
        assert!(Identifier::parse("events; DROP TABLE x").is_err());
        assert!(Identifier::parse("a".repeat(64)).is_err());
    }

    #[test]
    fn test_qualified_name_includes_schema() {
        let table = TableConfig::new("events").unwrap().in_schema("store").unwrap();

        assert_eq!(table.qualified_name(), "\"store\".\"events\"");
        assert_eq!(TableConfig::projections().qualified_name(), "\"projections\"");
    }

    #[test]
    fn test_custom_indexes_keep_their_columns() {
        let table = TableConfig::events()
            .with_index("events_list_type", ["(data ->> 'listId')", "type"])
            .unwrap();

        let index = &table.indexes()[0];
        assert_eq!(index.name().as_str(), "events_list_type");
        assert_eq!(index.columns(), ["(data ->> 'listId')", "type"]);
    }

    #[test]
    fn test_custom_index_definitions_are_validated() {
        let empty: [&str; 0] = [];

        assert!(matches!(
            TableConfig::events().with_index("idx", empty),
            Err(ConfigError::InvalidIndex { .. })
        ));
        assert!(matches!(
            TableConfig::events().with_index("idx", [" "]),
            Err(ConfigError::InvalidIndex { .. })
        ));
        assert!(matches!(
            TableConfig::events().with_index("idx", ["id); DROP TABLE events; --"]),
            Err(ConfigError::InvalidIndex { .. })
        ));
        assert!(matches!(
            TableConfig::events().with_index("bad name", ["id"]),
            Err(ConfigError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_from_lookup_applies_defaults() {
        let config = StoreConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://db")])).unwrap();

        assert_eq!(config.database_url, "postgres://db");
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.events, TableConfig::events());
        assert_eq!(config.projections, TableConfig::projections());
    }

    #[test]
    fn test_from_lookup_reads_overrides() {
        // Arrange
        let vars = lookup(&[
            ("DATABASE_URL", "postgres://db"),
            ("EVENTIDE_MAX_CONNECTIONS", "4"),
            ("EVENTIDE_SCHEMA", "todo"),
            ("EVENTIDE_EVENTS_TABLE", "todo_events"),
            ("EVENTIDE_DATA_INDEXES", "listId, itemId"),
        ]);

        // Act
        let config = StoreConfig::from_lookup(vars).unwrap();

        // Assert
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.events.qualified_name(), "\"todo\".\"todo_events\"");
        assert_eq!(config.projections.qualified_name(), "\"todo\".\"projections\"");
        let fields: Vec<&str> = config.events.data_indexes().iter().map(Identifier::as_str).collect();
        assert_eq!(fields, ["listId", "itemId"]);
    }

    #[test]
    fn test_from_lookup_rejects_missing_url_and_bad_values() {
        assert!(matches!(
            StoreConfig::from_lookup(lookup(&[])),
            Err(ConfigError::Missing("DATABASE_URL"))
        ));
        assert!(matches!(
            StoreConfig::from_lookup(lookup(&[
                ("DATABASE_URL", "postgres://db"),
                ("EVENTIDE_MAX_CONNECTIONS", "many"),
            ])),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            StoreConfig::from_lookup(lookup(&[
                ("DATABASE_URL", "postgres://db"),
                ("EVENTIDE_EVENTS_TABLE", "bad-name"),
            ])),
            Err(ConfigError::InvalidIdentifier(_))
        ));
    }
}
