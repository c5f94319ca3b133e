//! Shared SQL fragments.

use eventide_core::error::StoreError;
use eventide_core::filter::{DataFilter, FilterValue};
use sqlx::{Postgres, QueryBuilder};

/// Appends ` AND <alias>.data ->> $k = $v` (or `= ANY($vs)`) per constrained
/// field. Field names are bound, never interpolated.
pub(crate) fn push_data_filter(
    builder: &mut QueryBuilder<'_, Postgres>,
    alias: &str,
    filter: &DataFilter,
) {
    for (field, constraint) in filter.iter() {
        builder.push(format!(" AND {alias}.data ->> "));
        builder.push_bind(field.to_owned());
        match constraint {
            FilterValue::Equals(value) => {
                builder.push(" = ");
                builder.push_bind(value.clone());
            }
            FilterValue::AnyOf(values) => {
                builder.push(" = ANY(");
                builder.push_bind(values.clone());
                builder.push(")");
            }
        }
    }
}

/// Appends ` AND <alias>.type = ANY($types)`.
pub(crate) fn push_types(builder: &mut QueryBuilder<'_, Postgres>, alias: &str, types: &[&str]) {
    builder.push(format!(" AND {alias}.type = ANY("));
    builder.push_bind(types.iter().map(|t| (*t).to_owned()).collect::<Vec<String>>());
    builder.push(")");
}

/// Maps a failed read to an infrastructure error.
pub(crate) fn read_error(err: sqlx::Error) -> StoreError {
    StoreError::Infrastructure(err.to_string())
}

/// Maps a failed write to a write error.
pub(crate) fn write_error(err: sqlx::Error) -> StoreError {
    StoreError::Write(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_binds_fields_and_values() {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT 1 FROM t AS e WHERE TRUE");
        let filter = DataFilter::new()
            .equals("listId", "L")
            .any_of("itemId", ["a", "b"]);

        push_data_filter(&mut builder, "e", &filter);

        assert_eq!(
            builder.sql(),
            "SELECT 1 FROM t AS e WHERE TRUE AND e.data ->> $1 = ANY($2) AND e.data ->> $3 = $4"
        );
    }

    #[test]
    fn test_empty_filter_adds_nothing() {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT 1");

        push_data_filter(&mut builder, "e", &DataFilter::new());

        assert_eq!(builder.sql(), "SELECT 1");
    }
}
