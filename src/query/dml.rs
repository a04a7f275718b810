//! Row statements generated from table metadata.
//!
//! Rows are keyed by property name (falling back to the column name); the
//! statements are native SQL with `?` placeholders.

use serde_json::Value as JsonValue;

use crate::error::{ContextError, ContextResult};
use crate::models::{Column, CompiledQuery, DatabaseType, QueryParam, Row, Table};

fn row_value<'r>(row: &'r Row, column: &Column) -> Option<&'r JsonValue> {
    row.get(column.actual_property_name())
        .or_else(|| row.get(&column.column_name))
}

fn target(dialect: DatabaseType, table: &Table) -> String {
    dialect.qualified_table(table.qualified_name())
}

/// `k1 = ? AND k2 = ?` over the primary key, with values taken from `row`.
fn key_predicate(
    dialect: DatabaseType,
    table: &Table,
    row: &Row,
) -> ContextResult<(String, Vec<QueryParam>)> {
    let keys = table.key_columns();
    if keys.is_empty() {
        return Err(ContextError::invalid_input(format!(
            "Table {} has no primary key",
            table.qualified_name()
        )));
    }
    let mut fragments = Vec::with_capacity(keys.len());
    let mut parameters = Vec::with_capacity(keys.len());
    for column in keys {
        let value = row_value(row, column)
            .filter(|v| !v.is_null())
            .ok_or_else(|| {
                ContextError::invalid_input(format!(
                    "Missing key property '{}' for table {}",
                    column.actual_property_name(),
                    table.qualified_name()
                ))
            })?;
        fragments.push(format!("{} = ?", dialect.quote_identifier(&column.column_name)));
        parameters.push(QueryParam::from_json(value));
    }
    Ok((fragments.join(" AND "), parameters))
}

/// `INSERT` of every column present in `row`; absent or null autoincrement
/// columns are left to the database.
pub fn insert(dialect: DatabaseType, table: &Table, row: &Row) -> ContextResult<CompiledQuery> {
    let mut columns = Vec::new();
    let mut parameters = Vec::new();
    for column in &table.columns {
        let Some(value) = row_value(row, column) else {
            continue;
        };
        if column.autoincrement && value.is_null() {
            continue;
        }
        columns.push(dialect.quote_identifier(&column.column_name));
        parameters.push(QueryParam::from_json(value));
    }
    if columns.is_empty() {
        return Err(ContextError::invalid_input(format!(
            "Row has no properties of table {}",
            table.qualified_name()
        )));
    }
    let placeholders = vec!["?"; columns.len()].join(", ");
    Ok(CompiledQuery::new(
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            target(dialect, table),
            columns.join(", "),
            placeholders
        ),
        parameters,
    ))
}

/// `UPDATE` of the non-key columns present in `row`, matched by primary key.
pub fn update(dialect: DatabaseType, table: &Table, row: &Row) -> ContextResult<CompiledQuery> {
    let (predicate, key_parameters) = key_predicate(dialect, table, row)?;
    let key_names: Vec<&str> = table
        .primary_key
        .as_ref()
        .map(|pk| pk.column_names())
        .unwrap_or_default();

    let mut assignments = Vec::new();
    let mut parameters = Vec::new();
    for column in &table.columns {
        if key_names.contains(&column.column_name.as_str()) {
            continue;
        }
        if let Some(value) = row_value(row, column) {
            assignments.push(format!("{} = ?", dialect.quote_identifier(&column.column_name)));
            parameters.push(QueryParam::from_json(value));
        }
    }
    if assignments.is_empty() {
        return Err(ContextError::invalid_input(format!(
            "Row has no non-key properties of table {}",
            table.qualified_name()
        )));
    }
    parameters.extend(key_parameters);
    Ok(CompiledQuery::new(
        format!(
            "UPDATE {} SET {} WHERE {}",
            target(dialect, table),
            assignments.join(", "),
            predicate
        ),
        parameters,
    ))
}

pub fn delete(dialect: DatabaseType, table: &Table, row: &Row) -> ContextResult<CompiledQuery> {
    let (predicate, parameters) = key_predicate(dialect, table, row)?;
    Ok(CompiledQuery::new(
        format!("DELETE FROM {} WHERE {}", target(dialect, table), predicate),
        parameters,
    ))
}

/// Rename the column keys of a fetched row to property names.
pub fn property_row(table: &Table, row: Row) -> Row {
    row.into_iter()
        .map(|(key, value)| match table.find_column_by_name(&key) {
            Some(column) => (column.actual_property_name().to_string(), value),
            None => (key, value),
        })
        .collect()
}
