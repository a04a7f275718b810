//! Primary key strings.
//!
//! A key string is the table's key values joined with `,` in key order, used
//! by outer layers to address a row in URLs and forms.

use serde_json::Value as JsonValue;

use crate::error::{ContextError, ContextResult};
use crate::models::query::{QueryParam, Row};
use crate::models::schema::{Column, Table, ValueKind};

const SEPARATOR: &str = ",";

pub struct PkHelper<'a> {
    table: &'a Table,
}

impl<'a> PkHelper<'a> {
    pub fn new(table: &'a Table) -> Self {
        Self { table }
    }

    /// Join the key values of `row` (keyed by property name) in key order.
    pub fn generate_pk_string(&self, row: &Row) -> ContextResult<String> {
        let columns = self.key_columns()?;
        let mut segments = Vec::with_capacity(columns.len());
        for column in columns {
            let property = column.actual_property_name();
            let value = row
                .get(property)
                .filter(|v| !v.is_null())
                .ok_or_else(|| {
                    ContextError::invalid_input(format!(
                        "row has no value for key property '{property}' of {}",
                        self.table.qualified_name()
                    ))
                })?;
            segments.push(QueryParam::from_json(value).to_key_segment());
        }
        Ok(segments.join(SEPARATOR))
    }

    /// Split `text` and coerce each segment to its key column's type.
    pub fn parse_pk_string(&self, text: &str) -> ContextResult<Row> {
        let columns = self.key_columns()?;
        let segments: Vec<&str> = text.split(SEPARATOR).collect();
        if segments.len() != columns.len() {
            return Err(ContextError::invalid_input(format!(
                "key '{text}' has {} segment(s), {} expects {}",
                segments.len(),
                self.table.qualified_name(),
                columns.len()
            )));
        }

        let mut row = Row::new();
        for (column, segment) in columns.into_iter().zip(segments) {
            let value = match column.value_kind() {
                ValueKind::Integer => segment.parse::<i64>().map(JsonValue::from).ok(),
                ValueKind::Float => segment.parse::<f64>().map(JsonValue::from).ok(),
                ValueKind::Boolean => segment.parse::<bool>().map(JsonValue::from).ok(),
                ValueKind::Text => Some(JsonValue::from(segment)),
            }
            .ok_or_else(|| {
                ContextError::invalid_input(format!(
                    "key segment '{segment}' is not a valid {} for column '{}'",
                    column.column_type, column.column_name
                ))
            })?;
            row.insert(column.actual_property_name().to_string(), value);
        }
        Ok(row)
    }

    fn key_columns(&self) -> ContextResult<Vec<&'a Column>> {
        let columns = self.table.key_columns();
        if columns.is_empty() {
            return Err(ContextError::invalid_input(format!(
                "table {} has no primary key",
                self.table.qualified_name()
            )));
        }
        Ok(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn order_line() -> Table {
        Table::new("order_line")
            .with_column(Column::new("order_id", "BIGINT").with_property_name("orderId"))
            .with_column(Column::new("code", "VARCHAR"))
            .with_column(Column::new("qty", "INTEGER"))
            .with_primary_key(&["order_id", "code"])
    }

    #[test]
    fn test_generate_composite_key() {
        let table = order_line();
        let helper = PkHelper::new(&table);
        let row = json!({"orderId": 42, "code": "A-1", "qty": 3});
        let key = helper
            .generate_pk_string(row.as_object().unwrap())
            .unwrap();
        assert_eq!(key, "42,A-1");
    }

    #[test]
    fn test_parse_coerces_types() {
        let table = order_line();
        let row = PkHelper::new(&table).parse_pk_string("42,A-1").unwrap();
        assert_eq!(row.get("orderId"), Some(&json!(42)));
        assert_eq!(row.get("code"), Some(&json!("A-1")));
    }

    #[test]
    fn test_parse_rejects_wrong_width() {
        let table = order_line();
        let err = PkHelper::new(&table).parse_pk_string("42").unwrap_err();
        assert!(err.to_string().contains("expects 2"));
    }

    #[test]
    fn test_parse_rejects_bad_integer() {
        let table = order_line();
        assert!(PkHelper::new(&table).parse_pk_string("x,A-1").is_err());
    }

    #[test]
    fn test_missing_key_value() {
        let table = order_line();
        let row = json!({"code": "A-1"});
        assert!(PkHelper::new(&table)
            .generate_pk_string(row.as_object().unwrap())
            .is_err());
    }
}
