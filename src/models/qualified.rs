//! Qualified table and column names.
//!
//! A qualified table name is the triple `database.schema.table`; a qualified
//! column name appends `.column`. Comparison is case-sensitive.

use std::fmt;
use std::str::FromStr;

use crate::error::{ContextError, ContextResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName {
    pub database: String,
    pub schema: String,
    pub table: String,
}

impl QualifiedName {
    pub fn new(
        database: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// Parse `database.schema.table`.
    pub fn parse(name: &str) -> ContextResult<Self> {
        let parts: Vec<&str> = name.split('.').collect();
        match parts.as_slice() {
            [database, schema, table]
                if !database.is_empty() && !schema.is_empty() && !table.is_empty() =>
            {
                Ok(Self::new(*database, *schema, *table))
            }
            _ => Err(ContextError::invalid_input(format!(
                "'{name}' is not a qualified table name (expected database.schema.table)"
            ))),
        }
    }

    pub fn column(&self, column: impl Into<String>) -> QualifiedColumnName {
        QualifiedColumnName {
            table: self.clone(),
            column: column.into(),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.database, self.schema, self.table)
    }
}

impl FromStr for QualifiedName {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedColumnName {
    pub table: QualifiedName,
    pub column: String,
}

impl QualifiedColumnName {
    /// Parse `database.schema.table.column`.
    pub fn parse(name: &str) -> ContextResult<Self> {
        match name.rsplit_once('.') {
            Some((table, column)) if !column.is_empty() => Ok(Self {
                table: QualifiedName::parse(table)?,
                column: column.to_string(),
            }),
            _ => Err(ContextError::invalid_input(format!(
                "'{name}' is not a qualified column name (expected database.schema.table.column)"
            ))),
        }
    }
}

impl fmt::Display for QualifiedColumnName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let name = QualifiedName::parse("crm.public.person").unwrap();
        assert_eq!(name.database, "crm");
        assert_eq!(name.schema, "public");
        assert_eq!(name.table, "person");
        assert_eq!(name.to_string(), "crm.public.person");
    }

    #[test]
    fn test_parse_rejects_wrong_arity() {
        assert!(QualifiedName::parse("public.person").is_err());
        assert!(QualifiedName::parse("a.b.c.d").is_err());
        assert!(QualifiedName::parse("a..c").is_err());
    }

    #[test]
    fn test_case_sensitive_equality() {
        let a = QualifiedName::parse("crm.public.Person").unwrap();
        let b = QualifiedName::parse("crm.public.person").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_column_name() {
        let col = QualifiedColumnName::parse("crm.public.person.id").unwrap();
        assert_eq!(col.table, QualifiedName::new("crm", "public", "person"));
        assert_eq!(col.column, "id");
        assert_eq!(col.to_string(), "crm.public.person.id");
        assert!(QualifiedColumnName::parse("crm.public.person").is_err());
    }
}
