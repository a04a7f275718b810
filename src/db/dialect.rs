//! Dialect behavior: identifier quoting, placeholder style and DDL text.
//!
//! Everything above this module speaks `?` placeholders and qualified
//! model names; vendor syntax is produced here.

use crate::models::{Column, Database, DatabaseType, ForeignKey, QualifiedName, Table};

impl DatabaseType {
    pub fn quote_identifier(&self, name: &str) -> String {
        match self {
            DatabaseType::MySQL => format!("`{}`", name.replace('`', "``")),
            DatabaseType::PostgreSQL | DatabaseType::SQLite => {
                format!("\"{}\"", name.replace('"', "\"\""))
            }
        }
    }

    /// `schema.table`, quoted. SQLite tables are referenced by name alone.
    pub fn table_reference(&self, schema: &str, table: &str) -> String {
        match self {
            DatabaseType::SQLite => self.quote_identifier(table),
            _ => format!(
                "{}.{}",
                self.quote_identifier(schema),
                self.quote_identifier(table)
            ),
        }
    }

    /// Native table reference for a model table.
    pub fn qualified_table(&self, name: &QualifiedName) -> String {
        self.table_reference(&name.schema, &name.table)
    }

    /// Rewrite `?` placeholders into the dialect's positional form.
    ///
    /// PostgreSQL uses `$1, $2, ...`; MySQL and SQLite keep `?`. Placeholders
    /// inside quoted literals and identifiers are left alone.
    pub fn rewrite_placeholders(&self, sql: &str) -> String {
        if *self != DatabaseType::PostgreSQL {
            return sql.to_string();
        }
        let mut out = String::with_capacity(sql.len() + 8);
        let mut index = 0;
        let mut quote: Option<char> = None;
        for c in sql.chars() {
            match (quote, c) {
                (None, '\'' | '"') => {
                    quote = Some(c);
                    out.push(c);
                }
                (Some(q), _) if c == q => {
                    quote = None;
                    out.push(c);
                }
                (None, '?') => {
                    index += 1;
                    out.push('$');
                    out.push_str(&index.to_string());
                }
                _ => out.push(c),
            }
        }
        out
    }

    /// Type text with length and scale, e.g. `VARCHAR(100)` or `DECIMAL(10,2)`.
    fn column_type(&self, column: &Column) -> String {
        if column.column_type.contains('(') {
            return column.column_type.clone();
        }
        match (column.length, column.scale) {
            (Some(length), Some(scale)) => format!("{}({},{})", column.column_type, length, scale),
            (Some(length), None) => format!("{}({})", column.column_type, length),
            _ => column.column_type.clone(),
        }
    }

    fn column_definition(&self, table: &Table, column: &Column) -> String {
        let name = self.quote_identifier(&column.column_name);
        let mut definition = match (self, column.autoincrement) {
            (DatabaseType::PostgreSQL, true) => {
                let serial = if column.column_type.to_lowercase().contains("big") {
                    "BIGSERIAL"
                } else {
                    "SERIAL"
                };
                format!("{name} {serial}")
            }
            (DatabaseType::SQLite, true) if is_single_key(table, column) => {
                return format!("{name} INTEGER PRIMARY KEY AUTOINCREMENT");
            }
            _ => format!("{} {}", name, self.column_type(column)),
        };
        if !column.nullable {
            definition.push_str(" NOT NULL");
        }
        if *self == DatabaseType::MySQL && column.autoincrement {
            definition.push_str(" AUTO_INCREMENT");
        }
        definition
    }

    fn references_clause(&self, fk: &ForeignKey) -> String {
        let target = QualifiedName::parse(&fk.to_table).unwrap_or_default();
        let from: Vec<String> = fk
            .references
            .iter()
            .map(|r| self.quote_identifier(&r.from_column))
            .collect();
        let to: Vec<String> = fk
            .references
            .iter()
            .map(|r| self.quote_identifier(&r.to_column))
            .collect();
        let target_ref = self.qualified_table(&target);
        format!(
            "FOREIGN KEY ({}) REFERENCES {} ({}) ON UPDATE {} ON DELETE {}",
            from.join(", "),
            target_ref,
            to.join(", "),
            fk.on_update,
            fk.on_delete
        )
    }

    /// `CREATE TABLE` for one table. Foreign keys are inlined for SQLite only.
    pub fn create_table(&self, schema: &str, table: &Table) -> String {
        let mut lines: Vec<String> = table
            .columns
            .iter()
            .map(|c| format!("    {}", self.column_definition(table, c)))
            .collect();

        let inline_key = *self == DatabaseType::SQLite
            && table
                .columns
                .iter()
                .any(|c| c.autoincrement && is_single_key(table, c));
        if let Some(pk) = &table.primary_key {
            if !inline_key && !pk.columns.is_empty() {
                let columns: Vec<String> = pk
                    .columns
                    .iter()
                    .map(|c| self.quote_identifier(&c.column_name))
                    .collect();
                lines.push(format!("    PRIMARY KEY ({})", columns.join(", ")));
            }
        }
        if *self == DatabaseType::SQLite {
            for fk in &table.foreign_keys {
                lines.push(format!(
                    "    CONSTRAINT {} {}",
                    self.quote_identifier(&fk.name),
                    self.references_clause(fk)
                ));
            }
        }

        format!(
            "CREATE TABLE {} (\n{}\n);",
            self.table_reference(schema, &table.table_name),
            lines.join(",\n")
        )
    }

    fn add_foreign_key(&self, schema: &str, table: &Table, fk: &ForeignKey) -> String {
        format!(
            "ALTER TABLE {} ADD CONSTRAINT {} {};",
            self.table_reference(schema, &table.table_name),
            self.quote_identifier(&fk.name),
            self.references_clause(fk)
        )
    }

    fn add_column(&self, schema: &str, table: &Table, column: &Column) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {};",
            self.table_reference(schema, &table.table_name),
            self.column_definition(table, column)
        )
    }

    /// Statements creating every schema object of `database`.
    pub fn create_script(&self, database: &Database) -> Vec<String> {
        let mut statements = Vec::new();
        for schema in &database.schemas {
            if *self == DatabaseType::PostgreSQL {
                statements.push(format!(
                    "CREATE SCHEMA IF NOT EXISTS {};",
                    self.quote_identifier(&schema.schema_name)
                ));
            }
            for table in &schema.tables {
                statements.push(self.create_table(&schema.schema_name, table));
            }
        }
        if *self != DatabaseType::SQLite {
            for schema in &database.schemas {
                for table in &schema.tables {
                    for fk in &table.foreign_keys {
                        statements.push(self.add_foreign_key(&schema.schema_name, table, fk));
                    }
                }
            }
        }
        statements
    }

    /// Statements bringing `live` up to `model`: missing tables, columns and
    /// foreign keys are added. Objects present only in `live` are reported as
    /// comments and never dropped.
    pub fn update_script(&self, model: &Database, live: &Database) -> Vec<String> {
        let mut statements = Vec::new();
        for schema in &model.schemas {
            let live_schema = live.find_schema_by_name(&schema.schema_name);
            if live_schema.is_none() && *self == DatabaseType::PostgreSQL {
                statements.push(format!(
                    "CREATE SCHEMA IF NOT EXISTS {};",
                    self.quote_identifier(&schema.schema_name)
                ));
            }
            for table in &schema.tables {
                let Some(live_table) =
                    live_schema.and_then(|s| s.find_table_by_name(&table.table_name))
                else {
                    statements.push(self.create_table(&schema.schema_name, table));
                    if *self != DatabaseType::SQLite {
                        for fk in &table.foreign_keys {
                            statements.push(self.add_foreign_key(&schema.schema_name, table, fk));
                        }
                    }
                    continue;
                };

                for column in &table.columns {
                    if live_table.find_column_by_name(&column.column_name).is_none() {
                        statements.push(self.add_column(&schema.schema_name, table, column));
                    }
                }
                for column in &live_table.columns {
                    if table.find_column_by_name(&column.column_name).is_none() {
                        statements.push(format!(
                            "-- column {}.{}.{} exists only in the live schema",
                            schema.schema_name, table.table_name, column.column_name
                        ));
                    }
                }
                for fk in &table.foreign_keys {
                    if live_table.foreign_keys.iter().any(|l| l.same_target(fk)) {
                        continue;
                    }
                    if *self == DatabaseType::SQLite {
                        statements.push(format!(
                            "-- foreign key {} cannot be added to existing SQLite table {}",
                            fk.name, table.table_name
                        ));
                    } else {
                        statements.push(self.add_foreign_key(&schema.schema_name, table, fk));
                    }
                }
            }
        }
        statements
    }
}

fn is_single_key(table: &Table, column: &Column) -> bool {
    table
        .primary_key
        .as_ref()
        .is_some_and(|pk| pk.columns.len() == 1 && pk.columns[0].column_name == column.column_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ForeignKeyAction, Schema};

    fn person() -> Table {
        Table::new("person")
            .with_column(Column::new("id", "INTEGER").not_null().with_autoincrement())
            .with_column(Column::new("name", "VARCHAR").with_length(100).not_null())
            .with_primary_key(&["id"])
    }

    fn address() -> Table {
        let mut fk = ForeignKey::new("fk_address_person", "crm.public.person")
            .with_reference("person_id", "id");
        fk.on_delete = ForeignKeyAction::Cascade;
        Table::new("address")
            .with_column(Column::new("id", "INTEGER").not_null())
            .with_column(Column::new("person_id", "INTEGER"))
            .with_primary_key(&["id"])
            .with_foreign_key(fk)
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(DatabaseType::PostgreSQL.quote_identifier("a\"b"), "\"a\"\"b\"");
        assert_eq!(DatabaseType::MySQL.quote_identifier("a`b"), "`a``b`");
        assert_eq!(
            DatabaseType::SQLite.qualified_table(&QualifiedName::new("db", "main", "t")),
            "\"t\""
        );
    }

    #[test]
    fn test_rewrite_placeholders() {
        let sql = "SELECT * FROM t WHERE a = ? AND b = '?' AND c = ?";
        assert_eq!(
            DatabaseType::PostgreSQL.rewrite_placeholders(sql),
            "SELECT * FROM t WHERE a = $1 AND b = '?' AND c = $2"
        );
        assert_eq!(DatabaseType::MySQL.rewrite_placeholders(sql), sql);
        assert_eq!(DatabaseType::SQLite.rewrite_placeholders(sql), sql);
    }

    #[test]
    fn test_create_table_postgres() {
        let ddl = DatabaseType::PostgreSQL.create_table("public", &person());
        assert_eq!(
            ddl,
            "CREATE TABLE \"public\".\"person\" (\n    \"id\" SERIAL NOT NULL,\n    \"name\" VARCHAR(100) NOT NULL,\n    PRIMARY KEY (\"id\")\n);"
        );
    }

    #[test]
    fn test_create_table_sqlite_inlines_key_and_foreign_keys() {
        let ddl = DatabaseType::SQLite.create_table("main", &person());
        assert!(ddl.contains("\"id\" INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(!ddl.contains("PRIMARY KEY (\"id\")"));

        let ddl = DatabaseType::SQLite.create_table("main", &address());
        assert!(ddl.contains(
            "CONSTRAINT \"fk_address_person\" FOREIGN KEY (\"person_id\") REFERENCES \"person\" (\"id\") ON UPDATE NO ACTION ON DELETE CASCADE"
        ));
    }

    #[test]
    fn test_create_script_adds_foreign_keys_last() {
        let database = Database::new("crm")
            .with_schema(Schema::new("public").with_table(address()).with_table(person()));
        let script = DatabaseType::PostgreSQL.create_script(&database);
        assert_eq!(script.len(), 4);
        assert!(script[0].starts_with("CREATE SCHEMA IF NOT EXISTS \"public\""));
        assert!(script[3].starts_with(
            "ALTER TABLE \"public\".\"address\" ADD CONSTRAINT \"fk_address_person\""
        ));
        assert!(script[3].contains("REFERENCES \"public\".\"person\""));
    }

    #[test]
    fn test_update_script_adds_missing_objects() {
        let model = Database::new("crm").with_schema(
            Schema::new("public")
                .with_table(person().with_column(Column::new("email", "VARCHAR").with_length(200)))
                .with_table(address()),
        );
        let live = Database::new("crm").with_schema(
            Schema::new("public")
                .with_table(person().with_column(Column::new("legacy", "TEXT"))),
        );

        let script = DatabaseType::MySQL.update_script(&model, &live);
        assert_eq!(
            script[0],
            "ALTER TABLE `public`.`person` ADD COLUMN `email` VARCHAR(200);"
        );
        assert!(script[1].contains("public.person.legacy exists only in the live schema"));
        assert!(script[2].starts_with("CREATE TABLE `public`.`address`"));
        assert!(script[3].starts_with("ALTER TABLE `public`.`address` ADD CONSTRAINT"));
        assert_eq!(script.len(), 4);
    }

    #[test]
    fn test_update_script_empty_when_in_sync() {
        let database = Database::new("crm")
            .with_schema(Schema::new("public").with_table(person()).with_table(address()));
        assert!(DatabaseType::PostgreSQL
            .update_script(&database, &database)
            .is_empty());
    }
}
