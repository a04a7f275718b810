//! Live schema introspection.
//!
//! Reads tables, columns, primary keys and foreign keys from the catalog of
//! a connected database and assembles them into a model [`Database`].
//! Foreign key targets are qualified with the provider name, so an
//! introspected database can be diffed against the installed model directly.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::db::pool::DbPool;
use crate::error::ContextResult;
use crate::models::{
    Column, Database, ForeignKey, ForeignKeyAction, PrimaryKeyColumn, Reference, Schema, Table,
};

/// Introspect the database behind `pool`, naming the result `database_name`.
pub async fn introspect(pool: &DbPool, database_name: &str) -> ContextResult<Database> {
    let database = match pool {
        DbPool::MySql(p) => mysql::introspect(p, database_name).await?,
        DbPool::Postgres(p) => postgres::introspect(p, database_name).await?,
        DbPool::SQLite(p) => sqlite::introspect(p, database_name).await?,
    };
    debug!(
        database = %database_name,
        schemas = database.schemas.len(),
        tables = database.schemas.iter().map(|s| s.tables.len()).sum::<usize>(),
        "Introspected live schema"
    );
    Ok(database)
}

mod queries {
    pub mod postgres {
        pub const TABLES: &str = r#"
            SELECT table_schema::text AS table_schema, table_name::text AS table_name
            FROM information_schema.tables
            WHERE table_type = 'BASE TABLE'
            AND table_schema NOT IN ('pg_catalog', 'information_schema')
            ORDER BY table_schema, table_name
            "#;

        pub const COLUMNS: &str = r#"
            SELECT
                c.table_schema::text AS table_schema,
                c.table_name::text AS table_name,
                c.column_name::text AS column_name,
                c.data_type::text AS data_type,
                c.is_nullable::text AS is_nullable,
                c.character_maximum_length::int4 AS char_length,
                c.numeric_precision::int4 AS numeric_precision,
                c.numeric_scale::int4 AS numeric_scale,
                c.column_default::text AS column_default,
                c.is_identity::text AS is_identity
            FROM information_schema.columns c
            JOIN information_schema.tables t
                ON t.table_schema = c.table_schema AND t.table_name = c.table_name
            WHERE t.table_type = 'BASE TABLE'
            AND c.table_schema NOT IN ('pg_catalog', 'information_schema')
            ORDER BY c.table_schema, c.table_name, c.ordinal_position
            "#;

        pub const PRIMARY_KEYS: &str = r#"
            SELECT
                tc.table_schema::text AS table_schema,
                tc.table_name::text AS table_name,
                tc.constraint_name::text AS constraint_name,
                kcu.column_name::text AS column_name
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
                ON tc.constraint_name = kcu.constraint_name
                AND tc.table_schema = kcu.table_schema
                AND tc.table_name = kcu.table_name
            WHERE tc.constraint_type = 'PRIMARY KEY'
            AND tc.table_schema NOT IN ('pg_catalog', 'information_schema')
            ORDER BY tc.table_schema, tc.table_name, kcu.ordinal_position
            "#;

        pub const FOREIGN_KEYS: &str = r#"
            SELECT
                kcu.table_schema::text AS table_schema,
                kcu.table_name::text AS table_name,
                kcu.constraint_name::text AS constraint_name,
                kcu.column_name::text AS column_name,
                rkcu.table_schema::text AS ref_schema,
                rkcu.table_name::text AS ref_table,
                rkcu.column_name::text AS ref_column,
                rc.update_rule::text AS update_rule,
                rc.delete_rule::text AS delete_rule
            FROM information_schema.referential_constraints rc
            JOIN information_schema.key_column_usage kcu
                ON kcu.constraint_schema = rc.constraint_schema
                AND kcu.constraint_name = rc.constraint_name
            JOIN information_schema.key_column_usage rkcu
                ON rkcu.constraint_schema = rc.unique_constraint_schema
                AND rkcu.constraint_name = rc.unique_constraint_name
                AND rkcu.ordinal_position = kcu.position_in_unique_constraint
            ORDER BY kcu.table_schema, kcu.table_name, kcu.constraint_name, kcu.ordinal_position
            "#;
    }

    pub mod mysql {
        pub const TABLES: &str = r#"
            SELECT
                CONVERT(TABLE_SCHEMA USING utf8) AS TABLE_SCHEMA,
                CONVERT(TABLE_NAME USING utf8) AS TABLE_NAME
            FROM information_schema.TABLES
            WHERE TABLE_SCHEMA = DATABASE()
            AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
            "#;

        pub const COLUMNS: &str = r#"
            SELECT
                CONVERT(c.TABLE_SCHEMA USING utf8) AS TABLE_SCHEMA,
                CONVERT(c.TABLE_NAME USING utf8) AS TABLE_NAME,
                CONVERT(c.COLUMN_NAME USING utf8) AS COLUMN_NAME,
                CONVERT(c.DATA_TYPE USING utf8) AS DATA_TYPE,
                CONVERT(c.IS_NULLABLE USING utf8) AS IS_NULLABLE,
                CAST(c.CHARACTER_MAXIMUM_LENGTH AS SIGNED) AS CHAR_LENGTH,
                CAST(c.NUMERIC_PRECISION AS SIGNED) AS NUMERIC_PRECISION,
                CAST(c.NUMERIC_SCALE AS SIGNED) AS NUMERIC_SCALE,
                CONVERT(c.EXTRA USING utf8) AS EXTRA
            FROM information_schema.COLUMNS c
            JOIN information_schema.TABLES t
                ON t.TABLE_SCHEMA = c.TABLE_SCHEMA AND t.TABLE_NAME = c.TABLE_NAME
            WHERE c.TABLE_SCHEMA = DATABASE()
            AND t.TABLE_TYPE = 'BASE TABLE'
            ORDER BY c.TABLE_NAME, c.ORDINAL_POSITION
            "#;

        pub const PRIMARY_KEYS: &str = r#"
            SELECT
                CONVERT(TABLE_SCHEMA USING utf8) AS TABLE_SCHEMA,
                CONVERT(TABLE_NAME USING utf8) AS TABLE_NAME,
                CONVERT(CONSTRAINT_NAME USING utf8) AS CONSTRAINT_NAME,
                CONVERT(COLUMN_NAME USING utf8) AS COLUMN_NAME
            FROM information_schema.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = DATABASE()
            AND CONSTRAINT_NAME = 'PRIMARY'
            ORDER BY TABLE_NAME, ORDINAL_POSITION
            "#;

        pub const FOREIGN_KEYS: &str = r#"
            SELECT
                CONVERT(k.TABLE_SCHEMA USING utf8) AS TABLE_SCHEMA,
                CONVERT(k.TABLE_NAME USING utf8) AS TABLE_NAME,
                CONVERT(k.CONSTRAINT_NAME USING utf8) AS CONSTRAINT_NAME,
                CONVERT(k.COLUMN_NAME USING utf8) AS COLUMN_NAME,
                CONVERT(k.REFERENCED_TABLE_SCHEMA USING utf8) AS REF_SCHEMA,
                CONVERT(k.REFERENCED_TABLE_NAME USING utf8) AS REF_TABLE,
                CONVERT(k.REFERENCED_COLUMN_NAME USING utf8) AS REF_COLUMN,
                CONVERT(r.UPDATE_RULE USING utf8) AS UPDATE_RULE,
                CONVERT(r.DELETE_RULE USING utf8) AS DELETE_RULE
            FROM information_schema.KEY_COLUMN_USAGE k
            JOIN information_schema.REFERENTIAL_CONSTRAINTS r
                ON r.CONSTRAINT_SCHEMA = k.CONSTRAINT_SCHEMA
                AND r.CONSTRAINT_NAME = k.CONSTRAINT_NAME
            WHERE k.TABLE_SCHEMA = DATABASE()
            AND k.REFERENCED_TABLE_NAME IS NOT NULL
            ORDER BY k.TABLE_NAME, k.CONSTRAINT_NAME, k.ORDINAL_POSITION
            "#;
    }

    pub mod sqlite {
        pub const TABLES: &str = r#"
            SELECT name, sql FROM sqlite_master
            WHERE type = 'table'
            AND name NOT LIKE 'sqlite_%'
            ORDER BY name
            "#;
    }
}

/// Collects catalog rows into tables, keeping first-seen order.
#[derive(Default)]
struct Assembler {
    database_name: String,
    tables: Vec<(String, Table)>,
    index: HashMap<(String, String), usize>,
}

impl Assembler {
    fn new(database_name: &str) -> Self {
        Self {
            database_name: database_name.to_string(),
            ..Default::default()
        }
    }

    fn table_mut(&mut self, schema: &str, table: &str) -> &mut Table {
        let key = (schema.to_string(), table.to_string());
        let position = match self.index.get(&key) {
            Some(&position) => position,
            None => {
                self.tables.push((schema.to_string(), Table::new(table)));
                self.index.insert(key, self.tables.len() - 1);
                self.tables.len() - 1
            }
        };
        &mut self.tables[position].1
    }

    fn add_key_column(&mut self, schema: &str, table: &str, constraint: Option<&str>, column: &str) {
        let table = self.table_mut(schema, table);
        let pk = table.primary_key.get_or_insert_with(Default::default);
        if pk.primary_key_name.is_none() {
            pk.primary_key_name = constraint.map(str::to_string);
        }
        pk.columns.push(PrimaryKeyColumn {
            column_name: column.to_string(),
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn add_reference(
        &mut self,
        schema: &str,
        table: &str,
        constraint: &str,
        from_column: &str,
        ref_schema: &str,
        ref_table: &str,
        to_column: &str,
        on_update: ForeignKeyAction,
        on_delete: ForeignKeyAction,
    ) {
        let to_table = format!("{}.{}.{}", self.database_name, ref_schema, ref_table);
        let table = self.table_mut(schema, table);
        let position = match table.foreign_keys.iter().position(|fk| fk.name == constraint) {
            Some(position) => position,
            None => {
                let mut fk = ForeignKey::new(constraint, to_table);
                fk.on_update = on_update;
                fk.on_delete = on_delete;
                table.foreign_keys.push(fk);
                table.foreign_keys.len() - 1
            }
        };
        table.foreign_keys[position].references.push(Reference {
            from_column: from_column.to_string(),
            to_column: to_column.to_string(),
        });
    }

    fn into_database(self) -> Database {
        let mut database = Database::new(&self.database_name);
        for (schema_name, table) in self.tables {
            match database.find_schema_by_name_mut(&schema_name) {
                Some(schema) => schema.tables.push(table),
                None => database
                    .schemas
                    .push(Schema::new(&schema_name).with_table(table)),
            }
        }
        database
    }
}

/// Split `VARCHAR(100)` or `DECIMAL(10,2)` into base type, length and scale.
fn split_type(declared: &str) -> (String, Option<u32>, Option<u32>) {
    let Some((base, rest)) = declared.split_once('(') else {
        return (declared.trim().to_uppercase(), None, None);
    };
    let args = rest.trim_end_matches(')');
    let mut parts = args.split(',').map(|p| p.trim().parse::<u32>().ok());
    let length = parts.next().flatten();
    let scale = parts.next().flatten();
    (base.trim().to_uppercase(), length, scale)
}

/// Length and scale worth recording for a catalog type.
fn sizing(
    data_type: &str,
    char_length: Option<i64>,
    precision: Option<i64>,
    scale: Option<i64>,
) -> (Option<u32>, Option<u32>) {
    let lower = data_type.to_lowercase();
    let to_u32 = |v: Option<i64>| v.and_then(|v| u32::try_from(v).ok());
    if lower.contains("char") {
        (to_u32(char_length), None)
    } else if lower == "numeric" || lower == "decimal" {
        (to_u32(precision), to_u32(scale))
    } else {
        (None, None)
    }
}

mod postgres {
    use super::*;
    use sqlx::{PgPool, Row};

    /// Catalog type names in the spelling DDL uses.
    pub(super) fn normalize_type(data_type: &str) -> String {
        match data_type {
            "character varying" => "VARCHAR".to_string(),
            "character" => "CHAR".to_string(),
            "timestamp without time zone" => "TIMESTAMP".to_string(),
            "timestamp with time zone" => "TIMESTAMPTZ".to_string(),
            "double precision" => "DOUBLE PRECISION".to_string(),
            other => other.to_uppercase(),
        }
    }

    pub async fn introspect(pool: &PgPool, database_name: &str) -> ContextResult<Database> {
        let mut assembler = Assembler::new(database_name);

        for row in sqlx::query(queries::postgres::TABLES).fetch_all(pool).await? {
            let schema: String = row.try_get("table_schema")?;
            let table: String = row.try_get("table_name")?;
            assembler.table_mut(&schema, &table);
        }

        for row in sqlx::query(queries::postgres::COLUMNS).fetch_all(pool).await? {
            let schema: String = row.try_get("table_schema")?;
            let table: String = row.try_get("table_name")?;
            let name: String = row.try_get("column_name")?;
            let data_type: String = row.try_get("data_type")?;
            let nullable: String = row.try_get("is_nullable")?;
            let default: Option<String> = row.try_get("column_default")?;
            let identity: Option<String> = row.try_get("is_identity")?;
            let (length, scale) = sizing(
                &data_type,
                row.try_get::<Option<i32>, _>("char_length")?.map(i64::from),
                row.try_get::<Option<i32>, _>("numeric_precision")?.map(i64::from),
                row.try_get::<Option<i32>, _>("numeric_scale")?.map(i64::from),
            );

            let mut column = Column::new(name, normalize_type(&data_type));
            column.nullable = nullable == "YES";
            column.autoincrement = default.is_some_and(|d| d.starts_with("nextval("))
                || identity.as_deref() == Some("YES");
            column.length = length;
            column.scale = scale;
            assembler.table_mut(&schema, &table).columns.push(column);
        }

        for row in sqlx::query(queries::postgres::PRIMARY_KEYS)
            .fetch_all(pool)
            .await?
        {
            let schema: String = row.try_get("table_schema")?;
            let table: String = row.try_get("table_name")?;
            let constraint: String = row.try_get("constraint_name")?;
            let column: String = row.try_get("column_name")?;
            assembler.add_key_column(&schema, &table, Some(&constraint), &column);
        }

        for row in sqlx::query(queries::postgres::FOREIGN_KEYS)
            .fetch_all(pool)
            .await?
        {
            let update_rule: String = row.try_get("update_rule")?;
            let delete_rule: String = row.try_get("delete_rule")?;
            assembler.add_reference(
                &row.try_get::<String, _>("table_schema")?,
                &row.try_get::<String, _>("table_name")?,
                &row.try_get::<String, _>("constraint_name")?,
                &row.try_get::<String, _>("column_name")?,
                &row.try_get::<String, _>("ref_schema")?,
                &row.try_get::<String, _>("ref_table")?,
                &row.try_get::<String, _>("ref_column")?,
                ForeignKeyAction::parse(&update_rule),
                ForeignKeyAction::parse(&delete_rule),
            );
        }

        Ok(assembler.into_database())
    }
}

mod mysql {
    use super::*;
    use sqlx::{MySqlPool, Row};

    pub async fn introspect(pool: &MySqlPool, database_name: &str) -> ContextResult<Database> {
        let mut assembler = Assembler::new(database_name);

        for row in sqlx::query(queries::mysql::TABLES).fetch_all(pool).await? {
            let schema: String = row.try_get("TABLE_SCHEMA")?;
            let table: String = row.try_get("TABLE_NAME")?;
            assembler.table_mut(&schema, &table);
        }

        for row in sqlx::query(queries::mysql::COLUMNS).fetch_all(pool).await? {
            let schema: String = row.try_get("TABLE_SCHEMA")?;
            let table: String = row.try_get("TABLE_NAME")?;
            let name: String = row.try_get("COLUMN_NAME")?;
            let data_type: String = row.try_get("DATA_TYPE")?;
            let nullable: String = row.try_get("IS_NULLABLE")?;
            let extra: Option<String> = row.try_get("EXTRA")?;
            let (length, scale) = sizing(
                &data_type,
                row.try_get("CHAR_LENGTH")?,
                row.try_get("NUMERIC_PRECISION")?,
                row.try_get("NUMERIC_SCALE")?,
            );

            let mut column = Column::new(name, data_type.to_uppercase());
            column.nullable = nullable == "YES";
            column.autoincrement = extra
                .is_some_and(|e| e.to_lowercase().contains("auto_increment"));
            column.length = length;
            column.scale = scale;
            assembler.table_mut(&schema, &table).columns.push(column);
        }

        for row in sqlx::query(queries::mysql::PRIMARY_KEYS).fetch_all(pool).await? {
            let schema: String = row.try_get("TABLE_SCHEMA")?;
            let table: String = row.try_get("TABLE_NAME")?;
            let column: String = row.try_get("COLUMN_NAME")?;
            assembler.add_key_column(&schema, &table, None, &column);
        }

        for row in sqlx::query(queries::mysql::FOREIGN_KEYS).fetch_all(pool).await? {
            let update_rule: String = row.try_get("UPDATE_RULE")?;
            let delete_rule: String = row.try_get("DELETE_RULE")?;
            assembler.add_reference(
                &row.try_get::<String, _>("TABLE_SCHEMA")?,
                &row.try_get::<String, _>("TABLE_NAME")?,
                &row.try_get::<String, _>("CONSTRAINT_NAME")?,
                &row.try_get::<String, _>("COLUMN_NAME")?,
                &row.try_get::<String, _>("REF_SCHEMA")?,
                &row.try_get::<String, _>("REF_TABLE")?,
                &row.try_get::<String, _>("REF_COLUMN")?,
                ForeignKeyAction::parse(&update_rule),
                ForeignKeyAction::parse(&delete_rule),
            );
        }

        Ok(assembler.into_database())
    }
}

mod sqlite {
    use super::*;
    use sqlx::{Row, SqlitePool};

    /// SQLite exposes a single schema.
    pub(super) const SCHEMA: &str = "main";

    static NAMED_FOREIGN_KEY: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"(?i)CONSTRAINT\s+["`\[]?([\w$]+)["`\]]?\s+FOREIGN\s+KEY\s*\(([^)]*)\)"#)
            .expect("Invalid foreign key regex")
    });

    /// Constraint names declared in `CREATE TABLE` text, keyed by their
    /// comma-joined from-column list.
    pub(super) fn declared_fk_names(create_sql: &str) -> HashMap<String, String> {
        NAMED_FOREIGN_KEY
            .captures_iter(create_sql)
            .map(|caps| {
                let columns: Vec<String> = caps[2]
                    .split(',')
                    .map(|c| c.trim().trim_matches(|ch| matches!(ch, '"' | '`' | '[' | ']')).to_string())
                    .collect();
                (columns.join(","), caps[1].to_string())
            })
            .collect()
    }

    pub async fn introspect(pool: &SqlitePool, database_name: &str) -> ContextResult<Database> {
        let mut assembler = Assembler::new(database_name);
        let tables = sqlx::query(queries::sqlite::TABLES).fetch_all(pool).await?;

        for table_row in &tables {
            let table_name: String = table_row.try_get("name")?;
            let create_sql: Option<String> = table_row.try_get("sql")?;
            let create_sql = create_sql.unwrap_or_default();
            let has_autoincrement = create_sql.to_uppercase().contains("AUTOINCREMENT");

            let pragma = format!("PRAGMA table_info('{}')", table_name.replace('\'', "''"));
            let column_rows = sqlx::query(&pragma).fetch_all(pool).await?;
            let mut key_columns: Vec<(i64, String)> = Vec::new();
            let mut columns = Vec::with_capacity(column_rows.len());
            for row in &column_rows {
                let name: String = row.try_get("name")?;
                let declared: String = row.try_get("type")?;
                let notnull: i64 = row.try_get("notnull")?;
                let pk: i64 = row.try_get("pk")?;
                let (base, length, scale) = split_type(&declared);

                let mut column = Column::new(&name, base);
                column.nullable = notnull == 0 && pk == 0;
                column.length = length;
                column.scale = scale;
                if pk > 0 {
                    key_columns.push((pk, name));
                }
                columns.push(column);
            }
            key_columns.sort();
            if has_autoincrement && key_columns.len() == 1 {
                let key = &key_columns[0].1;
                if let Some(column) = columns.iter_mut().find(|c| &c.column_name == key) {
                    column.autoincrement = column.column_type == "INTEGER";
                }
            }

            assembler.table_mut(SCHEMA, &table_name).columns = columns;
            for (_, column) in &key_columns {
                assembler.add_key_column(SCHEMA, &table_name, None, column);
            }

            let names = declared_fk_names(&create_sql);
            let pragma = format!(
                "PRAGMA foreign_key_list('{}')",
                table_name.replace('\'', "''")
            );
            let fk_rows = sqlx::query(&pragma).fetch_all(pool).await?;
            let mut grouped: Vec<(i64, Vec<(String, String, String, String, String)>)> = Vec::new();
            for row in &fk_rows {
                let id: i64 = row.try_get("id")?;
                let entry = (
                    row.try_get::<String, _>("table")?,
                    row.try_get::<String, _>("from")?,
                    row.try_get::<Option<String>, _>("to")?.unwrap_or_default(),
                    row.try_get::<String, _>("on_update")?,
                    row.try_get::<String, _>("on_delete")?,
                );
                match grouped.iter_mut().find(|(g, _)| *g == id) {
                    Some((_, refs)) => refs.push(entry),
                    None => grouped.push((id, vec![entry])),
                }
            }
            grouped.sort_by_key(|(id, _)| *id);

            for (id, refs) in grouped {
                let from_columns: Vec<&str> = refs.iter().map(|r| r.1.as_str()).collect();
                let constraint = names
                    .get(&from_columns.join(","))
                    .cloned()
                    .unwrap_or_else(|| format!("fk_{}_{}", table_name, id));
                for (ref_table, from, to, on_update, on_delete) in &refs {
                    assembler.add_reference(
                        SCHEMA,
                        &table_name,
                        &constraint,
                        from,
                        SCHEMA,
                        ref_table,
                        to,
                        ForeignKeyAction::parse(on_update),
                        ForeignKeyAction::parse(on_delete),
                    );
                }
            }
        }

        Ok(assembler.into_database())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PoolOptions, ProviderConfig};

    #[test]
    fn test_split_type() {
        assert_eq!(split_type("varchar(100)"), ("VARCHAR".to_string(), Some(100), None));
        assert_eq!(
            split_type("DECIMAL(10, 2)"),
            ("DECIMAL".to_string(), Some(10), Some(2))
        );
        assert_eq!(split_type("INTEGER"), ("INTEGER".to_string(), None, None));
    }

    #[test]
    fn test_sizing_only_for_char_and_decimal() {
        assert_eq!(sizing("character varying", Some(50), None, None), (Some(50), None));
        assert_eq!(sizing("numeric", None, Some(10), Some(2)), (Some(10), Some(2)));
        assert_eq!(sizing("integer", None, Some(32), Some(0)), (None, None));
    }

    #[test]
    fn test_postgres_type_names() {
        assert_eq!(postgres::normalize_type("character varying"), "VARCHAR");
        assert_eq!(postgres::normalize_type("integer"), "INTEGER");
    }

    #[test]
    fn test_declared_fk_names() {
        let sql = r#"CREATE TABLE "address" (
            "id" INTEGER NOT NULL,
            "person_id" INTEGER,
            CONSTRAINT "fk_address_person" FOREIGN KEY ("person_id") REFERENCES "person" ("id")
        )"#;
        let names = sqlite::declared_fk_names(sql);
        assert_eq!(names.get("person_id").map(String::as_str), Some("fk_address_person"));
    }

    #[tokio::test]
    async fn test_introspect_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProviderConfig::new(
            "crm",
            format!("sqlite:{}", dir.path().join("crm.db").display()),
            PoolOptions::default(),
        )
        .unwrap();
        let pool = DbPool::connect(&config).await.unwrap();
        let DbPool::SQLite(sqlite_pool) = &pool else {
            panic!("expected a SQLite pool");
        };
        sqlx::query(
            "CREATE TABLE person (id INTEGER PRIMARY KEY AUTOINCREMENT, name VARCHAR(100) NOT NULL)",
        )
        .execute(sqlite_pool)
        .await
        .unwrap();
        sqlx::query(
            "CREATE TABLE address (id INTEGER NOT NULL, person_id INTEGER, PRIMARY KEY (id), \
             CONSTRAINT fk_address_person FOREIGN KEY (person_id) REFERENCES person (id) ON DELETE CASCADE)",
        )
        .execute(sqlite_pool)
        .await
        .unwrap();

        let database = introspect(&pool, "crm").await.unwrap();
        let schema = database.find_schema_by_name("main").unwrap();
        assert_eq!(schema.tables.len(), 2);

        let person = schema.find_table_by_name("person").unwrap();
        let id = person.find_column_by_name("id").unwrap();
        assert!(id.autoincrement);
        assert!(!id.nullable);
        let name = person.find_column_by_name("name").unwrap();
        assert_eq!(name.column_type, "VARCHAR");
        assert_eq!(name.length, Some(100));

        let address = schema.find_table_by_name("address").unwrap();
        assert!(!address.find_column_by_name("id").unwrap().autoincrement);
        assert_eq!(address.foreign_keys.len(), 1);
        let fk = &address.foreign_keys[0];
        assert_eq!(fk.name, "fk_address_person");
        assert_eq!(fk.to_table, "crm.main.person");
        assert_eq!(fk.on_delete, ForeignKeyAction::Cascade);
        assert_eq!(fk.references[0].from_column, "person_id");
        assert_eq!(fk.references[0].to_column, "id");
        pool.close().await;
    }
}
