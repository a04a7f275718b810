//! Structural diff between a model database and a live one.
//!
//! Schemas, tables and columns are matched by name. Foreign keys are matched
//! by target and column pairs, since live catalogs do not always keep the
//! names the model uses.

use crate::models::{Column, Database, DatabaseType, ForeignKey, PrimaryKey, Schema, Table};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatabaseDiff {
    pub database: String,
    pub added_schemas: Vec<Schema>,
    pub removed_schemas: Vec<String>,
    pub changed_schemas: Vec<SchemaDiff>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDiff {
    pub schema: String,
    pub added_tables: Vec<Table>,
    pub removed_tables: Vec<String>,
    pub changed_tables: Vec<TableDiff>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableDiff {
    pub table: String,
    pub added_columns: Vec<Column>,
    pub removed_columns: Vec<String>,
    /// Live definitions of columns whose physical attributes differ.
    pub changed_columns: Vec<Column>,
    /// `Some(new key)` when the key columns differ.
    pub primary_key: Option<Option<PrimaryKey>>,
    pub added_foreign_keys: Vec<ForeignKey>,
    pub removed_foreign_keys: Vec<String>,
    /// `(model name, live definition)` for keys whose actions differ.
    pub changed_foreign_keys: Vec<(String, ForeignKey)>,
}

impl DatabaseDiff {
    pub fn is_empty(&self) -> bool {
        self.added_schemas.is_empty()
            && self.removed_schemas.is_empty()
            && self.changed_schemas.is_empty()
    }

    /// Number of added, removed and changed nodes at every level.
    pub fn change_count(&self) -> usize {
        self.added_schemas.len()
            + self.removed_schemas.len()
            + self
                .changed_schemas
                .iter()
                .map(SchemaDiff::change_count)
                .sum::<usize>()
    }
}

impl SchemaDiff {
    pub fn is_empty(&self) -> bool {
        self.added_tables.is_empty() && self.removed_tables.is_empty() && self.changed_tables.is_empty()
    }

    fn change_count(&self) -> usize {
        self.added_tables.len()
            + self.removed_tables.len()
            + self
                .changed_tables
                .iter()
                .map(TableDiff::change_count)
                .sum::<usize>()
    }
}

impl TableDiff {
    pub fn is_empty(&self) -> bool {
        self.change_count() == 0
    }

    fn change_count(&self) -> usize {
        self.added_columns.len()
            + self.removed_columns.len()
            + self.changed_columns.len()
            + usize::from(self.primary_key.is_some())
            + self.added_foreign_keys.len()
            + self.removed_foreign_keys.len()
            + self.changed_foreign_keys.len()
    }
}

fn key_columns(pk: &Option<PrimaryKey>) -> Vec<&str> {
    pk.as_ref().map(PrimaryKey::column_names).unwrap_or_default()
}

pub fn diff_table(model: &Table, live: &Table) -> TableDiff {
    let mut diff = TableDiff {
        table: model.table_name.clone(),
        ..Default::default()
    };

    for column in &model.columns {
        match live.find_column_by_name(&column.column_name) {
            None => diff.removed_columns.push(column.column_name.clone()),
            Some(live_column) if !column.same_definition(live_column) => {
                diff.changed_columns.push(live_column.clone())
            }
            Some(_) => {}
        }
    }
    diff.added_columns = live
        .columns
        .iter()
        .filter(|c| model.find_column_by_name(&c.column_name).is_none())
        .cloned()
        .collect();

    if key_columns(&model.primary_key) != key_columns(&live.primary_key) {
        diff.primary_key = Some(live.primary_key.clone());
    }

    for fk in &model.foreign_keys {
        match live.foreign_keys.iter().find(|l| l.same_target(fk)) {
            None => diff.removed_foreign_keys.push(fk.name.clone()),
            Some(live_fk) if !fk.same_definition(live_fk) => {
                diff.changed_foreign_keys.push((fk.name.clone(), live_fk.clone()))
            }
            Some(_) => {}
        }
    }
    diff.added_foreign_keys = live
        .foreign_keys
        .iter()
        .filter(|l| !model.foreign_keys.iter().any(|fk| fk.same_target(l)))
        .cloned()
        .collect();

    diff
}

pub fn diff_schema(model: &Schema, live: &Schema) -> SchemaDiff {
    let mut diff = SchemaDiff {
        schema: model.schema_name.clone(),
        ..Default::default()
    };
    for table in &model.tables {
        match live.find_table_by_name(&table.table_name) {
            None => diff.removed_tables.push(table.table_name.clone()),
            Some(live_table) => {
                let table_diff = diff_table(table, live_table);
                if !table_diff.is_empty() {
                    diff.changed_tables.push(table_diff);
                }
            }
        }
    }
    diff.added_tables = live
        .tables
        .iter()
        .filter(|t| model.find_table_by_name(&t.table_name).is_none())
        .cloned()
        .collect();
    diff
}

/// Diff `live` against `model`; both describe the same database.
pub fn diff_database(model: &Database, live: &Database) -> DatabaseDiff {
    let mut diff = DatabaseDiff {
        database: live.database_name.clone(),
        ..Default::default()
    };
    for schema in &model.schemas {
        match live.find_schema_by_name(&schema.schema_name) {
            None => diff.removed_schemas.push(schema.schema_name.clone()),
            Some(live_schema) => {
                let schema_diff = diff_schema(schema, live_schema);
                if !schema_diff.is_empty() {
                    diff.changed_schemas.push(schema_diff);
                }
            }
        }
    }
    diff.added_schemas = live
        .schemas
        .iter()
        .filter(|s| model.find_schema_by_name(&s.schema_name).is_none())
        .cloned()
        .collect();
    diff
}

/// Rename the only live schema of a single-schema dialect to the model's
/// schema name, rewriting foreign key targets to match.
pub fn align_single_schema(dialect: DatabaseType, model: &Database, live: &mut Database) {
    if dialect != DatabaseType::SQLite || model.schemas.len() != 1 || live.schemas.len() != 1 {
        return;
    }
    let target = &model.schemas[0].schema_name;
    let schema = &mut live.schemas[0];
    if &schema.schema_name == target {
        return;
    }
    let old_prefix = format!("{}.{}.", live.database_name, schema.schema_name);
    let new_prefix = format!("{}.{}.", live.database_name, target);
    schema.schema_name = target.clone();
    for table in &mut schema.tables {
        for fk in &mut table.foreign_keys {
            if let Some(rest) = fk.to_table.strip_prefix(&old_prefix) {
                fk.to_table = format!("{new_prefix}{rest}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ForeignKeyAction;

    fn person() -> Table {
        Table::new("person")
            .with_column(Column::new("id", "INTEGER").not_null())
            .with_column(Column::new("name", "VARCHAR").with_length(100))
            .with_primary_key(&["id"])
    }

    fn address() -> Table {
        Table::new("address")
            .with_column(Column::new("id", "INTEGER").not_null())
            .with_column(Column::new("person_id", "INTEGER"))
            .with_primary_key(&["id"])
            .with_foreign_key(
                ForeignKey::new("fk_address_person", "crm.public.person")
                    .with_reference("person_id", "id"),
            )
    }

    fn database(tables: Vec<Table>) -> Database {
        let mut schema = Schema::new("public");
        schema.tables = tables;
        Database::new("crm").with_schema(schema)
    }

    #[test]
    fn test_identical_databases_have_empty_diff() {
        let db = database(vec![person(), address()]);
        let diff = diff_database(&db, &db);
        assert!(diff.is_empty());
        assert_eq!(diff.change_count(), 0);
    }

    #[test]
    fn test_annotations_and_property_names_are_not_changes() {
        let mut annotated = person();
        annotated.columns = vec![
            Column::new("id", "INTEGER")
                .not_null()
                .with_property_name("key")
                .with_annotation("label", "Id"),
            Column::new("name", "varchar").with_length(100),
        ];
        let model = database(vec![annotated]);
        let live = database(vec![person()]);
        assert!(diff_database(&model, &live).is_empty());
    }

    #[test]
    fn test_column_changes() {
        let model = database(vec![person()]);
        let mut live_person = person();
        live_person.columns[1].length = Some(200);
        live_person.columns.push(Column::new("email", "TEXT"));
        live_person.columns.remove(0);
        live_person.primary_key = None;
        let live = database(vec![live_person]);

        let diff = diff_database(&model, &live);
        let table = &diff.changed_schemas[0].changed_tables[0];
        assert_eq!(table.removed_columns, vec!["id".to_string()]);
        assert_eq!(table.added_columns[0].column_name, "email");
        assert_eq!(table.changed_columns[0].length, Some(200));
        assert_eq!(table.primary_key, Some(None));
        assert_eq!(diff.change_count(), 4);
    }

    #[test]
    fn test_foreign_keys_match_by_target() {
        let model = database(vec![person(), address()]);
        let mut live_address = address();
        live_address.foreign_keys[0].name = "fk_address_0".to_string();
        live_address.foreign_keys[0].on_delete = ForeignKeyAction::Cascade;
        let live = database(vec![person(), live_address]);

        let diff = diff_database(&model, &live);
        let table = &diff.changed_schemas[0].changed_tables[0];
        assert!(table.added_foreign_keys.is_empty());
        assert!(table.removed_foreign_keys.is_empty());
        assert_eq!(table.changed_foreign_keys[0].0, "fk_address_person");
        assert_eq!(table.changed_foreign_keys[0].1.on_delete, ForeignKeyAction::Cascade);
    }

    #[test]
    fn test_table_and_schema_changes() {
        let model = database(vec![person(), address()]);
        let live = database(vec![person(), Table::new("invoice")])
            .with_schema(Schema::new("audit"));
        let diff = diff_database(&model, &live);
        assert_eq!(diff.added_schemas[0].schema_name, "audit");
        let schema = &diff.changed_schemas[0];
        assert_eq!(schema.removed_tables, vec!["address".to_string()]);
        assert_eq!(schema.added_tables[0].table_name, "invoice");
    }

    #[test]
    fn test_align_single_schema() {
        let model = database(vec![person()]);
        let mut live = Database::new("crm").with_schema(
            Schema::new("main").with_table(
                Table::new("address").with_foreign_key(
                    ForeignKey::new("fk", "crm.main.person").with_reference("person_id", "id"),
                ),
            ),
        );
        align_single_schema(DatabaseType::SQLite, &model, &mut live);
        assert_eq!(live.schemas[0].schema_name, "public");
        assert_eq!(live.schemas[0].tables[0].foreign_keys[0].to_table, "crm.public.person");

        let mut untouched = Database::new("crm").with_schema(Schema::new("main"));
        align_single_schema(DatabaseType::PostgreSQL, &model, &mut untouched);
        assert_eq!(untouched.schemas[0].schema_name, "main");
    }
}
