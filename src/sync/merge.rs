//! Folding a [`DatabaseDiff`] into the model.
//!
//! Additions are appended, removals excised and changed nodes updated field
//! by field, so surviving nodes keep their annotations, property names,
//! entity names and relationship names.

use crate::models::{Column, Database, ForeignKey, Model, Table};
use crate::sync::diff::{DatabaseDiff, TableDiff};

fn merge_column(column: &mut Column, live: &Column) {
    column.column_type = live.column_type.clone();
    column.nullable = live.nullable;
    column.autoincrement = live.autoincrement;
    column.length = live.length;
    column.scale = live.scale;
}

fn merge_foreign_key(fk: &mut ForeignKey, live: &ForeignKey) {
    fk.to_table = live.to_table.clone();
    fk.references = live.references.clone();
    fk.on_update = live.on_update;
    fk.on_delete = live.on_delete;
}

fn merge_table(table: &mut Table, diff: &TableDiff) {
    table
        .columns
        .retain(|c| !diff.removed_columns.contains(&c.column_name));
    for live in &diff.changed_columns {
        if let Some(column) = table.find_column_by_name_mut(&live.column_name) {
            merge_column(column, live);
        }
    }
    table.columns.extend(diff.added_columns.iter().cloned());

    if let Some(primary_key) = &diff.primary_key {
        table.primary_key = primary_key.clone();
    }

    table
        .foreign_keys
        .retain(|fk| !diff.removed_foreign_keys.contains(&fk.name));
    for (name, live) in &diff.changed_foreign_keys {
        if let Some(fk) = table.foreign_keys.iter_mut().find(|fk| &fk.name == name) {
            merge_foreign_key(fk, live);
        }
    }
    table
        .foreign_keys
        .extend(diff.added_foreign_keys.iter().cloned());
}

/// Apply `diff` to `database` in place.
pub fn merge_database(database: &mut Database, diff: &DatabaseDiff) {
    database
        .schemas
        .retain(|s| !diff.removed_schemas.contains(&s.schema_name));

    for schema_diff in &diff.changed_schemas {
        let Some(schema) = database.find_schema_by_name_mut(&schema_diff.schema) else {
            continue;
        };
        schema
            .tables
            .retain(|t| !schema_diff.removed_tables.contains(&t.table_name));
        for table_diff in &schema_diff.changed_tables {
            if let Some(table) = schema.find_table_by_name_mut(&table_diff.table) {
                merge_table(table, table_diff);
            }
        }
        schema.tables.extend(schema_diff.added_tables.iter().cloned());
    }

    database.schemas.extend(diff.added_schemas.iter().cloned());
}

/// Merge `live` into `model`: an unknown database is appended whole,
/// a known one gets `diff` applied.
pub fn merge_into_model(model: &mut Model, live: &Database, diff: &DatabaseDiff) {
    match model.find_database_by_name_mut(&live.database_name) {
        Some(database) => merge_database(database, diff),
        None => model.databases.push(live.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ForeignKeyAction, Schema};
    use crate::sync::diff::diff_database;

    fn model_database() -> Database {
        Database::new("crm").with_schema(
            Schema::new("public")
                .with_table(
                    Table::new("person")
                        .with_column(
                            Column::new("id", "INTEGER")
                                .not_null()
                                .with_annotation("label", "Identifier"),
                        )
                        .with_column(
                            Column::new("name", "VARCHAR")
                                .with_length(50)
                                .with_property_name("fullName"),
                        )
                        .with_column(Column::new("legacy", "TEXT"))
                        .with_primary_key(&["id"]),
                )
                .with_table(
                    Table::new("address")
                        .with_column(Column::new("id", "INTEGER").not_null())
                        .with_column(Column::new("person_id", "INTEGER"))
                        .with_foreign_key(
                            ForeignKey::new("fk_address_person", "crm.public.person")
                                .with_reference("person_id", "id")
                                .with_many_property_name("addresses"),
                        ),
                ),
        )
    }

    #[test]
    fn test_merge_preserves_annotations() {
        let mut model = model_database();
        let mut live = model_database();
        {
            let person = live.schemas[0].find_table_by_name_mut("person").unwrap();
            person.columns[0].annotations.clear();
            person.columns[1].property_name = None;
            person.columns[1].length = Some(120);
            person.columns.retain(|c| c.column_name != "legacy");
            person.columns.push(Column::new("email", "VARCHAR").with_length(200));
            let address = live.schemas[0].find_table_by_name_mut("address").unwrap();
            address.foreign_keys[0].name = "fk_address_0".to_string();
            address.foreign_keys[0].many_property_name = None;
            address.foreign_keys[0].on_delete = ForeignKeyAction::Cascade;
        }

        let diff = diff_database(&model, &live);
        merge_database(&mut model, &diff);

        let person = model.schemas[0].find_table_by_name("person").unwrap();
        let names: Vec<&str> = person.columns.iter().map(|c| c.column_name.as_str()).collect();
        assert_eq!(names, vec!["id", "name", "email"]);
        assert_eq!(person.columns[0].annotations["label"], "Identifier");
        assert_eq!(person.columns[1].property_name.as_deref(), Some("fullName"));
        assert_eq!(person.columns[1].length, Some(120));

        let fk = &model.schemas[0].find_table_by_name("address").unwrap().foreign_keys[0];
        assert_eq!(fk.name, "fk_address_person");
        assert_eq!(fk.many_property_name.as_deref(), Some("addresses"));
        assert_eq!(fk.on_delete, ForeignKeyAction::Cascade);

        assert!(diff_database(&model, &live).is_empty());
    }

    #[test]
    fn test_merge_excises_removed_tables() {
        let mut model = model_database();
        let mut live = model_database();
        live.schemas[0].tables.retain(|t| t.table_name != "address");
        live.schemas[0].tables.push(Table::new("invoice").with_column(Column::new("id", "INTEGER")));

        let diff = diff_database(&model, &live);
        merge_database(&mut model, &diff);
        let names: Vec<&str> = model.schemas[0]
            .tables
            .iter()
            .map(|t| t.table_name.as_str())
            .collect();
        assert_eq!(names, vec!["person", "invoice"]);
    }

    #[test]
    fn test_unknown_database_is_appended() {
        let mut model = Model::new(vec![model_database()]);
        let live = Database::new("billing").with_schema(Schema::new("public"));
        merge_into_model(&mut model, &live, &diff_database(&Database::new("billing"), &live));
        assert_eq!(model.databases.len(), 2);
        assert_eq!(model.databases[1].database_name, "billing");
    }
}
