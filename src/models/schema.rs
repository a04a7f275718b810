//! The schema model.
//!
//! An ownership tree `Model → Database → Schema → Table → Column` with
//! primary keys and foreign keys hanging off tables. Foreign keys point at
//! their target table by qualified name; [`Model::init`] resolves every such
//! reference and records the qualified name of each table.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{ContextError, ContextResult};
use crate::models::qualified::QualifiedName;

/// Free-form metadata attached to model nodes and preserved across merges.
pub type Annotations = BTreeMap<String, String>;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Model {
    #[serde(default)]
    pub databases: Vec<Database>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub site_nodes: Vec<SiteNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub use_cases: Vec<UseCase>,
    #[serde(skip)]
    initialized: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Database {
    pub database_name: String,
    #[serde(default)]
    pub schemas: Vec<Schema>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub schema_name: String,
    #[serde(default)]
    pub tables: Vec<Table>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub table_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_name: Option<String>,
    #[serde(default)]
    pub columns: Vec<Column>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<PrimaryKey>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKey>,
    #[serde(default, skip_serializing_if = "Annotations::is_empty")]
    pub annotations: Annotations,
    /// Set by [`Model::init`].
    #[serde(skip)]
    qualified_name: QualifiedName,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub column_name: String,
    pub column_type: String,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub autoincrement: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
    #[serde(default = "default_true")]
    pub searchable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_name: Option<String>,
    #[serde(default, skip_serializing_if = "Annotations::is_empty")]
    pub annotations: Annotations,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrimaryKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key_name: Option<String>,
    pub columns: Vec<PrimaryKeyColumn>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrimaryKeyColumn {
    pub column_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub name: String,
    /// Qualified name of the referenced table.
    pub to_table: String,
    pub references: Vec<Reference>,
    #[serde(default)]
    pub on_update: ForeignKeyAction,
    #[serde(default)]
    pub on_delete: ForeignKeyAction,
    /// Name of the one-to-many relationship seen from the referenced table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub many_property_name: Option<String>,
    #[serde(default, skip_serializing_if = "Annotations::is_empty")]
    pub annotations: Annotations,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub from_column: String,
    pub to_column: String,
}

/// Foreign key referential action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForeignKeyAction {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ForeignKeyAction {
    /// Parse from database-specific string.
    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "CASCADE" => Self::Cascade,
            "SET NULL" => Self::SetNull,
            "SET DEFAULT" => Self::SetDefault,
            "RESTRICT" => Self::Restrict,
            _ => Self::NoAction,
        }
    }
}

impl std::fmt::Display for ForeignKeyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoAction => write!(f, "NO ACTION"),
            Self::Restrict => write!(f, "RESTRICT"),
            Self::Cascade => write!(f, "CASCADE"),
            Self::SetNull => write!(f, "SET NULL"),
            Self::SetDefault => write!(f, "SET DEFAULT"),
        }
    }
}

/// A navigation node; may point at a use case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteNode {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_case: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child_nodes: Vec<SiteNode>,
}

/// A logical view bound to a qualified table, optionally filtered by a query template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UseCase {
    pub name: String,
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

/// A foreign key seen as a one-to-many relationship from its referenced table.
#[derive(Debug, Clone, Copy)]
pub struct Relationship<'a> {
    /// The referencing ("many") table that owns the foreign key.
    pub from_table: &'a Table,
    pub foreign_key: &'a ForeignKey,
}

/// Coarse value category of a column, used to coerce key strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Integer,
    Float,
    Boolean,
    Text,
}

impl Model {
    pub fn new(databases: Vec<Database>) -> Self {
        Self {
            databases,
            ..Default::default()
        }
    }

    /// Parse a JSON model description and resolve it.
    pub fn load(description: &str) -> ContextResult<Self> {
        let mut model: Model = serde_json::from_str(description)?;
        model.init().map_err(|e| match e {
            ContextError::ModelIntegrity { unresolved } => ContextError::model_parse(format!(
                "unresolved references: {}",
                unresolved.join("; ")
            )),
            other => other,
        })?;
        Ok(model)
    }

    /// Serialize the model back to its JSON description.
    pub fn to_description(&self) -> ContextResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ContextError::store(format!("Cannot serialize model: {e}")))
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Resolve every cross reference.
    ///
    /// Checks name uniqueness in every scope, primary key columns, foreign key
    /// targets and columns, and use case tables. All problems are collected
    /// before failing.
    pub fn init(&mut self) -> ContextResult<()> {
        self.initialized = false;
        let mut unresolved = Vec::new();

        let mut database_names = HashSet::new();
        for database in &mut self.databases {
            if !database_names.insert(database.database_name.clone()) {
                unresolved.push(format!(
                    "duplicate database name '{}'",
                    database.database_name
                ));
            }
            let mut schema_names = HashSet::new();
            for schema in &mut database.schemas {
                if !schema_names.insert(schema.schema_name.clone()) {
                    unresolved.push(format!(
                        "duplicate schema name '{}.{}'",
                        database.database_name, schema.schema_name
                    ));
                }
                let mut table_names = HashSet::new();
                for table in &mut schema.tables {
                    table.qualified_name = QualifiedName::new(
                        &database.database_name,
                        &schema.schema_name,
                        &table.table_name,
                    );
                    if !table_names.insert(table.table_name.clone()) {
                        unresolved.push(format!("duplicate table name '{}'", table.qualified_name));
                    }
                    table.check_columns(&mut unresolved);
                }
            }
        }

        let index: HashMap<QualifiedName, &Table> = self
            .tables()
            .map(|t| (t.qualified_name.clone(), t))
            .collect();

        for table in self.tables() {
            for fk in &table.foreign_keys {
                let location = format!("foreign key '{}' on {}", fk.name, table.qualified_name);
                if fk.references.is_empty() {
                    unresolved.push(format!("{location}: no references"));
                }
                for reference in &fk.references {
                    if table.find_column_by_name(&reference.from_column).is_none() {
                        unresolved.push(format!(
                            "{location}: from column '{}' not found",
                            reference.from_column
                        ));
                    }
                }
                let target = QualifiedName::parse(&fk.to_table)
                    .ok()
                    .and_then(|name| index.get(&name).copied());
                let Some(to_table) = target else {
                    unresolved.push(format!("{location}: to table '{}' not found", fk.to_table));
                    continue;
                };
                for reference in &fk.references {
                    if to_table.find_column_by_name(&reference.to_column).is_none() {
                        unresolved.push(format!(
                            "{location}: to column '{}.{}' not found",
                            fk.to_table, reference.to_column
                        ));
                    }
                }
            }
        }

        let mut use_case_names = HashSet::new();
        for use_case in &self.use_cases {
            if !use_case_names.insert(use_case.name.as_str()) {
                unresolved.push(format!("duplicate use case name '{}'", use_case.name));
            }
            let resolved = QualifiedName::parse(&use_case.table)
                .ok()
                .is_some_and(|name| index.contains_key(&name));
            if !resolved {
                unresolved.push(format!(
                    "use case '{}': table '{}' not found",
                    use_case.name, use_case.table
                ));
            }
        }

        let mut stack: Vec<&SiteNode> = self.site_nodes.iter().collect();
        while let Some(node) = stack.pop() {
            if let Some(name) = &node.use_case {
                if !use_case_names.contains(name.as_str()) {
                    unresolved.push(format!(
                        "site node '{}': use case '{}' not found",
                        node.id, name
                    ));
                }
            }
            stack.extend(node.child_nodes.iter());
        }

        if unresolved.is_empty() {
            self.initialized = true;
            Ok(())
        } else {
            Err(ContextError::model_integrity(unresolved))
        }
    }

    /// Every table of every database, in tree order.
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.databases
            .iter()
            .flat_map(|d| d.schemas.iter())
            .flat_map(|s| s.tables.iter())
    }

    pub fn find_database_by_name(&self, name: &str) -> Option<&Database> {
        self.databases.iter().find(|d| d.database_name == name)
    }

    pub fn find_database_by_name_mut(&mut self, name: &str) -> Option<&mut Database> {
        self.databases.iter_mut().find(|d| d.database_name == name)
    }

    pub fn find_table(&self, name: &QualifiedName) -> Option<&Table> {
        self.find_database_by_name(&name.database)?
            .find_schema_by_name(&name.schema)?
            .find_table_by_name(&name.table)
    }

    /// Look up a table by `database.schema.table`, case-sensitively.
    pub fn find_table_by_qualified_name(&self, name: &str) -> Option<&Table> {
        let name = QualifiedName::parse(name).ok()?;
        self.find_table(&name)
    }

    /// Like [`Model::find_table_by_qualified_name`] but failing with `TableNotFound`.
    pub fn table(&self, name: &str) -> ContextResult<&Table> {
        self.find_table_by_qualified_name(name)
            .ok_or_else(|| ContextError::table_not_found(name))
    }

    /// Find the foreign key pointing at `table_name` whose relationship name is `rel_name`.
    pub fn find_one_to_many_relationship(
        &self,
        table_name: &str,
        rel_name: &str,
    ) -> Option<Relationship<'_>> {
        self.tables().find_map(|from_table| {
            from_table
                .foreign_keys
                .iter()
                .find(|fk| fk.to_table == table_name && fk.actual_many_property_name() == rel_name)
                .map(|foreign_key| Relationship {
                    from_table,
                    foreign_key,
                })
        })
    }

    pub fn find_use_case(&self, name: &str) -> Option<&UseCase> {
        self.use_cases.iter().find(|u| u.name == name)
    }
}

impl Database {
    pub fn new(database_name: impl Into<String>) -> Self {
        Self {
            database_name: database_name.into(),
            schemas: Vec::new(),
        }
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schemas.push(schema);
        self
    }

    pub fn find_schema_by_name(&self, name: &str) -> Option<&Schema> {
        self.schemas.iter().find(|s| s.schema_name == name)
    }

    pub fn find_schema_by_name_mut(&mut self, name: &str) -> Option<&mut Schema> {
        self.schemas.iter_mut().find(|s| s.schema_name == name)
    }
}

impl Schema {
    pub fn new(schema_name: impl Into<String>) -> Self {
        Self {
            schema_name: schema_name.into(),
            tables: Vec::new(),
        }
    }

    pub fn with_table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    pub fn find_table_by_name(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.table_name == name)
    }

    pub fn find_table_by_name_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.iter_mut().find(|t| t.table_name == name)
    }
}

impl Table {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            ..Default::default()
        }
    }

    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Set the primary key from column names, in key order.
    pub fn with_primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = Some(PrimaryKey {
            primary_key_name: None,
            columns: columns
                .iter()
                .map(|c| PrimaryKeyColumn {
                    column_name: c.to_string(),
                })
                .collect(),
        });
        self
    }

    pub fn with_foreign_key(mut self, foreign_key: ForeignKey) -> Self {
        self.foreign_keys.push(foreign_key);
        self
    }

    /// Qualified name recorded by [`Model::init`]; empty before that.
    pub fn qualified_name(&self) -> &QualifiedName {
        &self.qualified_name
    }

    pub fn actual_entity_name(&self) -> &str {
        self.entity_name.as_deref().unwrap_or(&self.table_name)
    }

    pub fn find_column_by_name(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.column_name == name)
    }

    pub fn find_column_by_name_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.column_name == name)
    }

    pub fn find_column_by_property(&self, property: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.actual_property_name() == property)
    }

    /// Primary key columns in key order; empty when the table has no key.
    pub fn key_columns(&self) -> Vec<&Column> {
        self.primary_key
            .iter()
            .flat_map(|pk| pk.columns.iter())
            .filter_map(|pkc| self.find_column_by_name(&pkc.column_name))
            .collect()
    }

    fn check_columns(&self, unresolved: &mut Vec<String>) {
        let mut names = HashSet::new();
        for column in &self.columns {
            if !names.insert(column.column_name.as_str()) {
                unresolved.push(format!(
                    "duplicate column name '{}.{}'",
                    self.qualified_name, column.column_name
                ));
            }
        }
        if let Some(pk) = &self.primary_key {
            for pkc in &pk.columns {
                if !names.contains(pkc.column_name.as_str()) {
                    unresolved.push(format!(
                        "primary key of {}: column '{}' not found",
                        self.qualified_name, pkc.column_name
                    ));
                }
            }
        }
    }
}

impl Column {
    pub fn new(column_name: impl Into<String>, column_type: impl Into<String>) -> Self {
        Self {
            column_name: column_name.into(),
            column_type: column_type.into(),
            nullable: true,
            searchable: true,
            ..Default::default()
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_autoincrement(mut self) -> Self {
        self.autoincrement = true;
        self
    }

    pub fn with_length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    pub fn with_property_name(mut self, property_name: impl Into<String>) -> Self {
        self.property_name = Some(property_name.into());
        self
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Property name used in rows; defaults to the column name.
    pub fn actual_property_name(&self) -> &str {
        self.property_name.as_deref().unwrap_or(&self.column_name)
    }

    pub fn value_kind(&self) -> ValueKind {
        let t = self.column_type.to_lowercase();
        if t.contains("bool") || t == "bit" {
            ValueKind::Boolean
        } else if t.contains("int") || t.contains("serial") {
            ValueKind::Integer
        } else if t.contains("float")
            || t.contains("double")
            || t.contains("real")
            || t.contains("numeric")
            || t.contains("decimal")
        {
            ValueKind::Float
        } else {
            ValueKind::Text
        }
    }

    /// Physical attributes only; names, annotations and property names are ignored.
    pub fn same_definition(&self, other: &Column) -> bool {
        self.column_type.eq_ignore_ascii_case(&other.column_type)
            && self.nullable == other.nullable
            && self.autoincrement == other.autoincrement
            && self.length == other.length
            && self.scale == other.scale
    }
}

impl ForeignKey {
    pub fn new(name: impl Into<String>, to_table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            to_table: to_table.into(),
            ..Default::default()
        }
    }

    pub fn with_reference(mut self, from_column: &str, to_column: &str) -> Self {
        self.references.push(Reference {
            from_column: from_column.to_string(),
            to_column: to_column.to_string(),
        });
        self
    }

    pub fn with_many_property_name(mut self, name: impl Into<String>) -> Self {
        self.many_property_name = Some(name.into());
        self
    }

    /// Relationship name; defaults to the foreign key name.
    pub fn actual_many_property_name(&self) -> &str {
        self.many_property_name.as_deref().unwrap_or(&self.name)
    }

    /// Same target, same column pairs and same actions.
    pub fn same_definition(&self, other: &ForeignKey) -> bool {
        self.same_target(other) && self.on_update == other.on_update && self.on_delete == other.on_delete
    }

    /// Same target table and column pairs, ignoring name and actions.
    pub fn same_target(&self, other: &ForeignKey) -> bool {
        self.to_table == other.to_table && self.references == other.references
    }
}

impl PrimaryKey {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.column_name.as_str()).collect()
    }
}
