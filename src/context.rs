//! The persistence context.
//!
//! [`PersistenceContext`] ties the connection registry, the installed model,
//! the session manager, the query compiler and the synchronization engine
//! together behind one set of operations.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::{info, warn};

use crate::db::ConnectionRegistry;
use crate::error::{ContextError, ContextResult};
use crate::models::{
    ConnectionStatus, CriteriaSet, Model, PkHelper, QualifiedName, Row, Table,
};
use crate::query::{QueryCompiler, template};
use crate::session::{ExecutionContext, InstalledModel, SessionManager};
use crate::store::ModelStore;
use crate::sync::diff::align_single_schema;
use crate::sync::{SyncEngine, SyncReport, SyncState};

pub struct PersistenceContext {
    registry: Arc<ConnectionRegistry>,
    sessions: SessionManager,
    sync: SyncEngine,
    store: Arc<dyn ModelStore>,
}

impl std::fmt::Debug for PersistenceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceContext")
            .field("store", &self.store.describe())
            .finish_non_exhaustive()
    }
}

/// Key row holding exactly the key properties of `table`.
///
/// Single-key and composite-key tables are handled separately; in both cases
/// `key` is a row map, never a bare key value.
fn key_row(table: &Table, key: &Row) -> ContextResult<Row> {
    let lookup = |column: &crate::models::Column| {
        key.get(column.actual_property_name())
            .or_else(|| key.get(&column.column_name))
            .filter(|v| !v.is_null())
            .cloned()
            .ok_or_else(|| {
                ContextError::invalid_input(format!(
                    "Missing key property '{}' for table {}",
                    column.actual_property_name(),
                    table.qualified_name()
                ))
            })
    };

    let columns = table.key_columns();
    let mut row = Row::new();
    match columns.as_slice() {
        [] => {
            return Err(ContextError::invalid_input(format!(
                "Table {} has no primary key",
                table.qualified_name()
            )));
        }
        [single] => {
            row.insert(single.actual_property_name().to_string(), lookup(single)?);
        }
        composite => {
            for column in composite {
                row.insert(column.actual_property_name().to_string(), lookup(column)?);
            }
        }
    }
    Ok(row)
}

impl PersistenceContext {
    pub fn new(registry: ConnectionRegistry, store: Arc<dyn ModelStore>) -> Self {
        Self {
            registry: Arc::new(registry),
            sessions: SessionManager::new(),
            sync: SyncEngine::new(),
            store,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub async fn model(&self) -> Arc<Model> {
        self.sessions.current().await.shared_model()
    }

    pub async fn sync_state(&self) -> SyncState {
        self.sync.state().await
    }

    /// Load the model from the store and install it.
    pub async fn load_model(&self) -> ContextResult<Arc<InstalledModel>> {
        let model = self.store.load().await?;
        self.sessions.install(model, &self.registry).await
    }

    /// Initialize `model` if needed and install it.
    pub async fn install_model(&self, mut model: Model) -> ContextResult<Arc<InstalledModel>> {
        if !model.is_initialized() {
            model.init()?;
        }
        self.sessions.install(model, &self.registry).await
    }

    pub async fn save_model(&self) -> ContextResult<()> {
        let installed = self.sessions.current().await;
        self.store.save(installed.model()).await?;
        info!(store = %self.store.describe(), "Model saved");
        Ok(())
    }

    pub async fn status(&self) -> Vec<(String, ConnectionStatus)> {
        let mut statuses = Vec::new();
        for provider in self.registry.providers().await {
            statuses.push((provider.name().to_string(), provider.status().await));
        }
        statuses
    }

    pub fn open_context(&self, ctx: &mut ExecutionContext) {
        self.sessions.open_context(ctx);
    }

    pub async fn close_context(&self, ctx: &mut ExecutionContext) {
        self.sessions.close_context(ctx).await;
    }

    pub async fn save(&self, ctx: &mut ExecutionContext, table: &str, row: &Row) -> ContextResult<u64> {
        self.sessions.save(ctx, table, row).await
    }

    pub async fn update(&self, ctx: &mut ExecutionContext, table: &str, row: &Row) -> ContextResult<u64> {
        self.sessions.update(ctx, table, row).await
    }

    pub async fn delete(&self, ctx: &mut ExecutionContext, table: &str, row: &Row) -> ContextResult<u64> {
        self.sessions.delete(ctx, table, row).await
    }

    pub async fn commit(&self, ctx: &mut ExecutionContext, database: &str) -> ContextResult<()> {
        self.sessions.commit(ctx, database).await
    }

    pub async fn rollback(&self, ctx: &mut ExecutionContext, database: &str) -> ContextResult<()> {
        self.sessions.rollback(ctx, database).await
    }

    pub async fn commit_all(&self, ctx: &mut ExecutionContext) -> ContextResult<()> {
        self.sessions.commit_all(ctx).await
    }

    pub async fn rollback_all(&self, ctx: &mut ExecutionContext) -> ContextResult<()> {
        self.sessions.rollback_all(ctx).await
    }

    /// Compiler resolving against `model`, quoting columns for the dialect
    /// `table`'s database is bound to.
    async fn compiler<'m>(&self, model: &'m Model, table: &str) -> QueryCompiler<'m> {
        let compiler = QueryCompiler::for_model(model);
        let Ok(name) = QualifiedName::parse(table) else {
            return compiler;
        };
        match self.sessions.current().await.binding(&name.database) {
            Ok(binding) => compiler.with_dialect(binding.dialect),
            Err(_) => compiler,
        }
    }

    /// Rows of `criteria.table` matching every criterion.
    pub async fn get_objects(
        &self,
        ctx: &mut ExecutionContext,
        criteria: &CriteriaSet,
    ) -> ContextResult<Vec<Row>> {
        let model = self.model().await;
        let compiled = self.compiler(&model, &criteria.table).await.compile(criteria)?;
        self.sessions.query(ctx, &compiled).await
    }

    pub async fn get_all_objects(
        &self,
        ctx: &mut ExecutionContext,
        table: &str,
    ) -> ContextResult<Vec<Row>> {
        self.get_objects(ctx, &CriteriaSet::new(table)).await
    }

    /// The row of `table` whose key matches `key`, if any.
    pub async fn get_object_by_pk(
        &self,
        ctx: &mut ExecutionContext,
        table: &str,
        key: &Row,
    ) -> ContextResult<Option<Row>> {
        let model = self.model().await;
        let key = key_row(model.table(table)?, key)?;
        let criteria = key
            .iter()
            .fold(CriteriaSet::new(table), |set, (property, value)| {
                set.eq(property.clone(), crate::models::QueryParam::from_json(value))
            });
        let compiled = self.compiler(&model, table).await.compile(&criteria)?;
        Ok(self.sessions.query(ctx, &compiled).await?.into_iter().next())
    }

    /// Like [`Self::get_object_by_pk`] with the key given as a key string.
    pub async fn get_object_by_pk_string(
        &self,
        ctx: &mut ExecutionContext,
        table: &str,
        pk: &str,
    ) -> ContextResult<Option<Row>> {
        let key = {
            let model = self.model().await;
            PkHelper::new(model.table(table)?).parse_pk_string(pk)?
        };
        self.get_object_by_pk(ctx, table, &key).await
    }

    pub async fn get_objects_by_query(
        &self,
        ctx: &mut ExecutionContext,
        query: &str,
        root: &JsonValue,
    ) -> ContextResult<Vec<Row>> {
        let compiled = QueryCompiler::new().compile_with_template(query, root, None)?;
        self.sessions.query(ctx, &compiled).await
    }

    pub async fn get_objects_by_query_and_criteria(
        &self,
        ctx: &mut ExecutionContext,
        query: &str,
        criteria: &CriteriaSet,
        root: &JsonValue,
    ) -> ContextResult<Vec<Row>> {
        let model = self.model().await;
        let compiled = self
            .compiler(&model, &criteria.table)
            .await
            .compile_with_template(query, root, Some(criteria))?;
        self.sessions.query(ctx, &compiled).await
    }

    /// Rows on the many side of the one-to-many relationship `relationship`
    /// pointing at `table`, for the parent `row`.
    pub async fn get_related_objects(
        &self,
        ctx: &mut ExecutionContext,
        table: &str,
        row: &Row,
        relationship: &str,
    ) -> ContextResult<Vec<Row>> {
        let model = self.model().await;
        let parent = model.table(table)?;
        let relation = model
            .find_one_to_many_relationship(table, relationship)
            .ok_or_else(|| {
                ContextError::invalid_input(format!(
                    "No one-to-many relationship '{relationship}' points at {table}"
                ))
            })?;

        let mut criteria = CriteriaSet::new(relation.from_table.qualified_name().to_string());
        for reference in &relation.foreign_key.references {
            let to_column = parent
                .find_column_by_name(&reference.to_column)
                .ok_or_else(|| ContextError::unknown_property(table, &reference.to_column))?;
            let value = row
                .get(to_column.actual_property_name())
                .or_else(|| row.get(&to_column.column_name))
                .ok_or_else(|| {
                    ContextError::invalid_input(format!(
                        "Row has no value for '{}'",
                        to_column.actual_property_name()
                    ))
                })?;
            criteria = criteria.eq(
                reference.from_column.clone(),
                crate::models::QueryParam::from_json(value),
            );
        }
        let compiled = self.compiler(&model, &criteria.table).await.compile(&criteria)?;
        self.sessions.query(ctx, &compiled).await
    }

    /// Run templated SQL against one database.
    pub async fn run_sql(
        &self,
        ctx: &mut ExecutionContext,
        database: &str,
        sql: &str,
        root: &JsonValue,
    ) -> ContextResult<Vec<Row>> {
        let expanded = template::expand(sql, root);
        self.sessions
            .query_database(ctx, database, &expanded.query, &expanded.parameters)
            .await
    }

    /// `CREATE` scripts for every model database, each under a `-- DB:` header.
    pub async fn ddl_create(&self) -> ContextResult<String> {
        let model = self.model().await;
        let mut lines = Vec::new();
        for database in &model.databases {
            let provider = match self.registry.find(&database.database_name).await {
                Ok(provider) => provider,
                Err(e) => {
                    warn!(database = %database.database_name, error = %e, "No dialect for database");
                    continue;
                }
            };
            lines.push(format!("-- DB: {}", database.database_name));
            lines.extend(provider.database_type().create_script(database));
        }
        Ok(lines.join("\n"))
    }

    /// Update scripts bringing each live database up to the model.
    /// Databases that cannot be introspected are skipped.
    pub async fn ddl_update(&self) -> ContextResult<String> {
        let model = self.model().await;
        let mut lines = Vec::new();
        for database in &model.databases {
            let name = &database.database_name;
            let provider = match self.registry.find(name).await {
                Ok(provider) => provider,
                Err(e) => {
                    warn!(database = %name, error = %e, "No provider for database");
                    continue;
                }
            };
            let mut live = match provider.introspect().await {
                Ok(live) => live,
                Err(e) => {
                    warn!(database = %name, error = %e, "Introspection failed; skipping database");
                    continue;
                }
            };
            let dialect = provider.database_type();
            align_single_schema(dialect, database, &mut live);
            lines.push(format!("-- DB: {name}"));
            lines.extend(dialect.update_script(database, &live));
        }
        Ok(lines.join("\n"))
    }

    /// Run one synchronization pass against every connected provider.
    pub async fn synchronize(&self) -> ContextResult<SyncReport> {
        self.sync
            .run(&self.registry, &self.sessions, self.store.as_ref())
            .await
    }

    /// Table metadata from the installed model.
    pub async fn table(&self, name: &QualifiedName) -> ContextResult<Table> {
        self.model()
            .await
            .find_table(name)
            .cloned()
            .ok_or_else(|| ContextError::table_not_found(name.to_string()))
    }

    pub async fn shutdown(&self) {
        self.registry.close_all().await;
    }
}
