//! Session and transaction manager.
//!
//! Owns the installed model snapshot and hands out one session per database
//! per [`ExecutionContext`]. Mutations open a transaction on demand and leave
//! it open; callers group work and finish with `commit` or `rollback`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::db::{ConnectionRegistry, Driver};
use crate::error::{ContextError, ContextResult, Operation};
use crate::models::{CompiledQuery, DatabaseType, Model, QualifiedName, QueryParam, Row};
use crate::query::{dml, native, target_table};
use crate::session::context::{ExecutionContext, Session};

/// A model database bound to a connected driver.
#[derive(Debug, Clone)]
pub struct DatabaseBinding {
    pub database: String,
    pub dialect: DatabaseType,
    pub driver: Arc<dyn Driver>,
}

/// An initialized model together with the driver bindings built for it.
/// Never mutated once installed.
#[derive(Debug, Default)]
pub struct InstalledModel {
    model: Arc<Model>,
    bindings: HashMap<String, DatabaseBinding>,
    generation: u64,
}

impl InstalledModel {
    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn shared_model(&self) -> Arc<Model> {
        Arc::clone(&self.model)
    }

    /// Install counter; 0 before the first install.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn binding(&self, database: &str) -> ContextResult<&DatabaseBinding> {
        self.bindings.get(database).ok_or_else(|| {
            ContextError::connection(
                database,
                "Database is not bound to a connected provider",
                "Connect the provider and reinstall the model",
            )
        })
    }

    pub fn bound_databases(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.bindings.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[derive(Debug, Default)]
pub struct SessionManager {
    installed: RwLock<Arc<InstalledModel>>,
    generation: AtomicU64,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind every model database to its connected provider and swap the
    /// result in. Databases without a connected provider stay unbound.
    pub async fn install(
        &self,
        model: Model,
        registry: &ConnectionRegistry,
    ) -> ContextResult<Arc<InstalledModel>> {
        if !model.is_initialized() {
            return Err(ContextError::invalid_input(
                "Model must be initialized before it is installed",
            ));
        }

        let mut bindings = HashMap::new();
        for database in &model.databases {
            let name = &database.database_name;
            let provider = match registry.find(name).await {
                Ok(provider) => provider,
                Err(_) => {
                    warn!(database = %name, "No provider registered for model database");
                    continue;
                }
            };
            match provider.driver().await {
                Ok(driver) => {
                    bindings.insert(
                        name.clone(),
                        DatabaseBinding {
                            database: name.clone(),
                            dialect: driver.database_type(),
                            driver,
                        },
                    );
                }
                Err(e) => warn!(database = %name, error = %e, "Provider not connected; database left unbound"),
            }
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let installed = Arc::new(InstalledModel {
            model: Arc::new(model),
            bindings,
            generation,
        });
        *self.installed.write().await = Arc::clone(&installed);
        info!(
            generation,
            databases = installed.model.databases.len(),
            bound = installed.bindings.len(),
            "Model installed"
        );
        Ok(installed)
    }

    /// The active snapshot.
    pub async fn current(&self) -> Arc<InstalledModel> {
        Arc::clone(&*self.installed.read().await)
    }

    /// Mark the context open. Existing sessions are kept.
    pub fn open_context(&self, ctx: &mut ExecutionContext) {
        if !ctx.is_open() {
            debug!(context = %ctx.id(), "Context opened");
        }
        ctx.mark_open();
    }

    /// Close every session of the context, rolling back open transactions.
    /// Failures are logged; teardown always completes.
    pub async fn close_context(&self, ctx: &mut ExecutionContext) {
        let sessions = std::mem::take(&mut ctx.sessions);
        for (database, mut session) in sessions {
            if let Err(e) = session.inner.close().await {
                warn!(context = %ctx.id(), database = %database, error = %e, "Failed to close session");
            }
        }
        ctx.stopwatch.suspend();
        ctx.mark_closed();
        debug!(context = %ctx.id(), "Context closed");
    }

    async fn session_in<'s>(
        &self,
        sessions: &'s mut BTreeMap<String, Session>,
        database: &str,
    ) -> ContextResult<&'s mut Session> {
        if !sessions.contains_key(database) {
            let snapshot = self.current().await;
            let binding = snapshot.binding(database)?;
            let inner = binding.driver.open_session().await?;
            debug!(database = %database, generation = snapshot.generation(), "Session opened");
            let session = Session::new(database, Arc::clone(&snapshot), inner);
            sessions.insert(database.to_string(), session);
        }
        sessions
            .get_mut(database)
            .ok_or_else(|| ContextError::internal(format!("session for '{database}' missing")))
    }

    /// The context's session for `database`, opened on first use.
    pub async fn session<'c>(
        &self,
        ctx: &'c mut ExecutionContext,
        database: &str,
    ) -> ContextResult<&'c mut Session> {
        ctx.ensure_open()?;
        ctx.stopwatch.resume();
        let opened = self.session_in(&mut ctx.sessions, database).await.map(|_| ());
        ctx.stopwatch.suspend();
        opened?;
        ctx.sessions
            .get_mut(database)
            .ok_or_else(|| ContextError::internal(format!("session for '{database}' missing")))
    }

    pub async fn save(&self, ctx: &mut ExecutionContext, table: &str, row: &Row) -> ContextResult<u64> {
        self.mutate(ctx, Operation::Save, table, row).await
    }

    pub async fn update(&self, ctx: &mut ExecutionContext, table: &str, row: &Row) -> ContextResult<u64> {
        self.mutate(ctx, Operation::Update, table, row).await
    }

    pub async fn delete(&self, ctx: &mut ExecutionContext, table: &str, row: &Row) -> ContextResult<u64> {
        self.mutate(ctx, Operation::Delete, table, row).await
    }

    async fn mutate(
        &self,
        ctx: &mut ExecutionContext,
        operation: Operation,
        table: &str,
        row: &Row,
    ) -> ContextResult<u64> {
        ctx.ensure_open()?;
        ctx.stopwatch.resume();
        let result = self.mutate_in(&mut ctx.sessions, operation, table, row).await;
        ctx.stopwatch.suspend();
        result
    }

    async fn mutate_in(
        &self,
        sessions: &mut BTreeMap<String, Session>,
        operation: Operation,
        table_name: &str,
        row: &Row,
    ) -> ContextResult<u64> {
        let qualified = QualifiedName::parse(table_name)?;
        let session = self.session_in(sessions, &qualified.database).await?;
        let dialect = session.dialect()?;
        let statement = {
            let table = session
                .model()
                .find_table(&qualified)
                .ok_or_else(|| ContextError::table_not_found(table_name))?;
            match operation {
                Operation::Save => dml::insert(dialect, table, row)?,
                Operation::Update => dml::update(dialect, table, row)?,
                Operation::Delete => dml::delete(dialect, table, row)?,
                other => {
                    return Err(ContextError::internal(format!("{other} is not a row mutation")));
                }
            }
        };

        if !session.inner.in_transaction() {
            session.inner.begin().await.map_err(|e| {
                ContextError::persistence(&qualified.database, table_name, operation, e)
            })?;
        }

        match session
            .inner
            .execute(&statement.query, &statement.parameters)
            .await
        {
            Ok(affected) => {
                debug!(
                    database = %qualified.database,
                    table = %table_name,
                    operation = %operation,
                    affected,
                    "Row mutation"
                );
                Ok(affected)
            }
            Err(e) => {
                warn!(
                    database = %qualified.database,
                    table = %table_name,
                    operation = %operation,
                    error = %e,
                    "Mutation failed; rolling back"
                );
                if let Err(rollback_error) = session.inner.rollback().await {
                    warn!(database = %qualified.database, error = %rollback_error, "Rollback failed");
                }
                Err(ContextError::persistence(
                    &qualified.database,
                    table_name,
                    operation,
                    e,
                ))
            }
        }
    }

    /// Commit `database`'s transaction; a no-op when none is active.
    pub async fn commit(&self, ctx: &mut ExecutionContext, database: &str) -> ContextResult<()> {
        ctx.stopwatch.resume();
        let result = finish(&mut ctx.sessions, database, Operation::Commit).await;
        ctx.stopwatch.suspend();
        result
    }

    /// Roll back `database`'s transaction; a no-op when none is active.
    pub async fn rollback(&self, ctx: &mut ExecutionContext, database: &str) -> ContextResult<()> {
        ctx.stopwatch.resume();
        let result = finish(&mut ctx.sessions, database, Operation::Rollback).await;
        ctx.stopwatch.suspend();
        result
    }

    /// Commit every open transaction of the context. All databases are
    /// attempted; failures are returned together.
    pub async fn commit_all(&self, ctx: &mut ExecutionContext) -> ContextResult<()> {
        self.finish_all(ctx, Operation::Commit).await
    }

    pub async fn rollback_all(&self, ctx: &mut ExecutionContext) -> ContextResult<()> {
        self.finish_all(ctx, Operation::Rollback).await
    }

    async fn finish_all(&self, ctx: &mut ExecutionContext, operation: Operation) -> ContextResult<()> {
        ctx.stopwatch.resume();
        let databases: Vec<String> = ctx.sessions.keys().cloned().collect();
        let mut failures = Vec::new();
        for database in databases {
            if let Err(e) = finish(&mut ctx.sessions, &database, operation).await {
                failures.push((database, e));
            }
        }
        ctx.stopwatch.suspend();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ContextError::MultiDatabase {
                operation,
                failures,
            })
        }
    }

    /// Run a compiled query against its target database. Queries built
    /// outside the compiler have their `FROM` target extracted here.
    ///
    /// Rows of a model table come back keyed by property name.
    pub async fn query(
        &self,
        ctx: &mut ExecutionContext,
        compiled: &CompiledQuery,
    ) -> ContextResult<Vec<Row>> {
        ctx.ensure_open()?;
        let target = match &compiled.target {
            Some(target) => target.clone(),
            None => target_table(&compiled.query)?,
        };
        ctx.stopwatch.resume();
        let result = self
            .query_in(&mut ctx.sessions, &target.database, Some(&target), &compiled.query, &compiled.parameters)
            .await;
        ctx.stopwatch.suspend();
        result
    }

    /// Run `sql` against `database` as is, apart from native rendering.
    pub async fn query_database(
        &self,
        ctx: &mut ExecutionContext,
        database: &str,
        sql: &str,
        parameters: &[QueryParam],
    ) -> ContextResult<Vec<Row>> {
        ctx.ensure_open()?;
        ctx.stopwatch.resume();
        let result = self
            .query_in(&mut ctx.sessions, database, None, sql, parameters)
            .await;
        ctx.stopwatch.suspend();
        result
    }

    async fn query_in(
        &self,
        sessions: &mut BTreeMap<String, Session>,
        database: &str,
        target: Option<&QualifiedName>,
        query: &str,
        parameters: &[QueryParam],
    ) -> ContextResult<Vec<Row>> {
        let session = self.session_in(sessions, database).await?;
        let sql = native::render(session.model(), session.dialect()?, query);
        let rows = session.inner.query(&sql, parameters).await?;
        debug!(database = %database, rows = rows.len(), "Query returned");

        let table = target.and_then(|t| session.model().find_table(t));
        Ok(match table {
            Some(table) => rows.into_iter().map(|r| dml::property_row(table, r)).collect(),
            None => rows,
        })
    }
}

async fn finish(
    sessions: &mut BTreeMap<String, Session>,
    database: &str,
    operation: Operation,
) -> ContextResult<()> {
    let Some(session) = sessions.get_mut(database) else {
        return Ok(());
    };
    if !session.inner.in_transaction() {
        return Ok(());
    }
    let result = match operation {
        Operation::Rollback => session.inner.rollback().await,
        _ => session.inner.commit().await,
    };
    match result {
        Ok(()) => {
            info!(database = %database, operation = %operation, "Transaction finished");
            Ok(())
        }
        Err(e) => {
            warn!(database = %database, operation = %operation, error = %e, "Transaction failed");
            Err(ContextError::transaction_failed(database, operation, e))
        }
    }
}
