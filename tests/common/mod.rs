//! Shared fixtures: a scripted in-memory driver and a failing model store.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use db_model_context::ContextResult;
use db_model_context::db::{ConnectionProvider, ConnectionRegistry, Driver, DriverSession};
use db_model_context::error::ContextError;
use db_model_context::models::{
    Column, Database, DatabaseType, ForeignKey, Model, QueryParam, Row, Schema, Table,
};
use db_model_context::store::ModelStore;

/// Everything a [`MockDriver`] saw, plus the failures it should inject.
#[derive(Debug, Default)]
pub struct MockState {
    pub log: Vec<String>,
    pub executed: Vec<(String, Vec<QueryParam>)>,
    pub queried: Vec<(String, Vec<QueryParam>)>,
    pub rows: Vec<Row>,
    pub live: Option<Database>,
    pub fail_begin: bool,
    pub fail_commit: bool,
    pub fail_execute: bool,
    pub fail_rollback: bool,
    /// Slept inside every `execute`.
    pub execute_delay: Option<Duration>,
    pub sessions_opened: usize,
}

#[derive(Debug, Clone)]
pub struct MockDriver {
    dialect: DatabaseType,
    pub state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    pub fn new(dialect: DatabaseType) -> Self {
        Self {
            dialect,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn log(&self) -> Vec<String> {
        self.with(|s| s.log.clone())
    }
}

#[async_trait]
impl Driver for MockDriver {
    fn database_type(&self) -> DatabaseType {
        self.dialect
    }

    async fn open_session(&self) -> ContextResult<Box<dyn DriverSession>> {
        self.with(|s| s.sessions_opened += 1);
        Ok(Box::new(MockSession {
            state: Arc::clone(&self.state),
            in_transaction: false,
        }))
    }

    async fn introspect(&self, database_name: &str) -> ContextResult<Database> {
        let live = self.with(|s| s.live.clone());
        match live {
            Some(mut database) => {
                database.database_name = database_name.to_string();
                Ok(database)
            }
            None => Err(ContextError::driver("catalog unavailable", None)),
        }
    }

    async fn close(&self) {
        self.with(|s| s.log.push("close".to_string()));
    }
}

pub struct MockSession {
    state: Arc<Mutex<MockState>>,
    in_transaction: bool,
}

impl MockSession {
    fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }
}

#[async_trait]
impl DriverSession for MockSession {
    fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    async fn begin(&mut self) -> ContextResult<()> {
        let fail = self.with(|s| {
            s.log.push("begin".to_string());
            s.fail_begin
        });
        if fail {
            return Err(ContextError::driver("cannot begin", None));
        }
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> ContextResult<()> {
        let fail = self.with(|s| {
            s.log.push("commit".to_string());
            s.fail_commit
        });
        self.in_transaction = false;
        if fail {
            return Err(ContextError::driver("commit refused", Some("40001".to_string())));
        }
        Ok(())
    }

    async fn rollback(&mut self) -> ContextResult<()> {
        let fail = self.with(|s| {
            s.log.push("rollback".to_string());
            s.fail_rollback
        });
        self.in_transaction = false;
        if fail {
            return Err(ContextError::driver("connection reset", Some("08006".to_string())));
        }
        Ok(())
    }

    async fn query(&mut self, sql: &str, params: &[QueryParam]) -> ContextResult<Vec<Row>> {
        Ok(self.with(|s| {
            s.log.push(format!("query: {sql}"));
            s.queried.push((sql.to_string(), params.to_vec()));
            s.rows.clone()
        }))
    }

    async fn execute(&mut self, sql: &str, params: &[QueryParam]) -> ContextResult<u64> {
        let (fail, delay) = self.with(|s| {
            s.log.push(format!("execute: {sql}"));
            s.executed.push((sql.to_string(), params.to_vec()));
            (s.fail_execute, s.execute_delay)
        });
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(ContextError::driver("constraint violated", Some("23505".to_string())));
        }
        Ok(1)
    }
}

/// A store whose saves always fail.
#[derive(Debug, Default)]
pub struct FailingStore;

#[async_trait]
impl ModelStore for FailingStore {
    async fn load(&self) -> ContextResult<Model> {
        Err(ContextError::store("nothing stored"))
    }

    async fn save(&self, _model: &Model) -> ContextResult<()> {
        Err(ContextError::store("disk full"))
    }

    fn describe(&self) -> String {
        "failing".to_string()
    }
}

pub fn crm_database() -> Database {
    Database::new("crm").with_schema(
        Schema::new("public")
            .with_table(
                Table::new("person")
                    .with_column(Column::new("id", "INTEGER").not_null().with_autoincrement())
                    .with_column(
                        Column::new("first_name", "VARCHAR")
                            .with_length(50)
                            .with_property_name("firstName")
                            .with_annotation("label", "First name"),
                    )
                    .with_primary_key(&["id"]),
            )
            .with_table(
                Table::new("address")
                    .with_column(Column::new("id", "INTEGER").not_null())
                    .with_column(Column::new("person_id", "INTEGER").with_property_name("personId"))
                    .with_column(Column::new("city", "VARCHAR").with_length(80))
                    .with_primary_key(&["id"])
                    .with_foreign_key(
                        ForeignKey::new("fk_address_person", "crm.public.person")
                            .with_reference("person_id", "id")
                            .with_many_property_name("addresses"),
                    ),
            ),
    )
}

pub fn billing_database() -> Database {
    Database::new("billing").with_schema(
        Schema::new("public").with_table(
            Table::new("invoice")
                .with_column(Column::new("id", "INTEGER").not_null())
                .with_column(Column::new("amount", "DECIMAL"))
                .with_primary_key(&["id"]),
        ),
    )
}

pub fn model() -> Model {
    let mut model = Model::new(vec![crm_database(), billing_database()]);
    model.init().unwrap();
    model
}

/// A registry with `crm` on PostgreSQL and `billing` on MySQL, both mocked.
pub async fn registry() -> (ConnectionRegistry, MockDriver, MockDriver) {
    let crm = MockDriver::new(DatabaseType::PostgreSQL);
    let billing = MockDriver::new(DatabaseType::MySQL);
    let registry = ConnectionRegistry::new();
    registry
        .register(ConnectionProvider::with_driver("crm", Arc::new(crm.clone())))
        .await
        .unwrap();
    registry
        .register(ConnectionProvider::with_driver("billing", Arc::new(billing.clone())))
        .await
        .unwrap();
    (registry, crm, billing)
}

pub fn row(value: serde_json::Value) -> Row {
    value.as_object().cloned().unwrap()
}
