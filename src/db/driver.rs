//! Driver seam between the session layer and a concrete database.
//!
//! [`Driver`] is what a connection provider hands out once connected;
//! [`DriverSession`] is a unit of work on it. The sqlx implementation keeps
//! no connection checked out outside a transaction: plain statements run on
//! the pool, and `begin` pins one connection until commit or rollback.

use async_trait::async_trait;
use sqlx::{MySql, Postgres, Sqlite, Transaction};
use tracing::{debug, warn};

use crate::db::introspect;
use crate::db::macros::{execute_bound, fetch_json_rows};
use crate::db::params::{bind_mysql_param, bind_postgres_param, bind_sqlite_param};
use crate::db::pool::DbPool;
use crate::error::{ContextError, ContextResult};
use crate::models::{Database, DatabaseType, QueryParam, Row};

/// A connected database able to open sessions and describe itself.
#[async_trait]
pub trait Driver: Send + Sync + std::fmt::Debug {
    fn database_type(&self) -> DatabaseType;

    async fn open_session(&self) -> ContextResult<Box<dyn DriverSession>>;

    /// Read the live schema of this database as a model database named `database_name`.
    async fn introspect(&self, database_name: &str) -> ContextResult<Database>;

    async fn server_version(&self) -> Option<String> {
        None
    }

    async fn close(&self);
}

/// A unit of work against one database. Statements use `?` placeholders.
#[async_trait]
pub trait DriverSession: Send {
    fn in_transaction(&self) -> bool;

    async fn begin(&mut self) -> ContextResult<()>;

    async fn commit(&mut self) -> ContextResult<()>;

    async fn rollback(&mut self) -> ContextResult<()>;

    async fn query(&mut self, sql: &str, params: &[QueryParam]) -> ContextResult<Vec<Row>>;

    async fn execute(&mut self, sql: &str, params: &[QueryParam]) -> ContextResult<u64>;

    /// Release the session, rolling back an open transaction.
    async fn close(&mut self) -> ContextResult<()> {
        if self.in_transaction() {
            self.rollback().await?;
        }
        Ok(())
    }
}

/// Database-specific transaction wrapper.
pub enum DbTransaction {
    MySql(Transaction<'static, MySql>),
    Postgres(Transaction<'static, Postgres>),
    SQLite(Transaction<'static, Sqlite>),
}

impl DbTransaction {
    pub async fn begin(pool: &DbPool) -> ContextResult<Self> {
        Ok(match pool {
            DbPool::MySql(p) => DbTransaction::MySql(p.begin().await?),
            DbPool::Postgres(p) => DbTransaction::Postgres(p.begin().await?),
            DbPool::SQLite(p) => DbTransaction::SQLite(p.begin().await?),
        })
    }

    pub async fn commit(self) -> ContextResult<()> {
        match self {
            DbTransaction::MySql(tx) => tx.commit().await?,
            DbTransaction::Postgres(tx) => tx.commit().await?,
            DbTransaction::SQLite(tx) => tx.commit().await?,
        }
        Ok(())
    }

    pub async fn rollback(self) -> ContextResult<()> {
        match self {
            DbTransaction::MySql(tx) => tx.rollback().await?,
            DbTransaction::Postgres(tx) => tx.rollback().await?,
            DbTransaction::SQLite(tx) => tx.rollback().await?,
        }
        Ok(())
    }
}

/// [`Driver`] over an sqlx pool.
#[derive(Debug, Clone)]
pub struct SqlxDriver {
    pool: DbPool,
}

impl SqlxDriver {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl Driver for SqlxDriver {
    fn database_type(&self) -> DatabaseType {
        self.pool.db_type()
    }

    async fn open_session(&self) -> ContextResult<Box<dyn DriverSession>> {
        Ok(Box::new(SqlxSession {
            pool: self.pool.clone(),
            tx: None,
        }))
    }

    async fn introspect(&self, database_name: &str) -> ContextResult<Database> {
        introspect::introspect(&self.pool, database_name).await
    }

    async fn server_version(&self) -> Option<String> {
        self.pool.server_version().await
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Session over an sqlx pool; holds a connection only while a transaction is open.
pub struct SqlxSession {
    pool: DbPool,
    tx: Option<DbTransaction>,
}

fn backend_mismatch() -> ContextError {
    ContextError::internal("transaction backend does not match the pool")
}

#[async_trait]
impl DriverSession for SqlxSession {
    fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    async fn begin(&mut self) -> ContextResult<()> {
        if self.tx.is_some() {
            return Ok(());
        }
        self.tx = Some(DbTransaction::begin(&self.pool).await?);
        debug!(db_type = %self.pool.db_type(), "Transaction started");
        Ok(())
    }

    async fn commit(&mut self) -> ContextResult<()> {
        match self.tx.take() {
            Some(tx) => tx.commit().await,
            None => Ok(()),
        }
    }

    async fn rollback(&mut self) -> ContextResult<()> {
        match self.tx.take() {
            Some(tx) => tx.rollback().await,
            None => Ok(()),
        }
    }

    async fn query(&mut self, sql: &str, params: &[QueryParam]) -> ContextResult<Vec<Row>> {
        let sql = self.pool.db_type().rewrite_placeholders(sql);
        debug!(sql = %sql, params = params.len(), "Running query");
        let rows = match (&mut self.tx, &self.pool) {
            (Some(DbTransaction::MySql(tx)), DbPool::MySql(_)) => {
                fetch_json_rows!(&mut **tx, sql.as_str(), params, bind_mysql_param)
            }
            (Some(DbTransaction::Postgres(tx)), DbPool::Postgres(_)) => {
                fetch_json_rows!(&mut **tx, sql.as_str(), params, bind_postgres_param)
            }
            (Some(DbTransaction::SQLite(tx)), DbPool::SQLite(_)) => {
                fetch_json_rows!(&mut **tx, sql.as_str(), params, bind_sqlite_param)
            }
            (None, DbPool::MySql(pool)) => {
                fetch_json_rows!(pool, sql.as_str(), params, bind_mysql_param)
            }
            (None, DbPool::Postgres(pool)) => {
                fetch_json_rows!(pool, sql.as_str(), params, bind_postgres_param)
            }
            (None, DbPool::SQLite(pool)) => {
                fetch_json_rows!(pool, sql.as_str(), params, bind_sqlite_param)
            }
            _ => return Err(backend_mismatch()),
        };
        Ok(rows)
    }

    async fn execute(&mut self, sql: &str, params: &[QueryParam]) -> ContextResult<u64> {
        let sql = self.pool.db_type().rewrite_placeholders(sql);
        debug!(sql = %sql, params = params.len(), "Executing statement");
        let affected = match (&mut self.tx, &self.pool) {
            (Some(DbTransaction::MySql(tx)), DbPool::MySql(_)) => {
                execute_bound!(&mut **tx, sql.as_str(), params, bind_mysql_param)
            }
            (Some(DbTransaction::Postgres(tx)), DbPool::Postgres(_)) => {
                execute_bound!(&mut **tx, sql.as_str(), params, bind_postgres_param)
            }
            (Some(DbTransaction::SQLite(tx)), DbPool::SQLite(_)) => {
                execute_bound!(&mut **tx, sql.as_str(), params, bind_sqlite_param)
            }
            (None, DbPool::MySql(pool)) => {
                execute_bound!(pool, sql.as_str(), params, bind_mysql_param)
            }
            (None, DbPool::Postgres(pool)) => {
                execute_bound!(pool, sql.as_str(), params, bind_postgres_param)
            }
            (None, DbPool::SQLite(pool)) => {
                execute_bound!(pool, sql.as_str(), params, bind_sqlite_param)
            }
            _ => return Err(backend_mismatch()),
        };
        Ok(affected)
    }
}

impl Drop for SqlxSession {
    fn drop(&mut self) {
        if self.tx.is_some() {
            warn!("Session dropped with an open transaction; it will be rolled back");
        }
    }
}
