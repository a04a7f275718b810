//! Execution contexts and their per-database sessions.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::db::DriverSession;
use crate::error::{ContextError, ContextResult};
use crate::models::{DatabaseType, Model};
use crate::session::manager::InstalledModel;
use crate::session::stopwatch::Stopwatch;

/// One unit of work against one database, owned by one execution context.
///
/// The session keeps the installed model snapshot it was opened under, so a
/// model reinstall never changes the metadata an open session works with.
pub struct Session {
    database: String,
    snapshot: Arc<InstalledModel>,
    pub(crate) inner: Box<dyn DriverSession>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("database", &self.database)
            .field("generation", &self.snapshot.generation())
            .field("in_transaction", &self.inner.in_transaction())
            .finish()
    }
}

impl Session {
    pub(crate) fn new(
        database: impl Into<String>,
        snapshot: Arc<InstalledModel>,
        inner: Box<dyn DriverSession>,
    ) -> Self {
        Self {
            database: database.into(),
            snapshot,
            inner,
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn model(&self) -> &Model {
        self.snapshot.model()
    }

    pub fn snapshot(&self) -> &Arc<InstalledModel> {
        &self.snapshot
    }

    pub fn dialect(&self) -> ContextResult<DatabaseType> {
        Ok(self.snapshot.binding(&self.database)?.dialect)
    }

    pub fn in_transaction(&self) -> bool {
        self.inner.in_transaction()
    }
}

/// Per-request (or per-worker) state: open sessions keyed by database and a
/// stopwatch over time spent in database calls.
#[derive(Debug)]
pub struct ExecutionContext {
    id: String,
    pub(crate) sessions: BTreeMap<String, Session>,
    pub(crate) stopwatch: Stopwatch,
    opened: bool,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self {
            id: format!("ctx_{}", uuid::Uuid::new_v4().simple()),
            sessions: BTreeMap::new(),
            stopwatch: Stopwatch::new(),
            opened: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_open(&self) -> bool {
        self.opened
    }

    pub(crate) fn mark_open(&mut self) {
        self.opened = true;
    }

    pub(crate) fn mark_closed(&mut self) {
        self.opened = false;
    }

    pub(crate) fn ensure_open(&self) -> ContextResult<()> {
        if self.opened {
            Ok(())
        } else {
            Err(ContextError::invalid_input(format!(
                "Execution context {} is not open",
                self.id
            )))
        }
    }

    /// Databases with an open session, in name order.
    pub fn open_databases(&self) -> Vec<&str> {
        self.sessions.keys().map(String::as_str).collect()
    }

    pub fn session(&self, database: &str) -> Option<&Session> {
        self.sessions.get(database)
    }

    pub fn reset_timer(&mut self) {
        self.stopwatch.reset();
    }

    /// Time spent inside database calls since the last reset.
    pub fn elapsed(&self) -> Duration {
        self.stopwatch.elapsed()
    }
}
