//! Schema synchronization runs.
//!
//! One run walks `Introspecting → Diffing → Merging → Reinstalling →
//! Persisting` and returns to `Idle`, or stops in `Failed`. A failure while
//! persisting leaves the merged model installed.

use std::fmt;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::db::ConnectionRegistry;
use crate::error::{ContextError, ContextResult};
use crate::models::{Database, DatabaseType};
use crate::session::SessionManager;
use crate::store::ModelStore;
use crate::sync::diff::{DatabaseDiff, align_single_schema, diff_database};
use crate::sync::merge::merge_into_model;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    #[default]
    Idle,
    Introspecting,
    Diffing,
    Merging,
    Reinstalling,
    Persisting,
    Failed,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Introspecting => "introspecting",
            Self::Diffing => "diffing",
            Self::Merging => "merging",
            Self::Reinstalling => "reinstalling",
            Self::Persisting => "persisting",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub introspected: Vec<String>,
    /// Providers left out of the run, with the reason.
    pub skipped: Vec<(String, String)>,
    pub diffs: Vec<DatabaseDiff>,
    /// Generation of the model installed by this run.
    pub generation: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SyncReport {
    pub fn change_count(&self) -> usize {
        self.diffs.iter().map(DatabaseDiff::change_count).sum()
    }

    pub fn has_changes(&self) -> bool {
        self.change_count() > 0
    }
}

/// Runs synchronization passes one at a time.
#[derive(Debug, Default)]
pub struct SyncEngine {
    state: Mutex<SyncState>,
    running: Mutex<()>,
}

impl SyncEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn state(&self) -> SyncState {
        *self.state.lock().await
    }

    async fn enter(&self, state: SyncState) {
        *self.state.lock().await = state;
        info!(step = %state, "Synchronization step");
    }

    async fn fail(&self, step: SyncState, message: String, model_installed: bool) -> ContextError {
        *self.state.lock().await = SyncState::Failed;
        warn!(step = %step, model_installed, error = %message, "Synchronization failed");
        ContextError::synchronization(step.to_string(), message, model_installed)
    }

    /// Introspect every connected provider, merge the differences into the
    /// installed model, reinstall it and persist it to `store`.
    pub async fn run(
        &self,
        registry: &ConnectionRegistry,
        sessions: &SessionManager,
        store: &dyn ModelStore,
    ) -> ContextResult<SyncReport> {
        let _running = self.running.lock().await;
        let mut report = SyncReport {
            started_at: Utc::now(),
            ..SyncReport::default()
        };

        self.enter(SyncState::Introspecting).await;
        let installed = sessions.current().await;
        let mut model = installed.model().clone();
        let mut live_databases: Vec<(Database, DatabaseType)> = Vec::new();
        for provider in registry.providers().await {
            let name = provider.name().to_string();
            let status = provider.status().await;
            if !status.is_connected() {
                warn!(database = %name, status = %status, "Skipping provider that is not connected");
                report.skipped.push((name, status.to_string()));
                continue;
            }
            match provider.introspect().await {
                Ok(database) => {
                    report.introspected.push(name);
                    live_databases.push((database, provider.database_type()));
                }
                Err(e) => {
                    warn!(database = %name, error = %e, "Introspection failed; skipping provider");
                    report.skipped.push((name, e.to_string()));
                }
            }
        }

        self.enter(SyncState::Diffing).await;
        let empty = Database::default();
        for (live, dialect) in &mut live_databases {
            let model_database = model
                .find_database_by_name(&live.database_name)
                .unwrap_or(&empty);
            align_single_schema(*dialect, model_database, live);
            let diff = diff_database(model_database, live);
            info!(
                database = %live.database_name,
                changes = diff.change_count(),
                "Computed schema diff"
            );
            report.diffs.push(diff);
        }

        self.enter(SyncState::Merging).await;
        for ((live, _), diff) in live_databases.iter().zip(&report.diffs) {
            merge_into_model(&mut model, live, diff);
        }

        self.enter(SyncState::Reinstalling).await;
        if let Err(e) = model.init() {
            return Err(self
                .fail(SyncState::Reinstalling, e.to_string(), false)
                .await);
        }
        let installed = match sessions.install(model, registry).await {
            Ok(installed) => installed,
            Err(e) => {
                return Err(self
                    .fail(SyncState::Reinstalling, e.to_string(), false)
                    .await);
            }
        };
        report.generation = installed.generation();

        self.enter(SyncState::Persisting).await;
        if let Err(e) = store.save(installed.model()).await {
            return Err(self
                .fail(
                    SyncState::Persisting,
                    format!("{} (store: {})", e, store.describe()),
                    true,
                )
                .await);
        }

        *self.state.lock().await = SyncState::Idle;
        report.finished_at = Some(Utc::now());
        info!(
            introspected = report.introspected.len(),
            skipped = report.skipped.len(),
            changes = report.change_count(),
            generation = report.generation,
            "Synchronization finished"
        );
        Ok(report)
    }
}
