//! Model description stores.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{ContextError, ContextResult};
use crate::models::Model;

/// Where the model description lives between runs.
#[async_trait]
pub trait ModelStore: Send + Sync {
    /// Load and initialize the model.
    async fn load(&self) -> ContextResult<Model>;

    async fn save(&self, model: &Model) -> ContextResult<()>;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

/// JSON description in a file; saves write a sibling temp file and rename it.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "model.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl ModelStore for JsonFileStore {
    async fn load(&self) -> ContextResult<Model> {
        let description = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            ContextError::store(format!("Cannot read {}: {}", self.path.display(), e))
        })?;
        let model = Model::load(&description)?;
        info!(
            path = %self.path.display(),
            databases = model.databases.len(),
            "Model loaded"
        );
        Ok(model)
    }

    async fn save(&self, model: &Model) -> ContextResult<()> {
        let description = model.to_description()?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, description).await.map_err(|e| {
            ContextError::store(format!("Cannot write {}: {}", temp.display(), e))
        })?;
        tokio::fs::rename(&temp, &self.path).await.map_err(|e| {
            ContextError::store(format!("Cannot replace {}: {}", self.path.display(), e))
        })?;
        debug!(path = %self.path.display(), "Model saved");
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory description, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    description: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_description(description: impl Into<String>) -> Self {
        Self {
            description: Mutex::new(Some(description.into())),
        }
    }

    pub async fn description(&self) -> Option<String> {
        self.description.lock().await.clone()
    }
}

#[async_trait]
impl ModelStore for MemoryStore {
    async fn load(&self) -> ContextResult<Model> {
        let guard = self.description.lock().await;
        let description = guard
            .as_deref()
            .ok_or_else(|| ContextError::store("No model description stored"))?;
        Model::load(description)
    }

    async fn save(&self, model: &Model) -> ContextResult<()> {
        let description = model.to_description()?;
        *self.description.lock().await = Some(description);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
