//! Connection registry.
//!
//! Holds the named [`ConnectionProvider`]s, one per physical database. A
//! provider owns its connection status and, once connected, the [`Driver`]
//! used to open sessions and introspect the live schema.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::ProviderConfig;
use crate::db::driver::{Driver, DriverSession, SqlxDriver};
use crate::db::pool::DbPool;
use crate::error::{ContextError, ContextResult};
use crate::models::{ConnectionStatus, Database, DatabaseType};

#[derive(Debug, Default)]
struct ProviderState {
    status: ConnectionStatus,
    driver: Option<Arc<dyn Driver>>,
}

/// One named database endpoint.
#[derive(Debug)]
pub struct ConnectionProvider {
    name: String,
    database_type: DatabaseType,
    config: Option<ProviderConfig>,
    state: RwLock<ProviderState>,
    leases: AtomicUsize,
}

impl ConnectionProvider {
    /// A disconnected provider for `config`.
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            name: config.name.clone(),
            database_type: config.database_type,
            config: Some(config),
            state: RwLock::new(ProviderState::default()),
            leases: AtomicUsize::new(0),
        }
    }

    /// A provider already connected through `driver`.
    pub fn with_driver(name: impl Into<String>, driver: Arc<dyn Driver>) -> Self {
        Self {
            name: name.into(),
            database_type: driver.database_type(),
            config: None,
            state: RwLock::new(ProviderState {
                status: ConnectionStatus::Connected,
                driver: Some(driver),
            }),
            leases: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn database_type(&self) -> DatabaseType {
        self.database_type
    }

    pub fn config(&self) -> Option<&ProviderConfig> {
        self.config.as_ref()
    }

    pub async fn status(&self) -> ConnectionStatus {
        self.state.read().await.status.clone()
    }

    /// Number of leases handed out and not yet released.
    pub fn active_leases(&self) -> usize {
        self.leases.load(Ordering::SeqCst)
    }

    /// Open the pool. Already-connected providers are left alone.
    pub async fn connect(&self, timeout: Duration) -> ContextResult<()> {
        let mut state = self.state.write().await;
        if state.status.is_connected() {
            return Ok(());
        }
        let Some(config) = &self.config else {
            return Err(ContextError::connection(
                &self.name,
                "Provider has no connection configuration",
                "Register the provider from a connection string",
            ));
        };

        info!(
            database = %self.name,
            db_type = %self.database_type,
            url = %config.masked_connection_string(),
            "Connecting to database"
        );
        let result = match tokio::time::timeout(timeout, DbPool::connect(config)).await {
            Ok(result) => result,
            Err(_) => Err(ContextError::connection(
                &self.name,
                format!("Connection timed out after {}s", timeout.as_secs()),
                "Check that the server is reachable or raise --connect-timeout",
            )),
        };

        match result {
            Ok(pool) => {
                if let Some(version) = pool.server_version().await {
                    debug!(database = %self.name, version = %version, "Server version");
                }
                state.driver = Some(Arc::new(SqlxDriver::new(pool)));
                state.status = ConnectionStatus::Connected;
                info!(database = %self.name, "Connected");
                Ok(())
            }
            Err(e) => {
                warn!(database = %self.name, error = %e, "Connection failed");
                state.status = ConnectionStatus::Error(e.to_string());
                Err(e)
            }
        }
    }

    /// Close the driver and mark the provider disconnected.
    pub async fn disconnect(&self) {
        let mut state = self.state.write().await;
        if let Some(driver) = state.driver.take() {
            driver.close().await;
            info!(database = %self.name, "Disconnected");
        }
        state.status = ConnectionStatus::Disconnected;
    }

    /// The connected driver; fails with a connection error otherwise.
    pub async fn driver(&self) -> ContextResult<Arc<dyn Driver>> {
        let state = self.state.read().await;
        match (&state.status, &state.driver) {
            (ConnectionStatus::Connected, Some(driver)) => Ok(Arc::clone(driver)),
            (status, _) => Err(ContextError::connection(
                &self.name,
                format!("Provider is {}", status),
                "Connect the provider before using it",
            )),
        }
    }

    /// Read the live schema of this provider's database.
    pub async fn introspect(&self) -> ContextResult<Database> {
        self.driver().await?.introspect(&self.name).await
    }
}

/// A session borrowed from a provider; return it with [`ConnectionLease::release`].
pub struct ConnectionLease {
    provider: Arc<ConnectionProvider>,
    session: Option<Box<dyn DriverSession>>,
}

impl std::fmt::Debug for ConnectionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionLease")
            .field("provider", &self.provider.name)
            .field("released", &self.session.is_none())
            .finish()
    }
}

impl ConnectionLease {
    pub fn provider(&self) -> &str {
        &self.provider.name
    }

    pub fn session(&mut self) -> ContextResult<&mut (dyn DriverSession + 'static)> {
        self.session
            .as_deref_mut()
            .ok_or_else(|| ContextError::internal("connection lease already released"))
    }

    /// Close the session and give the lease back. Close failures are logged.
    pub async fn release(mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close().await {
                warn!(database = %self.provider.name, error = %e, "Failed to close leased session");
            }
            self.provider.leases.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for ConnectionLease {
    fn drop(&mut self) {
        if self.session.take().is_some() {
            self.provider.leases.fetch_sub(1, Ordering::SeqCst);
            debug!(database = %self.provider.name, "Connection lease dropped without release");
        }
    }
}

/// Named connection providers, swapped wholesale on reconfiguration.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    providers: RwLock<Vec<Arc<ConnectionProvider>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry of disconnected providers from configuration.
    pub fn from_configs(configs: Vec<ProviderConfig>) -> ContextResult<Self> {
        let mut providers: Vec<Arc<ConnectionProvider>> = Vec::with_capacity(configs.len());
        for config in configs {
            if providers.iter().any(|p| p.name == config.name) {
                return Err(ContextError::invalid_input(format!(
                    "Duplicate provider name '{}'",
                    config.name
                )));
            }
            providers.push(Arc::new(ConnectionProvider::new(config)));
        }
        Ok(Self {
            providers: RwLock::new(providers),
        })
    }

    pub async fn register(&self, provider: ConnectionProvider) -> ContextResult<Arc<ConnectionProvider>> {
        let mut providers = self.providers.write().await;
        if providers.iter().any(|p| p.name == provider.name) {
            return Err(ContextError::invalid_input(format!(
                "Provider '{}' is already registered",
                provider.name
            )));
        }
        let provider = Arc::new(provider);
        providers.push(Arc::clone(&provider));
        debug!(database = %provider.name, "Registered provider");
        Ok(provider)
    }

    pub async fn find(&self, name: &str) -> ContextResult<Arc<ConnectionProvider>> {
        self.providers
            .read()
            .await
            .iter()
            .find(|p| p.name == name)
            .cloned()
            .ok_or_else(|| ContextError::provider_not_found(name))
    }

    pub async fn status(&self, name: &str) -> ContextResult<ConnectionStatus> {
        Ok(self.find(name).await?.status().await)
    }

    /// Snapshot of the provider list.
    pub async fn providers(&self) -> Vec<Arc<ConnectionProvider>> {
        self.providers.read().await.clone()
    }

    /// Replace the whole provider list, disconnecting the old one.
    pub async fn replace_all(&self, providers: Vec<ConnectionProvider>) {
        let new: Vec<Arc<ConnectionProvider>> = providers.into_iter().map(Arc::new).collect();
        let old = std::mem::replace(&mut *self.providers.write().await, new);
        for provider in old {
            provider.disconnect().await;
        }
    }

    /// Lease a session from a connected provider.
    pub async fn acquire_connection(&self, name: &str) -> ContextResult<ConnectionLease> {
        let provider = self.find(name).await?;
        let session = provider.driver().await?.open_session().await?;
        provider.leases.fetch_add(1, Ordering::SeqCst);
        Ok(ConnectionLease {
            provider,
            session: Some(session),
        })
    }

    pub async fn release_connection(&self, lease: ConnectionLease) {
        lease.release().await;
    }

    /// Connect every provider; failures are logged and reported per provider.
    pub async fn connect_all(&self, timeout: Duration) -> Vec<(String, ContextResult<()>)> {
        let mut results = Vec::new();
        for provider in self.providers().await {
            let result = provider.connect(timeout).await;
            results.push((provider.name.clone(), result));
        }
        results
    }

    pub async fn close_all(&self) {
        for provider in self.providers().await {
            provider.disconnect().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolOptions;

    fn sqlite_config(dir: &tempfile::TempDir, name: &str) -> ProviderConfig {
        ProviderConfig::new(
            name,
            format!("sqlite:{}", dir.path().join(format!("{name}.db")).display()),
            PoolOptions::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_find_unknown_provider() {
        let registry = ConnectionRegistry::new();
        let err = registry.find("nope").await.unwrap_err();
        assert!(matches!(err, ContextError::ProviderNotFound { .. }));
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ConnectionRegistry::new();
        registry
            .register(ConnectionProvider::new(sqlite_config(&dir, "a")))
            .await
            .unwrap();
        let err = registry
            .register(ConnectionProvider::new(sqlite_config(&dir, "a")))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already registered"));
    }

    #[tokio::test]
    async fn test_acquire_requires_connected_provider() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ConnectionRegistry::from_configs(vec![sqlite_config(&dir, "a")]).unwrap();
        assert_eq!(
            registry.status("a").await.unwrap(),
            ConnectionStatus::Disconnected
        );

        let err = registry.acquire_connection("a").await.unwrap_err();
        assert!(matches!(err, ContextError::Connection { .. }));
        assert_eq!(err.database(), Some("a"));
    }

    #[tokio::test]
    async fn test_connect_lease_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ConnectionRegistry::from_configs(vec![sqlite_config(&dir, "a")]).unwrap();
        let results = registry.connect_all(Duration::from_secs(5)).await;
        assert!(results.iter().all(|(_, r)| r.is_ok()));
        assert!(registry.status("a").await.unwrap().is_connected());

        let provider = registry.find("a").await.unwrap();
        let mut lease = registry.acquire_connection("a").await.unwrap();
        assert_eq!(provider.active_leases(), 1);
        lease.session().unwrap().query("SELECT 1 AS one", &[]).await.unwrap();
        registry.release_connection(lease).await;
        assert_eq!(provider.active_leases(), 0);

        {
            let _dropped = registry.acquire_connection("a").await.unwrap();
            assert_eq!(provider.active_leases(), 1);
        }
        assert_eq!(provider.active_leases(), 0);

        registry.close_all().await;
        assert_eq!(
            registry.status("a").await.unwrap(),
            ConnectionStatus::Disconnected
        );
    }

    #[test]
    fn test_from_configs_rejects_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConnectionRegistry::from_configs(vec![
            sqlite_config(&dir, "a"),
            sqlite_config(&dir, "a"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("Duplicate provider name 'a'"));
    }
}
