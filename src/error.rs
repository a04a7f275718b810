//! Error types for the persistence context.
//!
//! Every variant carries enough structured context (database, table,
//! operation) for an upper layer to render it without re-deriving anything.

use std::fmt;

use thiserror::Error;

/// The data operation that was running when a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Save,
    Update,
    Delete,
    Query,
    Commit,
    Rollback,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Save => write!(f, "save"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
            Self::Query => write!(f, "query"),
            Self::Commit => write!(f, "commit"),
            Self::Rollback => write!(f, "rollback"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ContextError {
    #[error("Connection failed for '{provider}': {message}")]
    Connection {
        provider: String,
        message: String,
        suggestion: String,
    },

    #[error("Connection provider not found: {provider}")]
    ProviderNotFound { provider: String },

    #[error("Model parse error: {message}")]
    ModelParse { message: String },

    #[error(
        "Model integrity error: {} unresolved reference(s): {}",
        unresolved.len(),
        unresolved.join("; ")
    )]
    ModelIntegrity { unresolved: Vec<String> },

    #[error("Table not found: {table}")]
    TableNotFound { table: String },

    #[error("Unknown property '{property}' on table {table}")]
    UnknownProperty { table: String, property: String },

    #[error("Unsupported criterion: {message}")]
    UnsupportedCriterion { message: String },

    #[error("Cannot determine the target table of query: {query}")]
    AmbiguousQueryTarget { query: String },

    #[error("{operation} failed on {table} (database: {database}): {source}")]
    Persistence {
        database: String,
        table: String,
        operation: Operation,
        #[source]
        source: Box<ContextError>,
    },

    #[error("Database error: {message}")]
    Driver {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
    },

    #[error("Transaction {operation} failed on database '{database}': {source}")]
    Transaction {
        database: String,
        operation: Operation,
        #[source]
        source: Box<ContextError>,
    },

    #[error(
        "{operation} failed for {} database(s): {}",
        failures.len(),
        failures.iter().map(|(db, err)| format!("{db}: {err}")).collect::<Vec<_>>().join("; ")
    )]
    MultiDatabase {
        operation: Operation,
        failures: Vec<(String, ContextError)>,
    },

    #[error("Synchronization failed while {step}: {message}")]
    Synchronization {
        step: String,
        message: String,
        /// The merged model was installed before the failure happened.
        model_installed: bool,
    },

    #[error("Model store error: {message}")]
    Store { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ContextError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(
        provider: impl Into<String>,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Connection {
            provider: provider.into(),
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    pub fn provider_not_found(provider: impl Into<String>) -> Self {
        Self::ProviderNotFound {
            provider: provider.into(),
        }
    }

    pub fn model_parse(message: impl Into<String>) -> Self {
        Self::ModelParse {
            message: message.into(),
        }
    }

    pub fn model_integrity(unresolved: Vec<String>) -> Self {
        Self::ModelIntegrity { unresolved }
    }

    pub fn table_not_found(table: impl Into<String>) -> Self {
        Self::TableNotFound {
            table: table.into(),
        }
    }

    pub fn unknown_property(table: impl Into<String>, property: impl Into<String>) -> Self {
        Self::UnknownProperty {
            table: table.into(),
            property: property.into(),
        }
    }

    pub fn unsupported_criterion(message: impl Into<String>) -> Self {
        Self::UnsupportedCriterion {
            message: message.into(),
        }
    }

    pub fn ambiguous_query_target(query: impl Into<String>) -> Self {
        Self::AmbiguousQueryTarget {
            query: query.into(),
        }
    }

    /// Wrap an underlying failure of a data operation.
    pub fn persistence(
        database: impl Into<String>,
        table: impl Into<String>,
        operation: Operation,
        source: ContextError,
    ) -> Self {
        Self::Persistence {
            database: database.into(),
            table: table.into(),
            operation,
            source: Box::new(source),
        }
    }

    pub fn driver(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Driver {
            message: message.into(),
            sql_state,
        }
    }

    /// Wrap a failed commit or rollback.
    pub fn transaction_failed(
        database: impl Into<String>,
        operation: Operation,
        source: ContextError,
    ) -> Self {
        Self::Transaction {
            database: database.into(),
            operation,
            source: Box::new(source),
        }
    }

    pub fn synchronization(
        step: impl Into<String>,
        message: impl Into<String>,
        model_installed: bool,
    ) -> Self {
        Self::Synchronization {
            step: step.into(),
            message: message.into(),
            model_installed,
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Persistence { source, .. } => source.suggestion(),
            _ => None,
        }
    }

    /// Database the failure is attributed to, when known.
    pub fn database(&self) -> Option<&str> {
        match self {
            Self::Connection { provider, .. } => Some(provider),
            Self::ProviderNotFound { provider } => Some(provider),
            Self::Persistence { database, .. } => Some(database),
            Self::Transaction { database, .. } => Some(database),
            _ => None,
        }
    }

    /// A failed synchronization whose merged model is nevertheless active.
    pub fn is_model_installed(&self) -> bool {
        matches!(
            self,
            Self::Synchronization {
                model_installed: true,
                ..
            }
        )
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { .. } => true,
            Self::Synchronization {
                model_installed, ..
            } => *model_installed,
            _ => false,
        }
    }
}

/// Convert sqlx errors to ContextError.
impl From<sqlx::Error> for ContextError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => ContextError::connection(
                "",
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                ContextError::driver(db_err.message(), code)
            }
            sqlx::Error::RowNotFound => ContextError::driver("No rows returned", None),
            sqlx::Error::PoolTimedOut => ContextError::connection(
                "",
                "Timed out acquiring a pooled connection",
                "Increase acquire_timeout or max_connections",
            ),
            sqlx::Error::PoolClosed => {
                ContextError::connection("", "Connection pool is closed", "Reconnect the provider")
            }
            sqlx::Error::Io(io_err) => ContextError::connection(
                "",
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => ContextError::connection(
                "",
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => ContextError::driver(format!("Protocol error: {}", msg), None),
            sqlx::Error::ColumnNotFound(col) => {
                ContextError::driver(format!("Column not found: {}", col), None)
            }
            sqlx::Error::ColumnDecode { index, source } => {
                ContextError::driver(format!("Failed to decode column {}: {}", index, source), None)
            }
            sqlx::Error::Decode(source) => {
                ContextError::driver(format!("Decode error: {}", source), None)
            }
            sqlx::Error::WorkerCrashed => ContextError::internal("Database worker crashed"),
            _ => ContextError::driver(format!("Unknown database error: {}", err), None),
        }
    }
}

impl From<serde_json::Error> for ContextError {
    fn from(err: serde_json::Error) -> Self {
        ContextError::model_parse(err.to_string())
    }
}

/// Result type alias for persistence context operations.
pub type ContextResult<T> = Result<T, ContextError>;
