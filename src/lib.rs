//! DB Model Context Library
//!
//! A multi-database persistence context driven by an abstract relational
//! schema model. Rows are saved, updated, deleted and queried against
//! SQLite, PostgreSQL and MySQL providers through one context, and the
//! model can be synchronized with the live schemas.

pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod models;
pub mod query;
pub mod session;
pub mod store;
pub mod sync;

pub use config::Config;
pub use context::PersistenceContext;
pub use error::{ContextError, ContextResult};
pub use session::ExecutionContext;
pub use store::{JsonFileStore, MemoryStore, ModelStore};
