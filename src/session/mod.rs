//! Per-context sessions and transactions.

pub mod context;
pub mod manager;
pub mod stopwatch;

pub use context::{ExecutionContext, Session};
pub use manager::{DatabaseBinding, InstalledModel, SessionManager};
pub use stopwatch::Stopwatch;
