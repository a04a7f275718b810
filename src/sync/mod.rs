//! Keeping the model in step with the live schemas.

pub mod diff;
pub mod engine;
pub mod merge;

pub use diff::{DatabaseDiff, SchemaDiff, TableDiff, diff_database};
pub use engine::{SyncEngine, SyncReport, SyncState};
pub use merge::merge_into_model;
