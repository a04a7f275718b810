//! Query construction.
//!
//! - Criteria compilation and template merging
//! - `%{path}` template expansion
//! - Native SQL rendering for a dialect
//! - Row statements (insert, update, delete)

pub mod compiler;
pub mod dml;
pub mod native;
pub mod template;

pub use compiler::{QueryCompiler, target_table};
