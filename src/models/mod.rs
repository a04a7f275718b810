//! Data models for the persistence context.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod criteria;
pub mod pk;
pub mod qualified;
pub mod query;
pub mod schema;

// Re-export commonly used types
pub use connection::{ConnectionStatus, DatabaseType};
pub use criteria::{CriteriaSet, Criterion, MatchMode};
pub use pk::PkHelper;
pub use qualified::{QualifiedColumnName, QualifiedName};
pub use query::{CompiledQuery, QueryParam, Row};
pub use schema::{
    Annotations, Column, Database, ForeignKey, ForeignKeyAction, Model, PrimaryKey,
    PrimaryKeyColumn, Reference, Relationship, Schema, SiteNode, Table, UseCase, ValueKind,
};
