//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Connection registry and providers
//! - Connection pools and the sqlx-backed driver
//! - Parameter binding and row decoding
//! - Live schema introspection
//! - Dialect quoting, placeholder style and DDL generation

pub mod dialect;
pub mod driver;
pub mod introspect;
#[macro_use]
pub mod macros;
pub mod params;
pub mod pool;
pub mod registry;
pub mod types;

pub use driver::{DbTransaction, Driver, DriverSession, SqlxDriver};
pub use pool::DbPool;
pub use registry::{ConnectionLease, ConnectionProvider, ConnectionRegistry};
