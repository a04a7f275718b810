//! Binding [`QueryParam`] values onto sqlx queries, one binder per backend.

use crate::models::QueryParam;
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::{MySql, Postgres, Sqlite};

/// Defines `$name(query, param)` binding every `QueryParam` variant.
/// NULL binds as a nullable text value on all backends.
macro_rules! param_binder {
    ($(#[$meta:meta])* $name:ident<$q:lifetime>, $db:ty, $args:ty) => {
        $(#[$meta])*
        pub(crate) fn $name<$q>(query: Query<$q, $db, $args>, param: &$q QueryParam) -> Query<$q, $db, $args> {
            match param {
                QueryParam::Null => query.bind(None::<String>),
                QueryParam::Bool(v) => query.bind(*v),
                QueryParam::Int(v) => query.bind(*v),
                QueryParam::Float(v) => query.bind(*v),
                QueryParam::String(v) => query.bind(v.as_str()),
                QueryParam::Bytes(v) => query.bind(v.as_slice()),
            }
        }
    };
}

param_binder!(bind_mysql_param<'q>, MySql, MySqlArguments);
param_binder!(bind_postgres_param<'q>, Postgres, PgArguments);
param_binder!(
    /// SQLite arguments borrow the query lifetime.
    bind_sqlite_param<'q>,
    Sqlite,
    SqliteArguments<'q>
);
