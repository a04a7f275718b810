//! Database dispatch macros for reducing code duplication.
//!
//! The sqlx executors for the three backends have distinct types, so the
//! bind-and-run sequence is generated per call site instead of abstracted
//! behind a generic.

/// Bind `$params` with `$bind` and fetch every row as a generic JSON row.
///
/// ```ignore
/// let rows = fetch_json_rows!(&mut **tx, sql, params, bind_postgres_param);
/// ```
macro_rules! fetch_json_rows {
    ($executor:expr, $sql:expr, $params:expr, $bind:path) => {{
        use futures_util::TryStreamExt as _;
        use $crate::db::types::RowToJson as _;

        let mut query = sqlx::query($sql);
        for param in $params {
            query = $bind(query, param);
        }
        let rows: Vec<_> = query.fetch($executor).try_collect().await?;
        rows.iter()
            .map(|row| row.to_json_row())
            .collect::<Vec<$crate::models::Row>>()
    }};
}

/// Bind `$params` with `$bind` and execute, yielding the affected row count.
macro_rules! execute_bound {
    ($executor:expr, $sql:expr, $params:expr, $bind:path) => {{
        let mut query = sqlx::query($sql);
        for param in $params {
            query = $bind(query, param);
        }
        query.execute($executor).await?.rows_affected()
    }};
}

pub(crate) use execute_bound;
pub(crate) use fetch_json_rows;
