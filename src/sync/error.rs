// ABOUTME: Typed error kinds for a synchronisation run
// ABOUTME: Every variant carries the table and, where known, the offending row's key

use thiserror::Error;

use super::row::PrimaryKey;

/// Boxed driver error returned by database backends.
pub type DbError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used by [`crate::db::Database`] implementations.
pub type DbResult<T> = std::result::Result<T, DbError>;

/// Errors that end a synchronisation run.
///
/// No variant is retried or swallowed by the engine: the first one raised
/// stops the run and is returned to the caller unchanged.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The database could not be reached or rejected the credentials.
    #[error("cannot connect to {endpoint}")]
    Connection {
        endpoint: String,
        #[source]
        source: DbError,
    },

    /// Catalog metadata could not be read, or described an unusable table.
    #[error("schema query failed for {}", table.as_deref().unwrap_or("<database>"))]
    SchemaQuery {
        table: Option<String>,
        #[source]
        source: DbError,
    },

    /// A select or scan failed. `key` is set when matching a specific row.
    #[error("row query failed on table '{table}'{}", fmt_key(key.as_ref()))]
    RowQuery {
        table: String,
        key: Option<PrimaryKey>,
        #[source]
        source: DbError,
    },

    /// A value could not be put into the form the engine compares.
    #[error("cannot use column '{column}' of table '{table}' for row [{key}]: {reason}")]
    TypeCoercion {
        table: String,
        column: String,
        key: PrimaryKey,
        reason: String,
    },

    /// The target rejected the insert-or-replace statement.
    #[error("failed to write row [{key}] to table '{table}'")]
    Write {
        table: String,
        key: PrimaryKey,
        #[source]
        source: DbError,
    },

    /// Source and target rows disagree on their column sets; the write is refused.
    #[error(
        "column sets differ for row [{key}] of table '{table}' (missing in target: {missing:?}, only in target: {extra:?})"
    )]
    ColumnMismatch {
        table: String,
        key: PrimaryKey,
        missing: Vec<String>,
        extra: Vec<String>,
    },

    /// Invalid connection settings supplied by the caller.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SyncError {
    /// Table the error relates to, if any.
    pub fn table(&self) -> Option<&str> {
        match self {
            SyncError::SchemaQuery { table, .. } => table.as_deref(),
            SyncError::RowQuery { table, .. }
            | SyncError::TypeCoercion { table, .. }
            | SyncError::Write { table, .. }
            | SyncError::ColumnMismatch { table, .. } => Some(table),
            SyncError::Connection { .. } | SyncError::Config(_) => None,
        }
    }
}

fn fmt_key(key: Option<&PrimaryKey>) -> String {
    match key {
        Some(key) => format!(" for row [{}]", key),
        None => String::new(),
    }
}
