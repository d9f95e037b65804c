// ABOUTME: Schema inspector - discovers which source tables take part in a sync
// ABOUTME: Selects tables carrying the last-modified column and resolves their keys

use super::error::SyncError;
use crate::db::Database;

/// A table eligible for synchronisation.
///
/// Built fresh from source metadata on every run. `primary_key_columns` is
/// empty until [`primary_key_columns`] resolves it for the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub name: String,
    pub primary_key_columns: Vec<String>,
    pub has_last_modified_column: bool,
}

/// List the source tables that carry `last_modified_column`.
///
/// Tables are returned in the order the source's catalog enumerates them,
/// with no filtering beyond the column check and no sorting.
pub async fn list_syncable_tables(
    source: &dyn Database,
    last_modified_column: &str,
) -> Result<Vec<TableDescriptor>, SyncError> {
    let tables = source
        .list_tables()
        .await
        .map_err(|source| SyncError::SchemaQuery {
            table: None,
            source,
        })?;

    tracing::debug!("Source database has {} tables", tables.len());

    let mut syncable = Vec::new();
    for table in tables {
        let has_column = source
            .has_column(&table, last_modified_column)
            .await
            .map_err(|source| SyncError::SchemaQuery {
                table: Some(table.clone()),
                source,
            })?;

        if has_column {
            syncable.push(TableDescriptor {
                name: table,
                primary_key_columns: Vec::new(),
                has_last_modified_column: true,
            });
        }
    }

    Ok(syncable)
}

/// Resolve the primary key columns of `table` in the order the database
/// enumerates them.
///
/// A table without a primary key cannot be matched row by row and is
/// reported as a schema error.
pub async fn primary_key_columns(
    source: &dyn Database,
    table: &str,
) -> Result<Vec<String>, SyncError> {
    let columns = source
        .primary_key_columns(table)
        .await
        .map_err(|source| SyncError::SchemaQuery {
            table: Some(table.to_string()),
            source,
        })?;

    if columns.is_empty() {
        return Err(SyncError::SchemaQuery {
            table: Some(table.to_string()),
            source: format!("table '{}' has no primary key", table).into(),
        });
    }

    Ok(columns)
}
