// ABOUTME: Row writer - applies a full-row insert-or-replace to the target
// ABOUTME: Refuses to write when source and target rows disagree on their columns

use std::collections::BTreeSet;

use super::error::SyncError;
use super::matcher::RowMatch;
use super::row::Row;
use crate::db::Database;

/// Overwrite the target copy of a row with `source_row`.
///
/// Every column of the source row is written in one statement keyed by the
/// row's natural primary key; there is no column-level merge. When a target
/// row already exists its column set must equal the source's, otherwise the
/// write is refused before anything is sent to the database.
pub async fn write_row(
    target: &dyn Database,
    table: &str,
    source_row: &Row,
    matched: &RowMatch,
) -> Result<u64, SyncError> {
    if let Some(existing) = &matched.target {
        ensure_same_columns(table, matched, source_row, existing)?;
    }

    target
        .replace_row(table, source_row)
        .await
        .map_err(|source| SyncError::Write {
            table: table.to_string(),
            key: matched.key.clone(),
            source,
        })
}

/// Check that `source` and `target` carry exactly the same column names.
pub fn ensure_same_columns(
    table: &str,
    matched: &RowMatch,
    source: &Row,
    target: &Row,
) -> Result<(), SyncError> {
    let source_columns: BTreeSet<&str> = source.column_names().collect();
    let target_columns: BTreeSet<&str> = target.column_names().collect();

    if source_columns == target_columns {
        return Ok(());
    }

    Err(SyncError::ColumnMismatch {
        table: table.to_string(),
        key: matched.key.clone(),
        missing: source_columns
            .difference(&target_columns)
            .map(|c| c.to_string())
            .collect(),
        extra: target_columns
            .difference(&source_columns)
            .map(|c| c.to_string())
            .collect(),
    })
}
