// ABOUTME: Row matcher - finds the target row sharing a source row's primary key
// ABOUTME: Filters on every key column so composite keys match exactly

use super::error::SyncError;
use super::row::{PrimaryKey, Row};
use crate::db::Database;

/// A source row's key and the target row found for it, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct RowMatch {
    pub key: PrimaryKey,
    pub target: Option<Row>,
}

/// Extract the primary key of `row`, reporting a missing or NULL key column
/// as a coercion error.
///
/// A NULL key never equals anything in the lookup and never conflicts on the
/// target's unique index, so writing it would add a new row on every run.
pub fn primary_key_of(
    table: &str,
    row: &Row,
    key_columns: &[String],
) -> Result<PrimaryKey, SyncError> {
    let key = row
        .primary_key(key_columns)
        .map_err(|column| SyncError::TypeCoercion {
            table: table.to_string(),
            column: column.clone(),
            key: PrimaryKey::default(),
            reason: format!("source row has no value for key column '{}'", column),
        })?;

    if let Some((column, _)) = key.columns().zip(key.values()).find(|(_, v)| v.is_null()) {
        return Err(SyncError::TypeCoercion {
            table: table.to_string(),
            column: column.to_string(),
            key: key.clone(),
            reason: "key column is NULL".to_string(),
        });
    }

    Ok(key)
}

/// Look up the target row with the same primary key as `source_row`.
///
/// Equality is required on every key column. When the target holds duplicate
/// keys only the first row it returns is considered.
pub async fn find_matching_row(
    target: &dyn Database,
    table: &str,
    source_row: &Row,
    key_columns: &[String],
) -> Result<RowMatch, SyncError> {
    let key = primary_key_of(table, source_row, key_columns)?;

    let found = target
        .select_by_key(table, &key)
        .await
        .map_err(|source| SyncError::RowQuery {
            table: table.to_string(),
            key: Some(key.clone()),
            source,
        })?;

    Ok(RowMatch { key, target: found })
}
