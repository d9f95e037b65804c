// ABOUTME: Sync orchestrator - runs discovery, then match/decide/write per row per table
// ABOUTME: Stops at the first error; rows already written stay in the target

use std::time::Instant;

use futures::TryStreamExt;

use super::decision::{decide, ComparisonMode, Decision, WriteReason};
use super::error::SyncError;
use super::events::{SyncEvent, SyncEvents};
use super::matcher::find_matching_row;
use super::reader::read_all_rows;
use super::schema::{list_syncable_tables, primary_key_columns, TableDescriptor};
use super::writer::write_row;
use crate::db::Database;

/// Column used as the recency signal unless configured otherwise.
pub const DEFAULT_LAST_MODIFIED_COLUMN: &str = "last_modified";

/// Settings and event sink for one run.
pub struct SyncContext<'a> {
    pub last_modified_column: String,
    pub comparison: ComparisonMode,
    pub events: &'a dyn SyncEvents,
}

impl<'a> SyncContext<'a> {
    /// Context with the default column and lexical comparison.
    pub fn new(events: &'a dyn SyncEvents) -> Self {
        Self {
            last_modified_column: DEFAULT_LAST_MODIFIED_COLUMN.to_string(),
            comparison: ComparisonMode::default(),
            events,
        }
    }

    pub fn with_last_modified_column(mut self, column: impl Into<String>) -> Self {
        self.last_modified_column = column.into();
        self
    }

    pub fn with_comparison(mut self, comparison: ComparisonMode) -> Self {
        self.comparison = comparison;
        self
    }
}

/// Row counts for one table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableStats {
    pub rows_scanned: u64,
    pub rows_inserted: u64,
    pub rows_replaced: u64,
    pub rows_skipped: u64,
}

impl TableStats {
    pub fn rows_written(&self) -> u64 {
        self.rows_inserted + self.rows_replaced
    }
}

/// Outcome of a completed run. Only produced when every table synchronised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub tables_synced: usize,
    pub rows_scanned: u64,
    pub rows_inserted: u64,
    pub rows_replaced: u64,
    pub rows_skipped: u64,
    pub duration_ms: u64,
}

impl SyncSummary {
    pub fn rows_written(&self) -> u64 {
        self.rows_inserted + self.rows_replaced
    }

    fn add(&mut self, stats: &TableStats) {
        self.tables_synced += 1;
        self.rows_scanned += stats.rows_scanned;
        self.rows_inserted += stats.rows_inserted;
        self.rows_replaced += stats.rows_replaced;
        self.rows_skipped += stats.rows_skipped;
    }
}

/// Bring `target` up to date with `source`.
///
/// Every source table carrying the last-modified column is processed in
/// catalog order. For each source row the target row with the same primary
/// key is looked up; the source row is written when the target row is absent
/// or older. The first error ends the run and tables after the failing one
/// are never attempted. There is no rollback and no isolation from concurrent
/// writers on the target.
///
/// `source` and `target` must be two distinct databases. Passing the same
/// handle twice is refused with [`SyncError::Config`]. Two `SqliteDatabase`
/// clones sharing one connection are not detected and must not be used: the
/// scan holds that connection while the target lookups wait for it, which
/// stalls once more rows are pending than the scan buffer holds.
pub async fn sync(
    source: &dyn Database,
    target: &dyn Database,
    ctx: &SyncContext<'_>,
) -> Result<SyncSummary, SyncError> {
    let start = Instant::now();

    match run(source, target, ctx).await {
        Ok(mut summary) => {
            summary.duration_ms = start.elapsed().as_millis() as u64;
            ctx.events.emit(&SyncEvent::RunFinished {
                summary: summary.clone(),
            });
            Ok(summary)
        }
        Err(e) => {
            ctx.events.emit(&SyncEvent::RunFailed {
                table: e.table().map(str::to_string),
                message: e.to_string(),
            });
            Err(e)
        }
    }
}

async fn run(
    source: &dyn Database,
    target: &dyn Database,
    ctx: &SyncContext<'_>,
) -> Result<SyncSummary, SyncError> {
    if same_handle(source, target) {
        return Err(SyncError::Config(
            "source and target are the same database handle".to_string(),
        ));
    }

    ctx.events.emit(&SyncEvent::DiscoveryStarted {
        last_modified_column: ctx.last_modified_column.clone(),
    });

    let tables = list_syncable_tables(source, &ctx.last_modified_column).await?;
    for table in &tables {
        ctx.events.emit(&SyncEvent::TableSelected {
            table: table.name.clone(),
        });
    }

    let mut summary = SyncSummary::default();
    for mut table in tables {
        table.primary_key_columns = primary_key_columns(source, &table.name).await?;

        let stats = sync_table(source, target, &table, ctx).await?;
        summary.add(&stats);
    }

    Ok(summary)
}

fn same_handle(a: &dyn Database, b: &dyn Database) -> bool {
    std::ptr::eq(
        a as *const dyn Database as *const (),
        b as *const dyn Database as *const (),
    )
}

/// Synchronise a single table whose primary key has been resolved.
pub async fn sync_table(
    source: &dyn Database,
    target: &dyn Database,
    table: &TableDescriptor,
    ctx: &SyncContext<'_>,
) -> Result<TableStats, SyncError> {
    ctx.events.emit(&SyncEvent::TableStarted {
        table: table.name.clone(),
        primary_key: table.primary_key_columns.clone(),
    });

    let mut stats = TableStats::default();
    let mut rows = read_all_rows(source, &table.name).await?;

    while let Some(source_row) = rows.try_next().await? {
        stats.rows_scanned += 1;

        let matched =
            find_matching_row(target, &table.name, &source_row, &table.primary_key_columns)
                .await?;

        let decision = decide(
            &source_row,
            matched.target.as_ref(),
            &ctx.last_modified_column,
            ctx.comparison,
        )
        .map_err(|e| SyncError::TypeCoercion {
            table: table.name.clone(),
            column: ctx.last_modified_column.clone(),
            key: matched.key.clone(),
            reason: e.reason,
        })?;

        match decision {
            Decision::Skip => {
                stats.rows_skipped += 1;
                ctx.events.emit(&SyncEvent::RowSkipped {
                    table: table.name.clone(),
                    key: matched.key,
                });
            }
            Decision::Write(reason) => {
                write_row(target, &table.name, &source_row, &matched).await?;
                match reason {
                    WriteReason::Missing => stats.rows_inserted += 1,
                    WriteReason::Newer => stats.rows_replaced += 1,
                }
                ctx.events.emit(&SyncEvent::RowWritten {
                    table: table.name.clone(),
                    key: matched.key,
                    reason,
                });
            }
        }
    }

    ctx.events.emit(&SyncEvent::TableFinished {
        table: table.name.clone(),
        stats,
    });

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::events::NoopEvents;

    #[test]
    fn test_context_defaults() {
        let events = NoopEvents;
        let ctx = SyncContext::new(&events);
        assert_eq!(ctx.last_modified_column, "last_modified");
        assert_eq!(ctx.comparison, ComparisonMode::Lexical);

        let ctx = ctx
            .with_last_modified_column("updated_at")
            .with_comparison(ComparisonMode::Temporal);
        assert_eq!(ctx.last_modified_column, "updated_at");
        assert_eq!(ctx.comparison, ComparisonMode::Temporal);
    }

    #[test]
    fn test_summary_accumulates_table_stats() {
        let mut summary = SyncSummary::default();
        summary.add(&TableStats {
            rows_scanned: 3,
            rows_inserted: 1,
            rows_replaced: 1,
            rows_skipped: 1,
        });
        summary.add(&TableStats {
            rows_scanned: 2,
            rows_inserted: 0,
            rows_replaced: 0,
            rows_skipped: 2,
        });

        assert_eq!(summary.tables_synced, 2);
        assert_eq!(summary.rows_scanned, 5);
        assert_eq!(summary.rows_written(), 2);
        assert_eq!(summary.rows_skipped, 3);
    }
}
