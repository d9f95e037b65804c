// ABOUTME: Structured events emitted while a sync runs
// ABOUTME: The engine reports through a sink passed in its context, never a global logger

use std::sync::Mutex;

use super::decision::WriteReason;
use super::engine::{SyncSummary, TableStats};
use super::row::PrimaryKey;

/// Progress of a synchronisation run.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    DiscoveryStarted {
        last_modified_column: String,
    },
    TableSelected {
        table: String,
    },
    TableStarted {
        table: String,
        primary_key: Vec<String>,
    },
    RowWritten {
        table: String,
        key: PrimaryKey,
        reason: WriteReason,
    },
    RowSkipped {
        table: String,
        key: PrimaryKey,
    },
    TableFinished {
        table: String,
        stats: TableStats,
    },
    RunFinished {
        summary: SyncSummary,
    },
    RunFailed {
        table: Option<String>,
        message: String,
    },
}

/// Receiver of [`SyncEvent`]s.
pub trait SyncEvents: Send + Sync {
    fn emit(&self, event: &SyncEvent);
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEvents;

impl SyncEvents for TracingEvents {
    fn emit(&self, event: &SyncEvent) {
        match event {
            SyncEvent::DiscoveryStarted {
                last_modified_column,
            } => {
                tracing::info!(
                    "Getting tables with {} column from source database",
                    last_modified_column
                );
            }
            SyncEvent::TableSelected { table } => {
                tracing::info!("{} has last-modified column", table);
            }
            SyncEvent::TableStarted { table, primary_key } => {
                tracing::info!("Synchronising {} (primary key: {}) ...", table, primary_key.join(", "));
            }
            SyncEvent::RowWritten { table, key, reason } => {
                tracing::info!(table = %table, key = %key, reason = ?reason, "Moving row to target database");
            }
            SyncEvent::RowSkipped { table, key } => {
                tracing::debug!(table = %table, key = %key, "Target row is up to date");
            }
            SyncEvent::TableFinished { table, stats } => {
                tracing::info!(
                    "Completed {}: {} rows scanned, {} inserted, {} replaced, {} skipped",
                    table,
                    stats.rows_scanned,
                    stats.rows_inserted,
                    stats.rows_replaced,
                    stats.rows_skipped
                );
            }
            SyncEvent::RunFinished { summary } => {
                tracing::info!(
                    "Synchronised {} tables in {}ms: {} rows written, {} skipped",
                    summary.tables_synced,
                    summary.duration_ms,
                    summary.rows_written(),
                    summary.rows_skipped
                );
            }
            SyncEvent::RunFailed { table, message } => match table {
                Some(table) => tracing::error!("Error in synchronising table {}: {}", table, message),
                None => tracing::error!("Error in synchronising databases: {}", message),
            },
        }
    }
}

/// Keeps every event in memory. Used by tests and callers that want a log of
/// what happened without a subscriber.
#[derive(Debug, Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<SyncEvent>>,
}

impl RecordingEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far.
    pub fn events(&self) -> Vec<SyncEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl SyncEvents for RecordingEvents {
    fn emit(&self, event: &SyncEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEvents;

impl SyncEvents for NoopEvents {
    fn emit(&self, _event: &SyncEvent) {}
}
