// ABOUTME: Synchronisation engine - one-way, most-recent-wins row reconciliation
// ABOUTME: Discovers tables, streams source rows, matches by key and overwrites stale rows

pub mod decision;
pub mod engine;
pub mod error;
pub mod events;
pub mod matcher;
pub mod reader;
pub mod row;
pub mod schema;
pub mod writer;

pub use decision::{decide, ComparisonMode, Decision, WriteReason};
pub use engine::{sync, sync_table, SyncContext, SyncSummary, TableStats, DEFAULT_LAST_MODIFIED_COLUMN};
pub use error::{DbError, DbResult, SyncError};
pub use events::{NoopEvents, RecordingEvents, SyncEvent, SyncEvents, TracingEvents};
pub use matcher::{find_matching_row, RowMatch};
pub use reader::{read_all_rows, RowStream};
pub use row::{PrimaryKey, Row, Value};
pub use schema::{list_syncable_tables, primary_key_columns, TableDescriptor};
pub use writer::write_row;
