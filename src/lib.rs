// ABOUTME: Library root for db-synchroniser
// ABOUTME: Exposes the sync engine, database backends, configuration and utilities

pub mod config;
pub mod db;
pub mod sync;
pub mod utils;

pub use db::{connect, Database};
pub use sync::{sync, SyncContext, SyncError, SyncSummary};
