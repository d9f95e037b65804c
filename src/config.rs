// ABOUTME: Run configuration bound from command-line flags and environment variables
// ABOUTME: Validated before any connection is opened

use anyhow::{bail, Result};
use clap::Args;

use crate::sync::{ComparisonMode, DEFAULT_LAST_MODIFIED_COLUMN};
use crate::utils::validate_source_target_different;

/// Default pool cap. Several instances of the tool may share one server, so
/// each keeps well below typical managed-instance connection limits.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

#[derive(Args, Debug, Clone)]
pub struct SyncConfig {
    /// Connection URL to the database with the most recent data
    #[arg(long = "source-db-connection-url", env = "SOURCE_DB_CONNECTION_URL")]
    pub source_url: String,

    /// Connection URL to the database that needs to receive the latest data
    #[arg(long = "target-db-connection-url", env = "TARGET_DB_CONNECTION_URL")]
    pub target_url: String,

    /// Maximum open connections per database
    #[arg(
        long,
        env = "MAX_DB_CONNECTIONS",
        default_value_t = DEFAULT_MAX_CONNECTIONS,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub max_connections: u32,

    /// Column whose value decides which copy of a row is the most recent
    #[arg(long, env = "LAST_MODIFIED_COLUMN", default_value = DEFAULT_LAST_MODIFIED_COLUMN)]
    pub last_modified_column: String,

    /// How last-modified values are ordered
    #[arg(long, env = "LAST_MODIFIED_COMPARISON", value_enum, default_value_t = ComparisonMode::Lexical)]
    pub comparison: ComparisonMode,
}

impl SyncConfig {
    /// Reject settings that would make the run meaningless or destructive.
    pub fn validate(&self) -> Result<()> {
        if self.source_url.trim().is_empty() {
            bail!("Source connection URL cannot be empty");
        }
        if self.target_url.trim().is_empty() {
            bail!("Target connection URL cannot be empty");
        }
        if self.last_modified_column.trim().is_empty() {
            bail!("Last-modified column name cannot be empty");
        }

        validate_source_target_different(&self.source_url, &self.target_url)
    }
}
