// ABOUTME: CLI entry point for db-synchroniser
// ABOUTME: Parses configuration, connects both databases and runs one synchronisation pass

use anyhow::Context;
use clap::Parser;
use db_synchroniser::config::SyncConfig;
use db_synchroniser::sync::{self, SyncContext, TracingEvents};
use db_synchroniser::Database;

#[derive(Parser)]
#[command(name = "db-synchroniser")]
#[command(
    about = "Copy newer rows from a source MySQL database into a target with the same schema",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log: String,
    #[command(flatten)]
    sync: SyncConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --log
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = cli.sync;
    config.validate()?;

    let max_connections = config.max_connections as usize;
    let source = db_synchroniser::connect(&config.source_url, max_connections)
        .await
        .context("error in connecting to source database")?;
    let target = db_synchroniser::connect(&config.target_url, max_connections)
        .await
        .context("error in connecting to target database")?;

    let events = TracingEvents;
    let ctx = SyncContext::new(&events)
        .with_last_modified_column(config.last_modified_column.clone())
        .with_comparison(config.comparison);

    let result = sync::sync(source.as_ref(), target.as_ref(), &ctx).await;

    close(source.as_ref(), "source").await;
    close(target.as_ref(), "target").await;

    result.context("error in synchronising the two databases")?;

    Ok(())
}

async fn close(db: &dyn Database, role: &str) {
    if let Err(e) = db.close().await {
        tracing::warn!("Failed to close {} database: {}", role, e);
    }
}
