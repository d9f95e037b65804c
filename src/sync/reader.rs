// ABOUTME: Row reader - lazily streams every row of a table from a database
// ABOUTME: Backends feed rows through a bounded channel so memory stays flat

use std::pin::Pin;
use std::task::{ready, Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use super::error::{DbResult, SyncError};
use super::row::Row;
use crate::db::Database;

/// Rows buffered between a backend's scan and the consumer.
pub const ROW_BUFFER: usize = 256;

/// Sending half handed to a backend's scan producer.
pub type RowSender = mpsc::Sender<DbResult<Row>>;

/// A lazy full-table scan.
///
/// Rows are produced one at a time as they are consumed. The producer owns
/// the connection it reads from and releases it when the scan is exhausted,
/// fails, or this stream is dropped.
pub struct RowStream {
    table: String,
    rx: mpsc::Receiver<DbResult<Row>>,
}

impl RowStream {
    /// Create a stream for `table` together with the sender its producer writes to.
    pub fn channel(table: &str) -> (RowSender, Self) {
        let (tx, rx) = mpsc::channel(ROW_BUFFER);
        (
            tx,
            Self {
                table: table.to_string(),
                rx,
            },
        )
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

impl Stream for RowStream {
    type Item = Result<Row, SyncError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let item = ready!(self.rx.poll_recv(cx));
        Poll::Ready(item.map(|result| {
            result.map_err(|source| SyncError::RowQuery {
                table: self.table.clone(),
                key: None,
                source,
            })
        }))
    }
}

/// Start a full-table scan of `table`.
///
/// Column names come from the result set itself, so they are authoritative
/// for each call.
pub async fn read_all_rows(db: &dyn Database, table: &str) -> Result<RowStream, SyncError> {
    tracing::debug!("Scanning all rows of '{}'", table);

    db.scan_table(table)
        .await
        .map_err(|source| SyncError::RowQuery {
            table: table.to_string(),
            key: None,
            source,
        })
}
