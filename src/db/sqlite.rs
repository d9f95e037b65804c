// ABOUTME: SQLite backend for the sync engine
// ABOUTME: Catalog queries via sqlite_master and pragma_table_info, upserts via INSERT OR REPLACE

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::{ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection, ToSql};

use super::{Database, Dialect};
use crate::sync::reader::RowSender;
use crate::sync::{DbError, DbResult, PrimaryKey, Row, RowStream, SyncError, Value};
use crate::utils::sqlite_path;

/// A SQLite database behind a single shared connection.
///
/// Calls are short and run on the calling task; full-table scans run on the
/// blocking pool and hold the connection until the scan finishes. Source and
/// target must therefore be two different `SqliteDatabase` values.
#[derive(Clone)]
pub struct SqliteDatabase {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDatabase {
    /// Open a database from a `sqlite:` URL.
    pub fn open_url(url: &str) -> Result<Self, SyncError> {
        let path = sqlite_path(url).map_err(|e| SyncError::Config(format!("{:#}", e)))?;
        match path {
            Some(path) => Self::open(path),
            None => Self::open_in_memory(),
        }
    }

    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SyncError> {
        let path = path.as_ref();
        tracing::debug!("Opening SQLite database {}", path.display());

        let conn = Connection::open(path).map_err(|e| SyncError::Connection {
            endpoint: path.display().to_string(),
            source: Box::new(e),
        })?;
        Ok(Self::from_connection(conn))
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, SyncError> {
        let conn = Connection::open_in_memory().map_err(|e| SyncError::Connection {
            endpoint: ":memory:".to_string(),
            source: Box::new(e),
        })?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run one or more SQL statements without parameters.
    pub fn execute_batch(&self, sql: &str) -> DbResult<()> {
        self.with_conn(|conn| conn.execute_batch(sql))
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> DbResult<T> {
        let conn = self.conn.lock().map_err(|_| poisoned())?;
        f(&conn).map_err(DbError::from)
    }
}

fn poisoned() -> DbError {
    "sqlite connection lock poisoned".into()
}

#[async_trait]
impl Database for SqliteDatabase {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn list_tables(&self) -> DbResult<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' \
                 AND name NOT LIKE 'sqlite_%'",
            )?;
            let tables = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(tables)
        })
    }

    async fn has_column(&self, table: &str, column: &str) -> DbResult<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
                params![table, column],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    async fn primary_key_columns(&self, table: &str) -> DbResult<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT name FROM pragma_table_info(?1) WHERE pk > 0 ORDER BY pk")?;
            let columns = stmt
                .query_map([table], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            Ok(columns)
        })
    }

    async fn scan_table(&self, table: &str) -> DbResult<RowStream> {
        let (tx, stream) = RowStream::channel(table);
        let conn = Arc::clone(&self.conn);
        let query = Dialect::Sqlite.select_all(table);

        tokio::task::spawn_blocking(move || {
            let outcome = match conn.lock() {
                Ok(guard) => scan_into(&guard, &query, &tx),
                Err(_) => Err(poisoned()),
            };
            if let Err(e) = outcome {
                let _ = tx.blocking_send(Err(e));
            }
        });

        Ok(stream)
    }

    async fn select_by_key(&self, table: &str, key: &PrimaryKey) -> DbResult<Option<Row>> {
        let query = Dialect::Sqlite.select_by_key(table, key.columns());
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&query)?;
            let names = column_names(&stmt);
            let mut rows = stmt.query(params_from_iter(key.values()))?;
            match rows.next()? {
                Some(row) => Ok(Some(read_row(row, &names)?)),
                None => Ok(None),
            }
        })
    }

    async fn replace_row(&self, table: &str, row: &Row) -> DbResult<u64> {
        let query = Dialect::Sqlite.replace_row(table, row.column_names());
        self.with_conn(|conn| {
            let affected = conn.execute(&query, params_from_iter(row.values()))?;
            Ok(affected as u64)
        })
    }
}

/// Read every row of `query` into `tx`, stopping early when the consumer is gone.
fn scan_into(conn: &Connection, query: &str, tx: &RowSender) -> DbResult<()> {
    let mut stmt = conn.prepare(query)?;
    let names = column_names(&stmt);
    let mut rows = stmt.query([])?;

    while let Some(row) = rows.next()? {
        let row = read_row(row, &names)?;
        if tx.blocking_send(Ok(row)).is_err() {
            break;
        }
    }
    Ok(())
}

fn column_names(stmt: &rusqlite::Statement<'_>) -> Vec<String> {
    stmt.column_names().into_iter().map(String::from).collect()
}

fn read_row(row: &rusqlite::Row<'_>, names: &[String]) -> rusqlite::Result<Row> {
    names
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let value: SqlValue = row.get(idx)?;
            Ok((name.clone(), Value::from(value)))
        })
        .collect()
}

impl From<SqlValue> for Value {
    fn from(value: SqlValue) -> Self {
        match value {
            SqlValue::Null => Value::Null,
            SqlValue::Integer(i) => Value::Int(i),
            SqlValue::Real(f) => Value::Float(f),
            SqlValue::Text(s) => Value::Text(s),
            SqlValue::Blob(b) => Value::Bytes(b),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(SqlValue::Null),
            Value::Int(i) => ToSqlOutput::Owned(SqlValue::Integer(*i)),
            // SQLite integers are signed; larger values keep their digits as text.
            Value::UInt(u) => match i64::try_from(*u) {
                Ok(i) => ToSqlOutput::Owned(SqlValue::Integer(i)),
                Err(_) => ToSqlOutput::Owned(SqlValue::Text(u.to_string())),
            },
            Value::Float(f) => ToSqlOutput::Owned(SqlValue::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Bytes(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    fn seeded() -> SqliteDatabase {
        let db = SqliteDatabase::open_in_memory().unwrap();
        db.execute_batch(
            "CREATE TABLE content (
                 uuid VARCHAR(36) NOT NULL,
                 lang VARCHAR(8) NOT NULL,
                 last_modified VARCHAR(36),
                 body TEXT,
                 PRIMARY KEY (uuid, lang)
             );
             CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT);
             INSERT INTO content VALUES ('a1', 'en', '2018-04-19', 'hello');
             INSERT INTO content VALUES ('a1', 'fr', '2018-04-20', 'bonjour');",
        )
        .unwrap();
        db
    }

    #[tokio::test]
    async fn test_list_tables_in_creation_order() {
        let db = seeded();
        assert_eq!(db.list_tables().await.unwrap(), vec!["content", "notes"]);
    }

    #[tokio::test]
    async fn test_has_column() {
        let db = seeded();
        assert!(db.has_column("content", "last_modified").await.unwrap());
        assert!(!db.has_column("notes", "last_modified").await.unwrap());
    }

    #[tokio::test]
    async fn test_composite_primary_key_order() {
        let db = seeded();
        assert_eq!(
            db.primary_key_columns("content").await.unwrap(),
            vec!["uuid", "lang"]
        );
        assert_eq!(db.primary_key_columns("notes").await.unwrap(), vec!["id"]);
    }

    #[tokio::test]
    async fn test_scan_table_streams_all_rows() {
        let db = seeded();
        let rows: Vec<Row> = db
            .scan_table("content")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0].column_names().collect::<Vec<_>>(),
            vec!["uuid", "lang", "last_modified", "body"]
        );
    }

    #[tokio::test]
    async fn test_scan_missing_table_reports_error() {
        let db = seeded();
        let result: Result<Vec<Row>, SyncError> =
            db.scan_table("missing").await.unwrap().try_collect().await;
        assert!(matches!(result, Err(SyncError::RowQuery { .. })));
    }

    #[tokio::test]
    async fn test_select_by_key_uses_every_key_column() {
        let db = seeded();
        let key = PrimaryKey::new(vec![
            ("uuid".to_string(), Value::from("a1")),
            ("lang".to_string(), Value::from("fr")),
        ]);

        let row = db.select_by_key("content", &key).await.unwrap().unwrap();
        assert_eq!(row.get("body"), Some(&Value::from("bonjour")));

        let key = PrimaryKey::new(vec![
            ("uuid".to_string(), Value::from("a1")),
            ("lang".to_string(), Value::from("de")),
        ]);
        assert!(db.select_by_key("content", &key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replace_row_overwrites_whole_row() {
        let db = seeded();
        let row = Row::from_iter([
            ("uuid", Value::from("a1")),
            ("lang", Value::from("en")),
            ("last_modified", Value::from("2018-05-01")),
            ("body", Value::Null),
        ]);
        db.replace_row("content", &row).await.unwrap();

        let key = row
            .primary_key(&["uuid".to_string(), "lang".to_string()])
            .unwrap();
        let stored = db.select_by_key("content", &key).await.unwrap().unwrap();
        assert_eq!(stored, row);
    }

    #[tokio::test]
    async fn test_replace_row_unknown_column_fails() {
        let db = seeded();
        let row = Row::from_iter([("id", Value::Int(1)), ("title", Value::from("x"))]);
        assert!(db.replace_row("notes", &row).await.is_err());
    }

    #[test]
    fn test_large_unsigned_binds_as_text() {
        let db = SqliteDatabase::open_in_memory().unwrap();
        let stored: String = db
            .with_conn(|conn| {
                conn.query_row("SELECT CAST(?1 AS TEXT)", [Value::UInt(u64::MAX)], |row| {
                    row.get(0)
                })
            })
            .unwrap();
        assert_eq!(stored, u64::MAX.to_string());
    }
}
