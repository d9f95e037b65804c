// ABOUTME: MySQL / Aurora backend for the sync engine
// ABOUTME: Pooled mysql_async connections, information_schema catalog queries, REPLACE INTO upserts

use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Opts, OptsBuilder, Params, Pool, PoolConstraints, PoolOpts};

use super::{Database, Dialect};
use crate::sync::{DbResult, PrimaryKey, Row, RowStream, SyncError, Value};
use crate::utils::redact_url;

/// A MySQL database behind a connection pool.
///
/// Every call checks a connection out of the pool and returns it on drop,
/// whichever way the call exits.
#[derive(Clone)]
pub struct MySqlDatabase {
    pool: Pool,
}

impl MySqlDatabase {
    /// Build a pool capped at `max_connections` and ping the server once.
    pub async fn connect(url: &str, max_connections: usize) -> Result<Self, SyncError> {
        let endpoint = redact_url(url);
        let connection_error = |source: mysql_async::Error| SyncError::Connection {
            endpoint: endpoint.clone(),
            source: Box::new(source),
        };

        let invalid_cap = || {
            SyncError::Config(format!(
                "max connections must be at least 1, got {}",
                max_connections
            ))
        };
        if max_connections == 0 {
            return Err(invalid_cap());
        }

        let opts = Opts::from_url(url).map_err(|e| connection_error(e.into()))?;
        let constraints = PoolConstraints::new(0, max_connections).ok_or_else(invalid_cap)?;
        let pool = Pool::new(
            OptsBuilder::from_opts(opts).pool_opts(PoolOpts::default().with_constraints(constraints)),
        );

        let mut conn = pool.get_conn().await.map_err(connection_error)?;
        conn.ping().await.map_err(connection_error)?;
        drop(conn);

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

#[async_trait]
impl Database for MySqlDatabase {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    async fn list_tables(&self) -> DbResult<Vec<String>> {
        let mut conn = self.pool.get_conn().await?;
        let tables: Vec<(String, String)> = conn
            .query("SHOW FULL TABLES WHERE Table_type = 'BASE TABLE'")
            .await?;
        Ok(tables.into_iter().map(|(name, _)| name).collect())
    }

    async fn has_column(&self, table: &str, column: &str) -> DbResult<bool> {
        let mut conn = self.pool.get_conn().await?;
        let count: Option<u64> = conn
            .exec_first(
                "SELECT COUNT(*) FROM information_schema.COLUMNS \
                 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND COLUMN_NAME = ?",
                (table, column),
            )
            .await?;
        Ok(count.unwrap_or(0) > 0)
    }

    async fn primary_key_columns(&self, table: &str) -> DbResult<Vec<String>> {
        let mut conn = self.pool.get_conn().await?;
        let columns: Vec<String> = conn
            .exec(
                "SELECT COLUMN_NAME FROM information_schema.KEY_COLUMN_USAGE \
                 WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? \
                 AND CONSTRAINT_NAME = 'PRIMARY' \
                 ORDER BY ORDINAL_POSITION",
                (table,),
            )
            .await?;
        Ok(columns)
    }

    async fn scan_table(&self, table: &str) -> DbResult<RowStream> {
        let (tx, stream) = RowStream::channel(table);
        let mut conn = self.pool.get_conn().await?;
        let query = Dialect::MySql.select_all(table);

        // Binary protocol on both the scan and the key lookup, so both sides
        // of a comparison decode values the same way.
        tokio::spawn(async move {
            let outcome: mysql_async::Result<()> = async {
                let mut result = conn.exec_iter(query, ()).await?;
                while let Some(row) = result.next().await? {
                    if tx.send(Ok(convert_row(row))).await.is_err() {
                        break;
                    }
                }
                Ok(())
            }
            .await;

            if let Err(e) = outcome {
                let _ = tx.send(Err(e.into())).await;
            }
        });

        Ok(stream)
    }

    async fn select_by_key(&self, table: &str, key: &PrimaryKey) -> DbResult<Option<Row>> {
        let query = Dialect::MySql.select_by_key(table, key.columns());
        let params = Params::Positional(key.values().map(to_mysql_value).collect());

        let mut conn = self.pool.get_conn().await?;
        let row: Option<mysql_async::Row> = conn.exec_first(query, params).await?;
        Ok(row.map(convert_row))
    }

    async fn replace_row(&self, table: &str, row: &Row) -> DbResult<u64> {
        let query = Dialect::MySql.replace_row(table, row.column_names());
        let params = Params::Positional(row.values().map(to_mysql_value).collect());

        let mut conn = self.pool.get_conn().await?;
        conn.exec_drop(query, params).await?;
        Ok(conn.affected_rows())
    }

    async fn close(&self) -> DbResult<()> {
        self.pool.clone().disconnect().await?;
        Ok(())
    }
}

/// Pair each value with the column name reported by the result set.
fn convert_row(row: mysql_async::Row) -> Row {
    let names: Vec<String> = row
        .columns_ref()
        .iter()
        .map(|column| column.name_str().into_owned())
        .collect();

    names
        .into_iter()
        .zip(row.unwrap())
        .map(|(name, value)| (name, from_mysql_value(value)))
        .collect()
}

pub fn from_mysql_value(value: mysql_async::Value) -> Value {
    use mysql_async::Value as My;

    match value {
        My::NULL => Value::Null,
        My::Bytes(b) => Value::Bytes(b),
        My::Int(i) => Value::Int(i),
        My::UInt(u) => Value::UInt(u),
        My::Float(f) => Value::Float(f64::from(f)),
        My::Double(d) => Value::Float(d),
        My::Date(year, month, day, hour, minute, second, micros) => {
            let mut text = format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                year, month, day, hour, minute, second
            );
            if micros > 0 {
                text.push_str(&format!(".{:06}", micros));
            }
            Value::Text(text)
        }
        My::Time(negative, days, hours, minutes, seconds, micros) => {
            let mut text = format!(
                "{}{:02}:{:02}:{:02}",
                if negative { "-" } else { "" },
                u64::from(days) * 24 + u64::from(hours),
                minutes,
                seconds
            );
            if micros > 0 {
                text.push_str(&format!(".{:06}", micros));
            }
            Value::Text(text)
        }
    }
}

pub fn to_mysql_value(value: &Value) -> mysql_async::Value {
    use mysql_async::Value as My;

    match value {
        Value::Null => My::NULL,
        Value::Int(i) => My::Int(*i),
        Value::UInt(u) => My::UInt(*u),
        Value::Float(f) => My::Double(*f),
        Value::Text(s) => My::Bytes(s.as_bytes().to_vec()),
        Value::Bytes(b) => My::Bytes(b.clone()),
    }
}
