//! SQL-backed snapshot source
//!
//! Runs one configured statement against Postgres or SQLite and converts every
//! column of every row into a [`Value`]. The statement is responsible for the
//! ordering contract (`ORDER BY` a monotonically increasing id, descending).
//!
//! Every column type is readable, so `SELECT *` works on any table:
//!
//! - Postgres statements run over the simple query protocol, which returns
//!   every column in its text form. Booleans, integers and floats become typed
//!   values, `bytea` becomes [`Value::Bytes`], and everything else (dates,
//!   timestamps, numerics, uuids, json, ...) is kept as [`Value::Text`] in
//!   Postgres' own rendering.
//! - SQLite values are decoded by their storage class.
//!
//! `NULL` is always [`Value::Null`].

use super::SnapshotSource;
use crate::error::{Result, SourceError};
use crate::value::{Row, Snapshot, Value};
use async_trait::async_trait;
use sqlx::{Column, Row as _, TypeInfo, ValueRef};
use std::time::Duration;

#[cfg(feature = "sqlx-postgres")]
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
#[cfg(feature = "sqlx-sqlite")]
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};

/// Statement used when none is configured
pub const DEFAULT_QUERY: &str = "SELECT * FROM Export_Backlogs ORDER BY idBackLog DESC";

/// Connection pool of one of the supported databases
#[derive(Debug, Clone)]
pub enum SqlPool {
    #[cfg(feature = "sqlx-postgres")]
    Postgres(PgPool),
    #[cfg(feature = "sqlx-sqlite")]
    Sqlite(SqlitePool),
}

/// Snapshot source reading from a SQL database
#[derive(Debug, Clone)]
pub struct SqlSource {
    pool: SqlPool,
    query: String,
}

impl SqlSource {
    /// Connect to `url` (`postgres://…` or `sqlite:…`) with default pool settings
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with(url, 5, Duration::from_secs(5)).await
    }

    /// Connect with an explicit pool size and connection acquire timeout
    pub async fn connect_with(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self> {
        let max_connections = max_connections.max(1);
        let scheme = url.split(':').next().unwrap_or_default();

        let pool = match scheme {
            #[cfg(feature = "sqlx-postgres")]
            "postgres" | "postgresql" => SqlPool::Postgres(
                PgPoolOptions::new()
                    .max_connections(max_connections)
                    .acquire_timeout(acquire_timeout)
                    .connect(url)
                    .await?,
            ),
            #[cfg(feature = "sqlx-sqlite")]
            "sqlite" => SqlPool::Sqlite(
                SqlitePoolOptions::new()
                    .max_connections(max_connections)
                    .acquire_timeout(acquire_timeout)
                    .connect(url)
                    .await?,
            ),
            other => return Err(SourceError::UnsupportedDatabase(other.to_string())),
        };

        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: SqlPool) -> Self {
        Self {
            pool,
            query: DEFAULT_QUERY.to_string(),
        }
    }

    /// Use a different statement
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn query_text(&self) -> &str {
        &self.query
    }

    pub fn pool(&self) -> &SqlPool {
        &self.pool
    }
}

#[async_trait]
impl SnapshotSource for SqlSource {
    async fn query(&self) -> Result<Snapshot> {
        match &self.pool {
            #[cfg(feature = "sqlx-postgres")]
            SqlPool::Postgres(pool) => {
                let rows = sqlx::raw_sql(&self.query).fetch_all(pool).await?;
                rows.iter()
                    .map(|row| decode_row(row, decode_pg_column))
                    .collect()
            }
            #[cfg(feature = "sqlx-sqlite")]
            SqlPool::Sqlite(pool) => {
                let rows = sqlx::query(&self.query).fetch_all(pool).await?;
                rows.iter()
                    .map(|row| decode_row(row, decode_sqlite_column))
                    .collect()
            }
        }
    }

    fn name(&self) -> &str {
        match self.pool {
            #[cfg(feature = "sqlx-postgres")]
            SqlPool::Postgres(_) => "postgres",
            #[cfg(feature = "sqlx-sqlite")]
            SqlPool::Sqlite(_) => "sqlite",
        }
    }
}

fn decode_row<R, F>(row: &R, decode: F) -> Result<Row>
where
    R: sqlx::Row,
    F: Fn(&R, usize) -> Result<Value>,
{
    let mut decoded = Row::with_capacity(row.columns().len());
    for column in row.columns() {
        decoded.insert(column.name(), decode(row, column.ordinal())?);
    }
    Ok(decoded)
}

/// Decode one column of a row fetched over the simple query protocol
#[cfg(feature = "sqlx-postgres")]
fn decode_pg_column(row: &PgRow, index: usize) -> Result<Value> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_string();

    if type_name == "BYTEA" {
        return Ok(Value::Bytes(row.try_get_unchecked::<Vec<u8>, _>(index)?));
    }
    let text: &str = row.try_get_unchecked(index)?;
    Ok(pg_text_value(&type_name, text))
}

/// Convert the text rendering of a Postgres value of type `type_name`
#[cfg(feature = "sqlx-postgres")]
fn pg_text_value(type_name: &str, text: &str) -> Value {
    let typed = match type_name {
        "BOOL" => match text {
            "t" => Some(Value::Bool(true)),
            "f" => Some(Value::Bool(false)),
            _ => None,
        },
        "INT2" | "INT4" | "INT8" | "OID" => text.parse().ok().map(Value::Int),
        "FLOAT4" | "FLOAT8" => text.parse().ok().map(Value::Float),
        _ => None,
    };
    typed.unwrap_or_else(|| Value::Text(text.to_string()))
}

/// Decode one column by its SQLite storage class
#[cfg(feature = "sqlx-sqlite")]
fn decode_sqlite_column(row: &SqliteRow, index: usize) -> Result<Value> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let storage = raw.type_info().name().to_string();

    Ok(match storage.as_str() {
        "INTEGER" | "BOOLEAN" => Value::Int(row.try_get_unchecked(index)?),
        "REAL" => Value::Float(row.try_get_unchecked(index)?),
        "BLOB" => Value::Bytes(row.try_get_unchecked(index)?),
        _ => Value::Text(row.try_get_unchecked(index)?),
    })
}

#[cfg(all(test, feature = "sqlx-postgres"))]
mod pg_tests {
    use super::*;

    #[test]
    fn test_scalar_types_are_typed() {
        assert_eq!(pg_text_value("BOOL", "t"), Value::Bool(true));
        assert_eq!(pg_text_value("BOOL", "f"), Value::Bool(false));
        assert_eq!(pg_text_value("INT4", "42"), Value::Int(42));
        assert_eq!(pg_text_value("INT8", "-9000000000"), Value::Int(-9_000_000_000));
        assert_eq!(pg_text_value("FLOAT8", "2.5"), Value::Float(2.5));
        assert_eq!(pg_text_value("FLOAT8", "NaN"), Value::Float(f64::NAN));
    }

    #[test]
    fn test_other_types_keep_text_rendering() {
        assert_eq!(pg_text_value("NUMERIC", "12.50"), Value::Text("12.50".into()));
        assert_eq!(pg_text_value("DATE", "2024-03-01"), Value::Text("2024-03-01".into()));
        assert_eq!(
            pg_text_value("TIMESTAMP", "2024-03-01 09:30:00"),
            Value::Text("2024-03-01 09:30:00".into())
        );
        assert_eq!(
            pg_text_value("UUID", "67e55044-10b1-426f-9247-bb680e5fe0c8"),
            Value::Text("67e55044-10b1-426f-9247-bb680e5fe0c8".into())
        );
        assert_eq!(pg_text_value("BPCHAR", "A  "), Value::Text("A  ".into()));
    }
}

#[cfg(all(test, feature = "sqlx-sqlite"))]
mod tests {
    use super::*;

    async fn seeded() -> SqlSource {
        let source = SqlSource::connect_with("sqlite::memory:", 1, Duration::from_secs(5))
            .await
            .unwrap();
        let SqlPool::Sqlite(pool) = source.pool().clone() else {
            panic!("expected a sqlite pool");
        };

        sqlx::query(
            "CREATE TABLE Export_Backlogs (
                idBackLog INTEGER PRIMARY KEY,
                status TEXT NOT NULL,
                estimate REAL,
                owner TEXT,
                due DATE,
                updated_at DATETIME,
                blob BLOB
            )",
        )
        .execute(&pool)
        .await
        .unwrap();

        sqlx::query(
            "INSERT INTO Export_Backlogs
                (idBackLog, status, estimate, owner, due, updated_at, blob) VALUES
                (1, 'closed', 2.5, 'ana', '2024-03-01', '2024-03-01 09:30:00', x'0102'),
                (2, 'open', NULL, NULL, NULL, NULL, NULL)",
        )
        .execute(&pool)
        .await
        .unwrap();

        source
    }

    #[tokio::test]
    async fn test_default_query_orders_descending() {
        let source = seeded().await;
        let snapshot = source.query().await.unwrap();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.rows()[0].get("idBackLog"), Some(&Value::Int(2)));
        assert_eq!(snapshot.rows()[1].get("idBackLog"), Some(&Value::Int(1)));
    }

    #[tokio::test]
    async fn test_column_decoding() {
        let source = seeded().await;
        let snapshot = source.query().await.unwrap();
        let closed = &snapshot.rows()[1];

        assert_eq!(closed.get("status"), Some(&Value::Text("closed".into())));
        assert_eq!(closed.get("estimate"), Some(&Value::Float(2.5)));
        assert_eq!(closed.get("blob"), Some(&Value::Bytes(vec![1, 2])));
        assert_eq!(snapshot.rows()[0].get("owner"), Some(&Value::Null));

        let names: Vec<&str> = closed.columns().map(|(name, _)| name).collect();
        assert_eq!(
            names,
            vec!["idBackLog", "status", "estimate", "owner", "due", "updated_at", "blob"]
        );
    }

    #[tokio::test]
    async fn test_date_columns_are_read_as_text() {
        let source = seeded().await;
        let snapshot = source.query().await.unwrap();
        let closed = &snapshot.rows()[1];

        assert_eq!(closed.get("due"), Some(&Value::Text("2024-03-01".into())));
        assert_eq!(
            closed.get("updated_at"),
            Some(&Value::Text("2024-03-01 09:30:00".into()))
        );
        assert_eq!(snapshot.rows()[0].get("due"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_repeated_queries_are_equal() {
        let source = seeded().await;
        assert_eq!(source.query().await.unwrap(), source.query().await.unwrap());
    }

    #[tokio::test]
    async fn test_bad_statement_is_query_error() {
        let source = seeded().await.with_query("SELECT * FROM missing_table");
        let err = source.query().await.unwrap_err();
        assert!(matches!(err, SourceError::Query(_)));
    }

    #[tokio::test]
    async fn test_unknown_scheme_rejected() {
        let err = SqlSource::connect("mysql://localhost/backlog").await.unwrap_err();
        assert!(matches!(err, SourceError::UnsupportedDatabase(ref s) if s == "mysql"));
    }
}
