//! MySQL database client implementation.
//!
//! Provides the `MySqlClient` struct that implements the `DatabaseClient`
//! trait using sqlx. Server errors that mean "this server does not know
//! that syntax or variable" are mapped to the typed negative result so
//! probe chains can fall through to older syntax.

use crate::config::ConnectionConfig;
use crate::db::{ColumnInfo, DatabaseClient, QueryResult, Row, Value};
use crate::error::{PreflightError, Result};
use async_trait::async_trait;
use sqlx::mysql::{MySqlDatabaseError, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column as SqlxColumn, Row as SqlxRow, TypeInfo};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Query timeout in seconds.
const QUERY_TIMEOUT_SECS: u64 = 30;

/// Maximum number of connection retry attempts.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// Server error numbers that mean the statement or variable is unknown to
/// this server rather than the query having failed. Probes rely on these
/// to distinguish "feature absent" from "server unreachable".
const UNSUPPORTED_ERROR_NUMBERS: &[u16] = &[
    1064, // parse error: syntax this server predates
    1109, // unknown table in information_schema
    1142, // command denied: probe tables the grant does not cover
    1146, // table does not exist: performance_schema feature tables
    1193, // unknown system variable
    1227, // access denied for SUPER-only probes
];

/// MySQL database client.
#[derive(Debug)]
pub struct MySqlClient {
    pool: MySqlPool,
}

impl MySqlClient {
    /// Creates a new MySqlClient from an existing connection pool.
    ///
    /// This is primarily useful for testing.
    #[allow(dead_code)]
    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Connects with exponential-backoff retries for transient failures.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let conn_str = config.to_connection_string()?;

        let mut last_error = None;
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);

        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            debug!("Connection attempt {} of {}", attempt, MAX_RETRY_ATTEMPTS);

            let result = MySqlPoolOptions::new()
                .max_connections(2)
                .acquire_timeout(Duration::from_secs(10))
                .connect(&conn_str)
                .await;

            match result {
                Ok(pool) => {
                    debug!("Successfully connected to database");
                    return Ok(Self { pool });
                }
                Err(e) => {
                    let is_transient = is_transient_error(&e);
                    last_error = Some(e);

                    if attempt < MAX_RETRY_ATTEMPTS && is_transient {
                        warn!(
                            "Connection attempt {} failed (transient error), retrying in {:?}",
                            attempt, delay
                        );
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    } else if !is_transient {
                        break;
                    }
                }
            }
        }

        Err(map_connection_error(last_error, config))
    }
}

#[async_trait]
impl DatabaseClient for MySqlClient {
    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        let start = Instant::now();

        let result = tokio::time::timeout(
            Duration::from_secs(QUERY_TIMEOUT_SECS),
            sqlx::query(sql).fetch_all(&self.pool),
        )
        .await
        .map_err(|_| {
            PreflightError::query(format!(
                "Query timed out after {QUERY_TIMEOUT_SECS} seconds"
            ))
        })?
        .map_err(map_query_error)?;

        let execution_time = start.elapsed();

        let columns: Vec<ColumnInfo> = result
            .first()
            .map(|row| {
                row.columns()
                    .iter()
                    .map(|col| ColumnInfo::new(col.name(), col.type_info().name()))
                    .collect()
            })
            .unwrap_or_default();

        let rows: Vec<Row> = result.iter().map(convert_row).collect();
        let row_count = rows.len();

        Ok(QueryResult {
            columns,
            rows,
            execution_time,
            row_count,
        })
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

/// Converts one driver row into the backend-neutral representation.
fn convert_row(row: &MySqlRow) -> Row {
    (0..row.columns().len())
        .map(|idx| convert_value(row, idx))
        .collect()
}

/// Decodes one cell by cascading through the supported value shapes.
/// Anything undecodable becomes NULL after a debug log rather than
/// failing the whole probe.
fn convert_value(row: &MySqlRow, idx: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map(Value::Int).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<u64>, _>(idx) {
        return v.map(Value::Uint).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return v.map(Value::Float).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.map(Value::String).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
        return v.map(Value::Bool).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
        return v
            .map(|dt| Value::String(dt.format("%Y-%m-%d %H:%M:%S").to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return v.map(Value::Bytes).unwrap_or(Value::Null);
    }
    debug!(
        column = row.columns().get(idx).map(|c| c.name()),
        "Could not decode column value, treating as NULL"
    );
    Value::Null
}

/// Maps a query error, routing server errors that mean "feature absent"
/// to the typed negative result.
fn map_query_error(e: sqlx::Error) -> PreflightError {
    if let Some(number) = mysql_error_number(&e) {
        if UNSUPPORTED_ERROR_NUMBERS.contains(&number) {
            return PreflightError::unsupported(format!("server error {number}: {e}"));
        }
    }
    PreflightError::query(format!("Query failed: {e}"))
}

/// Extracts the MySQL server error number, if this is a server error.
fn mysql_error_number(e: &sqlx::Error) -> Option<u16> {
    e.as_database_error()
        .and_then(|db| db.try_downcast_ref::<MySqlDatabaseError>())
        .map(|my| my.number())
}

/// Returns true for errors worth retrying: network hiccups and pool
/// timeouts, not authentication or TLS failures.
fn is_transient_error(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => {
            // 1040 too many connections, 1053 server shutdown in progress
            matches!(
                db.try_downcast_ref::<MySqlDatabaseError>().map(|m| m.number()),
                Some(1040) | Some(1053)
            )
        }
        _ => false,
    }
}

/// Produces a user-facing connection error with the target named.
fn map_connection_error(e: Option<sqlx::Error>, config: &ConnectionConfig) -> PreflightError {
    let target = format!("{}:{}", config.host, config.port);
    match e {
        Some(e) => match mysql_error_number(&e) {
            Some(1045) => PreflightError::connection(format!(
                "Access denied connecting to {target}: check username and password"
            )),
            Some(1049) => PreflightError::connection(format!(
                "Unknown database connecting to {target}: {e}"
            )),
            _ => PreflightError::connection(format!("Failed to connect to {target}: {e}")),
        },
        None => PreflightError::connection(format!("Failed to connect to {target}")),
    }
}
