//! Mock database client for testing.
//!
//! A scripted client: tests register the result each query should produce,
//! and anything unscripted answers with the typed negative result, which is
//! exactly how an old server that lacks the probed feature behaves. The
//! query log lets tests assert on probe ordering and short-circuiting.

use super::{ColumnInfo, DatabaseClient, QueryResult, Row, Value};
use crate::error::{PreflightError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// A scripted response for one query.
#[derive(Debug, Clone)]
enum Scripted {
    Rows(Vec<ColumnInfo>, Vec<Row>),
    Unsupported(String),
    Fail(String),
}

/// A mock database client that returns predefined results.
#[derive(Debug, Default)]
pub struct MockDatabaseClient {
    responses: HashMap<String, Scripted>,
    log: Mutex<Vec<String>>,
}

impl MockDatabaseClient {
    /// Creates a new mock client with no scripted responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts a full result set for the given query.
    pub fn with_rows(
        mut self,
        sql: &str,
        columns: &[&str],
        rows: Vec<Vec<Value>>,
    ) -> Self {
        let columns = columns
            .iter()
            .map(|name| ColumnInfo::new(*name, "text"))
            .collect();
        self.responses
            .insert(normalize(sql), Scripted::Rows(columns, rows));
        self
    }

    /// Scripts a single-value result, the shape of variable probes.
    pub fn with_scalar(self, sql: &str, value: impl Into<Value>) -> Self {
        self.with_rows(sql, &["value"], vec![vec![value.into()]])
    }

    /// Scripts an empty result set.
    pub fn with_empty(self, sql: &str) -> Self {
        self.with_rows(sql, &[], vec![])
    }

    /// Scripts the typed negative result for the given query. Unscripted
    /// queries already answer this way; this makes the intent explicit.
    pub fn with_unsupported(mut self, sql: &str) -> Self {
        self.responses.insert(
            normalize(sql),
            Scripted::Unsupported(format!("unsupported: {sql}")),
        );
        self
    }

    /// Scripts a hard failure for the given query.
    pub fn with_failure(mut self, sql: &str, message: &str) -> Self {
        self.responses
            .insert(normalize(sql), Scripted::Fail(message.to_string()));
        self
    }

    /// Returns the queries executed so far, in order.
    pub fn executed_queries(&self) -> Vec<String> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    async fn execute_query(&self, sql: &str) -> Result<QueryResult> {
        if let Ok(mut log) = self.log.lock() {
            log.push(sql.to_string());
        }
        match self.responses.get(&normalize(sql)) {
            Some(Scripted::Rows(columns, rows)) => {
                Ok(QueryResult::with_data(columns.clone(), rows.clone()))
            }
            Some(Scripted::Unsupported(msg)) => Err(PreflightError::unsupported(msg.clone())),
            Some(Scripted::Fail(msg)) => Err(PreflightError::query(msg.clone())),
            None => Err(PreflightError::unsupported(format!(
                "no scripted response for: {sql}"
            ))),
        }
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Normalizes a query for lookup: case-folded, whitespace-collapsed, and
/// stripped of a trailing terminator.
fn normalize(sql: &str) -> String {
    let collapsed = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.trim_end_matches(';').trim().to_lowercase()
}
