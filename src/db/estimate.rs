//! Row impact estimation for DML statements.
//!
//! Runs the statement through EXPLAIN and reads the optimizer's row
//! estimate. Estimation is best-effort: when EXPLAIN is refused or fails,
//! the estimate falls back to the table's row count, and failing that
//! reports itself as unavailable rather than aborting the analysis.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classify::ParsedStatement;
use crate::db::sandbox::explain_statement;
use crate::db::{DatabaseClient, TableMetadata};

/// Where a row estimate came from, in decreasing order of fidelity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EstimateSource {
    /// The optimizer's plan for this exact statement.
    Explain,
    /// The table's total row count; an upper bound for filtered DML.
    TableRows,
    /// No estimate could be produced.
    Unavailable,
}

/// An estimated number of affected rows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RowEstimate {
    pub rows: u64,
    pub source: EstimateSource,
    /// Estimated share of the table the statement touches, when the table
    /// row count is known and nonzero.
    pub table_fraction: Option<f64>,
}

impl RowEstimate {
    pub fn unavailable() -> Self {
        Self {
            rows: 0,
            source: EstimateSource::Unavailable,
            table_fraction: None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.source != EstimateSource::Unavailable
    }

    /// Percentage of the table touched, for display and thresholds.
    pub fn table_percent(&self) -> Option<f64> {
        self.table_fraction.map(|f| f * 100.0)
    }
}

/// Estimates how many rows a DML statement will touch.
pub async fn estimate_rows(
    client: &dyn DatabaseClient,
    statement: &ParsedStatement,
    metadata: &TableMetadata,
) -> RowEstimate {
    let explained = match explain_statement(&statement.raw_text) {
        Ok(sql) => match client.execute_query(&sql).await {
            Ok(result) => explained_row_count(&result),
            Err(e) => {
                debug!("EXPLAIN failed, falling back to table rows: {e}");
                None
            }
        },
        Err(e) => {
            debug!("statement not eligible for EXPLAIN: {e}");
            None
        }
    };

    let (rows, source) = match explained {
        Some(rows) => (rows, EstimateSource::Explain),
        None if metadata.table_rows > 0 => (metadata.table_rows, EstimateSource::TableRows),
        None => return RowEstimate::unavailable(),
    };

    let table_fraction = if metadata.table_rows > 0 {
        Some((rows as f64 / metadata.table_rows as f64).min(1.0))
    } else {
        None
    };

    RowEstimate {
        rows,
        source,
        table_fraction,
    }
}

/// Reads the driving row estimate out of a tabular EXPLAIN result. The
/// first plan row's `rows` column is the scan the statement starts from;
/// later rows are joined lookups per driven row.
fn explained_row_count(result: &crate::db::QueryResult) -> Option<u64> {
    let value = result.get(0, "rows")?;
    if value.is_null() {
        return None;
    }
    value.as_u64()
}
