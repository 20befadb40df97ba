//! Chunked-execution script generation for large DML.
//!
//! One big DELETE or UPDATE becomes a loop of bounded transactions so the
//! statement never holds row locks for minutes or stalls replicas with a
//! single giant binlog event. The generated artifact is a shell script
//! driving the mysql client, because plain SQL files cannot loop.

use serde::{Deserialize, Serialize};

use crate::classify::{OperationType, ParsedStatement};

/// A generated chunked-execution script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkScript {
    pub body: String,
    /// Suggested file name, relative to the working directory.
    pub suggested_path: String,
}

/// Number of chunks needed for the estimate at the given chunk size.
pub fn chunk_count(estimated_rows: u64, chunk_size: u64) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    estimated_rows.div_ceil(chunk_size)
}

/// Builds the chunked script for a filtered UPDATE or DELETE.
///
/// The loop reruns the statement with a LIMIT until it affects no rows.
/// For DELETE the predicate shrinks naturally; for UPDATE the caller is
/// warned separately that the predicate must exclude already-updated rows.
pub fn build_script(
    statement: &ParsedStatement,
    estimated_rows: u64,
    chunk_size: u64,
) -> ChunkScript {
    let table = statement.table.as_deref().unwrap_or("table");
    let chunks = chunk_count(estimated_rows, chunk_size);
    let verb = match statement.operation {
        OperationType::Update => "UPDATE",
        _ => "DELETE",
    };
    let chunked_sql = format!("{} LIMIT {}", statement.raw_text.trim_end(), chunk_size);

    let body = format!(
        r#"#!/usr/bin/env bash
# Chunked {verb} for {table}: ~{estimated_rows} rows in {chunks} chunks of {chunk_size}.
# Run with connection parameters in the environment or a ~/.my.cnf section:
#   MYSQL_ARGS="-h host -u user -p dbname" ./this_script.sh
set -euo pipefail

MYSQL_ARGS="${{MYSQL_ARGS:-}}"
SLEEP_BETWEEN_CHUNKS="${{SLEEP_BETWEEN_CHUNKS:-0.5}}"
chunk=0

while :; do
    affected=$(mysql $MYSQL_ARGS --skip-column-names -e \
        "{chunked_sql}; SELECT ROW_COUNT();" | tail -n 1)
    chunk=$((chunk + 1))
    echo "chunk $chunk: $affected rows"
    if [ "$affected" -lt 1 ]; then
        echo "done after $chunk chunks"
        break
    fi
    sleep "$SLEEP_BETWEEN_CHUNKS"
done
"#
    );

    ChunkScript {
        body,
        suggested_path: format!("preflight_chunked_{}.sh", sanitize(table)),
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
