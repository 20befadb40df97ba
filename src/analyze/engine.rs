//! The decision engine.
//!
//! A pure function over the classifier output, table metadata, topology,
//! and server version. No I/O happens here, which is what makes the
//! end-to-end decision scenarios testable without a server.

use crate::classify::{OperationType, ParsedStatement, StatementKind, SubOperation};
use crate::db::{EstimateSource, RowEstimate, ServerVersion, TableMetadata};
use crate::topology::{Topology, TopologyInfo};

use super::chunk::{self, chunk_count};
use super::matrix::classify_ddl;
use super::rollback;
use super::{
    Algorithm, AnalysisOptions, AnalysisResult, DdlClass, DiskEstimate, DmlImpact,
    ExecutionMethod, LockLevel, Risk,
};

/// Everything the engine needs for one statement.
#[derive(Debug)]
pub struct AnalysisInput<'a> {
    pub statement: &'a ParsedStatement,
    pub metadata: &'a TableMetadata,
    pub topology: &'a TopologyInfo,
    pub version: &'a ServerVersion,
    /// Row estimate for filtered DML; None when estimation failed or does
    /// not apply.
    pub estimate: Option<RowEstimate>,
    pub options: &'a AnalysisOptions,
}

/// Either a full plan or an explained refusal. A refusal is not an error;
/// it is "nothing to report" with the reason spelled out.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Plan(Box<AnalysisResult>),
    Refusal(String),
}

/// Analyzes one classified statement.
pub fn analyze(input: &AnalysisInput) -> AnalysisOutcome {
    let statement = input.statement;

    if let Some(reason) = refusal_reason(statement) {
        return AnalysisOutcome::Refusal(reason);
    }

    match statement.kind {
        StatementKind::Dml => AnalysisOutcome::Plan(Box::new(analyze_dml(input))),
        StatementKind::Ddl | StatementKind::Unknown => {
            AnalysisOutcome::Plan(Box::new(analyze_ddl(input)))
        }
    }
}

/// Returns the refusal text for statements outside the analyzable scope.
/// Callable before any connection is made.
pub fn refusal_reason(statement: &ParsedStatement) -> Option<String> {
    if statement.kind == StatementKind::Unknown {
        return Some(
            "statement is neither a schema change nor a bulk write; nothing to analyze"
                .to_string(),
        );
    }
    if !statement.operation.is_refused() {
        return None;
    }
    let reason = match statement.operation {
        OperationType::Insert => {
            "INSERT adds rows without touching existing data; there is nothing to assess"
        }
        OperationType::LoadData => {
            "LOAD DATA is a bulk import; batch sizing belongs to the import tool"
        }
        OperationType::CreateTable => {
            "CREATE TABLE affects no existing data; run it directly"
        }
        _ => "statement kind is out of scope",
    };
    Some(reason.to_string())
}

// DDL analysis

fn analyze_ddl(input: &AnalysisInput) -> AnalysisResult {
    let statement = input.statement;
    let metadata = input.metadata;
    let options = input.options;

    let per_operation = classify_clauses(statement, metadata, input.version);
    let class = per_operation
        .iter()
        .map(|(_, c)| *c)
        .reduce(DdlClass::worst_of)
        .unwrap_or(DdlClass::new(Algorithm::Instant, LockLevel::None, false));

    let mut warnings = Vec::new();
    let mut cluster_warnings = Vec::new();
    let mut risk = Risk::Safe;

    // Cost-based escalation.
    if class.algorithm == Algorithm::Copy || class.lock == LockLevel::Exclusive {
        risk = risk.escalate(Risk::Caution);
    }
    if class.rebuilds_table && metadata.total_bytes() >= options.large_table_bytes {
        risk = risk.escalate(Risk::Caution);
    }
    if class.algorithm == Algorithm::Copy && metadata.total_bytes() >= options.large_table_bytes {
        risk = risk.escalate(Risk::Dangerous);
    }
    if class.rebuilds_table && metadata.total_bytes() >= options.huge_table_bytes {
        risk = risk.escalate(Risk::Dangerous);
    }

    // Topology escalation, independent of algorithm.
    risk = escalate_for_topology(
        input,
        TopologyImpact {
            ddl: true,
            trivial: class.is_trivial(),
            writeset_bytes: rebuild_writeset(metadata, &class),
        },
        &mut cluster_warnings,
        risk,
    );
    collect_ddl_warnings(input, &class, &mut warnings);

    let disk_estimate = class.rebuilds_table.then(|| DiskEstimate {
        bytes: metadata.total_bytes(),
        reason: format!(
            "full table rebuild of {} ({}) needs roughly the current size again \
             while the new copy is built",
            metadata.qualified_name(),
            format_bytes(metadata.total_bytes())
        ),
    });

    let external = class.algorithm == Algorithm::Copy
        || (risk == Risk::Dangerous && metadata.total_bytes() >= options.large_table_bytes);
    let (method, alternative_method, command, rationale) = if external {
        if input.topology.topology.is_aurora() {
            warnings.push(
                "gh-ost reads the binary log, which Aurora does not enable by default; \
                 set binlog_format=ROW in the cluster parameter group first"
                    .to_string(),
            );
        }
        ddl_external_method(statement, metadata)
    } else {
        ddl_native_method(statement, &class)
    };

    let recommendation = match method {
        ExecutionMethod::Native => format!(
            "run the statement directly: {} with {} lock{}",
            class.algorithm,
            class.lock,
            if class.rebuilds_table {
                ", note the table is rebuilt in place"
            } else {
                ""
            }
        ),
        _ => format!(
            "use {method} instead of running the ALTER directly; the native path is {} \
             with {} lock on a {} table",
            class.algorithm,
            class.lock,
            format_bytes(metadata.total_bytes())
        ),
    };

    AnalysisResult {
        operation: statement.operation.to_string(),
        table: statement.table.clone(),
        class,
        per_operation,
        risk,
        method,
        alternative_method,
        recommendation,
        command,
        rationale,
        warnings,
        cluster_warnings,
        rollback: rollback::plan(statement, metadata),
        disk_estimate,
        script: None,
        retry_wrapper_sql: rollback::idempotent_wrapper(statement, metadata),
        dml: None,
    }
}

/// One classification per relevant clause, labeled for reporting.
fn classify_clauses(
    statement: &ParsedStatement,
    metadata: &TableMetadata,
    version: &ServerVersion,
) -> Vec<(String, DdlClass)> {
    let relevant: Vec<&SubOperation> =
        statement.sub_operations.iter().filter(|s| s.relevant).collect();

    if statement.operation != OperationType::MultipleOps {
        let sub = statement
            .single_relevant()
            .or_else(|| statement.sub_operations.first());
        let class = classify_ddl(
            statement.operation,
            sub,
            old_type_for(sub, metadata),
            version,
        );
        return vec![(clause_label(statement.operation, sub), class)];
    }

    relevant
        .iter()
        .map(|sub| {
            let class = classify_ddl(
                sub.operation,
                Some(sub),
                old_type_for(Some(sub), metadata),
                version,
            );
            (clause_label(sub.operation, Some(sub)), class)
        })
        .collect()
}

fn old_type_for<'a>(sub: Option<&SubOperation>, metadata: &'a TableMetadata) -> Option<&'a str> {
    let column = sub?.column.as_deref()?;
    Some(metadata.column(column)?.column_type.as_str())
}

fn clause_label(operation: OperationType, sub: Option<&SubOperation>) -> String {
    let target = sub.and_then(|s| {
        s.column
            .as_deref()
            .or(s.index_name.as_deref())
            .or(s.new_column.as_deref())
    });
    match target {
        Some(name) => format!("{operation} {name}"),
        None => operation.to_string(),
    }
}

/// The write-set a rebuilding DDL produces on a certifying cluster is
/// roughly the whole table.
fn rebuild_writeset(metadata: &TableMetadata, class: &DdlClass) -> Option<u64> {
    class.rebuilds_table.then(|| metadata.total_bytes())
}

/// What a statement does to the cluster, as far as escalation cares.
struct TopologyImpact {
    /// TOI blocking applies to schema changes only.
    ddl: bool,
    trivial: bool,
    writeset_bytes: Option<u64>,
}

/// Cluster-specific escalation shared by DDL and DML.
fn escalate_for_topology(
    input: &AnalysisInput,
    impact: TopologyImpact,
    cluster_warnings: &mut Vec<String>,
    mut risk: Risk,
) -> Risk {
    let writeset_bytes = impact.writeset_bytes;
    match &input.topology.topology {
        Topology::Galera(galera) => {
            if impact.ddl && galera.uses_toi() && !impact.trivial {
                risk = risk.escalate(Risk::Caution);
                cluster_warnings.push(format!(
                    "the whole {}-node cluster pauses under TOI while this change runs",
                    galera.cluster_size
                ));
            }
            if let (Some(writeset), Some(max)) = (writeset_bytes, galera.max_writeset_bytes) {
                if writeset as f64 >= input.options.writeset_warn_ratio * max as f64 {
                    risk = risk.escalate(Risk::Dangerous);
                    cluster_warnings.push(format!(
                        "estimated write-set ({}) approaches wsrep_max_ws_size ({}); \
                         the transaction may be rejected",
                        format_bytes(writeset),
                        format_bytes(max)
                    ));
                }
            }
            if let Some(paused) = galera.flow_control_paused {
                if paused > 0.1 {
                    cluster_warnings.push(format!(
                        "cluster flow control already pauses {:.0}% of the time; \
                         extra load will make it worse",
                        paused * 100.0
                    ));
                }
            }
        }
        Topology::GroupReplication(group) => {
            if let (Some(writeset), Some(limit)) = (writeset_bytes, group.transaction_size_limit) {
                if limit > 0
                    && writeset as f64 >= input.options.writeset_warn_ratio * limit as f64
                {
                    risk = risk.escalate(Risk::Dangerous);
                    cluster_warnings.push(format!(
                        "estimated write-set ({}) approaches \
                         group_replication_transaction_size_limit ({}); \
                         the transaction will be rolled back if it exceeds it",
                        format_bytes(writeset),
                        format_bytes(limit)
                    ));
                }
            }
            if group.single_primary
                && group
                    .member_role
                    .as_deref()
                    .is_some_and(|r| !r.eq_ignore_ascii_case("PRIMARY"))
            {
                cluster_warnings.push(
                    "this member is a secondary; run the statement on the primary".to_string(),
                );
            }
        }
        _ => {}
    }
    risk
}

fn collect_ddl_warnings(input: &AnalysisInput, class: &DdlClass, warnings: &mut Vec<String>) {
    let statement = input.statement;
    let metadata = input.metadata;
    let topology = input.topology;

    if topology.read_only || topology.super_read_only {
        warnings.push("the server is read-only; the statement will fail here".to_string());
    }
    if matches!(topology.topology, Topology::AuroraReader) {
        warnings.push("this is an Aurora reader; run the change on the writer".to_string());
    }
    if metadata.has_triggers() {
        warnings.push(format!(
            "table has {} trigger(s); external schema-change tools based on triggers \
             cannot be used before MySQL 8.0 multi-trigger support",
            metadata.triggers.len()
        ));
    }
    if class.rebuilds_table && !metadata.referencing_foreign_keys.is_empty() {
        warnings.push(format!(
            "{} table(s) declare foreign keys against this one; a rebuild takes \
             metadata locks that can stall them",
            metadata.referencing_foreign_keys.len()
        ));
    }
    if matches!(
        statement.operation,
        OperationType::DropColumn
            | OperationType::DropPartition
            | OperationType::TruncatePartition
    ) {
        warnings.push("this change discards data; make sure a backup exists".to_string());
    }
    if statement.operation == OperationType::AddFulltextIndex {
        warnings.push(
            "the first FULLTEXT index on a table may force a rebuild to add the hidden \
             FTS_DOC_ID column"
                .to_string(),
        );
    }
    if !metadata.is_innodb() && !metadata.engine.is_empty() {
        warnings.push(format!(
            "table engine is {}; online DDL guarantees apply to InnoDB only",
            metadata.engine
        ));
    }
    if let Topology::AsyncReplica(detail) | Topology::SemiSyncReplica(detail) =
        &topology.topology
    {
        if detail.is_primary && class.rebuilds_table {
            warnings.push(
                "the rebuild replays on every replica and will lag them for its duration"
                    .to_string(),
            );
        }
        if let Some(lag) = detail.lag_seconds {
            if lag > 0 {
                warnings.push(format!("replication is already {lag}s behind"));
            }
        }
    }
}

/// gh-ost first: binlog-replay based, pausable, no triggers on the source
/// table. pt-online-schema-change as the alternative where binlog row
/// access is not available.
fn ddl_external_method(
    statement: &ParsedStatement,
    metadata: &TableMetadata,
) -> (
    ExecutionMethod,
    Option<ExecutionMethod>,
    Option<String>,
    String,
) {
    let tail = alter_clause_tail(&statement.raw_text).unwrap_or_else(|| statement.raw_text.clone());
    let command = format!(
        "gh-ost --database={} --table={} --alter=\"{}\" --assume-rbr \
         --chunk-size=1000 --max-load=Threads_running=25 --execute",
        metadata.database, metadata.name, tail
    );
    let rationale = format!(
        "gh-ost builds a shadow table and replays changes from the binlog, so the \
         original table stays fully available; pt-online-schema-change does the same \
         with triggers and works without binlog row access. Either avoids the blocking \
         native path. pt-osc equivalent: pt-online-schema-change --alter \"{}\" \
         D={},t={} --execute",
        tail, metadata.database, metadata.name
    );
    (
        ExecutionMethod::GhOst,
        Some(ExecutionMethod::PtOsc),
        Some(command),
        rationale,
    )
}

fn ddl_native_method(
    statement: &ParsedStatement,
    class: &DdlClass,
) -> (
    ExecutionMethod,
    Option<ExecutionMethod>,
    Option<String>,
    String,
) {
    let raw = &statement.raw_text;
    // Append the expected algorithm and lock as assertions so the server
    // refuses instead of silently degrading.
    let command = if raw.to_lowercase().starts_with("alter table")
        && !raw.to_lowercase().contains("algorithm")
    {
        Some(format!(
            "{raw}, ALGORITHM={}, LOCK={}",
            class.algorithm, class.lock
        ))
    } else {
        Some(raw.clone())
    };
    let rationale = format!(
        "the change applies as {} with {} lock{}; no copy tool is needed",
        class.algorithm,
        class.lock,
        if class.rebuilds_table {
            ", rebuilding the table in place"
        } else {
            ""
        }
    );
    (ExecutionMethod::Native, None, command, rationale)
}

/// Returns the clause list of an ALTER TABLE statement, after the table
/// reference.
fn alter_clause_tail(raw: &str) -> Option<String> {
    let lower = raw.to_lowercase();
    let rest = lower.strip_prefix("alter table")?;
    let offset = raw.len() - rest.len();
    let after_kw = &raw[offset..];

    // Skip leading whitespace, then the table reference (possibly quoted,
    // possibly schema-qualified).
    let mut in_quote = false;
    let mut seen_ident = false;
    for (i, c) in after_kw.char_indices() {
        match c {
            '`' => {
                in_quote = !in_quote;
                seen_ident = true;
            }
            '.' if !in_quote => {}
            c if c.is_whitespace() && !in_quote => {
                if seen_ident {
                    return Some(after_kw[i..].trim().to_string());
                }
            }
            _ => seen_ident = true,
        }
    }
    None
}

// DML analysis

fn analyze_dml(input: &AnalysisInput) -> AnalysisResult {
    let statement = input.statement;
    let metadata = input.metadata;
    let options = input.options;

    let estimate = input.estimate.unwrap_or_else(RowEstimate::unavailable);
    let mut warnings = Vec::new();
    let mut cluster_warnings = Vec::new();
    let mut risk = Risk::Safe;

    if !statement.has_filter {
        risk = risk.escalate(Risk::Dangerous);
        warnings.push(format!(
            "no WHERE clause; the statement touches every row of {}",
            metadata.qualified_name()
        ));
    }
    if !estimate.is_available() {
        warnings.push(
            "could not estimate affected rows; proceeding with a zero estimate".to_string(),
        );
    } else if estimate.source == EstimateSource::TableRows {
        warnings.push(format!(
            "EXPLAIN could not estimate affected rows; using the full table row \
             count (~{}) as an upper bound",
            estimate.rows
        ));
    }

    let affected_percent = estimate.table_percent();
    if let Some(pct) = affected_percent {
        if pct >= options.dml_danger_pct {
            risk = risk.escalate(Risk::Dangerous);
        } else if pct >= options.dml_caution_pct {
            risk = risk.escalate(Risk::Caution);
        }
    }

    // Rough write-set: affected rows times the table's average row size.
    let writeset_bytes = (estimate.rows > 0 && metadata.table_rows > 0).then(|| {
        let avg_row = metadata.data_length / metadata.table_rows.max(1);
        estimate.rows * avg_row.max(1)
    });
    risk = escalate_for_topology(
        input,
        TopologyImpact {
            ddl: false,
            trivial: false,
            writeset_bytes,
        },
        &mut cluster_warnings,
        risk,
    );

    if let Topology::AsyncReplica(detail) | Topology::SemiSyncReplica(detail) =
        &input.topology.topology
    {
        if detail.is_primary {
            warnings.push(
                "large single-transaction DML replays as one unit on replicas and lags them"
                    .to_string(),
            );
        }
    }
    if input.topology.read_only || input.topology.super_read_only {
        warnings.push("the server is read-only; the statement will fail here".to_string());
    }

    let chunked = statement.has_filter
        && affected_percent.is_some_and(|pct| pct >= options.dml_caution_pct);
    let chunks = chunk_count(estimate.rows, options.chunk_size);

    let (method, command, script, rationale) = if chunked {
        let script = chunk::build_script(statement, estimate.rows, options.chunk_size);
        if statement.operation == OperationType::Update {
            warnings.push(
                "chunked UPDATE requires the predicate to exclude already-updated rows, \
                 or the loop will not terminate"
                    .to_string(),
            );
        }
        let rationale = format!(
            "~{} rows ({:.1}% of the table) is too much for one transaction; \
             {} chunks of {} bound lock time and replication lag",
            estimate.rows,
            affected_percent.unwrap_or(0.0),
            chunks,
            options.chunk_size
        );
        (
            ExecutionMethod::ChunkedScript,
            Some(format!("bash {}", script.suggested_path)),
            Some(script),
            rationale,
        )
    } else {
        let rationale = if estimate.is_available() {
            format!(
                "~{} rows is small relative to the table; a single transaction is fine",
                estimate.rows
            )
        } else {
            "no row estimate available; review the predicate before running".to_string()
        };
        (
            ExecutionMethod::Native,
            Some(statement.raw_text.clone()),
            None,
            rationale,
        )
    };

    let recommendation = match method {
        ExecutionMethod::ChunkedScript => format!(
            "run the generated chunked script ({} chunks of {} rows) instead of the raw statement",
            chunks, options.chunk_size
        ),
        _ => "run the statement directly".to_string(),
    };

    AnalysisResult {
        operation: statement.operation.to_string(),
        table: statement.table.clone(),
        class: DdlClass::new(Algorithm::Inplace, LockLevel::None, false),
        per_operation: Vec::new(),
        risk,
        method,
        alternative_method: matches!(method, ExecutionMethod::ChunkedScript)
            .then_some(ExecutionMethod::Native),
        recommendation,
        command,
        rationale,
        warnings,
        cluster_warnings,
        rollback: rollback::plan(statement, metadata),
        disk_estimate: None,
        script,
        retry_wrapper_sql: None,
        dml: Some(DmlImpact {
            estimated_rows: estimate.rows,
            affected_percent,
            estimated_writeset_bytes: writeset_bytes,
            chunk_size: options.chunk_size,
            chunk_count: chunks,
        }),
    }
}

/// Human-readable byte size, binary units.
fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
