//! Analysis result model and decision engine.
//!
//! The engine is a pure function over the classifier output, server
//! version, topology, and table metadata. Everything here is an immutable
//! value record built once per invocation; rendering happens elsewhere.

mod chunk;
mod engine;
mod matrix;
mod rollback;

pub use chunk::{chunk_count, ChunkScript};
pub use engine::{analyze, refusal_reason, AnalysisInput, AnalysisOutcome};
pub use matrix::classify_ddl;
pub use rollback::idempotent_wrapper;

use serde::{Deserialize, Serialize};
use std::fmt;

/// How the server applies a schema change, in increasing cost order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Algorithm {
    /// Metadata-only change.
    Instant,
    /// In-place change, possibly with an internal rebuild.
    Inplace,
    /// Full table copy.
    Copy,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instant => write!(f, "INSTANT"),
            Self::Inplace => write!(f, "INPLACE"),
            Self::Copy => write!(f, "COPY"),
        }
    }
}

/// The lock the change holds for its duration, in increasing severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LockLevel {
    /// Concurrent reads and writes permitted.
    None,
    /// Concurrent reads only.
    Shared,
    /// Table blocked entirely.
    Exclusive,
}

impl fmt::Display for LockLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "NONE"),
            Self::Shared => write!(f, "SHARED"),
            Self::Exclusive => write!(f, "EXCLUSIVE"),
        }
    }
}

/// The DDL classification for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DdlClass {
    pub algorithm: Algorithm,
    pub lock: LockLevel,
    pub rebuilds_table: bool,
}

impl DdlClass {
    pub fn new(algorithm: Algorithm, lock: LockLevel, rebuilds_table: bool) -> Self {
        Self {
            algorithm,
            lock,
            rebuilds_table,
        }
    }

    /// Folds two classifications into the least favorable of both. Used
    /// for multi-clause ALTERs, which execute as one unit at the cost of
    /// their most expensive clause.
    pub fn worst_of(self, other: Self) -> Self {
        Self {
            algorithm: self.algorithm.max(other.algorithm),
            lock: self.lock.max(other.lock),
            rebuilds_table: self.rebuilds_table || other.rebuilds_table,
        }
    }

    /// Metadata-only changes with no rebuild are trivial for clusters.
    pub fn is_trivial(&self) -> bool {
        self.algorithm == Algorithm::Instant && !self.rebuilds_table
    }
}

/// Overall risk rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Risk {
    Safe,
    Caution,
    Dangerous,
}

impl Risk {
    /// Raises the rating to at least `floor`, never lowers it.
    pub fn escalate(self, floor: Risk) -> Risk {
        self.max(floor)
    }
}

impl fmt::Display for Risk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Safe => write!(f, "SAFE"),
            Self::Caution => write!(f, "CAUTION"),
            Self::Dangerous => write!(f, "DANGEROUS"),
        }
    }
}

/// How the statement should be executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMethod {
    /// Run the statement directly.
    Native,
    /// Run the generated chunked script instead of the raw DML.
    ChunkedScript,
    /// gh-ost: shadow table with binlog replay.
    GhOst,
    /// pt-online-schema-change: shadow table with triggers.
    PtOsc,
}

impl fmt::Display for ExecutionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => write!(f, "direct execution"),
            Self::ChunkedScript => write!(f, "chunked script"),
            Self::GhOst => write!(f, "gh-ost"),
            Self::PtOsc => write!(f, "pt-online-schema-change"),
        }
    }
}

/// One named rollback strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackAlternative {
    pub label: String,
    pub description: String,
    pub sql: Option<String>,
}

/// The rollback plan: a mechanically derived inverse when one exists,
/// plus notes and ordered alternatives when it does not.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RollbackPlan {
    /// The inverse statement, when mechanically derivable.
    pub sql: Option<String>,
    pub notes: Vec<String>,
    pub alternatives: Vec<RollbackAlternative>,
}

/// Extra disk the change needs while it runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskEstimate {
    pub bytes: u64,
    pub reason: String,
}

/// DML-only impact figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DmlImpact {
    pub estimated_rows: u64,
    /// Share of the table touched, as a percentage, when known.
    pub affected_percent: Option<f64>,
    /// Rough write-set size the change produces on certifying clusters.
    pub estimated_writeset_bytes: Option<u64>,
    pub chunk_size: u64,
    pub chunk_count: u64,
}

/// Tunable policy thresholds. Defaults are conservative; every field can
/// be overridden from the `[analysis]` config table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisOptions {
    /// Rows per transaction in generated chunked scripts.
    pub chunk_size: u64,
    /// Tables at or above this size make Copy operations Dangerous.
    pub large_table_bytes: u64,
    /// Tables at or above this size make any rebuild Dangerous.
    pub huge_table_bytes: u64,
    /// DML touching at least this share of the table is Caution.
    pub dml_caution_pct: f64,
    /// DML touching at least this share of the table is Dangerous.
    pub dml_danger_pct: f64,
    /// Write-sets above this fraction of the cluster limit are Dangerous.
    pub writeset_warn_ratio: f64,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            chunk_size: 10_000,
            large_table_bytes: 1 << 30,
            huge_table_bytes: 20 << 30,
            dml_caution_pct: 10.0,
            dml_danger_pct: 50.0,
            writeset_warn_ratio: 0.8,
        }
    }
}

/// The full analysis for one statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// What the statement was classified as, for display.
    pub operation: String,
    pub table: Option<String>,
    pub class: DdlClass,
    /// Per-clause classifications for multi-op ALTERs, labeled.
    pub per_operation: Vec<(String, DdlClass)>,
    pub risk: Risk,
    pub method: ExecutionMethod,
    pub alternative_method: Option<ExecutionMethod>,
    pub recommendation: String,
    /// Ready-to-run command, when the method is an external tool or a
    /// script.
    pub command: Option<String>,
    pub rationale: String,
    pub warnings: Vec<String>,
    pub cluster_warnings: Vec<String>,
    pub rollback: RollbackPlan,
    pub disk_estimate: Option<DiskEstimate>,
    pub script: Option<ChunkScript>,
    /// Idempotent retry wrapper for mechanically guardable DDL.
    pub retry_wrapper_sql: Option<String>,
    pub dml: Option<DmlImpact>,
}
