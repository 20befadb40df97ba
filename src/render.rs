//! Text and JSON rendering of analysis outcomes.
//!
//! The JSON renderer is a straight serialization of the result types; the
//! structured data is the contract and the text view is derived from it.

use serde::Serialize;

use crate::analyze::{AnalysisOutcome, AnalysisResult, Risk};
use crate::db::ServerVersion;
use crate::error::Result;
use crate::topology::TopologyInfo;

/// Output format selector, set from the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable report.
    #[default]
    Text,
    /// Full `AnalysisResult` serialization.
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Invalid output format: {s}. Expected: text or json")),
        }
    }
}

/// Everything the renderer shows besides the result itself. Refusals
/// happen before a connection exists, so the server fields are optional.
#[derive(Debug, Serialize)]
pub struct Report<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topology: Option<&'a TopologyInfo>,
    #[serde(flatten)]
    pub outcome: ReportOutcome<'a>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReportOutcome<'a> {
    Analyzed { result: &'a AnalysisResult },
    Refused { reason: &'a str },
}

impl<'a> Report<'a> {
    pub fn new(
        version: &ServerVersion,
        topology: &'a TopologyInfo,
        outcome: &'a AnalysisOutcome,
    ) -> Self {
        let outcome = match outcome {
            AnalysisOutcome::Plan(result) => ReportOutcome::Analyzed { result },
            AnalysisOutcome::Refusal(reason) => ReportOutcome::Refused { reason },
        };
        Self {
            server_version: Some(version.to_string()),
            topology: Some(topology),
            outcome,
        }
    }

    /// A report for a statement refused before any connection was made.
    pub fn refusal(reason: &'a str) -> Self {
        Self {
            server_version: None,
            topology: None,
            outcome: ReportOutcome::Refused { reason },
        }
    }

    pub fn render(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => serde_json::to_string_pretty(self)
                .map_err(|e| crate::error::PreflightError::internal(e.to_string())),
            OutputFormat::Text => Ok(self.render_text()),
        }
    }

    fn render_text(&self) -> String {
        let mut out = String::new();
        if let Some(version) = &self.server_version {
            line(&mut out, format!("server:   {version}"));
        }
        if let Some(topology) = self.topology {
            line(&mut out, format!("topology: {}", topology.topology));
            if let Some(provider) = &topology.cloud_provider {
                line(&mut out, format!("cloud:    {provider}"));
            }
            if topology.read_only || topology.super_read_only {
                line(&mut out, "flags:    read-only".to_string());
            }
            out.push('\n');
        }

        match &self.outcome {
            ReportOutcome::Refused { reason } => {
                line(&mut out, format!("not analyzed: {reason}"));
            }
            ReportOutcome::Analyzed { result } => render_result(&mut out, result),
        }
        out
    }
}

fn render_result(out: &mut String, result: &AnalysisResult) {
    line(out, format!("operation: {}", result.operation));
    if let Some(table) = &result.table {
        line(out, format!("table:     {table}"));
    }
    line(out, format!("risk:      {} {}", risk_marker(result.risk), result.risk));
    line(
        out,
        format!(
            "class:     ALGORITHM={}, LOCK={}{}",
            result.class.algorithm,
            result.class.lock,
            if result.class.rebuilds_table {
                ", rebuilds table"
            } else {
                ""
            }
        ),
    );
    if result.per_operation.len() > 1 {
        line(out, "clauses:".to_string());
        for (label, class) in &result.per_operation {
            line(
                out,
                format!("  - {label}: {}/{}", class.algorithm, class.lock),
            );
        }
    }
    line(out, format!("method:    {}", result.method));
    if let Some(alternative) = result.alternative_method {
        line(out, format!("fallback:  {alternative}"));
    }
    out.push('\n');

    line(out, format!("recommendation: {}", result.recommendation));
    line(out, format!("why: {}", result.rationale));
    if let Some(command) = &result.command {
        out.push('\n');
        line(out, "command:".to_string());
        line(out, format!("  {command}"));
    }

    if let Some(dml) = &result.dml {
        out.push('\n');
        line(out, "impact:".to_string());
        line(out, format!("  estimated rows: {}", dml.estimated_rows));
        if let Some(pct) = dml.affected_percent {
            line(out, format!("  share of table: {pct:.1}%"));
        }
        if let Some(bytes) = dml.estimated_writeset_bytes {
            line(out, format!("  estimated write-set: {bytes} bytes"));
        }
        if dml.chunk_count > 0 {
            line(
                out,
                format!(
                    "  chunks: {} of {} rows",
                    dml.chunk_count, dml.chunk_size
                ),
            );
        }
    }

    if let Some(disk) = &result.disk_estimate {
        out.push('\n');
        line(out, format!("disk: ~{} bytes extra ({})", disk.bytes, disk.reason));
    }

    if !result.warnings.is_empty() {
        out.push('\n');
        line(out, "warnings:".to_string());
        for warning in &result.warnings {
            line(out, format!("  ! {warning}"));
        }
    }
    if !result.cluster_warnings.is_empty() {
        out.push('\n');
        line(out, "cluster warnings:".to_string());
        for warning in &result.cluster_warnings {
            line(out, format!("  ! {warning}"));
        }
    }

    out.push('\n');
    line(out, "rollback:".to_string());
    match &result.rollback.sql {
        Some(sql) => line(out, format!("  {sql}")),
        None => line(out, "  no mechanical inverse".to_string()),
    }
    for note in &result.rollback.notes {
        line(out, format!("  note: {note}"));
    }
    for alternative in &result.rollback.alternatives {
        line(
            out,
            format!("  {}: {}", alternative.label, alternative.description),
        );
        if let Some(sql) = &alternative.sql {
            line(out, format!("    {sql}"));
        }
    }

    if let Some(wrapper) = &result.retry_wrapper_sql {
        out.push('\n');
        line(out, "idempotent retry wrapper:".to_string());
        for wrapper_line in wrapper.lines() {
            line(out, format!("  {wrapper_line}"));
        }
    }

    if let Some(script) = &result.script {
        out.push('\n');
        line(
            out,
            format!("chunked script: {}", script.suggested_path),
        );
    }
}

fn risk_marker(risk: Risk) -> &'static str {
    match risk {
        Risk::Safe => "[ok]",
        Risk::Caution => "[!]",
        Risk::Dangerous => "[!!]",
    }
}

fn line(out: &mut String, content: String) {
    out.push_str(&content);
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::{
        Algorithm, AnalysisResult, DdlClass, ExecutionMethod, LockLevel, RollbackPlan,
    };

    fn sample_result() -> AnalysisResult {
        AnalysisResult {
            operation: "ADD COLUMN".to_string(),
            table: Some("orders".to_string()),
            class: DdlClass::new(Algorithm::Instant, LockLevel::None, false),
            per_operation: vec![(
                "ADD COLUMN note".to_string(),
                DdlClass::new(Algorithm::Instant, LockLevel::None, false),
            )],
            risk: Risk::Safe,
            method: ExecutionMethod::Native,
            alternative_method: None,
            recommendation: "run the statement directly".to_string(),
            command: Some("ALTER TABLE orders ADD COLUMN note TEXT".to_string()),
            rationale: "metadata-only change".to_string(),
            warnings: vec![],
            cluster_warnings: vec![],
            rollback: RollbackPlan {
                sql: Some("ALTER TABLE `orders` DROP COLUMN `note`".to_string()),
                ..RollbackPlan::default()
            },
            disk_estimate: None,
            script: None,
            retry_wrapper_sql: None,
            dml: None,
        }
    }

    fn report_for(outcome: &AnalysisOutcome) -> String {
        let version = ServerVersion::parse("8.0.32").unwrap();
        let topology = TopologyInfo::standalone();
        Report::new(&version, &topology, outcome)
            .render(OutputFormat::Text)
            .unwrap()
    }

    #[test]
    fn test_text_render_includes_risk_and_rollback() {
        let outcome = AnalysisOutcome::Plan(Box::new(sample_result()));
        let text = report_for(&outcome);
        assert!(text.contains("risk:      [ok] SAFE"));
        assert!(text.contains("ALGORITHM=INSTANT, LOCK=NONE"));
        assert!(text.contains("DROP COLUMN `note`"));
    }

    #[test]
    fn test_refusal_renders_reason() {
        let outcome = AnalysisOutcome::Refusal("nothing to assess".to_string());
        let text = report_for(&outcome);
        assert!(text.contains("not analyzed: nothing to assess"));
    }

    #[test]
    fn test_preconnection_refusal_omits_server_fields() {
        let report = Report::refusal("INSERT adds rows");
        let text = report.render(OutputFormat::Text).unwrap();
        assert!(!text.contains("server:"));
        assert!(text.contains("not analyzed: INSERT adds rows"));

        let json = report.render(OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["status"], "refused");
        assert!(value.get("server_version").is_none());
    }

    #[test]
    fn test_json_round_trips_status_tag() {
        let version = ServerVersion::parse("8.0.32").unwrap();
        let topology = TopologyInfo::standalone();
        let outcome = AnalysisOutcome::Plan(Box::new(sample_result()));
        let json = Report::new(&version, &topology, &outcome)
            .render(OutputFormat::Json)
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["status"], "analyzed");
        assert_eq!(value["result"]["risk"], "Safe");
        assert_eq!(value["server_version"], "MySQL 8.0.32");
    }
}
