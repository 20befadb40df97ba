//! Statement classification module.
//!
//! Turns raw SQL text into a typed operation descriptor so the decision
//! engine can look execution behavior up in its feature matrix without ever
//! touching the original text again.

mod parser;

pub use parser::StatementClassifier;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad statement family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatementKind {
    /// Schema-altering statements.
    Ddl,
    /// Row-altering statements.
    Dml,
    /// Parsed, but not a statement family this tool reasons about.
    Unknown,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ddl => write!(f, "DDL"),
            Self::Dml => write!(f, "DML"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// The closed set of operations the decision engine knows how to rate.
///
/// New variants must be added here first; every `match` over this enum is
/// written without a wildcard arm so the compiler flags the feature matrix,
/// rollback planner, and renderer when the set grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OperationType {
    // Column operations
    AddColumn,
    DropColumn,
    ModifyColumn,
    ChangeColumn,
    RenameColumn,
    SetDefault,
    DropDefault,
    // Index and key operations
    AddIndex,
    DropIndex,
    RenameIndex,
    AddFulltextIndex,
    AddSpatialIndex,
    AddPrimaryKey,
    DropPrimaryKey,
    ReplacePrimaryKey,
    AddForeignKey,
    DropForeignKey,
    /// DROP INDEX + ADD INDEX of the same name fused into one operation.
    ChangeIndexType,
    AddCheck,
    DropCheck,
    // Table-level operations
    RenameTable,
    ChangeEngine,
    ChangeCharset,
    ConvertCharset,
    ChangeRowFormat,
    ChangeAutoIncrement,
    ForceRebuild,
    KeyBlockSize,
    StatsOption,
    TableEncryption,
    OptimizeTable,
    AlterTablespace,
    // Partition operations
    AddPartition,
    DropPartition,
    ReorganizePartition,
    RebuildPartition,
    TruncatePartition,
    /// Compound ALTER with more than one clause and no fusion rule applied.
    MultipleOps,
    /// Rejected downstream by the decision engine.
    CreateTable,
    // DML
    Update,
    Delete,
    /// Rejected downstream by the decision engine.
    Insert,
    /// Rejected downstream by the decision engine.
    LoadData,
    /// Recognized but carries nothing the engine can rate.
    #[default]
    Other,
}

impl OperationType {
    /// Returns true for statement kinds the decision engine refuses to
    /// analyze (bulk loads, inserts, table creation).
    pub fn is_refused(&self) -> bool {
        matches!(self, Self::Insert | Self::LoadData | Self::CreateTable)
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AddColumn => "ADD COLUMN",
            Self::DropColumn => "DROP COLUMN",
            Self::ModifyColumn => "MODIFY COLUMN",
            Self::ChangeColumn => "CHANGE COLUMN",
            Self::RenameColumn => "RENAME COLUMN",
            Self::SetDefault => "SET DEFAULT",
            Self::DropDefault => "DROP DEFAULT",
            Self::AddIndex => "ADD INDEX",
            Self::DropIndex => "DROP INDEX",
            Self::RenameIndex => "RENAME INDEX",
            Self::AddFulltextIndex => "ADD FULLTEXT INDEX",
            Self::AddSpatialIndex => "ADD SPATIAL INDEX",
            Self::AddPrimaryKey => "ADD PRIMARY KEY",
            Self::DropPrimaryKey => "DROP PRIMARY KEY",
            Self::ReplacePrimaryKey => "REPLACE PRIMARY KEY",
            Self::AddForeignKey => "ADD FOREIGN KEY",
            Self::DropForeignKey => "DROP FOREIGN KEY",
            Self::ChangeIndexType => "CHANGE INDEX TYPE",
            Self::AddCheck => "ADD CHECK",
            Self::DropCheck => "DROP CHECK",
            Self::RenameTable => "RENAME TABLE",
            Self::ChangeEngine => "CHANGE ENGINE",
            Self::ChangeCharset => "CHANGE CHARSET",
            Self::ConvertCharset => "CONVERT CHARSET",
            Self::ChangeRowFormat => "CHANGE ROW_FORMAT",
            Self::ChangeAutoIncrement => "CHANGE AUTO_INCREMENT",
            Self::ForceRebuild => "FORCE REBUILD",
            Self::KeyBlockSize => "KEY_BLOCK_SIZE",
            Self::StatsOption => "STATS OPTION",
            Self::TableEncryption => "TABLE ENCRYPTION",
            Self::OptimizeTable => "OPTIMIZE TABLE",
            Self::AlterTablespace => "ALTER TABLESPACE",
            Self::AddPartition => "ADD PARTITION",
            Self::DropPartition => "DROP PARTITION",
            Self::ReorganizePartition => "REORGANIZE PARTITION",
            Self::RebuildPartition => "REBUILD PARTITION",
            Self::TruncatePartition => "TRUNCATE PARTITION",
            Self::MultipleOps => "MULTIPLE OPERATIONS",
            Self::CreateTable => "CREATE TABLE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Insert => "INSERT",
            Self::LoadData => "LOAD DATA",
            Self::Other => "OTHER",
        };
        write!(f, "{name}")
    }
}

/// Nullability change requested by a column clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NullabilityChange {
    /// The clause says nothing about nullability.
    #[default]
    Unspecified,
    /// Explicit `NULL`.
    ToNullable,
    /// Explicit `NOT NULL`.
    ToNotNull,
}

/// Per-clause detail for one comma-separated ALTER clause.
///
/// `new_type` carries only the base type grammar (keyword, length/scale,
/// unsigned/zerofill, enum literals) because it is compared against the
/// server's canonical column-type string. Nullability, defaults, charset,
/// and auto-increment never appear in it.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SubOperation {
    /// What this clause does.
    pub operation: OperationType,
    /// Column the clause targets, if any.
    pub column: Option<String>,
    /// Rename target for CHANGE COLUMN / RENAME COLUMN.
    pub new_column: Option<String>,
    /// Index or constraint name the clause targets, if any.
    pub index_name: Option<String>,
    /// Normalized type string before the change (CHANGE/MODIFY only; filled
    /// by callers that have metadata, not by the classifier).
    pub old_type: Option<String>,
    /// Normalized type string requested by the clause.
    pub new_type: Option<String>,
    /// Nullability requested by the clause.
    pub nullability: NullabilityChange,
    /// True when the clause carries a FIRST/AFTER position hint.
    pub has_position_hint: bool,
    /// True for generated columns.
    pub is_generated: bool,
    /// True for STORED generated columns (false means VIRTUAL).
    pub is_stored_generated: bool,
    /// True when the clause introduces or carries AUTO_INCREMENT.
    pub is_auto_increment: bool,
    /// CHECK expression text, if the clause defines one.
    pub check_expr: Option<String>,
    /// Target engine name for ENGINE= clauses.
    pub engine: Option<String>,
    /// False for assertion clauses (ALGORITHM=/LOCK=) that carry no
    /// schema change of their own.
    pub relevant: bool,
}

impl SubOperation {
    /// Creates a semantically relevant sub-operation of the given type.
    pub fn new(operation: OperationType) -> Self {
        Self {
            operation,
            relevant: true,
            ..Self::default()
        }
    }

    /// Creates an assertion clause (ALGORITHM=/LOCK=) that constrains how
    /// the statement may run but performs no change itself.
    pub fn assertion(operation: OperationType) -> Self {
        Self {
            operation,
            relevant: false,
            ..Self::default()
        }
    }
}

/// Immutable result of classifying one SQL statement.
///
/// The canonical data is `sub_operations`; the top-level accessors derive a
/// convenience view on read and only answer when exactly one semantically
/// relevant sub-operation exists, so the two can never drift apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedStatement {
    /// Statement family.
    pub kind: StatementKind,
    /// Schema name, when the table reference was qualified.
    pub database: Option<String>,
    /// Target table name.
    pub table: Option<String>,
    /// The statement-level operation. For compound ALTERs this is either a
    /// fusion result or `MultipleOps`.
    pub operation: OperationType,
    /// Ordered per-clause detail, one entry per comma-separated clause.
    pub sub_operations: Vec<SubOperation>,
    /// Whether a row-restricting predicate is present (DML only).
    pub has_filter: bool,
    /// Literal text of the filter predicate (DML only).
    pub filter_text: Option<String>,
    /// The trimmed, semicolon-stripped input, preserved for reproducibility.
    pub raw_text: String,
}

impl ParsedStatement {
    /// Returns the single semantically relevant sub-operation, if exactly
    /// one exists. Compound statements must be read via `sub_operations`.
    pub fn single_relevant(&self) -> Option<&SubOperation> {
        let mut relevant = self.sub_operations.iter().filter(|s| s.relevant);
        match (relevant.next(), relevant.next()) {
            (Some(sub), None) => Some(sub),
            _ => None,
        }
    }

    /// Target column of a single-clause statement.
    pub fn column(&self) -> Option<&str> {
        self.single_relevant().and_then(|s| s.column.as_deref())
    }

    /// Target index of a single-clause statement, or the fused index name
    /// of a `ChangeIndexType` statement.
    pub fn index_name(&self) -> Option<&str> {
        if let Some(name) = self.single_relevant().and_then(|s| s.index_name.as_deref()) {
            return Some(name);
        }
        if self.operation == OperationType::ChangeIndexType {
            return self
                .sub_operations
                .iter()
                .find_map(|s| s.index_name.as_deref());
        }
        None
    }

    /// Normalized requested type of a single-clause statement.
    pub fn new_type(&self) -> Option<&str> {
        self.single_relevant().and_then(|s| s.new_type.as_deref())
    }

    /// True when any clause carries AUTO_INCREMENT. Propagated to statement
    /// level because a later clause's classification may depend on it.
    pub fn introduces_auto_increment(&self) -> bool {
        self.sub_operations.iter().any(|s| s.is_auto_increment)
    }

    /// `db.table` display form of the statement target.
    pub fn qualified_table(&self) -> Option<String> {
        let table = self.table.as_deref()?;
        Some(match self.database.as_deref() {
            Some(db) => format!("{db}.{table}"),
            None => table.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stmt_with_subs(subs: Vec<SubOperation>) -> ParsedStatement {
        ParsedStatement {
            kind: StatementKind::Ddl,
            database: None,
            table: Some("t".into()),
            operation: OperationType::MultipleOps,
            sub_operations: subs,
            has_filter: false,
            filter_text: None,
            raw_text: String::new(),
        }
    }

    #[test]
    fn test_single_relevant_ignores_assertions() {
        let mut add = SubOperation::new(OperationType::AddColumn);
        add.column = Some("email".into());
        let lock = SubOperation::assertion(OperationType::Other);
        let stmt = stmt_with_subs(vec![add, lock]);
        assert_eq!(stmt.column(), Some("email"));
    }

    #[test]
    fn test_two_relevant_subs_hide_convenience_view() {
        let mut a = SubOperation::new(OperationType::AddColumn);
        a.column = Some("a".into());
        let mut b = SubOperation::new(OperationType::DropColumn);
        b.column = Some("b".into());
        let stmt = stmt_with_subs(vec![a, b]);
        assert_eq!(stmt.column(), None);
        assert!(stmt.single_relevant().is_none());
    }

    #[test]
    fn test_auto_increment_propagates_to_statement_level() {
        let mut a = SubOperation::new(OperationType::AddColumn);
        a.is_auto_increment = true;
        let b = SubOperation::new(OperationType::AddIndex);
        let stmt = stmt_with_subs(vec![a, b]);
        assert!(stmt.introduces_auto_increment());
    }

    #[test]
    fn test_qualified_table() {
        let mut stmt = stmt_with_subs(vec![]);
        assert_eq!(stmt.qualified_table().as_deref(), Some("t"));
        stmt.database = Some("shop".into());
        assert_eq!(stmt.qualified_table().as_deref(), Some("shop.t"));
    }

    #[test]
    fn test_refused_operations() {
        assert!(OperationType::Insert.is_refused());
        assert!(OperationType::LoadData.is_refused());
        assert!(OperationType::CreateTable.is_refused());
        assert!(!OperationType::Delete.is_refused());
        assert!(!OperationType::AddColumn.is_refused());
    }

    #[test]
    fn test_operation_display() {
        assert_eq!(OperationType::AddColumn.to_string(), "ADD COLUMN");
        assert_eq!(OperationType::ChangeIndexType.to_string(), "CHANGE INDEX TYPE");
        assert_eq!(OperationType::LoadData.to_string(), "LOAD DATA");
    }

    #[test]
    fn test_sub_operation_defaults() {
        let sub = SubOperation::default();
        assert_eq!(sub.operation, OperationType::Other);
        assert!(!sub.relevant);
        let sub = SubOperation::new(OperationType::AddColumn);
        assert_eq!(sub.operation, OperationType::AddColumn);
        assert!(sub.relevant);
    }
}
