//! Statement classification integration tests.
//!
//! Exercises the classifier through the public API the way the binary
//! uses it: one classifier instance, many statements.

use pretty_assertions::assert_eq;

use db_preflight::classify::{
    NullabilityChange, OperationType, ParsedStatement, StatementClassifier, StatementKind,
};
use db_preflight::db::sandbox::{explain_statement, quote_identifier};

fn classify(sql: &str) -> ParsedStatement {
    StatementClassifier::new()
        .classify(sql)
        .unwrap_or_else(|e| panic!("classification failed for {sql:?}: {e}"))
}

#[test]
fn test_add_column_basic_shape() {
    let statement = classify("ALTER TABLE users ADD COLUMN email VARCHAR(255)");
    assert_eq!(statement.kind, StatementKind::Ddl);
    assert_eq!(statement.operation, OperationType::AddColumn);
    assert_eq!(statement.table.as_deref(), Some("users"));
    assert_eq!(statement.database, None);
    assert_eq!(statement.column(), Some("email"));
    assert_eq!(statement.new_type(), Some("varchar(255)"));
}

#[test]
fn test_schema_qualified_table() {
    let statement = classify("ALTER TABLE `shop`.`orders` DROP COLUMN legacy_flag");
    assert_eq!(statement.database.as_deref(), Some("shop"));
    assert_eq!(statement.table.as_deref(), Some("orders"));
    assert_eq!(statement.operation, OperationType::DropColumn);
}

#[test]
fn test_drop_add_same_index_fuses_to_change_index_type() {
    let statement = classify("ALTER TABLE t DROP INDEX idx, ADD INDEX idx (email)");
    assert_eq!(statement.operation, OperationType::ChangeIndexType);
    assert_eq!(statement.index_name(), Some("idx"));
}

#[test]
fn test_drop_add_different_indexes_stays_multiple_ops() {
    let statement = classify("ALTER TABLE t DROP INDEX idx_a, ADD INDEX idx_b (email)");
    assert_eq!(statement.operation, OperationType::MultipleOps);
}

#[test]
fn test_change_column_type_excludes_column_options() {
    let statement = classify(
        "ALTER TABLE orders CHANGE COLUMN status order_status VARCHAR(20) NOT NULL DEFAULT 'pending'",
    );
    assert_eq!(statement.operation, OperationType::ChangeColumn);
    assert_eq!(statement.new_type(), Some("varchar(20)"));
    let sub = statement.single_relevant().unwrap();
    assert_eq!(sub.column.as_deref(), Some("status"));
    assert_eq!(sub.new_column.as_deref(), Some("order_status"));
    assert_eq!(sub.nullability, NullabilityChange::ToNotNull);
}

#[test]
fn test_classification_is_deterministic() {
    let sql = "ALTER TABLE t ADD COLUMN a INT FIRST, DROP INDEX i, ENGINE=InnoDB";
    let first = classify(sql);
    for _ in 0..5 {
        assert_eq!(classify(sql), first);
    }
    // A fresh classifier instance agrees with the first.
    assert_eq!(StatementClassifier::new().classify(sql).unwrap(), first);
}

#[test]
fn test_multi_clause_preserves_clause_order() {
    let statement = classify("ALTER TABLE t ENGINE=InnoDB, ADD COLUMN a INT, DROP COLUMN b");
    assert_eq!(statement.operation, OperationType::MultipleOps);
    let operations: Vec<OperationType> = statement
        .sub_operations
        .iter()
        .map(|s| s.operation)
        .collect();
    assert_eq!(
        operations,
        vec![
            OperationType::ChangeEngine,
            OperationType::AddColumn,
            OperationType::DropColumn,
        ]
    );
}

#[test]
fn test_textual_clauses_survive_alongside_grammar_clauses() {
    let statement = classify(
        "ALTER TABLE t CONVERT TO CHARACTER SET utf8mb4, ADD INDEX idx_name (name)",
    );
    assert_eq!(statement.operation, OperationType::MultipleOps);
    assert!(statement
        .sub_operations
        .iter()
        .any(|s| s.operation == OperationType::ConvertCharset));
    assert!(statement
        .sub_operations
        .iter()
        .any(|s| s.operation == OperationType::AddIndex));
}

#[test]
fn test_dml_filter_detection() {
    let filtered = classify("DELETE FROM logs WHERE created_at < '2020-01-01'");
    assert_eq!(filtered.kind, StatementKind::Dml);
    assert_eq!(filtered.operation, OperationType::Delete);
    assert!(filtered.has_filter);
    assert!(filtered
        .filter_text
        .as_deref()
        .is_some_and(|f| f.contains("created_at")));

    let unfiltered = classify("UPDATE orders SET status = 'done'");
    assert_eq!(unfiltered.operation, OperationType::Update);
    assert!(!unfiltered.has_filter);
}

#[test]
fn test_refused_kinds_are_still_classified() {
    let insert = classify("INSERT INTO orders (id) VALUES (1)");
    assert_eq!(insert.operation, OperationType::Insert);
    assert!(insert.operation.is_refused());

    let create = classify("CREATE TABLE t (id INT PRIMARY KEY)");
    assert_eq!(create.operation, OperationType::CreateTable);
    assert_eq!(create.table.as_deref(), Some("t"));
    assert!(create.operation.is_refused());

    let load = classify("LOAD DATA INFILE '/tmp/x.csv' INTO TABLE imports");
    assert_eq!(load.operation, OperationType::LoadData);
    assert_eq!(load.table.as_deref(), Some("imports"));
}

#[test]
fn test_maintenance_statements() {
    let optimize = classify("OPTIMIZE TABLE orders");
    assert_eq!(optimize.operation, OperationType::OptimizeTable);
    assert_eq!(optimize.table.as_deref(), Some("orders"));

    let analyze = classify("ANALYZE TABLE orders");
    assert_eq!(analyze.operation, OperationType::Other);
    assert_eq!(analyze.table.as_deref(), Some("orders"));
}

#[test]
fn test_malformed_sql_is_a_parse_error() {
    let classifier = StatementClassifier::new();
    let err = classifier.classify("ALTER TABLE").unwrap_err();
    assert_eq!(err.category(), "Parse Error");
}

#[test]
fn test_identifier_quoting_round_trips() {
    let cases = ["orders", "weird`name", "with``two", "spa ced", "`"];
    for name in cases {
        let quoted = quote_identifier(name);
        assert!(quoted.starts_with('`') && quoted.ends_with('`'));
        let inner = &quoted[1..quoted.len() - 1];
        assert_eq!(inner.replace("``", "`"), name, "round trip for {name:?}");
    }
}

#[test]
fn test_explain_sandbox_allows_reads_and_rejects_separators() {
    assert!(explain_statement("SELECT * FROM t WHERE id = 1").is_ok());
    assert!(explain_statement("  delete from t where id = 1").is_ok());
    assert!(explain_statement("(SELECT 1) UNION (SELECT 2)").is_ok());

    assert!(explain_statement("SELECT 1; DROP TABLE t").is_err());
    assert!(explain_statement("INSERT INTO t VALUES (1)").is_err());
    assert!(explain_statement("SHOW TABLES").is_err());
}
