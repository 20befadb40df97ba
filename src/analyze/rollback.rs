//! Rollback planning.
//!
//! Derives a mechanically inverse statement where one exists, captures
//! current definitions from table metadata before they are destroyed, and
//! falls back to named narrative strategies where SQL alone cannot undo
//! the change. DML never gets a claimed-correct inverse; it gets options.

use crate::classify::{OperationType, ParsedStatement, StatementKind, SubOperation};
use crate::db::sandbox::{quote_identifier, quote_table};
use crate::db::TableMetadata;

use super::{RollbackAlternative, RollbackPlan};

/// Builds the rollback plan for an analyzed statement.
pub fn plan(statement: &ParsedStatement, metadata: &TableMetadata) -> RollbackPlan {
    if statement.kind == StatementKind::Dml {
        return dml_plan(statement);
    }
    ddl_plan(statement, metadata)
}

fn ddl_plan(statement: &ParsedStatement, metadata: &TableMetadata) -> RollbackPlan {
    let table = metadata.qualified_name();
    let mut plan = RollbackPlan::default();

    match statement.operation {
        OperationType::MultipleOps => {
            // Each clause inverts individually; order is reversed so later
            // clauses are undone first.
            let mut inverse_clauses = Vec::new();
            for sub in statement.sub_operations.iter().rev().filter(|s| s.relevant) {
                match inverse_clause(sub, metadata) {
                    Some(clause) => inverse_clauses.push(clause),
                    None => {
                        plan.notes.push(format!(
                            "no mechanical inverse for the {} clause",
                            sub.operation
                        ));
                    }
                }
            }
            if !inverse_clauses.is_empty() && plan.notes.is_empty() {
                plan.sql = Some(format!("ALTER TABLE {} {}", table, inverse_clauses.join(", ")));
            } else if !inverse_clauses.is_empty() {
                plan.notes.push(format!(
                    "partial inverse available: ALTER TABLE {} {}",
                    table,
                    inverse_clauses.join(", ")
                ));
            }
        }
        OperationType::RenameTable => {
            if let (Some(old), Some(new)) = (
                statement.table.as_deref(),
                statement
                    .sub_operations
                    .first()
                    .and_then(|s| s.new_column.as_deref()),
            ) {
                plan.sql = Some(format!(
                    "RENAME TABLE {} TO {}",
                    quote_table(statement.database.as_deref(), new),
                    quote_table(statement.database.as_deref(), old)
                ));
            }
        }
        OperationType::ChangeEngine => {
            if !metadata.engine.is_empty() {
                plan.sql = Some(format!("ALTER TABLE {} ENGINE={}", table, metadata.engine));
                plan.notes.push(
                    "the reverse engine change is another full table rebuild".to_string(),
                );
            }
        }
        OperationType::OptimizeTable | OperationType::ForceRebuild => {
            plan.notes
                .push("a rebuild changes physical layout only; there is nothing to undo".to_string());
        }
        OperationType::DropPartition | OperationType::TruncatePartition => {
            plan.notes.push(
                "partition data is discarded immediately and cannot be restored by SQL".to_string(),
            );
            plan.alternatives.push(backup_restore());
        }
        _ => match statement
            .single_relevant()
            .or_else(|| statement.sub_operations.first())
        {
            Some(sub) => {
                match inverse_clause(sub, metadata) {
                    Some(clause) => plan.sql = Some(format!("ALTER TABLE {table} {clause}")),
                    None => plan
                        .notes
                        .push("no mechanical inverse for this operation".to_string()),
                }
                add_clause_notes(sub, &mut plan);
            }
            None => plan
                .notes
                .push("no mechanical inverse for this operation".to_string()),
        },
    }

    if plan.sql.is_none() && plan.alternatives.is_empty() {
        plan.alternatives.push(backup_restore());
    }
    plan
}

/// The inverse of one ALTER clause, when it is mechanically derivable.
/// Definitions that the forward statement destroys (dropped columns,
/// replaced indexes) are captured from current metadata.
fn inverse_clause(sub: &SubOperation, metadata: &TableMetadata) -> Option<String> {
    match sub.operation {
        OperationType::AddColumn => sub
            .column
            .as_deref()
            .map(|c| format!("DROP COLUMN {}", quote_identifier(c))),
        OperationType::DropColumn => {
            let column = metadata.column(sub.column.as_deref()?)?;
            Some(format!("ADD COLUMN {}", column.definition_sql()))
        }
        OperationType::ModifyColumn => {
            let column = metadata.column(sub.column.as_deref()?)?;
            Some(format!("MODIFY COLUMN {}", column.definition_sql()))
        }
        OperationType::ChangeColumn => {
            let column = metadata.column(sub.column.as_deref()?)?;
            let new_name = sub.new_column.as_deref()?;
            Some(format!(
                "CHANGE COLUMN {} {}",
                quote_identifier(new_name),
                column.definition_sql()
            ))
        }
        OperationType::RenameColumn => {
            let old = sub.column.as_deref()?;
            let new = sub.new_column.as_deref()?;
            Some(format!(
                "RENAME COLUMN {} TO {}",
                quote_identifier(new),
                quote_identifier(old)
            ))
        }
        OperationType::AddIndex
        | OperationType::AddFulltextIndex
        | OperationType::AddSpatialIndex => sub
            .index_name
            .as_deref()
            .map(|i| format!("DROP INDEX {}", quote_identifier(i))),
        OperationType::DropIndex | OperationType::ChangeIndexType => {
            let index = metadata.index(sub.index_name.as_deref()?)?;
            let unique = if index.unique { "UNIQUE " } else { "" };
            let columns = index
                .columns
                .iter()
                .map(|c| quote_identifier(c))
                .collect::<Vec<_>>()
                .join(", ");
            Some(format!(
                "ADD {}INDEX {} ({})",
                unique,
                quote_identifier(&index.name),
                columns
            ))
        }
        OperationType::RenameIndex => {
            let old = sub.index_name.as_deref()?;
            let new = sub.new_column.as_deref()?;
            Some(format!(
                "RENAME INDEX {} TO {}",
                quote_identifier(new),
                quote_identifier(old)
            ))
        }
        OperationType::AddForeignKey => sub
            .index_name
            .as_deref()
            .map(|n| format!("DROP FOREIGN KEY {}", quote_identifier(n))),
        OperationType::DropForeignKey => {
            let name = sub.index_name.as_deref()?;
            let fk = metadata
                .foreign_keys
                .iter()
                .find(|fk| fk.name.eq_ignore_ascii_case(name))?;
            let columns = fk
                .columns
                .iter()
                .map(|c| quote_identifier(c))
                .collect::<Vec<_>>()
                .join(", ");
            let referenced = fk
                .referenced_columns
                .iter()
                .map(|c| quote_identifier(c))
                .collect::<Vec<_>>()
                .join(", ");
            Some(format!(
                "ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
                quote_identifier(&fk.name),
                columns,
                quote_identifier(&fk.referenced_table),
                referenced
            ))
        }
        OperationType::AddPrimaryKey => Some("DROP PRIMARY KEY".to_string()),
        OperationType::DropPrimaryKey | OperationType::ReplacePrimaryKey => {
            let pk = metadata.indexes.iter().find(|i| i.is_primary())?;
            let columns = pk
                .columns
                .iter()
                .map(|c| quote_identifier(c))
                .collect::<Vec<_>>()
                .join(", ");
            Some(format!("ADD PRIMARY KEY ({columns})"))
        }
        OperationType::AddCheck => sub
            .index_name
            .as_deref()
            .map(|n| format!("DROP CHECK {}", quote_identifier(n))),
        OperationType::DropCheck => None,
        OperationType::SetDefault | OperationType::DropDefault => {
            let column = metadata.column(sub.column.as_deref()?)?;
            match &column.default {
                Some(_) => Some(format!("MODIFY COLUMN {}", column.definition_sql())),
                None => Some(format!(
                    "ALTER COLUMN {} DROP DEFAULT",
                    quote_identifier(&column.name)
                )),
            }
        }
        _ => None,
    }
}

/// Notes that qualify the mechanical inverse.
fn add_clause_notes(sub: &SubOperation, plan: &mut RollbackPlan) {
    match sub.operation {
        OperationType::DropColumn => {
            plan.notes.push(
                "re-adding the column restores the definition, not the data it held".to_string(),
            );
            plan.alternatives.push(backup_restore());
        }
        OperationType::ModifyColumn | OperationType::ChangeColumn => {
            plan.notes.push(
                "values truncated or coerced by the forward change are not restored".to_string(),
            );
        }
        OperationType::DropForeignKey => {
            plan.notes.push(
                "re-adding the constraint validates existing rows and fails on orphans".to_string(),
            );
        }
        _ => {}
    }
}

/// DML rollback is never mechanically derivable from the forward
/// statement alone; offer strategies instead.
fn dml_plan(statement: &ParsedStatement) -> RollbackPlan {
    let mut plan = RollbackPlan {
        sql: None,
        notes: vec![
            "row changes cannot be reversed from the statement text alone".to_string(),
        ],
        alternatives: vec![backup_restore()],
    };

    plan.alternatives.push(RollbackAlternative {
        label: "point-in-time recovery".to_string(),
        description: "replay binlogs up to just before the statement ran, \
                      on a restored copy, then swap"
            .to_string(),
        sql: None,
    });

    if let (Some(table), Some(filter)) = (statement.table.as_deref(), statement.filter_text.as_deref())
    {
        plan.alternatives.push(RollbackAlternative {
            label: "snapshot table".to_string(),
            description: "capture the affected rows before running the statement; \
                          restore from the snapshot if needed"
                .to_string(),
            sql: Some(format!(
                "CREATE TABLE {} AS SELECT * FROM {} WHERE {}",
                quote_identifier(&format!("{table}_preflight_snapshot")),
                quote_identifier(table),
                filter
            )),
        });
    }

    plan
}

fn backup_restore() -> RollbackAlternative {
    RollbackAlternative {
        label: "restore from backup".to_string(),
        description: "restore the table from the most recent backup and replay \
                      subsequent changes"
            .to_string(),
        sql: None,
    }
}

/// Wraps mechanically guardable DDL in an existence check so rerunning a
/// half-applied migration is safe. Only column and plain index add/drop
/// have a cheap information_schema guard.
pub fn idempotent_wrapper(statement: &ParsedStatement, metadata: &TableMetadata) -> Option<String> {
    use crate::db::sandbox::quote_literal;

    let sub = statement.single_relevant()?;
    let db_lit = quote_literal(&metadata.database);
    let table_lit = quote_literal(&metadata.name);

    let (guard, want_absent) = match statement.operation {
        OperationType::AddColumn => (
            format!(
                "SELECT COUNT(*) FROM information_schema.COLUMNS \
                 WHERE TABLE_SCHEMA = {db_lit} AND TABLE_NAME = {table_lit} \
                 AND COLUMN_NAME = {}",
                quote_literal(sub.column.as_deref()?)
            ),
            true,
        ),
        OperationType::DropColumn => (
            format!(
                "SELECT COUNT(*) FROM information_schema.COLUMNS \
                 WHERE TABLE_SCHEMA = {db_lit} AND TABLE_NAME = {table_lit} \
                 AND COLUMN_NAME = {}",
                quote_literal(sub.column.as_deref()?)
            ),
            false,
        ),
        OperationType::AddIndex => (
            format!(
                "SELECT COUNT(*) FROM information_schema.STATISTICS \
                 WHERE TABLE_SCHEMA = {db_lit} AND TABLE_NAME = {table_lit} \
                 AND INDEX_NAME = {}",
                quote_literal(sub.index_name.as_deref()?)
            ),
            true,
        ),
        OperationType::DropIndex => (
            format!(
                "SELECT COUNT(*) FROM information_schema.STATISTICS \
                 WHERE TABLE_SCHEMA = {db_lit} AND TABLE_NAME = {table_lit} \
                 AND INDEX_NAME = {}",
                quote_literal(sub.index_name.as_deref()?)
            ),
            false,
        ),
        _ => return None,
    };

    let condition = if want_absent { "= 0" } else { "> 0" };
    let ddl = statement.raw_text.replace('\'', "''");
    Some(format!(
        "SET @preflight_ddl := IF(({guard}) {condition}, '{ddl}', 'SELECT 1');\n\
         PREPARE preflight_stmt FROM @preflight_ddl;\n\
         EXECUTE preflight_stmt;\n\
         DEALLOCATE PREPARE preflight_stmt;"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::StatementClassifier;
    use crate::db::{ColumnMeta, IndexMeta};
    use pretty_assertions::assert_eq;

    fn classify(sql: &str) -> ParsedStatement {
        StatementClassifier::new().classify(sql).unwrap()
    }

    fn orders_metadata() -> TableMetadata {
        TableMetadata {
            database: "shop".to_string(),
            name: "orders".to_string(),
            engine: "InnoDB".to_string(),
            columns: vec![
                ColumnMeta {
                    name: "id".to_string(),
                    column_type: "bigint unsigned".to_string(),
                    is_nullable: false,
                    default: None,
                    extra: "auto_increment".to_string(),
                },
                ColumnMeta {
                    name: "status".to_string(),
                    column_type: "varchar(20)".to_string(),
                    is_nullable: false,
                    default: Some("pending".to_string()),
                    extra: String::new(),
                },
            ],
            indexes: vec![
                IndexMeta {
                    name: "PRIMARY".to_string(),
                    unique: true,
                    columns: vec!["id".to_string()],
                    index_type: "BTREE".to_string(),
                },
                IndexMeta {
                    name: "idx_status".to_string(),
                    unique: false,
                    columns: vec!["status".to_string()],
                    index_type: "BTREE".to_string(),
                },
            ],
            ..TableMetadata::default()
        }
    }

    #[test]
    fn test_add_column_inverts_to_drop() {
        let plan = plan(
            &classify("ALTER TABLE shop.orders ADD COLUMN note TEXT"),
            &orders_metadata(),
        );
        assert_eq!(
            plan.sql.as_deref(),
            Some("ALTER TABLE `shop`.`orders` DROP COLUMN `note`")
        );
    }

    #[test]
    fn test_drop_column_restores_captured_definition() {
        let result = plan(
            &classify("ALTER TABLE shop.orders DROP COLUMN status"),
            &orders_metadata(),
        );
        assert_eq!(
            result.sql.as_deref(),
            Some(
                "ALTER TABLE `shop`.`orders` ADD COLUMN `status` varchar(20) \
                 NOT NULL DEFAULT 'pending'"
            )
        );
        assert!(result
            .notes
            .iter()
            .any(|n| n.contains("not the data")));
    }

    #[test]
    fn test_drop_index_restores_definition() {
        let result = plan(
            &classify("ALTER TABLE shop.orders DROP INDEX idx_status"),
            &orders_metadata(),
        );
        assert_eq!(
            result.sql.as_deref(),
            Some("ALTER TABLE `shop`.`orders` ADD INDEX `idx_status` (`status`)")
        );
    }

    #[test]
    fn test_rename_table_reverses() {
        let result = plan(
            &classify("RENAME TABLE orders TO orders_old"),
            &orders_metadata(),
        );
        assert_eq!(
            result.sql.as_deref(),
            Some("RENAME TABLE `orders_old` TO `orders`")
        );
    }

    #[test]
    fn test_replace_primary_key_restores_current_key() {
        let result = plan(
            &classify("ALTER TABLE shop.orders DROP PRIMARY KEY, ADD PRIMARY KEY (id, status)"),
            &orders_metadata(),
        );
        // ReplacePrimaryKey has no single relevant sub; the first clause
        // drives the inverse, re-adding the captured current key.
        assert!(result
            .sql
            .as_deref()
            .is_some_and(|sql| sql.contains("ADD PRIMARY KEY (`id`)")));
    }

    #[test]
    fn test_multi_op_inverse_reverses_clause_order() {
        let result = plan(
            &classify("ALTER TABLE shop.orders ADD COLUMN a INT, ADD COLUMN b INT"),
            &orders_metadata(),
        );
        assert_eq!(
            result.sql.as_deref(),
            Some("ALTER TABLE `shop`.`orders` DROP COLUMN `b`, DROP COLUMN `a`")
        );
    }

    #[test]
    fn test_dml_gets_alternatives_not_inverse() {
        let result = plan(
            &classify("DELETE FROM orders WHERE created_at < '2020-01-01'"),
            &orders_metadata(),
        );
        assert_eq!(result.sql, None);
        let labels: Vec<&str> = result
            .alternatives
            .iter()
            .map(|a| a.label.as_str())
            .collect();
        assert!(labels.contains(&"restore from backup"));
        assert!(labels.contains(&"point-in-time recovery"));
        assert!(labels.contains(&"snapshot table"));
    }

    #[test]
    fn test_snapshot_sql_quotes_both_table_names() {
        let result = plan(
            &classify("DELETE FROM `order items` WHERE id < 100"),
            &orders_metadata(),
        );
        let snapshot = result
            .alternatives
            .iter()
            .find(|a| a.label == "snapshot table")
            .and_then(|a| a.sql.as_deref())
            .unwrap();
        assert!(snapshot.contains("CREATE TABLE `order items_preflight_snapshot`"));
        assert!(snapshot.contains("FROM `order items`"));
    }

    #[test]
    fn test_idempotent_wrapper_for_add_column() {
        let wrapper = idempotent_wrapper(
            &classify("ALTER TABLE shop.orders ADD COLUMN note TEXT"),
            &orders_metadata(),
        )
        .unwrap();
        assert!(wrapper.contains("COLUMN_NAME = 'note'"));
        assert!(wrapper.contains("= 0"));
        assert!(wrapper.contains("PREPARE preflight_stmt"));
    }

    #[test]
    fn test_no_wrapper_for_unguardable_ddl() {
        assert_eq!(
            idempotent_wrapper(
                &classify("ALTER TABLE shop.orders ENGINE=InnoDB"),
                &orders_metadata()
            ),
            None
        );
    }
}
