//! Target table metadata.
//!
//! Loads everything the decision engine needs to know about the table a
//! statement touches: size statistics, column definitions, indexes,
//! foreign keys in both directions, and triggers. All of it comes from
//! information_schema plus SHOW CREATE TABLE, through the client trait so
//! it works against the mock.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::sandbox::{quote_literal, quote_table};
use crate::db::{DatabaseClient, QueryResult};
use crate::error::{PreflightError, Result};

/// A column definition as information_schema reports it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    /// Full type with modifiers, e.g. `varchar(255)` or `int unsigned`.
    pub column_type: String,
    pub is_nullable: bool,
    pub default: Option<String>,
    /// The EXTRA column: `auto_increment`, `VIRTUAL GENERATED`, etc.
    pub extra: String,
}

impl ColumnMeta {
    /// Renders the column back into DDL clause form, used when building
    /// inverse statements.
    pub fn definition_sql(&self) -> String {
        let mut sql = format!("{} {}", super::sandbox::quote_identifier(&self.name), self.column_type);
        if !self.is_nullable {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&render_default(default));
        }
        if self.extra.to_lowercase().contains("auto_increment") {
            sql.push_str(" AUTO_INCREMENT");
        }
        sql
    }

    pub fn is_auto_increment(&self) -> bool {
        self.extra.to_lowercase().contains("auto_increment")
    }
}

/// Defaults that are expressions or keywords must not be quoted.
fn render_default(default: &str) -> String {
    let upper = default.to_uppercase();
    let is_keyword = upper == "CURRENT_TIMESTAMP"
        || upper.starts_with("CURRENT_TIMESTAMP(")
        || upper == "NULL";
    if is_keyword || default.parse::<f64>().is_ok() {
        default.to_string()
    } else {
        quote_literal(default)
    }
}

/// An index, with its member columns in position order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub name: String,
    pub unique: bool,
    pub columns: Vec<String>,
    /// BTREE, FULLTEXT, SPATIAL, or HASH.
    pub index_type: String,
}

impl IndexMeta {
    pub fn is_primary(&self) -> bool {
        self.name.eq_ignore_ascii_case("PRIMARY")
    }
}

/// A foreign key constraint, seen from either side.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyMeta {
    pub name: String,
    /// The table carrying the constraint.
    pub table: String,
    pub columns: Vec<String>,
    pub referenced_table: String,
    pub referenced_columns: Vec<String>,
}

/// A trigger attached to the table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerMeta {
    pub name: String,
    /// INSERT, UPDATE, or DELETE.
    pub event: String,
    /// BEFORE or AFTER.
    pub timing: String,
}

/// Everything known about the target table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub database: String,
    pub name: String,
    pub engine: String,
    pub row_format: String,
    /// The optimizer's row estimate; can be off by a wide margin.
    pub table_rows: u64,
    pub data_length: u64,
    pub index_length: u64,
    pub auto_increment: Option<u64>,
    pub is_partitioned: bool,
    pub columns: Vec<ColumnMeta>,
    pub indexes: Vec<IndexMeta>,
    /// Constraints this table declares on other tables.
    pub foreign_keys: Vec<ForeignKeyMeta>,
    /// Constraints other tables declare against this one.
    pub referencing_foreign_keys: Vec<ForeignKeyMeta>,
    pub triggers: Vec<TriggerMeta>,
    /// Full SHOW CREATE TABLE output, when the grant allows it.
    pub create_table: Option<String>,
}

impl TableMetadata {
    /// Total on-disk footprint of data plus indexes.
    pub fn total_bytes(&self) -> u64 {
        self.data_length + self.index_length
    }

    pub fn is_innodb(&self) -> bool {
        self.engine.eq_ignore_ascii_case("InnoDB")
    }

    pub fn has_triggers(&self) -> bool {
        !self.triggers.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnMeta> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn index(&self, name: &str) -> Option<&IndexMeta> {
        self.indexes
            .iter()
            .find(|i| i.name.eq_ignore_ascii_case(name))
    }

    pub fn has_primary_key(&self) -> bool {
        self.indexes.iter().any(IndexMeta::is_primary)
    }

    /// The fully quoted table reference.
    pub fn qualified_name(&self) -> String {
        quote_table(Some(&self.database), &self.name)
    }
}

/// Loads the full metadata for one table. Fails with a metadata error if
/// the table does not exist; SHOW CREATE TABLE and trigger listing are
/// best-effort since they need broader grants.
pub async fn fetch_table_metadata(
    client: &dyn DatabaseClient,
    database: &str,
    table: &str,
) -> Result<TableMetadata> {
    let db_lit = quote_literal(database);
    let table_lit = quote_literal(table);

    let stats = client
        .execute_query(&format!(
            "SELECT ENGINE, ROW_FORMAT, TABLE_ROWS, DATA_LENGTH, INDEX_LENGTH, \
             AUTO_INCREMENT, CREATE_OPTIONS \
             FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = {db_lit} AND TABLE_NAME = {table_lit}"
        ))
        .await?;
    if stats.is_empty() {
        return Err(PreflightError::metadata(format!(
            "table {database}.{table} does not exist"
        )));
    }

    let create_options = string_at(&stats, 0, "CREATE_OPTIONS").unwrap_or_default();
    let mut metadata = TableMetadata {
        database: database.to_string(),
        name: table.to_string(),
        engine: string_at(&stats, 0, "ENGINE").unwrap_or_default(),
        row_format: string_at(&stats, 0, "ROW_FORMAT").unwrap_or_default(),
        table_rows: u64_at(&stats, 0, "TABLE_ROWS").unwrap_or(0),
        data_length: u64_at(&stats, 0, "DATA_LENGTH").unwrap_or(0),
        index_length: u64_at(&stats, 0, "INDEX_LENGTH").unwrap_or(0),
        auto_increment: u64_at(&stats, 0, "AUTO_INCREMENT"),
        is_partitioned: create_options.to_lowercase().contains("partitioned"),
        ..TableMetadata::default()
    };

    metadata.columns = fetch_columns(client, &db_lit, &table_lit).await?;
    metadata.indexes = fetch_indexes(client, &db_lit, &table_lit).await?;
    metadata.foreign_keys = fetch_foreign_keys(client, &db_lit, &table_lit, Direction::Outbound).await?;
    metadata.referencing_foreign_keys =
        fetch_foreign_keys(client, &db_lit, &table_lit, Direction::Inbound).await?;
    metadata.triggers = fetch_triggers(client, &db_lit, &table_lit).await.unwrap_or_default();
    metadata.create_table = fetch_create_table(client, database, table).await;

    Ok(metadata)
}

async fn fetch_columns(
    client: &dyn DatabaseClient,
    db_lit: &str,
    table_lit: &str,
) -> Result<Vec<ColumnMeta>> {
    let result = client
        .execute_query(&format!(
            "SELECT COLUMN_NAME, COLUMN_TYPE, IS_NULLABLE, COLUMN_DEFAULT, EXTRA \
             FROM information_schema.COLUMNS \
             WHERE TABLE_SCHEMA = {db_lit} AND TABLE_NAME = {table_lit} \
             ORDER BY ORDINAL_POSITION"
        ))
        .await?;

    Ok((0..result.rows.len())
        .map(|i| ColumnMeta {
            name: string_at(&result, i, "COLUMN_NAME").unwrap_or_default(),
            column_type: string_at(&result, i, "COLUMN_TYPE").unwrap_or_default(),
            is_nullable: string_at(&result, i, "IS_NULLABLE")
                .is_some_and(|v| v.eq_ignore_ascii_case("YES")),
            default: string_at(&result, i, "COLUMN_DEFAULT"),
            extra: string_at(&result, i, "EXTRA").unwrap_or_default(),
        })
        .collect())
}

async fn fetch_indexes(
    client: &dyn DatabaseClient,
    db_lit: &str,
    table_lit: &str,
) -> Result<Vec<IndexMeta>> {
    let result = client
        .execute_query(&format!(
            "SELECT INDEX_NAME, NON_UNIQUE, COLUMN_NAME, INDEX_TYPE \
             FROM information_schema.STATISTICS \
             WHERE TABLE_SCHEMA = {db_lit} AND TABLE_NAME = {table_lit} \
             ORDER BY INDEX_NAME, SEQ_IN_INDEX"
        ))
        .await?;

    let mut indexes: Vec<IndexMeta> = Vec::new();
    for i in 0..result.rows.len() {
        let name = string_at(&result, i, "INDEX_NAME").unwrap_or_default();
        let column = string_at(&result, i, "COLUMN_NAME").unwrap_or_default();
        match indexes.iter_mut().find(|idx| idx.name == name) {
            Some(index) => index.columns.push(column),
            None => indexes.push(IndexMeta {
                name,
                unique: u64_at(&result, i, "NON_UNIQUE") == Some(0),
                columns: vec![column],
                index_type: string_at(&result, i, "INDEX_TYPE").unwrap_or_default(),
            }),
        }
    }
    Ok(indexes)
}

enum Direction {
    Outbound,
    Inbound,
}

async fn fetch_foreign_keys(
    client: &dyn DatabaseClient,
    db_lit: &str,
    table_lit: &str,
    direction: Direction,
) -> Result<Vec<ForeignKeyMeta>> {
    let filter = match direction {
        Direction::Outbound => format!(
            "TABLE_SCHEMA = {db_lit} AND TABLE_NAME = {table_lit} \
             AND REFERENCED_TABLE_NAME IS NOT NULL"
        ),
        Direction::Inbound => format!(
            "REFERENCED_TABLE_SCHEMA = {db_lit} AND REFERENCED_TABLE_NAME = {table_lit}"
        ),
    };
    let result = client
        .execute_query(&format!(
            "SELECT CONSTRAINT_NAME, TABLE_NAME, COLUMN_NAME, \
             REFERENCED_TABLE_NAME, REFERENCED_COLUMN_NAME \
             FROM information_schema.KEY_COLUMN_USAGE \
             WHERE {filter} \
             ORDER BY CONSTRAINT_NAME, ORDINAL_POSITION"
        ))
        .await?;

    let mut keys: Vec<ForeignKeyMeta> = Vec::new();
    for i in 0..result.rows.len() {
        let name = string_at(&result, i, "CONSTRAINT_NAME").unwrap_or_default();
        let column = string_at(&result, i, "COLUMN_NAME").unwrap_or_default();
        let referenced = string_at(&result, i, "REFERENCED_COLUMN_NAME").unwrap_or_default();
        match keys.iter_mut().find(|k| k.name == name) {
            Some(key) => {
                key.columns.push(column);
                key.referenced_columns.push(referenced);
            }
            None => keys.push(ForeignKeyMeta {
                name,
                table: string_at(&result, i, "TABLE_NAME").unwrap_or_default(),
                columns: vec![column],
                referenced_table: string_at(&result, i, "REFERENCED_TABLE_NAME")
                    .unwrap_or_default(),
                referenced_columns: vec![referenced],
            }),
        }
    }
    Ok(keys)
}

async fn fetch_triggers(
    client: &dyn DatabaseClient,
    db_lit: &str,
    table_lit: &str,
) -> Result<Vec<TriggerMeta>> {
    let result = client
        .execute_query(&format!(
            "SELECT TRIGGER_NAME, EVENT_MANIPULATION, ACTION_TIMING \
             FROM information_schema.TRIGGERS \
             WHERE EVENT_OBJECT_SCHEMA = {db_lit} AND EVENT_OBJECT_TABLE = {table_lit}"
        ))
        .await?;

    Ok((0..result.rows.len())
        .map(|i| TriggerMeta {
            name: string_at(&result, i, "TRIGGER_NAME").unwrap_or_default(),
            event: string_at(&result, i, "EVENT_MANIPULATION").unwrap_or_default(),
            timing: string_at(&result, i, "ACTION_TIMING").unwrap_or_default(),
        })
        .collect())
}

/// SHOW CREATE TABLE needs the SHOW VIEW / SELECT grant combination; a
/// refusal degrades to None rather than failing the analysis.
async fn fetch_create_table(
    client: &dyn DatabaseClient,
    database: &str,
    table: &str,
) -> Option<String> {
    let sql = format!("SHOW CREATE TABLE {}", quote_table(Some(database), table));
    match client.execute_query(&sql).await {
        Ok(result) => string_at(&result, 0, "Create Table"),
        Err(e) => {
            debug!("SHOW CREATE TABLE unavailable: {e}");
            None
        }
    }
}

fn string_at(result: &QueryResult, row: usize, column: &str) -> Option<String> {
    match result.get(row, column) {
        Some(super::Value::Null) | None => None,
        Some(v) => Some(v.to_display_string()),
    }
}

fn u64_at(result: &QueryResult, row: usize, column: &str) -> Option<u64> {
    result.get(row, column).and_then(super::Value::as_u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MockDatabaseClient, Value};

    fn stats_query() -> String {
        "SELECT ENGINE, ROW_FORMAT, TABLE_ROWS, DATA_LENGTH, INDEX_LENGTH, \
         AUTO_INCREMENT, CREATE_OPTIONS \
         FROM information_schema.TABLES \
         WHERE TABLE_SCHEMA = 'shop' AND TABLE_NAME = 'orders'"
            .to_string()
    }

    fn client_with_stats() -> MockDatabaseClient {
        MockDatabaseClient::new().with_rows(
            &stats_query(),
            &[
                "ENGINE",
                "ROW_FORMAT",
                "TABLE_ROWS",
                "DATA_LENGTH",
                "INDEX_LENGTH",
                "AUTO_INCREMENT",
                "CREATE_OPTIONS",
            ],
            vec![vec![
                Value::from("InnoDB"),
                Value::from("Dynamic"),
                Value::Uint(2_000_000),
                Value::Uint(512 * 1024 * 1024),
                Value::Uint(128 * 1024 * 1024),
                Value::Uint(2_000_001),
                Value::from(""),
            ]],
        )
    }

    #[tokio::test]
    async fn test_missing_table_is_a_metadata_error() {
        let client = MockDatabaseClient::new().with_empty(&stats_query());
        let err = fetch_table_metadata(&client, "shop", "orders")
            .await
            .unwrap_err();
        assert_eq!(err.category(), "Metadata Error");
        assert!(err.to_string().contains("does not exist"));
    }

    #[tokio::test]
    async fn test_stats_row_is_parsed() {
        // Column, index, FK, and trigger queries are unscripted; those
        // degrade or error. Script them empty so the happy path runs.
        let client = client_with_stats()
            .with_empty(
                "SELECT COLUMN_NAME, COLUMN_TYPE, IS_NULLABLE, COLUMN_DEFAULT, EXTRA \
                 FROM information_schema.COLUMNS \
                 WHERE TABLE_SCHEMA = 'shop' AND TABLE_NAME = 'orders' \
                 ORDER BY ORDINAL_POSITION",
            )
            .with_empty(
                "SELECT INDEX_NAME, NON_UNIQUE, COLUMN_NAME, INDEX_TYPE \
                 FROM information_schema.STATISTICS \
                 WHERE TABLE_SCHEMA = 'shop' AND TABLE_NAME = 'orders' \
                 ORDER BY INDEX_NAME, SEQ_IN_INDEX",
            )
            .with_empty(
                "SELECT CONSTRAINT_NAME, TABLE_NAME, COLUMN_NAME, \
                 REFERENCED_TABLE_NAME, REFERENCED_COLUMN_NAME \
                 FROM information_schema.KEY_COLUMN_USAGE \
                 WHERE TABLE_SCHEMA = 'shop' AND TABLE_NAME = 'orders' \
                 AND REFERENCED_TABLE_NAME IS NOT NULL \
                 ORDER BY CONSTRAINT_NAME, ORDINAL_POSITION",
            )
            .with_empty(
                "SELECT CONSTRAINT_NAME, TABLE_NAME, COLUMN_NAME, \
                 REFERENCED_TABLE_NAME, REFERENCED_COLUMN_NAME \
                 FROM information_schema.KEY_COLUMN_USAGE \
                 WHERE REFERENCED_TABLE_SCHEMA = 'shop' AND REFERENCED_TABLE_NAME = 'orders' \
                 ORDER BY CONSTRAINT_NAME, ORDINAL_POSITION",
            );

        let metadata = fetch_table_metadata(&client, "shop", "orders")
            .await
            .unwrap();
        assert_eq!(metadata.engine, "InnoDB");
        assert_eq!(metadata.table_rows, 2_000_000);
        assert_eq!(metadata.total_bytes(), 640 * 1024 * 1024);
        assert!(metadata.is_innodb());
        assert!(!metadata.is_partitioned);
        // Triggers and SHOW CREATE TABLE were unscripted and degraded.
        assert!(metadata.triggers.is_empty());
        assert_eq!(metadata.create_table, None);
    }

    #[test]
    fn test_column_definition_sql() {
        let col = ColumnMeta {
            name: "status".to_string(),
            column_type: "varchar(20)".to_string(),
            is_nullable: false,
            default: Some("pending".to_string()),
            extra: String::new(),
        };
        assert_eq!(
            col.definition_sql(),
            "`status` varchar(20) NOT NULL DEFAULT 'pending'"
        );

        let ts = ColumnMeta {
            name: "created_at".to_string(),
            column_type: "timestamp".to_string(),
            is_nullable: true,
            default: Some("CURRENT_TIMESTAMP".to_string()),
            extra: String::new(),
        };
        assert_eq!(
            ts.definition_sql(),
            "`created_at` timestamp DEFAULT CURRENT_TIMESTAMP"
        );

        let id = ColumnMeta {
            name: "id".to_string(),
            column_type: "bigint unsigned".to_string(),
            is_nullable: false,
            default: None,
            extra: "auto_increment".to_string(),
        };
        assert_eq!(
            id.definition_sql(),
            "`id` bigint unsigned NOT NULL AUTO_INCREMENT"
        );
    }

    #[test]
    fn test_trigger_queries_degrade() {
        let meta = TableMetadata::default();
        assert!(!meta.has_triggers());
        assert!(!meta.has_primary_key());
    }
}
