//! SQL statement classification logic.
//!
//! Uses sqlparser-rs with the MySQL dialect to parse SQL and build a typed
//! operation descriptor. A small set of textual pre-passes covers statement
//! shapes the general grammar cannot represent faithfully (table-maintenance
//! statements, tablespace renames, LOAD DATA, and ALTER clauses such as
//! `ENGINE=` or partition actions); everything else is delegated to the
//! grammar and classified from the syntax tree.

use regex::Regex;
use sqlparser::ast::{
    AlterTableOperation, ColumnOption, DataType, Delete, FromTable, Ident, ObjectName,
    ObjectNamePart, RenameTableNameKind, Statement, TableConstraint, TableFactor, TableObject,
    TableWithJoins,
};
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;

use crate::error::{PreflightError, Result};

use super::{NullabilityChange, OperationType, ParsedStatement, StatementKind, SubOperation};

/// Statement classifier. Owns its dialect and pre-pass patterns; construct
/// once and share by reference.
#[derive(Debug)]
pub struct StatementClassifier {
    dialect: MySqlDialect,
    re_maintenance: Regex,
    re_tablespace: Regex,
    re_load_data: Regex,
    re_alter_table: Regex,
    clause_patterns: Vec<(Regex, ClausePattern)>,
}

/// What a textual ALTER clause pattern classifies to.
#[derive(Debug, Clone, Copy)]
enum ClausePattern {
    Engine,
    RowFormat,
    ConvertCharset,
    DefaultCharset,
    AutoIncrement,
    KeyBlockSize,
    StatsOption,
    Encryption,
    Force,
    RenameIndex,
    DropCheck,
    TableComment,
    Assertion,
    Partition(OperationType),
}

impl Default for StatementClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl StatementClassifier {
    /// Creates a new classifier.
    pub fn new() -> Self {
        let clause_patterns = vec![
            (
                Regex::new(r"(?i)^(ADD)\s+PARTITION\b").unwrap(),
                ClausePattern::Partition(OperationType::AddPartition),
            ),
            (
                Regex::new(r"(?i)^DROP\s+PARTITION\b").unwrap(),
                ClausePattern::Partition(OperationType::DropPartition),
            ),
            (
                Regex::new(r"(?i)^(?:REORGANIZE|COALESCE)\s+PARTITION\b").unwrap(),
                ClausePattern::Partition(OperationType::ReorganizePartition),
            ),
            (
                Regex::new(r"(?i)^REBUILD\s+PARTITION\b").unwrap(),
                ClausePattern::Partition(OperationType::RebuildPartition),
            ),
            (
                Regex::new(r"(?i)^TRUNCATE\s+PARTITION\b").unwrap(),
                ClausePattern::Partition(OperationType::TruncatePartition),
            ),
            (
                Regex::new(r"(?i)^ENGINE\s*=?\s*([A-Za-z0-9_]+)$").unwrap(),
                ClausePattern::Engine,
            ),
            (
                Regex::new(r"(?i)^ROW_FORMAT\s*=?\s*[A-Za-z0-9_]+$").unwrap(),
                ClausePattern::RowFormat,
            ),
            (
                Regex::new(r"(?i)^CONVERT\s+TO\s+(?:CHARACTER\s+SET|CHARSET)\s+\S+").unwrap(),
                ClausePattern::ConvertCharset,
            ),
            (
                Regex::new(r"(?i)^(?:DEFAULT\s+)?(?:CHARACTER\s+SET|CHARSET)\s*=?\s*\S+").unwrap(),
                ClausePattern::DefaultCharset,
            ),
            (
                Regex::new(r"(?i)^AUTO_INCREMENT\s*=?\s*\d+$").unwrap(),
                ClausePattern::AutoIncrement,
            ),
            (
                Regex::new(r"(?i)^KEY_BLOCK_SIZE\s*=?\s*\d+$").unwrap(),
                ClausePattern::KeyBlockSize,
            ),
            (
                Regex::new(r"(?i)^STATS_(?:PERSISTENT|AUTO_RECALC|SAMPLE_PAGES)\s*=?\s*\S+$")
                    .unwrap(),
                ClausePattern::StatsOption,
            ),
            (
                Regex::new(r"(?i)^ENCRYPTION\s*=?\s*'?[YN]'?$").unwrap(),
                ClausePattern::Encryption,
            ),
            (
                Regex::new(r"(?i)^FORCE$").unwrap(),
                ClausePattern::Force,
            ),
            (
                Regex::new(r"(?i)^RENAME\s+INDEX\s+(\S+)\s+TO\s+(\S+)$").unwrap(),
                ClausePattern::RenameIndex,
            ),
            (
                Regex::new(r"(?i)^DROP\s+CHECK\s+(\S+)$").unwrap(),
                ClausePattern::DropCheck,
            ),
            (
                Regex::new(r"(?i)^COMMENT\s*=?\s*'").unwrap(),
                ClausePattern::TableComment,
            ),
            (
                Regex::new(r"(?i)^(?:ALGORITHM|LOCK)\s*=?\s*[A-Za-z]+$").unwrap(),
                ClausePattern::Assertion,
            ),
        ];

        Self {
            dialect: MySqlDialect {},
            re_maintenance: Regex::new(
                r"(?is)^(OPTIMIZE|ANALYZE|REPAIR|CHECK)\s+(?:NO_WRITE_TO_BINLOG\s+|LOCAL\s+)?TABLE\s+(.+)$",
            )
            .unwrap(),
            re_tablespace: Regex::new(r"(?is)^ALTER\s+TABLESPACE\s+(\S+)\s+RENAME\s+TO\s+(\S+)$")
                .unwrap(),
            re_load_data: Regex::new(r"(?is)^LOAD\s+DATA\b.*?\bINTO\s+TABLE\s+([^\s(;]+)").unwrap(),
            re_alter_table: Regex::new(r"(?is)^ALTER\s+TABLE\s+").unwrap(),
            clause_patterns,
        }
    }

    /// Classifies one SQL statement.
    ///
    /// Never panics on arbitrary input. On malformed SQL an error is
    /// returned; a success value is always fully populated.
    pub fn classify(&self, sql: &str) -> Result<ParsedStatement> {
        let raw = strip_terminator(sql);
        if raw.is_empty() {
            return Err(PreflightError::parse("empty statement"));
        }

        // Textual pre-passes for statement shapes the grammar cannot
        // represent faithfully. Anchored at the statement prefix; they
        // bypass the grammar entirely when they match.
        if let Some(caps) = self.re_maintenance.captures(&raw) {
            let op = if caps[1].eq_ignore_ascii_case("OPTIMIZE") {
                OperationType::OptimizeTable
            } else {
                OperationType::Other
            };
            let first_table = caps[2].split(',').next().unwrap_or("").trim();
            let (database, table) = split_table_reference(first_table);
            return Ok(self.build(StatementKind::Ddl, database, table, op, vec![], raw));
        }

        if let Some(caps) = self.re_tablespace.captures(&raw) {
            let mut sub = SubOperation::new(OperationType::AlterTablespace);
            sub.new_column = Some(unquote_identifier(&caps[2]));
            let name = unquote_identifier(&caps[1]);
            return Ok(self.build(
                StatementKind::Ddl,
                None,
                Some(name),
                OperationType::AlterTablespace,
                vec![sub],
                raw,
            ));
        }

        if let Some(caps) = self.re_load_data.captures(&raw) {
            let (database, table) = split_table_reference(&caps[1]);
            return Ok(self.build(
                StatementKind::Dml,
                database,
                table,
                OperationType::LoadData,
                vec![],
                raw,
            ));
        }

        if let Some(m) = self.re_alter_table.find(&raw) {
            return self.classify_alter(&raw, &raw[m.end()..]);
        }

        self.classify_via_grammar(&raw)
    }

    /// Classifies an ALTER TABLE statement: the table reference is scanned
    /// textually, each comma-separated clause is either matched by a clause
    /// pattern or handed back to the grammar, and the per-clause results are
    /// fused into the statement-level operation.
    fn classify_alter(&self, raw: &str, after_table_kw: &str) -> Result<ParsedStatement> {
        let (table_ref, tail) = scan_table_reference(after_table_kw)
            .ok_or_else(|| PreflightError::parse("missing table name after ALTER TABLE"))?;
        let (database, table) = (table_ref.0, table_ref.1);
        let tail = tail.trim();
        if tail.is_empty() {
            return Ok(self.build(
                StatementKind::Ddl,
                database,
                Some(table),
                OperationType::Other,
                vec![],
                raw.to_string(),
            ));
        }

        // Partition actions and clause-list operations are mutually
        // exclusive in the grammar; a partition action classifies the
        // whole statement.
        for (re, pattern) in &self.clause_patterns {
            if let ClausePattern::Partition(op) = pattern {
                if re.is_match(tail) {
                    let sub = SubOperation::new(*op);
                    return Ok(self.build(
                        StatementKind::Ddl,
                        database,
                        Some(table),
                        *op,
                        vec![sub],
                        raw.to_string(),
                    ));
                }
            }
        }

        let clauses = split_top_level(tail);
        let mut slots: Vec<Option<SubOperation>> = Vec::with_capacity(clauses.len());
        let mut grammar_clauses: Vec<(usize, String)> = Vec::new();

        for (i, clause) in clauses.iter().enumerate() {
            match self.classify_textual_clause(clause.trim()) {
                Some(sub) => slots.push(Some(sub)),
                None => {
                    slots.push(None);
                    grammar_clauses.push((i, clause.trim().to_string()));
                }
            }
        }

        if !grammar_clauses.is_empty() {
            let synthetic = format!(
                "ALTER TABLE {} {}",
                quote_table_reference(database.as_deref(), &table),
                grammar_clauses
                    .iter()
                    .map(|(_, c)| c.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            let statements = Parser::parse_sql(&self.dialect, &synthetic)
                .map_err(|e| PreflightError::parse(format!("SQL parse error: {e}")))?;
            let operations = match statements.first() {
                Some(Statement::AlterTable { operations, .. }) => operations.clone(),
                _ => {
                    return Err(PreflightError::parse(
                        "ALTER TABLE did not parse as a table alteration",
                    ))
                }
            };
            let mut converted = operations.iter().map(convert_alter_op);
            for (slot_idx, _) in &grammar_clauses {
                if let Some(sub) = converted.next() {
                    slots[*slot_idx] = Some(sub);
                }
            }
        }

        let sub_operations: Vec<SubOperation> = slots.into_iter().flatten().collect();
        let operation = fuse_operations(&sub_operations);

        Ok(self.build(
            StatementKind::Ddl,
            database,
            Some(table),
            operation,
            sub_operations,
            raw.to_string(),
        ))
    }

    /// Classifies one ALTER clause against the textual clause patterns.
    /// Returns None when the clause should be handed to the grammar.
    fn classify_textual_clause(&self, clause: &str) -> Option<SubOperation> {
        for (re, pattern) in &self.clause_patterns {
            let Some(caps) = re.captures(clause) else {
                continue;
            };
            let sub = match pattern {
                ClausePattern::Partition(op) => SubOperation::new(*op),
                ClausePattern::Engine => {
                    let mut sub = SubOperation::new(OperationType::ChangeEngine);
                    sub.engine = Some(caps[1].to_string());
                    sub
                }
                ClausePattern::RowFormat => SubOperation::new(OperationType::ChangeRowFormat),
                ClausePattern::ConvertCharset => SubOperation::new(OperationType::ConvertCharset),
                ClausePattern::DefaultCharset => SubOperation::new(OperationType::ChangeCharset),
                ClausePattern::AutoIncrement => {
                    SubOperation::new(OperationType::ChangeAutoIncrement)
                }
                ClausePattern::KeyBlockSize => SubOperation::new(OperationType::KeyBlockSize),
                ClausePattern::StatsOption => SubOperation::new(OperationType::StatsOption),
                ClausePattern::Encryption => SubOperation::new(OperationType::TableEncryption),
                ClausePattern::Force => SubOperation::new(OperationType::ForceRebuild),
                ClausePattern::RenameIndex => {
                    let mut sub = SubOperation::new(OperationType::RenameIndex);
                    sub.index_name = Some(unquote_identifier(&caps[1]));
                    sub.new_column = Some(unquote_identifier(&caps[2]));
                    sub
                }
                ClausePattern::DropCheck => {
                    let mut sub = SubOperation::new(OperationType::DropCheck);
                    sub.index_name = Some(unquote_identifier(&caps[1]));
                    sub
                }
                ClausePattern::TableComment => SubOperation::new(OperationType::Other),
                ClausePattern::Assertion => SubOperation::assertion(OperationType::Other),
            };
            return Some(sub);
        }
        None
    }

    /// Classifies non-ALTER statements through the general grammar.
    fn classify_via_grammar(&self, raw: &str) -> Result<ParsedStatement> {
        let statements = Parser::parse_sql(&self.dialect, raw)
            .map_err(|e| PreflightError::parse(format!("SQL parse error: {e}")))?;
        let statement = match statements.len() {
            0 => return Err(PreflightError::parse("empty statement")),
            1 => &statements[0],
            n => {
                return Err(PreflightError::parse(format!(
                    "expected one statement, found {n}; analyze statements individually"
                )))
            }
        };

        let raw = raw.to_string();
        match statement {
            Statement::Update {
                table, selection, ..
            } => {
                let (database, table) = table_from_joins(table);
                let filter = selection.as_ref().map(|e| e.to_string());
                Ok(self.build_dml(database, table, OperationType::Update, filter, raw))
            }
            Statement::Delete(Delete {
                from, selection, ..
            }) => {
                let tables = match from {
                    FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
                };
                let (database, table) = tables
                    .first()
                    .map(table_from_joins)
                    .unwrap_or((None, None));
                let filter = selection.as_ref().map(|e| e.to_string());
                Ok(self.build_dml(database, table, OperationType::Delete, filter, raw))
            }
            Statement::Insert(insert) => {
                let (database, table) = match &insert.table {
                    TableObject::TableName(name) => object_name_parts(name),
                    _ => (None, None),
                };
                Ok(self.build(StatementKind::Dml, database, table, OperationType::Insert, vec![], raw))
            }
            Statement::CreateTable(create) => {
                let (database, table) = object_name_parts(&create.name);
                Ok(self.build(
                    StatementKind::Ddl,
                    database,
                    table,
                    OperationType::CreateTable,
                    vec![],
                    raw,
                ))
            }
            Statement::RenameTable(renames) => {
                let mut subs = Vec::new();
                let mut target = (None, None);
                for rename in renames {
                    let (db, tbl) = object_name_parts(&rename.old_name);
                    let (_, new_tbl) = object_name_parts(&rename.new_name);
                    if target.1.is_none() {
                        target = (db, tbl.clone());
                    }
                    let mut sub = SubOperation::new(OperationType::RenameTable);
                    sub.column = tbl;
                    sub.new_column = new_tbl;
                    subs.push(sub);
                }
                Ok(self.build(
                    StatementKind::Ddl,
                    target.0,
                    target.1,
                    OperationType::RenameTable,
                    subs,
                    raw,
                ))
            }
            _ => Ok(self.build(
                StatementKind::Unknown,
                None,
                None,
                OperationType::Other,
                vec![],
                raw,
            )),
        }
    }

    fn build(
        &self,
        kind: StatementKind,
        database: Option<String>,
        table: Option<String>,
        operation: OperationType,
        sub_operations: Vec<SubOperation>,
        raw_text: String,
    ) -> ParsedStatement {
        ParsedStatement {
            kind,
            database,
            table,
            operation,
            sub_operations,
            has_filter: false,
            filter_text: None,
            raw_text,
        }
    }

    fn build_dml(
        &self,
        database: Option<String>,
        table: Option<String>,
        operation: OperationType,
        filter: Option<String>,
        raw_text: String,
    ) -> ParsedStatement {
        ParsedStatement {
            kind: StatementKind::Dml,
            database,
            table,
            operation,
            sub_operations: vec![],
            has_filter: filter.is_some(),
            filter_text: filter,
            raw_text,
        }
    }
}

/// Determines the statement-level operation from the clause list, applying
/// the two-clause fusion rules before falling back to `MultipleOps`.
fn fuse_operations(subs: &[SubOperation]) -> OperationType {
    let relevant: Vec<&SubOperation> = subs.iter().filter(|s| s.relevant).collect();
    match relevant.len() {
        0 => OperationType::Other,
        1 => relevant[0].operation,
        2 => {
            // DROP INDEX x + ADD INDEX x collapse to an index-type change.
            let dropped = relevant
                .iter()
                .find(|s| s.operation == OperationType::DropIndex)
                .and_then(|s| s.index_name.as_deref());
            let added = relevant
                .iter()
                .find(|s| s.operation == OperationType::AddIndex)
                .and_then(|s| s.index_name.as_deref());
            if let (Some(d), Some(a)) = (dropped, added) {
                if d.eq_ignore_ascii_case(a) {
                    return OperationType::ChangeIndexType;
                }
            }
            // DROP PRIMARY KEY + ADD PRIMARY KEY collapse to a replacement.
            let drops_pk = relevant
                .iter()
                .any(|s| s.operation == OperationType::DropPrimaryKey);
            let adds_pk = relevant
                .iter()
                .any(|s| s.operation == OperationType::AddPrimaryKey);
            if drops_pk && adds_pk {
                return OperationType::ReplacePrimaryKey;
            }
            OperationType::MultipleOps
        }
        _ => OperationType::MultipleOps,
    }
}

/// Converts one grammar-parsed ALTER operation into a sub-operation.
fn convert_alter_op(op: &AlterTableOperation) -> SubOperation {
    match op {
        AlterTableOperation::AddColumn {
            column_def,
            column_position,
            ..
        } => {
            let mut sub = SubOperation::new(OperationType::AddColumn);
            sub.column = Some(column_def.name.value.clone());
            sub.new_type = Some(normalize_type(&column_def.data_type));
            sub.has_position_hint = column_position.is_some();
            for def in &column_def.options {
                apply_column_option(&mut sub, &def.option);
            }
            sub
        }
        AlterTableOperation::DropColumn { column_names, .. } => {
            let mut sub = SubOperation::new(OperationType::DropColumn);
            sub.column = column_names.first().map(|c| c.value.clone());
            sub
        }
        AlterTableOperation::ModifyColumn {
            col_name,
            data_type,
            options,
            column_position,
        } => {
            let mut sub = SubOperation::new(OperationType::ModifyColumn);
            sub.column = Some(col_name.value.clone());
            sub.new_type = Some(normalize_type(data_type));
            sub.has_position_hint = column_position.is_some();
            for option in options {
                apply_column_option(&mut sub, option);
            }
            sub
        }
        AlterTableOperation::ChangeColumn {
            old_name,
            new_name,
            data_type,
            options,
            column_position,
        } => {
            let mut sub = SubOperation::new(OperationType::ChangeColumn);
            sub.column = Some(old_name.value.clone());
            sub.new_column = Some(new_name.value.clone());
            sub.new_type = Some(normalize_type(data_type));
            sub.has_position_hint = column_position.is_some();
            for option in options {
                apply_column_option(&mut sub, option);
            }
            sub
        }
        AlterTableOperation::RenameColumn {
            old_column_name,
            new_column_name,
        } => {
            let mut sub = SubOperation::new(OperationType::RenameColumn);
            sub.column = Some(old_column_name.value.clone());
            sub.new_column = Some(new_column_name.value.clone());
            sub
        }
        AlterTableOperation::AlterColumn { column_name, op } => {
            use sqlparser::ast::AlterColumnOperation as Aco;
            let mut sub = match op {
                Aco::SetDefault { .. } => SubOperation::new(OperationType::SetDefault),
                Aco::DropDefault => SubOperation::new(OperationType::DropDefault),
                Aco::SetNotNull => {
                    let mut s = SubOperation::new(OperationType::ModifyColumn);
                    s.nullability = NullabilityChange::ToNotNull;
                    s
                }
                Aco::DropNotNull => {
                    let mut s = SubOperation::new(OperationType::ModifyColumn);
                    s.nullability = NullabilityChange::ToNullable;
                    s
                }
                Aco::SetDataType { data_type, .. } => {
                    let mut s = SubOperation::new(OperationType::ModifyColumn);
                    s.new_type = Some(normalize_type(data_type));
                    s
                }
                Aco::AddGenerated { .. } => {
                    let mut s = SubOperation::new(OperationType::ModifyColumn);
                    s.is_generated = true;
                    s
                }
            };
            sub.column = Some(column_name.value.clone());
            sub
        }
        AlterTableOperation::AddConstraint { constraint, .. } => convert_constraint(constraint),
        AlterTableOperation::DropConstraint { name, .. } => {
            // MySQL 8.0.19 DROP CONSTRAINT; the named object is most
            // commonly a check constraint.
            let mut sub = SubOperation::new(OperationType::DropCheck);
            sub.index_name = Some(name.value.clone());
            sub
        }
        AlterTableOperation::DropPrimaryKey { .. } => {
            SubOperation::new(OperationType::DropPrimaryKey)
        }
        AlterTableOperation::DropForeignKey { name, .. } => {
            let mut sub = SubOperation::new(OperationType::DropForeignKey);
            sub.index_name = Some(name.value.clone());
            sub
        }
        AlterTableOperation::DropIndex { name } => {
            let mut sub = SubOperation::new(OperationType::DropIndex);
            sub.index_name = Some(name.value.clone());
            sub
        }
        AlterTableOperation::RenameTable { table_name } => {
            let name = match table_name {
                RenameTableNameKind::To(n) | RenameTableNameKind::As(n) => n,
            };
            let mut sub = SubOperation::new(OperationType::RenameTable);
            sub.new_column = object_name_parts(name).1;
            sub
        }
        AlterTableOperation::AutoIncrement { .. } => {
            SubOperation::new(OperationType::ChangeAutoIncrement)
        }
        AlterTableOperation::Algorithm { .. } | AlterTableOperation::Lock { .. } => {
            SubOperation::assertion(OperationType::Other)
        }
        AlterTableOperation::AddPartitions { .. } => SubOperation::new(OperationType::AddPartition),
        AlterTableOperation::DropPartitions { .. } => {
            SubOperation::new(OperationType::DropPartition)
        }
        _ => SubOperation::new(OperationType::Other),
    }
}

/// Converts an ADD <constraint> clause into a sub-operation.
fn convert_constraint(constraint: &TableConstraint) -> SubOperation {
    match constraint {
        TableConstraint::PrimaryKey {
            name, index_name, ..
        } => {
            let mut sub = SubOperation::new(OperationType::AddPrimaryKey);
            sub.index_name = pick_name(index_name, name);
            sub
        }
        TableConstraint::Unique {
            name, index_name, ..
        } => {
            let mut sub = SubOperation::new(OperationType::AddIndex);
            sub.index_name = pick_name(index_name, name);
            sub
        }
        TableConstraint::Index { name, .. } => {
            let mut sub = SubOperation::new(OperationType::AddIndex);
            sub.index_name = name.as_ref().map(|n| n.value.clone());
            sub
        }
        TableConstraint::FulltextOrSpatial {
            fulltext,
            opt_index_name,
            ..
        } => {
            let mut sub = SubOperation::new(if *fulltext {
                OperationType::AddFulltextIndex
            } else {
                OperationType::AddSpatialIndex
            });
            sub.index_name = opt_index_name.as_ref().map(|n| n.value.clone());
            sub
        }
        TableConstraint::ForeignKey { name, .. } => {
            let mut sub = SubOperation::new(OperationType::AddForeignKey);
            sub.index_name = name.as_ref().map(|n| n.value.clone());
            sub
        }
        TableConstraint::Check { name, expr, .. } => {
            let mut sub = SubOperation::new(OperationType::AddCheck);
            sub.index_name = name.as_ref().map(|n| n.value.clone());
            sub.check_expr = Some(expr.to_string());
            sub
        }
    }
}

fn pick_name(index_name: &Option<Ident>, name: &Option<Ident>) -> Option<String> {
    index_name
        .as_ref()
        .or(name.as_ref())
        .map(|n| n.value.clone())
}

/// Applies one column option to the sub-operation being built. Nullability,
/// defaults, and auto-increment are recorded as flags and must never leak
/// into the `new_type` string.
fn apply_column_option(sub: &mut SubOperation, option: &ColumnOption) {
    match option {
        ColumnOption::NotNull => sub.nullability = NullabilityChange::ToNotNull,
        ColumnOption::Null => sub.nullability = NullabilityChange::ToNullable,
        ColumnOption::Generated {
            generation_expr_mode,
            generated_as,
            ..
        } => {
            sub.is_generated = true;
            sub.is_stored_generated = matches!(
                generation_expr_mode,
                Some(sqlparser::ast::GeneratedExpressionMode::Stored)
            ) || matches!(generated_as, sqlparser::ast::GeneratedAs::ExpStored);
        }
        ColumnOption::Check(expr) => sub.check_expr = Some(expr.to_string()),
        ColumnOption::DialectSpecific(tokens) => {
            let auto_inc = tokens.iter().any(|t| match t {
                Token::Word(w) => w.value.eq_ignore_ascii_case("AUTO_INCREMENT"),
                _ => false,
            });
            if auto_inc {
                sub.is_auto_increment = true;
            }
        }
        _ => {}
    }
}

/// Normalizes a parsed data type into the server's canonical base-type
/// grammar: everything lowercased except the content of quoted literals
/// (enum/set members keep their case), and no whitespace after a list
/// separator, matching how the server renders `enum(...)` and `decimal(m,d)`.
fn normalize_type(data_type: &DataType) -> String {
    let rendered = data_type.to_string();
    let mut out = String::with_capacity(rendered.len());
    let mut in_literal = false;
    for c in rendered.chars() {
        if c == '\'' {
            in_literal = !in_literal;
            out.push(c);
        } else if in_literal {
            out.push(c);
        } else if c.is_whitespace() && out.ends_with(',') {
            continue;
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}

/// Strips surrounding whitespace and one trailing statement terminator.
fn strip_terminator(sql: &str) -> String {
    let trimmed = sql.trim();
    trimmed.strip_suffix(';').unwrap_or(trimmed).trim().to_string()
}

/// Splits a possibly-qualified, possibly-quoted table reference into
/// (database, table). Only the single `schema.table` separator is supported.
pub fn split_table_reference(text: &str) -> (Option<String>, Option<String>) {
    match scan_table_reference(text) {
        Some(((db, table), _)) => (db, Some(table)),
        None => (None, None),
    }
}

/// Scans one table reference off the front of `text`. Returns the parsed
/// (database, table) pair and the remaining text.
fn scan_table_reference(text: &str) -> Option<((Option<String>, String), &str)> {
    let text = text.trim_start();
    let (first, rest) = scan_identifier(text)?;
    let rest_trimmed = rest.trim_start();
    if let Some(after_dot) = rest_trimmed.strip_prefix('.') {
        let (second, rest2) = scan_identifier(after_dot.trim_start())?;
        Some(((Some(first), second), rest2))
    } else {
        Some(((None, first), rest))
    }
}

/// Scans a single identifier: backtick-quoted (with `` doubling) or bare.
fn scan_identifier(text: &str) -> Option<(String, &str)> {
    let mut chars = text.char_indices();
    let (_, first) = chars.next()?;
    if first == '`' {
        let mut value = String::new();
        let mut iter = text[1..].char_indices().peekable();
        while let Some((i, c)) = iter.next() {
            if c == '`' {
                if let Some((_, '`')) = iter.peek() {
                    value.push('`');
                    iter.next();
                } else {
                    let consumed = 1 + i + 1;
                    return Some((value, &text[consumed..]));
                }
            } else {
                value.push(c);
            }
        }
        None
    } else {
        let end = text
            .find(|c: char| c.is_whitespace() || c == '.' || c == ',' || c == '(' || c == ';')
            .unwrap_or(text.len());
        if end == 0 {
            None
        } else {
            Some((text[..end].to_string(), &text[end..]))
        }
    }
}

/// Strips one layer of matched quote characters from an identifier and
/// reverses backtick doubling.
fn unquote_identifier(text: &str) -> String {
    let text = text.trim();
    if text.len() >= 2 && text.starts_with('`') && text.ends_with('`') {
        text[1..text.len() - 1].replace("``", "`")
    } else {
        text.to_string()
    }
}

/// Rebuilds a backtick-quoted table reference for a synthetic statement.
fn quote_table_reference(database: Option<&str>, table: &str) -> String {
    let quote = |s: &str| format!("`{}`", s.replace('`', "``"));
    match database {
        Some(db) => format!("{}.{}", quote(db), quote(table)),
        None => quote(table),
    }
}

/// Splits a clause list on commas that are not nested in parentheses or
/// quoted strings.
fn split_top_level(text: &str) -> Vec<String> {
    let mut clauses = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for c in text.chars() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' | '`' => {
                    quote = Some(c);
                    current.push(c);
                }
                '(' => {
                    depth += 1;
                    current.push(c);
                }
                ')' => {
                    depth = depth.saturating_sub(1);
                    current.push(c);
                }
                ',' if depth == 0 => {
                    clauses.push(current.trim().to_string());
                    current = String::new();
                }
                _ => current.push(c),
            },
        }
    }
    if !current.trim().is_empty() {
        clauses.push(current.trim().to_string());
    }
    clauses
}

/// Extracts (database, table) from the primary relation of a FROM entry,
/// resolving qualified and aliased references.
fn table_from_joins(table: &TableWithJoins) -> (Option<String>, Option<String>) {
    match &table.relation {
        TableFactor::Table { name, .. } => object_name_parts(name),
        _ => (None, None),
    }
}

/// Splits an ObjectName into (database, table).
fn object_name_parts(name: &ObjectName) -> (Option<String>, Option<String>) {
    let idents: Vec<&Ident> = name
        .0
        .iter()
        .filter_map(ObjectNamePart::as_ident)
        .collect();
    match idents.as_slice() {
        [] => (None, None),
        [table] => (None, Some(table.value.clone())),
        [.., db, table] => (Some(db.value.clone()), Some(table.value.clone())),
    }
}
