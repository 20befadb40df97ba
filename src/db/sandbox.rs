//! Guard rails for statements sent to a live server during analysis.
//!
//! Row estimation runs `EXPLAIN` against the target, which still ships
//! attacker-controllable text to the server. Only read-plannable statement
//! heads are allowed through, and statement stacking is refused outright.

use crate::error::{PreflightError, Result};

/// Statement heads EXPLAIN may be wrapped around.
const ALLOWED_HEADS: &[&str] = &["select", "update", "delete", "with", "("];

/// Wraps a statement in EXPLAIN after verifying it is safe to send.
///
/// Refuses statements containing a semicolon anywhere (stacking) and
/// statements whose first token is not plannable.
pub fn explain_statement(sql: &str) -> Result<String> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(PreflightError::query("refusing to EXPLAIN an empty statement"));
    }
    if trimmed.contains(';') {
        return Err(PreflightError::query(
            "refusing to EXPLAIN a statement containing ';'",
        ));
    }
    let lower = trimmed.to_lowercase();
    let allowed = ALLOWED_HEADS
        .iter()
        .any(|head| lower.starts_with(head));
    if !allowed {
        return Err(PreflightError::query(format!(
            "refusing to EXPLAIN statement head '{}'",
            first_word(trimmed)
        )));
    }
    Ok(format!("EXPLAIN {trimmed}"))
}

fn first_word(sql: &str) -> &str {
    sql.split_whitespace().next().unwrap_or("")
}

/// Quotes an identifier for safe interpolation into generated SQL.
/// Embedded backticks are doubled.
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Quotes a fully qualified table reference.
pub fn quote_table(database: Option<&str>, table: &str) -> String {
    match database {
        Some(db) => format!("{}.{}", quote_identifier(db), quote_identifier(table)),
        None => quote_identifier(table),
    }
}

/// Escapes a string literal for interpolation into generated SQL. Used for
/// information_schema lookups that go through the plain query interface.
pub fn quote_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}
