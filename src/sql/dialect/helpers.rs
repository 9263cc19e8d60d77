//! Shared helper functions for SQL dialect implementations.
//!
//! Reusable building blocks that dialects compose to implement
//! [`SqlDialect`] with minimal duplication.

use super::super::token::{Token, TokenStream};
use super::SqlDialect;

// =============================================================================
// Identifier Quoting
// =============================================================================

/// Quote identifier with double quotes (ANSI style).
/// Used by: Postgres, DuckDB, Snowflake, Redshift
pub fn quote_double(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote identifier with backticks.
/// Used by: MySQL, BigQuery, Databricks
pub fn quote_backtick(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}

/// Quote identifier with square brackets.
/// Used by: T-SQL
pub fn quote_bracket(ident: &str) -> String {
    format!("[{}]", ident.replace(']', "]]"))
}

// =============================================================================
// String Quoting
// =============================================================================

pub fn quote_string_single(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// N'...' prefix for non-ASCII strings (T-SQL).
pub fn quote_string_unicode(s: &str) -> String {
    format!("N'{}'", s.replace('\'', "''"))
}

// =============================================================================
// Pagination
// =============================================================================

/// `LIMIT n OFFSET m`.
pub fn emit_limit_offset_standard(limit: Option<u64>, offset: Option<u64>) -> TokenStream {
    let mut ts = TokenStream::new();

    if let Some(lim) = limit {
        ts.push(Token::Limit)
            .space()
            .push(Token::LitInt(lim as i64));
    }

    if let Some(off) = offset {
        if limit.is_some() {
            ts.space();
        }
        ts.push(Token::Offset)
            .space()
            .push(Token::LitInt(off as i64));
    }

    ts
}

/// `OFFSET m ROWS FETCH NEXT n ROWS ONLY` (requires ORDER BY).
pub fn emit_limit_offset_tsql(limit: Option<u64>, offset: Option<u64>) -> TokenStream {
    let mut ts = TokenStream::new();

    let off = offset.unwrap_or(0);
    ts.push(Token::Offset)
        .space()
        .push(Token::LitInt(off as i64))
        .space()
        .push(Token::Rows);

    if let Some(lim) = limit {
        ts.space()
            .push(Token::Fetch)
            .space()
            .push(Token::Next)
            .space()
            .push(Token::LitInt(lim as i64))
            .space()
            .push(Token::Rows)
            .space()
            .push(Token::Only);
    }

    ts
}

// =============================================================================
// Intervals and Date Arithmetic
// =============================================================================

/// `INTERVAL '7 days'` (Postgres, DuckDB, Snowflake, Redshift).
pub fn interval_quoted(amount: i64, unit: &str) -> String {
    let plural = if amount.abs() == 1 { "" } else { "s" };
    format!("INTERVAL '{} {}{}'", amount, unit.to_lowercase(), plural)
}

/// `INTERVAL 7 DAY` (MySQL, BigQuery, Databricks).
pub fn interval_keyword(amount: i64, unit: &str) -> String {
    format!("INTERVAL {} {}", amount, unit.to_uppercase())
}

/// `expr + <interval>` / `expr - <interval>` using the dialect's interval literal.
pub fn date_add_with_interval<D: SqlDialect + ?Sized>(
    dialect: &D,
    expr: &str,
    amount: i64,
    unit: &str,
) -> String {
    let op = if amount < 0 { "-" } else { "+" };
    match dialect.interval_literal(amount.abs(), unit) {
        Some(interval) => format!("{} {} {}", expr, op, interval),
        None => format!("DATEADD({}, {}, {})", unit.to_lowercase(), amount, expr),
    }
}

// =============================================================================
// Date Truncation
// =============================================================================

/// MySQL has no DATE_TRUNC; each grain is spelled out.
/// `left = right`, also true when both are NULL, for dialects without
/// `IS NOT DISTINCT FROM`.
pub fn null_safe_eq_expanded(left: &str, right: &str) -> String {
    format!(
        "({l} = {r} OR ({l} IS NULL AND {r} IS NULL))",
        l = left,
        r = right
    )
}

pub fn date_trunc_mysql(granularity: &str, expr: &str) -> String {
    match granularity {
        "hour" => format!("DATE_FORMAT({}, '%Y-%m-%d %H:00:00')", expr),
        "day" => format!("DATE({})", expr),
        "week" => format!("DATE_SUB(DATE({}), INTERVAL WEEKDAY({}) DAY)", expr, expr),
        "month" => format!("DATE_FORMAT({}, '%Y-%m-01')", expr),
        "quarter" => format!(
            "MAKEDATE(YEAR({}), 1) + INTERVAL (QUARTER({}) - 1) QUARTER",
            expr, expr
        ),
        "year" => format!("DATE_FORMAT({}, '%Y-01-01')", expr),
        other => format!("DATE_FORMAT({}, '{}')", expr, other),
    }
}

// =============================================================================
// Function Remapping
// =============================================================================

pub fn remap_function_postgres(name: &str) -> Option<&'static str> {
    match name.to_uppercase().as_str() {
        "NVL" | "IFNULL" | "ISNULL" => Some("COALESCE"),
        "STRFTIME" | "DATE_FORMAT" => Some("TO_CHAR"),
        _ => None,
    }
}

pub fn remap_function_duckdb(name: &str) -> Option<&'static str> {
    match name.to_uppercase().as_str() {
        "NVL" | "IFNULL" | "ISNULL" => Some("COALESCE"),
        "TO_CHAR" | "DATE_FORMAT" => Some("STRFTIME"),
        _ => None,
    }
}

pub fn remap_function_mysql(name: &str) -> Option<&'static str> {
    match name.to_uppercase().as_str() {
        "NVL" | "ISNULL" => Some("IFNULL"),
        "STRFTIME" | "TO_CHAR" => Some("DATE_FORMAT"),
        "SUBSTR" => Some("SUBSTRING"),
        _ => None,
    }
}

pub fn remap_function_tsql(name: &str) -> Option<&'static str> {
    match name.to_uppercase().as_str() {
        "NVL" | "IFNULL" => Some("ISNULL"),
        "LENGTH" => Some("LEN"),
        "SUBSTR" => Some("SUBSTRING"),
        "NOW" => Some("GETDATE"),
        _ => None,
    }
}

pub fn remap_function_snowflake(name: &str) -> Option<&'static str> {
    match name.to_uppercase().as_str() {
        "IFNULL" | "ISNULL" => Some("NVL"),
        "STRFTIME" | "DATE_FORMAT" => Some("TO_CHAR"),
        _ => None,
    }
}

pub fn remap_function_bigquery(name: &str) -> Option<&'static str> {
    match name.to_uppercase().as_str() {
        "NVL" | "ISNULL" => Some("IFNULL"),
        "LENGTH" => Some("CHAR_LENGTH"),
        _ => None,
    }
}

pub fn remap_function_databricks(name: &str) -> Option<&'static str> {
    match name.to_uppercase().as_str() {
        "NVL" | "ISNULL" | "IFNULL" => Some("COALESCE"),
        "TO_CHAR" | "STRFTIME" => Some("DATE_FORMAT"),
        _ => None,
    }
}
