//! SQL dialect definitions and rendering rules.
//!
//! Each dialect implements [`SqlDialect`] for the constructs the compiler
//! emits that differ between warehouses:
//!
//! - Identifier quoting: `"` (ANSI/PG/DuckDB), `` ` `` (MySQL/BigQuery), `[]` (T-SQL)
//! - Pagination: LIMIT/OFFSET vs OFFSET FETCH
//! - Date truncation: `DATE_TRUNC('month', x)` vs `DATE_TRUNC(x, MONTH)` vs `DATETRUNC(month, x)`
//! - Interval arithmetic: `INTERVAL '1 month'` vs `INTERVAL 1 MONTH` vs `DATEADD`
//! - NULL-safe equality: `IS NOT DISTINCT FROM` vs `<=>` vs spelled out
//! - MEDIAN support
//!
//! # Usage
//!
//! ```ignore
//! use tessera::sql::dialect::{Dialect, SqlDialect};
//!
//! let dialect = Dialect::Postgres;
//! let truncated = dialect.date_trunc("month", "\"order_date\"");
//! ```

mod bigquery;
mod databricks;
mod duckdb;
pub mod helpers;
mod mysql;
mod postgres;
mod redshift;
mod snowflake;
mod tsql;

pub use bigquery::BigQuery;
pub use databricks::Databricks;
pub use duckdb::DuckDb;
pub use mysql::MySql;
pub use postgres::Postgres;
pub use redshift::Redshift;
pub use snowflake::Snowflake;
pub use tsql::TSql;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::token::TokenStream;

/// SQL dialect trait - defines how dialect-sensitive constructs are rendered.
///
/// Default implementations follow PostgreSQL/DuckDB syntax.
pub trait SqlDialect: fmt::Debug {
    /// Dialect name for display/logging.
    fn name(&self) -> &'static str;

    // =========================================================================
    // Identifier and Literal Quoting
    // =========================================================================

    /// Quote an identifier (table, column, alias).
    fn quote_identifier(&self, ident: &str) -> String;

    /// Quote a string literal with `''` escaping.
    fn quote_string(&self, s: &str) -> String {
        helpers::quote_string_single(s)
    }

    // =========================================================================
    // Pagination
    // =========================================================================

    /// Emit LIMIT/OFFSET or the dialect's equivalent.
    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        helpers::emit_limit_offset_standard(limit, offset)
    }

    /// Whether pagination needs an ORDER BY clause (T-SQL OFFSET FETCH).
    fn requires_order_by_for_offset(&self) -> bool {
        false
    }

    // =========================================================================
    // Joins
    // =========================================================================

    /// Whether FULL OUTER JOIN is available.
    ///
    /// MySQL has none; per-model aggregates are merged with LEFT JOINs there.
    fn supports_full_outer_join(&self) -> bool {
        true
    }

    /// Equality that also matches two NULLs, for merging grouped results.
    fn null_safe_eq(&self, left: &str, right: &str) -> String {
        format!("{} IS NOT DISTINCT FROM {}", left, right)
    }

    // =========================================================================
    // Date/Time
    // =========================================================================

    /// Truncate `expr` to `granularity` (`hour`, `day`, `week`, `month`, `quarter`, `year`).
    fn date_trunc(&self, granularity: &str, expr: &str) -> String {
        format!("DATE_TRUNC('{}', {})", granularity, expr)
    }

    /// Interval literal for `amount` `unit`s, or `None` when the dialect
    /// has no standalone interval type.
    fn interval_literal(&self, amount: i64, unit: &str) -> Option<String> {
        Some(helpers::interval_quoted(amount, unit))
    }

    /// `expr` shifted by `amount` `unit`s (negative moves backwards).
    fn date_add(&self, expr: &str, amount: i64, unit: &str) -> String {
        helpers::date_add_with_interval(self, expr, amount, unit)
    }

    /// Today's date.
    fn current_date(&self) -> &'static str {
        "CURRENT_DATE"
    }

    // =========================================================================
    // Functions
    // =========================================================================

    /// Median aggregate over `expr`.
    fn median(&self, expr: &str) -> String {
        format!("MEDIAN({})", expr)
    }

    /// Remap a function name for this dialect (matched case-insensitively).
    ///
    /// Returns `Some(new_name)` to rename, `None` to keep the original.
    fn remap_function(&self, name: &str) -> Option<&'static str> {
        let _ = name;
        None
    }
}

/// Supported SQL dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    DuckDb,
    TSql,
    MySql,
    Postgres,
    Snowflake,
    BigQuery,
    Redshift,
    Databricks,
}

impl Dialect {
    /// All dialects, in declaration order.
    pub const ALL: [Dialect; 8] = [
        Dialect::DuckDb,
        Dialect::TSql,
        Dialect::MySql,
        Dialect::Postgres,
        Dialect::Snowflake,
        Dialect::BigQuery,
        Dialect::Redshift,
        Dialect::Databricks,
    ];

    /// Get the dialect implementation.
    pub fn dialect(&self) -> &'static dyn SqlDialect {
        match self {
            Dialect::DuckDb => &DuckDb,
            Dialect::Postgres => &Postgres,
            Dialect::TSql => &TSql,
            Dialect::MySql => &MySql,
            Dialect::Snowflake => &Snowflake,
            Dialect::BigQuery => &BigQuery,
            Dialect::Redshift => &Redshift,
            Dialect::Databricks => &Databricks,
        }
    }
}

// Delegate to the concrete dialects.
impl SqlDialect for Dialect {
    fn name(&self) -> &'static str {
        self.dialect().name()
    }

    fn quote_identifier(&self, ident: &str) -> String {
        self.dialect().quote_identifier(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        self.dialect().quote_string(s)
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        self.dialect().emit_limit_offset(limit, offset)
    }

    fn requires_order_by_for_offset(&self) -> bool {
        self.dialect().requires_order_by_for_offset()
    }

    fn supports_full_outer_join(&self) -> bool {
        self.dialect().supports_full_outer_join()
    }

    fn null_safe_eq(&self, left: &str, right: &str) -> String {
        self.dialect().null_safe_eq(left, right)
    }

    fn date_trunc(&self, granularity: &str, expr: &str) -> String {
        self.dialect().date_trunc(granularity, expr)
    }

    fn interval_literal(&self, amount: i64, unit: &str) -> Option<String> {
        self.dialect().interval_literal(amount, unit)
    }

    fn date_add(&self, expr: &str, amount: i64, unit: &str) -> String {
        self.dialect().date_add(expr, amount, unit)
    }

    fn current_date(&self) -> &'static str {
        self.dialect().current_date()
    }

    fn median(&self, expr: &str) -> String {
        self.dialect().median(expr)
    }

    fn remap_function(&self, name: &str) -> Option<&'static str> {
        self.dialect().remap_function(name)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Error returned when parsing an unknown dialect name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown SQL dialect '{0}'")]
pub struct UnknownDialect(pub String);

impl FromStr for Dialect {
    type Err = UnknownDialect;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "duckdb" => Ok(Dialect::DuckDb),
            "tsql" | "mssql" | "sqlserver" => Ok(Dialect::TSql),
            "mysql" => Ok(Dialect::MySql),
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "snowflake" => Ok(Dialect::Snowflake),
            "bigquery" => Ok(Dialect::BigQuery),
            "redshift" => Ok(Dialect::Redshift),
            "databricks" | "spark" => Ok(Dialect::Databricks),
            other => Err(UnknownDialect(other.to_string())),
        }
    }
}
