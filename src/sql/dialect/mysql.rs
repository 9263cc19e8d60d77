//! MySQL SQL dialect.
//!
//! MySQL differences that matter to the compiler:
//! - Backtick identifier quoting (`` `name` ``)
//! - No DATE_TRUNC (each grain is spelled with DATE_FORMAT/DATE arithmetic)
//! - Unquoted interval literals (`INTERVAL 7 DAY`)
//! - No FULL OUTER JOIN; NULL-safe equality is `<=>`
//! - No MEDIAN aggregate

use super::helpers;
use super::SqlDialect;

/// MySQL SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct MySql;

impl SqlDialect for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_backtick(ident)
    }

    fn supports_full_outer_join(&self) -> bool {
        false
    }

    fn null_safe_eq(&self, left: &str, right: &str) -> String {
        format!("{} <=> {}", left, right)
    }

    fn date_trunc(&self, granularity: &str, expr: &str) -> String {
        helpers::date_trunc_mysql(granularity, expr)
    }

    fn interval_literal(&self, amount: i64, unit: &str) -> Option<String> {
        Some(helpers::interval_keyword(amount, unit))
    }

    // Approximation: MySQL 8 has no median aggregate.
    fn median(&self, expr: &str) -> String {
        format!("AVG({})", expr)
    }

    fn remap_function(&self, name: &str) -> Option<&'static str> {
        helpers::remap_function_mysql(name)
    }
}
