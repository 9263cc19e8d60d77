//! Databricks (Spark SQL) dialect.

use super::helpers;
use super::SqlDialect;

/// Databricks SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Databricks;

impl SqlDialect for Databricks {
    fn name(&self) -> &'static str {
        "databricks"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_backtick(ident)
    }

    fn interval_literal(&self, amount: i64, unit: &str) -> Option<String> {
        Some(helpers::interval_keyword(amount, unit))
    }

    fn remap_function(&self, name: &str) -> Option<&'static str> {
        helpers::remap_function_databricks(name)
    }
}
