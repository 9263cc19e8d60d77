//! Snowflake SQL dialect.
//!
//! Relative dates use `DATEADD(unit, n, x)` rather than interval arithmetic.

use super::helpers;
use super::SqlDialect;

/// Snowflake SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Snowflake;

impl SqlDialect for Snowflake {
    fn name(&self) -> &'static str {
        "snowflake"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn date_add(&self, expr: &str, amount: i64, unit: &str) -> String {
        format!("DATEADD({}, {}, {})", unit.to_lowercase(), amount, expr)
    }

    fn remap_function(&self, name: &str) -> Option<&'static str> {
        helpers::remap_function_snowflake(name)
    }
}
