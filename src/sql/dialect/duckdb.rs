//! DuckDB SQL dialect.
//!
//! PostgreSQL-compatible rendering: ANSI quoting, `DATE_TRUNC('grain', x)`,
//! quoted interval literals and a native `MEDIAN` aggregate.

use super::helpers;
use super::SqlDialect;

/// DuckDB SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct DuckDb;

impl SqlDialect for DuckDb {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    // Uses default emit_limit_offset, date_trunc and interval_literal

    fn remap_function(&self, name: &str) -> Option<&'static str> {
        helpers::remap_function_duckdb(name)
    }
}
