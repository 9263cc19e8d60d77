//! Amazon Redshift SQL dialect.
//!
//! Postgres-derived, but keeps a native `MEDIAN` aggregate and lacks
//! `IS NOT DISTINCT FROM`.

use super::helpers;
use super::SqlDialect;

/// Redshift SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct Redshift;

impl SqlDialect for Redshift {
    fn name(&self) -> &'static str {
        "redshift"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_double(ident)
    }

    fn null_safe_eq(&self, left: &str, right: &str) -> String {
        helpers::null_safe_eq_expanded(left, right)
    }

    fn remap_function(&self, name: &str) -> Option<&'static str> {
        helpers::remap_function_postgres(name)
    }
}
