//! T-SQL (SQL Server / Azure SQL) dialect.
//!
//! T-SQL differences that matter to the compiler:
//! - Square bracket identifier quoting (`[name]`)
//! - OFFSET FETCH pagination (requires ORDER BY)
//! - N'...' prefix for Unicode strings
//! - `DATETRUNC(grain, x)` (SQL Server 2022+)
//! - No interval type; date arithmetic goes through `DATEADD`
//! - No `IS NOT DISTINCT FROM` before SQL Server 2022

use super::helpers;
use super::SqlDialect;
use crate::sql::token::TokenStream;

/// T-SQL (SQL Server) dialect.
#[derive(Debug, Clone, Copy)]
pub struct TSql;

impl SqlDialect for TSql {
    fn name(&self) -> &'static str {
        "tsql"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_bracket(ident)
    }

    fn quote_string(&self, s: &str) -> String {
        if !s.is_ascii() {
            helpers::quote_string_unicode(s)
        } else {
            helpers::quote_string_single(s)
        }
    }

    fn emit_limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> TokenStream {
        helpers::emit_limit_offset_tsql(limit, offset)
    }

    fn requires_order_by_for_offset(&self) -> bool {
        true
    }

    fn null_safe_eq(&self, left: &str, right: &str) -> String {
        helpers::null_safe_eq_expanded(left, right)
    }

    fn date_trunc(&self, granularity: &str, expr: &str) -> String {
        format!("DATETRUNC({}, {})", granularity, expr)
    }

    fn interval_literal(&self, _amount: i64, _unit: &str) -> Option<String> {
        None
    }

    fn current_date(&self) -> &'static str {
        "CAST(GETDATE() AS DATE)"
    }

    fn remap_function(&self, name: &str) -> Option<&'static str> {
        helpers::remap_function_tsql(name)
    }
}
