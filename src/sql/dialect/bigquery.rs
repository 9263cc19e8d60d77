//! BigQuery SQL dialect.
//!
//! BigQuery puts the grain second (`DATE_TRUNC(x, MONTH)`), uses
//! `TIMESTAMP_TRUNC` for sub-day grains and computes medians with
//! `APPROX_QUANTILES`.

use super::helpers;
use super::SqlDialect;

/// BigQuery SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct BigQuery;

impl SqlDialect for BigQuery {
    fn name(&self) -> &'static str {
        "bigquery"
    }

    fn quote_identifier(&self, ident: &str) -> String {
        helpers::quote_backtick(ident)
    }

    fn date_trunc(&self, granularity: &str, expr: &str) -> String {
        if granularity == "hour" {
            format!("TIMESTAMP_TRUNC({}, HOUR)", expr)
        } else {
            format!("DATE_TRUNC({}, {})", expr, granularity.to_uppercase())
        }
    }

    fn interval_literal(&self, amount: i64, unit: &str) -> Option<String> {
        Some(helpers::interval_keyword(amount, unit))
    }

    fn date_add(&self, expr: &str, amount: i64, unit: &str) -> String {
        let func = if amount < 0 { "DATE_SUB" } else { "DATE_ADD" };
        format!(
            "{}({}, {})",
            func,
            expr,
            helpers::interval_keyword(amount.abs(), unit)
        )
    }

    fn current_date(&self) -> &'static str {
        "CURRENT_DATE()"
    }

    fn median(&self, expr: &str) -> String {
        format!("APPROX_QUANTILES({}, 2)[OFFSET(1)]", expr)
    }

    fn remap_function(&self, name: &str) -> Option<&'static str> {
        helpers::remap_function_bigquery(name)
    }
}
