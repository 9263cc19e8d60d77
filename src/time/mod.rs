//! Time intelligence: period-over-period comparisons and relative dates.
//!
//! A [`TimeComparison`] compares a metric with its own value some periods
//! earlier. The prior value is read with `LAG` over the grouped result
//! ordered by the query's time dimension; the number of rows to look back
//! depends on the grain of that dimension (see [`TimeComparison::lag_offset`]).

pub mod relative;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::semantic::error::{SemanticError, SemanticResult};
use crate::semantic::reference::Granularity;
use crate::sql::dialect::{Dialect, SqlDialect};
use crate::sql::expr::{func, lag_offset, lit_int, nullif, raw_sql, ExprExt, WindowExt, WindowOrderBy};

pub use relative::RelativeDate;

/// Standard comparison periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonType {
    Yoy,
    Mom,
    Wow,
    Dod,
    Qoq,
    PriorPeriod,
}

impl ComparisonType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonType::Yoy => "yoy",
            ComparisonType::Mom => "mom",
            ComparisonType::Wow => "wow",
            ComparisonType::Dod => "dod",
            ComparisonType::Qoq => "qoq",
            ComparisonType::PriorPeriod => "prior_period",
        }
    }

    /// Default look-back interval.
    pub fn default_interval(&self) -> (i64, TimeUnit) {
        match self {
            ComparisonType::Dod => (1, TimeUnit::Day),
            ComparisonType::Wow => (1, TimeUnit::Week),
            ComparisonType::Mom => (1, TimeUnit::Month),
            ComparisonType::Qoq => (1, TimeUnit::Quarter),
            ComparisonType::Yoy => (1, TimeUnit::Year),
            ComparisonType::PriorPeriod => (1, TimeUnit::Day),
        }
    }
}

/// Units for comparison offsets and rolling windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl TimeUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeUnit::Day => "day",
            TimeUnit::Week => "week",
            TimeUnit::Month => "month",
            TimeUnit::Quarter => "quarter",
            TimeUnit::Year => "year",
        }
    }

    /// `(amount, unit)` spelled without quarters, which not every
    /// dialect accepts inside an interval.
    pub fn interval_parts(&self, amount: i64) -> (i64, &'static str) {
        match self {
            TimeUnit::Quarter => (amount * 3, "month"),
            other => (amount, other.as_str()),
        }
    }

    /// Rows of data at `grain` that make up one unit.
    ///
    /// Grains coarser than the unit count as a single row.
    pub fn rows_per_unit(&self, grain: Granularity) -> i64 {
        match (self, grain) {
            (TimeUnit::Day, Granularity::Hour) => 24,
            (TimeUnit::Week, Granularity::Hour) => 168,
            (TimeUnit::Week, Granularity::Day) => 7,
            (TimeUnit::Month, Granularity::Hour) => 720,
            (TimeUnit::Month, Granularity::Day) => 30,
            (TimeUnit::Month, Granularity::Week) => 4,
            (TimeUnit::Quarter, Granularity::Hour) => 2160,
            (TimeUnit::Quarter, Granularity::Day) => 90,
            (TimeUnit::Quarter, Granularity::Week) => 13,
            (TimeUnit::Quarter, Granularity::Month) => 3,
            (TimeUnit::Year, Granularity::Hour) => 8760,
            (TimeUnit::Year, Granularity::Day) => 365,
            (TimeUnit::Year, Granularity::Week) => 52,
            (TimeUnit::Year, Granularity::Month) => 12,
            (TimeUnit::Year, Granularity::Quarter) => 4,
            _ => 1,
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeUnit {
    type Err = SemanticError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unit = s.trim().to_lowercase();
        match unit.trim_end_matches('s') {
            "day" => Ok(TimeUnit::Day),
            "week" => Ok(TimeUnit::Week),
            "month" => Ok(TimeUnit::Month),
            "quarter" => Ok(TimeUnit::Quarter),
            "year" => Ok(TimeUnit::Year),
            _ => Err(SemanticError::InvalidTimeComparison(format!(
                "unknown time unit '{}'",
                s
            ))),
        }
    }
}

/// Parse a window such as `7 days` or `1 month`.
pub fn parse_window(window: &str) -> SemanticResult<(i64, TimeUnit)> {
    let mut parts = window.split_whitespace();
    let (Some(amount), Some(unit), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(SemanticError::InvalidTimeComparison(format!(
            "window '{}' must look like '<amount> <unit>'",
            window
        )));
    };
    let amount: i64 = amount.parse().map_err(|_| {
        SemanticError::InvalidTimeComparison(format!("window amount '{}' is not an integer", amount))
    })?;
    Ok((amount, unit.parse()?))
}

/// How current and prior values are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ComparisonCalculation {
    Difference,
    #[default]
    PercentChange,
    Ratio,
}

impl ComparisonCalculation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonCalculation::Difference => "difference",
            ComparisonCalculation::PercentChange => "percent_change",
            ComparisonCalculation::Ratio => "ratio",
        }
    }
}

impl FromStr for ComparisonCalculation {
    type Err = SemanticError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "difference" => Ok(ComparisonCalculation::Difference),
            "percent_change" => Ok(ComparisonCalculation::PercentChange),
            "ratio" => Ok(ComparisonCalculation::Ratio),
            other => Err(SemanticError::UnknownCalculation(other.to_string())),
        }
    }
}

impl TryFrom<String> for ComparisonCalculation {
    type Error = SemanticError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ComparisonCalculation> for String {
    fn from(calc: ComparisonCalculation) -> Self {
        calc.as_str().to_string()
    }
}

/// A period-over-period comparison of a base metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeComparison {
    #[serde(rename = "type")]
    pub comparison_type: ComparisonType,
    /// Base metric reference (`model.metric` or graph-level name).
    pub metric: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset_unit: Option<TimeUnit>,
    #[serde(default)]
    pub calculation: ComparisonCalculation,
}

impl TimeComparison {
    pub fn new(comparison_type: ComparisonType, metric: impl Into<String>) -> Self {
        Self {
            comparison_type,
            metric: metric.into(),
            offset: None,
            offset_unit: None,
            calculation: ComparisonCalculation::default(),
        }
    }

    /// Custom look-back. A zero offset compares a period with itself and is rejected.
    pub fn with_offset(mut self, offset: i64, unit: TimeUnit) -> SemanticResult<Self> {
        if offset == 0 {
            return Err(SemanticError::InvalidTimeComparison(
                "offset must be non-zero".into(),
            ));
        }
        self.offset = Some(offset);
        self.offset_unit = Some(unit);
        Ok(self)
    }

    pub fn with_calculation(mut self, calculation: ComparisonCalculation) -> Self {
        self.calculation = calculation;
        self
    }

    /// Re-check invariants on a deserialized comparison.
    pub fn validate(&self) -> SemanticResult<()> {
        match (self.offset, self.offset_unit) {
            (Some(0), _) => Err(SemanticError::InvalidTimeComparison(
                "offset must be non-zero".into(),
            )),
            (Some(_), None) => Err(SemanticError::InvalidTimeComparison(
                "offset requires offset_unit".into(),
            )),
            _ => Ok(()),
        }
    }

    /// `(amount, unit)`; a custom offset wins over the type's default.
    pub fn offset_interval(&self) -> (i64, TimeUnit) {
        match (self.offset, self.offset_unit) {
            (Some(amount), Some(unit)) => (amount, unit),
            _ => self.comparison_type.default_interval(),
        }
    }

    /// The offset as an interval literal, or `None` for dialects without one.
    pub fn sql_offset(&self, dialect: Dialect) -> Option<String> {
        let (amount, unit) = self.offset_interval();
        let (amount, unit) = unit.interval_parts(amount);
        dialect.interval_literal(amount, unit)
    }

    /// Rows to look back in a result grouped at `grain`.
    ///
    /// Without a grain the data is assumed monthly for yearly comparisons
    /// and one row per period otherwise.
    pub fn lag_offset(&self, grain: Option<Granularity>) -> i64 {
        let (amount, unit) = self.offset_interval();
        match grain {
            Some(g) => amount * unit.rows_per_unit(g),
            None if unit == TimeUnit::Year => amount * 12,
            None => amount,
        }
    }
}

/// Comparison expression over an already-aggregated metric column.
///
/// The prior value is `LAG(current, lag) OVER (PARTITION BY ... ORDER BY
/// time_dimension)`, partitioned by the other grouped columns so a row is
/// only compared with its own series.
pub fn generate_time_comparison_sql(
    comparison: &TimeComparison,
    current_metric_sql: &str,
    time_dimension_sql: &str,
    partition_by: &[String],
    lag: i64,
    dialect: Dialect,
) -> String {
    let current = raw_sql(current_metric_sql);
    let lagged = if lag == 1 {
        func("LAG", vec![current.clone()])
    } else {
        lag_offset(current.clone(), lag)
    };
    let prior = lagged
        .over()
        .partition_by(partition_by.iter().map(|p| raw_sql(p)).collect())
        .order_by(vec![WindowOrderBy::new(raw_sql(time_dimension_sql))])
        .build();

    let expr = match comparison.calculation {
        ComparisonCalculation::Difference => current.sub(prior).paren(),
        ComparisonCalculation::PercentChange => current
            .sub(prior.clone())
            .paren()
            .div(nullif(prior, lit_int(0)))
            .mul(lit_int(100))
            .paren(),
        ComparisonCalculation::Ratio => current.div(nullif(prior, lit_int(0))).paren(),
    };
    expr.to_sql(dialect)
}
