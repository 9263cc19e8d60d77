//! Table calculations: post-processing applied to fetched result rows.
//!
//! Calculations run in declaration order over rows in result order, each
//! appending (or overwriting) one column. Later calculations can read the
//! columns earlier ones produced.
//!
//! ```text
//! rows + columns ──► validate every calculation ──► apply in order ──► rows + columns'
//! ```
//!
//! Configuration problems (a missing field, a malformed formula, an out of
//! range percentile) fail the whole batch before any row is touched. A
//! formula that fails on one row (division by zero, a text cell) yields
//! NULL for that row only.

mod formula;

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use formula::{EvalError, Formula, FormulaError, Num};

/// Errors raised for malformed table calculation configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TableCalcError {
    #[error("{calc_type} calculation '{name}' missing {field}")]
    MissingField {
        name: String,
        calc_type: TableCalculationType,
        field: &'static str,
    },

    #[error("Invalid formula expression in '{name}': {source}")]
    InvalidFormula {
        name: String,
        #[source]
        source: FormulaError,
    },

    #[error("Percentile for '{name}' must be between 0 and 1, got {value}")]
    InvalidPercentile { name: String, value: f64 },

    #[error("Window size for '{name}' must be at least 1")]
    InvalidWindowSize { name: String },

    #[error("Unknown table calculation type: {0}")]
    UnknownType(String),

    #[error("Column '{column}' used by '{name}' is not numeric")]
    NotNumeric { name: String, column: String },
}

/// Supported calculation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableCalculationType {
    Formula,
    PercentOfTotal,
    PercentOfPrevious,
    PercentOfColumnTotal,
    RunningTotal,
    Rank,
    RowNumber,
    Percentile,
    MovingAverage,
}

impl TableCalculationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Formula => "formula",
            Self::PercentOfTotal => "percent_of_total",
            Self::PercentOfPrevious => "percent_of_previous",
            Self::PercentOfColumnTotal => "percent_of_column_total",
            Self::RunningTotal => "running_total",
            Self::Rank => "rank",
            Self::RowNumber => "row_number",
            Self::Percentile => "percentile",
            Self::MovingAverage => "moving_average",
        }
    }
}

impl fmt::Display for TableCalculationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TableCalculationType {
    type Err = TableCalcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let calc_type = match s.trim().to_ascii_lowercase().as_str() {
            "formula" => Self::Formula,
            "percent_of_total" => Self::PercentOfTotal,
            "percent_of_previous" => Self::PercentOfPrevious,
            "percent_of_column_total" => Self::PercentOfColumnTotal,
            "running_total" => Self::RunningTotal,
            "rank" => Self::Rank,
            "row_number" => Self::RowNumber,
            "percentile" => Self::Percentile,
            "moving_average" => Self::MovingAverage,
            _ => return Err(TableCalcError::UnknownType(s.to_string())),
        };
        Ok(calc_type)
    }
}

/// A calculation over query results, named like an output column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableCalculation {
    pub name: String,
    #[serde(rename = "type")]
    pub calc_type: TableCalculationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Formula with `${column}` references.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    /// Column the calculation reads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub partition_by: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_by: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_size: Option<usize>,
    /// Fraction in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentile: Option<f64>,
}

impl TableCalculation {
    pub fn new(name: impl Into<String>, calc_type: TableCalculationType) -> Self {
        Self {
            name: name.into(),
            calc_type,
            description: None,
            expression: None,
            field: None,
            partition_by: vec![],
            order_by: vec![],
            window_size: None,
            percentile: None,
        }
    }

    pub fn formula(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self::new(name, TableCalculationType::Formula).with_expression(expression)
    }

    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_partition_by(mut self, columns: &[&str]) -> Self {
        self.partition_by = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_order_by(mut self, columns: &[&str]) -> Self {
        self.order_by = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = Some(window_size);
        self
    }

    pub fn with_percentile(mut self, percentile: f64) -> Self {
        self.percentile = Some(percentile);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Check the fields this calculation's type requires.
    pub fn validate(&self) -> Result<(), TableCalcError> {
        self.plan().map(|_| ())
    }

    fn missing(&self, field: &'static str) -> TableCalcError {
        TableCalcError::MissingField {
            name: self.name.clone(),
            calc_type: self.calc_type,
            field,
        }
    }

    fn require_field(&self) -> Result<&str, TableCalcError> {
        self.field.as_deref().ok_or_else(|| self.missing("field"))
    }

    fn plan(&self) -> Result<Step<'_>, TableCalcError> {
        use TableCalculationType as T;

        let step = match self.calc_type {
            T::Formula => {
                let expression = self
                    .expression
                    .as_deref()
                    .ok_or_else(|| self.missing("expression"))?;
                let formula =
                    Formula::parse(expression).map_err(|source| TableCalcError::InvalidFormula {
                        name: self.name.clone(),
                        source,
                    })?;
                Step::Formula(formula)
            }
            T::PercentOfTotal => Step::PercentOfTotal(self.require_field()?),
            T::PercentOfPrevious => Step::PercentOfPrevious(self.require_field()?),
            T::PercentOfColumnTotal => Step::PercentOfColumnTotal {
                field: self.require_field()?,
                partition_by: &self.partition_by,
            },
            T::RunningTotal => Step::RunningTotal(self.require_field()?),
            T::Rank => Step::Rank(self.require_field()?),
            T::RowNumber => Step::RowNumber,
            T::MovingAverage => {
                let field = self.require_field()?;
                let window = self.window_size.ok_or_else(|| self.missing("window_size"))?;
                if window == 0 {
                    return Err(TableCalcError::InvalidWindowSize {
                        name: self.name.clone(),
                    });
                }
                Step::MovingAverage { field, window }
            }
            T::Percentile => {
                let field = self.require_field()?;
                let fraction = self
                    .percentile
                    .ok_or_else(|| self.missing("percentile value"))?;
                if !(0.0..=1.0).contains(&fraction) {
                    return Err(TableCalcError::InvalidPercentile {
                        name: self.name.clone(),
                        value: fraction,
                    });
                }
                Step::Percentile { field, fraction }
            }
        };
        Ok(step)
    }
}

/// A result cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Numeric reading of the cell: NULL reads as 0, numeric text is parsed.
    fn number(&self) -> Option<Num> {
        match self {
            Value::Null => Some(Num::Int(0)),
            Value::Int(i) => Some(Num::Int(*i)),
            Value::Float(f) => Some(Num::Float(*f)),
            Value::Text(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .map(Num::Int)
                    .or_else(|_| s.parse::<f64>().map(Num::Float))
                    .ok()
            }
            Value::Bool(_) => None,
        }
    }
}

impl From<Num> for Value {
    fn from(n: Num) -> Self {
        match n {
            Num::Int(i) => Value::Int(i),
            Num::Float(f) => Value::Float(f),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", Num::Float(*x)),
            Value::Text(s) => f.write_str(s),
        }
    }
}

/// A validated calculation, borrowing its configuration.
enum Step<'a> {
    Formula(Formula),
    PercentOfTotal(&'a str),
    PercentOfPrevious(&'a str),
    PercentOfColumnTotal {
        field: &'a str,
        partition_by: &'a [String],
    },
    RunningTotal(&'a str),
    Rank(&'a str),
    RowNumber,
    MovingAverage {
        field: &'a str,
        window: usize,
    },
    Percentile {
        field: &'a str,
        fraction: f64,
    },
}

/// Rows with named columns while calculations run.
struct Frame {
    columns: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<Value>>,
}

impl Frame {
    fn new(columns: Vec<String>, mut rows: Vec<Vec<Value>>) -> Self {
        let width = columns.len();
        for row in &mut rows {
            row.resize(width.max(row.len()), Value::Null);
        }
        let index = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();
        Self {
            columns,
            index,
            rows,
        }
    }

    fn cell(&self, row: usize, column: &str) -> Option<&Value> {
        let i = *self.index.get(column)?;
        self.rows[row].get(i)
    }

    /// Numeric values of `column`, NULL and absent columns reading as 0.
    fn numbers(&self, name: &str, column: &str) -> Result<Vec<Num>, TableCalcError> {
        (0..self.rows.len())
            .map(|row| match self.cell(row, column) {
                None => Ok(Num::Int(0)),
                Some(value) => value.number().ok_or_else(|| TableCalcError::NotNumeric {
                    name: name.to_string(),
                    column: column.to_string(),
                }),
            })
            .collect()
    }

    /// Write `values` into column `name`, adding it when new.
    fn set_column(&mut self, name: &str, values: Vec<Value>) {
        let i = match self.index.get(name) {
            Some(i) => *i,
            None => {
                let i = self.columns.len();
                self.columns.push(name.to_string());
                self.index.insert(name.to_string(), i);
                i
            }
        };
        for (row, value) in self.rows.iter_mut().zip(values) {
            if row.len() <= i {
                row.resize(i + 1, Value::Null);
            }
            row[i] = value;
        }
    }
}

/// Applies a list of calculations to result rows.
pub struct TableCalculationProcessor {
    calculations: Vec<TableCalculation>,
}

impl TableCalculationProcessor {
    pub fn new(calculations: Vec<TableCalculation>) -> Self {
        Self { calculations }
    }

    /// Apply every calculation in order.
    ///
    /// Returns the rows with calculation columns filled in and the column
    /// names with calculation names appended.
    pub fn process(
        &self,
        rows: Vec<Vec<Value>>,
        columns: Vec<String>,
    ) -> Result<(Vec<Vec<Value>>, Vec<String>), TableCalcError> {
        let steps = self
            .calculations
            .iter()
            .map(|calc| calc.plan().map(|step| (calc.name.as_str(), step)))
            .collect::<Result<Vec<_>, TableCalcError>>()?;

        let mut frame = Frame::new(columns, rows);
        for (name, step) in steps {
            let values = apply(&frame, name, &step)?;
            frame.set_column(name, values);
        }

        debug!(
            calculations = self.calculations.len(),
            rows = frame.rows.len(),
            "applied table calculations"
        );
        Ok((frame.rows, frame.columns))
    }
}

fn apply(frame: &Frame, name: &str, step: &Step<'_>) -> Result<Vec<Value>, TableCalcError> {
    let n = frame.rows.len();
    let values = match step {
        Step::Formula(formula) => (0..n)
            .map(|row| {
                formula
                    .evaluate(|column| match frame.cell(row, column) {
                        None => Err(EvalError::UnknownColumn(column.to_string())),
                        Some(value) => value
                            .number()
                            .ok_or_else(|| EvalError::NotNumeric(column.to_string())),
                    })
                    .map_or(Value::Null, Value::from)
            })
            .collect(),

        Step::PercentOfTotal(field) => percent_of_total(&frame.numbers(name, field)?),

        Step::PercentOfColumnTotal {
            field,
            partition_by,
        } => {
            let numbers = frame.numbers(name, field)?;
            if partition_by.is_empty() {
                percent_of_total(&numbers)
            } else {
                let mut groups: HashMap<Vec<String>, Vec<usize>> = HashMap::new();
                for row in 0..n {
                    let key = partition_by
                        .iter()
                        .map(|p| frame.cell(row, p).map_or_else(String::new, Value::to_string))
                        .collect();
                    groups.entry(key).or_default().push(row);
                }
                let mut out = vec![Value::Null; n];
                for rows in groups.values() {
                    let part: Vec<Num> = rows.iter().map(|&r| numbers[r]).collect();
                    for (&row, value) in rows.iter().zip(percent_of_total(&part)) {
                        out[row] = value;
                    }
                }
                out
            }
        }

        Step::PercentOfPrevious(field) => {
            let mut previous: Option<f64> = None;
            let mut out = Vec::with_capacity(n);
            for row in 0..n {
                let current = match frame.cell(row, field) {
                    None | Some(Value::Null) => None,
                    Some(value) => Some(value.number().map(Num::as_f64).ok_or_else(|| {
                        TableCalcError::NotNumeric {
                            name: name.to_string(),
                            column: field.to_string(),
                        }
                    })?),
                };
                out.push(match (previous, current) {
                    (Some(prev), Some(cur)) if prev != 0.0 => {
                        Value::Float((cur - prev) / prev * 100.0)
                    }
                    _ => Value::Null,
                });
                previous = current;
            }
            out
        }

        Step::RunningTotal(field) => {
            let mut total = Num::Int(0);
            frame
                .numbers(name, field)?
                .into_iter()
                .map(|value| {
                    total = add(total, value);
                    Value::from(total)
                })
                .collect()
        }

        Step::Rank(field) => {
            let numbers = frame.numbers(name, field)?;
            let mut order: Vec<usize> = (0..n).collect();
            order.sort_by(|&a, &b| {
                numbers[b]
                    .as_f64()
                    .partial_cmp(&numbers[a].as_f64())
                    .unwrap_or(Ordering::Equal)
            });
            let mut out = vec![Value::Null; n];
            let mut rank = 1;
            let mut previous: Option<f64> = None;
            for (position, &row) in order.iter().enumerate() {
                let value = numbers[row].as_f64();
                if previous != Some(value) {
                    rank = position as i64 + 1;
                }
                out[row] = Value::Int(rank);
                previous = Some(value);
            }
            out
        }

        Step::RowNumber => (1..=n as i64).map(Value::Int).collect(),

        Step::MovingAverage { field, window } => {
            let numbers = frame.numbers(name, field)?;
            (0..n)
                .map(|row| {
                    let start = (row + 1).saturating_sub(*window);
                    let slice = &numbers[start..=row];
                    let sum: f64 = slice.iter().map(|v| v.as_f64()).sum();
                    Value::Float(sum / slice.len() as f64)
                })
                .collect()
        }

        Step::Percentile { field, fraction } => {
            let mut present = Vec::new();
            for row in 0..n {
                match frame.cell(row, field) {
                    None | Some(Value::Null) => {}
                    Some(value) => present.push(value.number().map(Num::as_f64).ok_or_else(
                        || TableCalcError::NotNumeric {
                            name: name.to_string(),
                            column: field.to_string(),
                        },
                    )?),
                }
            }
            let value = percentile(&mut present, *fraction).map_or(Value::Null, Value::Float);
            vec![value; n]
        }
    };
    Ok(values)
}

fn percent_of_total(values: &[Num]) -> Vec<Value> {
    let total: f64 = values.iter().map(|v| v.as_f64()).sum();
    values
        .iter()
        .map(|v| {
            if total == 0.0 {
                Value::Float(0.0)
            } else {
                Value::Float(v.as_f64() / total * 100.0)
            }
        })
        .collect()
}

fn add(a: Num, b: Num) -> Num {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => x
            .checked_add(y)
            .map_or(Num::Float(x as f64 + y as f64), Num::Int),
        (x, y) => Num::Float(x.as_f64() + y.as_f64()),
    }
}

/// Linear interpolation between the closest ranks.
fn percentile(values: &mut [f64], fraction: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let position = fraction * (values.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let weight = position - lower as f64;
    Some(values[lower] + (values[upper] - values[lower]) * weight)
}
