//! Relative date phrases in filters.
//!
//! `orders.order_date >= 'last 7 days'` reads better than a hand-written
//! interval expression. Phrases are recognised case-insensitively:
//!
//! - `today`, `yesterday`, `tomorrow`
//! - `last N days|weeks|months|quarters|years`
//! - `this|last|next week|month|quarter|year`
//!
//! Anything else is left for the database to interpret.

use std::sync::LazyLock;

use regex::Regex;

use super::TimeUnit;
use crate::sql::dialect::{Dialect, SqlDialect};

static LAST_N: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^last (\d+) (day|week|month|quarter|year)s?$").unwrap()
});

static PERIOD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(this|last|next) (week|month|quarter|year)$").unwrap()
});

static COMPARISON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(.+?)\s*(>=|<=|>|<|=)\s*['"](.+?)['"]$"#).unwrap()
});

/// A recognised relative date phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelativeDate {
    Today,
    Yesterday,
    Tomorrow,
    /// `last N <unit>s`
    LastN { amount: i64, unit: TimeUnit },
    /// `this|last|next <unit>`, with `shift` of 0, -1 or 1.
    Period { shift: i64, unit: TimeUnit },
}

impl RelativeDate {
    pub fn parse(phrase: &str) -> Option<Self> {
        let phrase = phrase.trim().to_lowercase();
        match phrase.as_str() {
            "today" => return Some(RelativeDate::Today),
            "yesterday" => return Some(RelativeDate::Yesterday),
            "tomorrow" => return Some(RelativeDate::Tomorrow),
            _ => {}
        }

        if let Some(caps) = LAST_N.captures(&phrase) {
            let amount = caps[1].parse().ok()?;
            let unit = caps[2].parse().ok()?;
            return Some(RelativeDate::LastN { amount, unit });
        }

        if let Some(caps) = PERIOD.captures(&phrase) {
            let shift = match &caps[1] {
                "this" => 0,
                "last" => -1,
                _ => 1,
            };
            let unit = caps[2].parse().ok()?;
            return Some(RelativeDate::Period { shift, unit });
        }

        None
    }

    pub fn is_relative_date(phrase: &str) -> bool {
        Self::parse(phrase).is_some()
    }

    /// Start of the range as a SQL date expression.
    pub fn start_sql(&self, dialect: Dialect) -> String {
        let today = dialect.current_date();
        match *self {
            RelativeDate::Today => today.to_string(),
            RelativeDate::Yesterday => dialect.date_add(today, -1, "day"),
            RelativeDate::Tomorrow => dialect.date_add(today, 1, "day"),
            RelativeDate::LastN { amount, unit } => match unit {
                TimeUnit::Day => dialect.date_add(today, -amount, "day"),
                TimeUnit::Week => dialect.date_add(today, -amount * 7, "day"),
                _ => {
                    let trunc = dialect.date_trunc(unit.as_str(), today);
                    let (amount, unit) = unit.interval_parts(amount);
                    dialect.date_add(&trunc, -amount, unit)
                }
            },
            RelativeDate::Period { shift, unit } => {
                let trunc = dialect.date_trunc(unit.as_str(), today);
                if shift == 0 {
                    trunc
                } else {
                    let (amount, unit) = unit.interval_parts(shift);
                    dialect.date_add(&trunc, amount, unit)
                }
            }
        }
    }

    /// Full predicate over `column`.
    ///
    /// Single days compare with `=`, rolling day and week windows are
    /// open-ended, and calendar periods are half-open ranges.
    pub fn to_range(&self, column: &str, dialect: Dialect) -> String {
        let start = self.start_sql(dialect);
        match *self {
            RelativeDate::Today | RelativeDate::Yesterday | RelativeDate::Tomorrow => {
                format!("{} = {}", column, start)
            }
            RelativeDate::LastN {
                unit: TimeUnit::Day | TimeUnit::Week,
                ..
            } => format!("{} >= {}", column, start),
            RelativeDate::LastN { unit, .. } => {
                let end = dialect.date_trunc(unit.as_str(), dialect.current_date());
                format!("{} >= {} AND {} < {}", column, start, column, end)
            }
            RelativeDate::Period { unit, .. } => {
                let (amount, unit) = unit.interval_parts(1);
                let end = dialect.date_add(&start, amount, unit);
                format!("{} >= {} AND {} < {}", column, start, column, end)
            }
        }
    }
}

/// Rewrite `column <op> '<phrase>'` when the quoted value is a relative date.
///
/// `>=` and `>` compare against the start of the range, `=` expands to the
/// whole range. Other operators and unrecognised values pass through.
pub fn rewrite_filter(filter: &str, dialect: Dialect) -> String {
    let trimmed = filter.trim();
    let Some(caps) = COMPARISON.captures(trimmed) else {
        return filter.to_string();
    };
    let (column, op, value) = (&caps[1], &caps[2], &caps[3]);
    let Some(date) = RelativeDate::parse(value) else {
        return filter.to_string();
    };

    match op {
        ">=" | ">" => format!("{} {} {}", column, op, date.start_sql(dialect)),
        "=" => date.to_range(column, dialect),
        _ => filter.to_string(),
    }
}
