//! Field references: `model.field`, `model.time_dim__granularity`, or a
//! bare graph-level metric name.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::{SemanticError, SemanticResult};

/// Time granularity for time dimensions and pre-aggregation rollups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl Granularity {
    pub const ALL: [Granularity; 6] = [
        Granularity::Hour,
        Granularity::Day,
        Granularity::Week,
        Granularity::Month,
        Granularity::Quarter,
        Granularity::Year,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Hour => "hour",
            Granularity::Day => "day",
            Granularity::Week => "week",
            Granularity::Month => "month",
            Granularity::Quarter => "quarter",
            Granularity::Year => "year",
        }
    }

    /// Position in the hierarchy, coarsest first: year 1 ... hour 6.
    pub fn level(&self) -> u8 {
        match self {
            Granularity::Year => 1,
            Granularity::Quarter => 2,
            Granularity::Month => 3,
            Granularity::Week => 4,
            Granularity::Day => 5,
            Granularity::Hour => 6,
        }
    }

    /// Whether data stored at `self` can be re-truncated to `target`.
    ///
    /// Weeks straddle month, quarter and year boundaries, so a weekly
    /// rollup only serves weekly queries.
    pub fn can_roll_up_to(&self, target: Granularity) -> bool {
        if *self == Granularity::Week
            && matches!(
                target,
                Granularity::Month | Granularity::Quarter | Granularity::Year
            )
        {
            return false;
        }
        target.level() <= self.level()
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = SemanticError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Granularity::ALL
            .into_iter()
            .find(|g| g.as_str() == s)
            .ok_or_else(|| {
                SemanticError::InvalidReference(format!(
                    "invalid granularity '{}' (expected one of hour, day, week, month, quarter, year)",
                    s
                ))
            })
    }
}

/// A parsed field reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    /// Owning model, `None` for bare graph-level metric names.
    pub model: Option<String>,
    pub field: String,
    pub granularity: Option<Granularity>,
}

impl FieldRef {
    /// Parse `model.field`, `model.field__grain` or a bare `name`.
    pub fn parse(reference: &str) -> SemanticResult<Self> {
        let reference = reference.trim();
        let (model, rest) = match reference.split_once('.') {
            Some((model, rest)) => (Some(model), rest),
            None => (None, reference),
        };

        if model.is_some_and(str::is_empty) || rest.is_empty() || rest.contains('.') {
            return Err(SemanticError::InvalidReference(format!(
                "'{}' is not of the form model.field",
                reference
            )));
        }

        let (field, granularity) = match rest.rsplit_once("__") {
            Some((field, grain)) => (field, Some(grain.parse::<Granularity>()?)),
            None => (rest, None),
        };

        Ok(FieldRef {
            model: model.map(str::to_string),
            field: field.to_string(),
            granularity,
        })
    }

    /// `model.field` (or just `field` for bare names), without granularity.
    pub fn qualified(&self) -> String {
        match &self.model {
            Some(m) => format!("{}.{}", m, self.field),
            None => self.field.clone(),
        }
    }

    /// Output column name: `field` or `field__grain`.
    pub fn alias(&self) -> String {
        match self.granularity {
            Some(g) => format!("{}__{}", self.field, g),
            None => self.field.clone(),
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.qualified())?;
        if let Some(g) = self.granularity {
            write!(f, "__{}", g)?;
        }
        Ok(())
    }
}
