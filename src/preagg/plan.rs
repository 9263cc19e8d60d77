//! Explain output for routing decisions.

use std::fmt;

use serde::Serialize;

/// Outcome of one compatibility check against one rollup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreaggCheck {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

impl PreaggCheck {
    pub fn new(name: &str, passed: bool, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for PreaggCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.passed { "pass" } else { "FAIL" };
        write!(f, "[{}] {}: {}", mark, self.name, self.detail)
    }
}

/// One rollup as evaluated for a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreaggCandidate {
    pub name: String,
    pub matched: bool,
    /// Set for matched candidates only.
    pub score: Option<i64>,
    pub selected: bool,
    pub checks: Vec<PreaggCheck>,
}

impl PreaggCandidate {
    fn label(&self) -> String {
        let score = self.score.unwrap_or_default();
        if self.selected {
            format!("{} (score: {}, selected)", self.name, score)
        } else if self.matched {
            format!("{} (score: {})", self.name, score)
        } else {
            format!("{} (not matched)", self.name)
        }
    }
}

impl fmt::Display for PreaggCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())?;
        for check in &self.checks {
            write!(f, "\n    {}", check)?;
        }
        Ok(())
    }
}

/// What `explain` reports for a query: the routing decision and the SQL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryPlan {
    pub sql: String,
    pub model: Option<String>,
    pub metrics: Vec<String>,
    pub dimensions: Vec<String>,
    /// Name of the rollup the SQL reads, if any.
    pub selected_preaggregation: Option<String>,
    pub reason: String,
    pub candidates: Vec<PreaggCandidate>,
}

impl QueryPlan {
    pub fn used_preaggregation(&self) -> bool {
        self.selected_preaggregation.is_some()
    }
}

impl fmt::Display for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines = vec!["Query Plan".to_string()];

        if let Some(model) = &self.model {
            lines.push(format!("  Model: {}", model));
        }
        if !self.metrics.is_empty() {
            lines.push(format!("  Metrics: {}", self.metrics.join(", ")));
        }
        if !self.dimensions.is_empty() {
            lines.push(format!("  Dimensions: {}", self.dimensions.join(", ")));
        }
        lines.push(String::new());

        match &self.selected_preaggregation {
            Some(name) => lines.push(format!("  Routing: using pre-aggregation '{}'", name)),
            None => lines.push("  Routing: scanning raw table".to_string()),
        }
        lines.push(format!("  Reason: {}", self.reason));
        lines.push(String::new());

        if !self.candidates.is_empty() {
            lines.push("  Candidates:".to_string());
            for candidate in &self.candidates {
                let prefix = if candidate.selected { "  > " } else { "    " };
                for (i, line) in candidate.to_string().lines().enumerate() {
                    if i == 0 {
                        lines.push(format!("{}{}", prefix, line));
                    } else {
                        lines.push(format!("      {}", line));
                    }
                }
            }
            lines.push(String::new());
        }

        lines.push("  SQL:".to_string());
        for line in self.sql.trim().lines() {
            lines.push(format!("    {}", line));
        }

        write!(f, "{}", lines.join("\n"))
    }
}
