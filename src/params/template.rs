//! Template rendering for SQL fragments with `{% %}` / `{# #}` tags.

use std::collections::BTreeMap;

use minijinja::Environment;
use serde_json::Value;

use crate::semantic::error::{SemanticError, SemanticResult};

/// Whether `sql` contains any template syntax.
pub fn is_template(sql: &str) -> bool {
    ["{{", "{%", "{#"].iter().any(|marker| sql.contains(marker))
}

/// Render `source` with `context`. No autoescaping is applied.
pub fn render_template(source: &str, context: &BTreeMap<String, Value>) -> SemanticResult<String> {
    if !is_template(source) {
        return Ok(source.to_string());
    }
    let env = Environment::new();
    env.render_str(source, context)
        .map_err(|e| SemanticError::Template(e.to_string()))
}
