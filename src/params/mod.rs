//! Query parameters.
//!
//! A [`Parameter`] is a named, typed user input. Filters and segments refer
//! to parameters as `{{ name }}`; [`ParameterSet::interpolate`] replaces the
//! placeholders with SQL literals formatted for the parameter's type.
//! Fragments that use block or comment tags (`{% %}`, `{# #}`) are rendered
//! through the template engine instead, with the raw values as context.

pub mod template;

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::semantic::error::{SemanticError, SemanticResult};

pub use template::{is_template, render_template};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*(\w+)\s*\}\}").unwrap());

/// Parameter data type; decides literal formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Number,
    Date,
    /// Identifier-like text spliced in without quotes.
    Unquoted,
    Yesno,
}

/// A user-configurable query input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub parameter_type: ParameterType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<Value>>,
    /// Date parameters without a value fall back to today's date.
    #[serde(default)]
    pub default_to_today: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, parameter_type: ParameterType) -> Self {
        Self {
            name: name.into(),
            parameter_type,
            default_value: None,
            allowed_values: None,
            default_to_today: false,
            description: None,
            label: None,
        }
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn with_allowed_values(mut self, values: Vec<Value>) -> Self {
        self.allowed_values = Some(values);
        self
    }

    pub fn with_default_to_today(mut self) -> Self {
        self.default_to_today = true;
        self
    }

    /// Check the definition itself: a usable default and a sensible type.
    pub fn validate(&self) -> SemanticResult<()> {
        if self.default_to_today && self.parameter_type != ParameterType::Date {
            return Err(self.invalid("default_to_today only applies to date parameters"));
        }
        if let Some(default) = &self.default_value {
            self.format_value(default)?;
        }
        Ok(())
    }

    /// Format `value` as a SQL literal for this parameter's type.
    pub fn format_value(&self, value: &Value) -> SemanticResult<String> {
        if let Some(allowed) = &self.allowed_values {
            if !value.is_null() && !allowed.contains(value) {
                return Err(self.invalid(format!("{} is not one of the allowed values", value)));
            }
        }

        match self.parameter_type {
            ParameterType::Yesno => Ok(if truthy(value) { "TRUE" } else { "FALSE" }.to_string()),
            _ if value.is_null() => Ok("NULL".to_string()),
            ParameterType::String => {
                let text = value_text(value);
                Ok(format!("'{}'", text.replace('\'', "''")))
            }
            ParameterType::Date => Ok(format!("'{}'", value_text(value).replace('\'', "''"))),
            ParameterType::Number => self.format_number(value),
            ParameterType::Unquoted => {
                let text = value_text(value);
                let safe = !text.is_empty()
                    && text
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
                if safe {
                    Ok(text)
                } else {
                    Err(self.invalid(format!(
                        "unquoted values may only contain letters, digits, '_' and '.', got '{}'",
                        text
                    )))
                }
            }
        }
    }

    fn format_number(&self, value: &Value) -> SemanticResult<String> {
        match value {
            Value::Number(n) => Ok(n.to_string()),
            Value::String(s) => match s.trim().parse::<f64>() {
                Ok(parsed) if parsed.is_finite() => Ok(ryu::Buffer::new().format(parsed).to_string()),
                _ => Err(self.invalid(format!("'{}' is not a number", s))),
            },
            other => Err(self.invalid(format!("expected a number, got {}", other))),
        }
    }

    fn invalid(&self, message: impl Into<String>) -> SemanticError {
        SemanticError::InvalidParameterValue {
            name: self.name.clone(),
            message: message.into(),
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "yes" | "y" | "true" | "1"
        ),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Parameter definitions bound to the values supplied with one query.
#[derive(Debug, Clone)]
pub struct ParameterSet<'a> {
    parameters: BTreeMap<&'a str, &'a Parameter>,
    values: HashMap<String, Value>,
}

impl<'a> ParameterSet<'a> {
    pub fn new(
        parameters: impl IntoIterator<Item = &'a Parameter>,
        values: HashMap<String, Value>,
    ) -> Self {
        Self {
            parameters: parameters.into_iter().map(|p| (p.name.as_str(), p)).collect(),
            values,
        }
    }

    /// Value for `name`: the supplied value, then today's date for
    /// `default_to_today`, then the declared default.
    pub fn get(&self, name: &str) -> SemanticResult<Value> {
        let param = self
            .parameters
            .get(name)
            .ok_or_else(|| SemanticError::ParameterNotFound(name.to_string()))?;

        if let Some(value) = self.values.get(name) {
            return Ok(value.clone());
        }
        if param.default_to_today && param.parameter_type == ParameterType::Date {
            let today = chrono::Local::now().date_naive();
            return Ok(Value::String(today.format("%Y-%m-%d").to_string()));
        }
        Ok(param.default_value.clone().unwrap_or(Value::Null))
    }

    /// SQL literal for `name`.
    pub fn format(&self, name: &str) -> SemanticResult<String> {
        let param = self
            .parameters
            .get(name)
            .ok_or_else(|| SemanticError::ParameterNotFound(name.to_string()))?;
        param.format_value(&self.get(name)?)
    }

    /// Replace parameter references in a SQL fragment.
    ///
    /// `{{ name }}` placeholders that don't name a parameter are left as-is.
    pub fn interpolate(&self, sql: &str) -> SemanticResult<String> {
        if sql.contains("{%") || sql.contains("{#") {
            let mut context = BTreeMap::new();
            for name in self.parameters.keys() {
                context.insert(name.to_string(), self.get(name)?);
            }
            return render_template(sql, &context);
        }

        let mut out = String::with_capacity(sql.len());
        let mut last = 0;
        for caps in PLACEHOLDER.captures_iter(sql) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if !self.parameters.contains_key(name.as_str()) {
                continue;
            }
            out.push_str(&sql[last..whole.start()]);
            out.push_str(&self.format(name.as_str())?);
            last = whole.end();
        }
        out.push_str(&sql[last..]);
        Ok(out)
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}
