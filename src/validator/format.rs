//! Per-leaf type and format checks. Non-recursive; structure is the walk's
//! concern.

use crate::validator::schema::{ParamSpec, ParamType};
use chrono::{DateTime, NaiveDate};
use regex::Regex;
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Email,
    Uuid,
    Date,
    Datetime,
}

/// Optional constraints a leaf may declare on top of its type.
#[derive(Clone, Debug, Default)]
pub struct FormatRules {
    pub format: Option<Format>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<String>,
    pub allowed: Option<Vec<Value>>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
}

impl FormatRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    pub fn min_length(mut self, n: usize) -> Self {
        self.min_length = Some(n);
        self
    }

    pub fn max_length(mut self, n: usize) -> Self {
        self.max_length = Some(n);
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn allowed(mut self, values: Vec<Value>) -> Self {
        self.allowed = Some(values);
        self
    }

    pub fn minimum(mut self, n: f64) -> Self {
        self.minimum = Some(n);
        self
    }

    pub fn maximum(mut self, n: f64) -> Self {
        self.maximum = Some(n);
        self
    }
}

/// Check a leaf value against its declared type and rules. Null passes;
/// presence is enforced separately via `required`.
pub fn check(spec: &ParamSpec, value: &Value) -> Result<(), Vec<String>> {
    if value.is_null() {
        return Ok(());
    }
    let mut messages = Vec::new();
    if let Some(message) = type_mismatch(spec.param_type, value) {
        messages.push(message);
    }
    if let Some(rules) = &spec.rules {
        check_rules(rules, value, &mut messages);
    }
    if messages.is_empty() {
        Ok(())
    } else {
        Err(messages)
    }
}

/// Query-string values arrive stringly typed, so string renditions of
/// numbers and booleans are accepted for the scalar types.
fn type_mismatch(param_type: ParamType, value: &Value) -> Option<String> {
    let ok = match param_type {
        ParamType::String => value.is_string(),
        ParamType::Integer => match value {
            Value::Number(n) => n.is_i64() || n.is_u64(),
            Value::String(s) => s.trim().parse::<i64>().is_ok(),
            _ => false,
        },
        ParamType::Decimal => match value {
            Value::Number(_) => true,
            Value::String(s) => s.trim().parse::<f64>().is_ok(),
            _ => false,
        },
        ParamType::Boolean => match value {
            Value::Bool(_) => true,
            Value::String(s) => matches!(s.trim(), "true" | "false"),
            _ => false,
        },
        ParamType::Datetime => match value {
            Value::String(s) => parses_as_datetime(s),
            _ => false,
        },
        // Structural types never reach here.
        ParamType::Hash | ParamType::Array => true,
    };
    (!ok).then(|| format!("must be of type {}", param_type.as_str()))
}

fn parses_as_datetime(s: &str) -> bool {
    DateTime::parse_from_rfc3339(s).is_ok() || NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}

fn check_rules(rules: &FormatRules, value: &Value, messages: &mut Vec<String>) {
    if let Some(format) = rules.format {
        if let Some(message) = format_mismatch(format, value) {
            messages.push(message);
        }
    }
    if let Some(max) = rules.max_length {
        if let Some(s) = value.as_str() {
            if s.len() > max {
                messages.push(format!("must be at most {} characters", max));
            }
        }
    }
    if let Some(min) = rules.min_length {
        if let Some(s) = value.as_str() {
            if s.len() < min {
                messages.push(format!("must be at least {} characters", min));
            }
        }
    }
    if let Some(pattern) = &rules.pattern {
        match Regex::new(pattern) {
            Ok(re) => {
                if let Some(s) = value.as_str() {
                    if !re.is_match(s) {
                        messages.push("does not match required pattern".to_string());
                    }
                }
            }
            Err(_) => messages.push("invalid pattern in schema".to_string()),
        }
    }
    if let Some(allowed) = &rules.allowed {
        if !allowed.iter().any(|a| value_eq(value, a)) {
            messages.push(format!(
                "must be one of: {:?}",
                allowed.iter().take(5).collect::<Vec<_>>()
            ));
        }
    }
    if let Some(min) = rules.minimum {
        if let Some(n) = value.as_f64() {
            if n < min {
                messages.push(format!("must be at least {}", min));
            }
        }
    }
    if let Some(max) = rules.maximum {
        if let Some(n) = value.as_f64() {
            if n > max {
                messages.push(format!("must be at most {}", max));
            }
        }
    }
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(s), Value::String(t)) => s == t,
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn format_mismatch(format: Format, value: &Value) -> Option<String> {
    let Some(s) = value.as_str() else {
        return Some("must be a string".to_string());
    };
    let ok = match format {
        Format::Email => s.contains('@') && s.len() >= 3,
        Format::Uuid => uuid::Uuid::parse_str(s).is_ok(),
        Format::Date => NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok(),
        Format::Datetime => DateTime::parse_from_rfc3339(s).is_ok(),
    };
    (!ok).then(|| {
        let label = match format {
            Format::Email => "email",
            Format::Uuid => "UUID",
            Format::Date => "date",
            Format::Datetime => "datetime",
        };
        format!("must be a valid {}", label)
    })
}
