//! Request parameter bag with typed accessors.

use serde_json::{Map, Value};

/// Untyped request parameters (query string / body), keyed by string.
/// Accessors tolerate values arriving as either native JSON types or
/// strings, since query-string parsing yields strings for everything.
#[derive(Clone, Debug, Default)]
pub struct Params {
    inner: Map<String, Value>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON object; any other value yields empty params.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(inner) => Self { inner },
            _ => Self::default(),
        }
    }

    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let inner = pairs.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self { inner }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.inner.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    /// String view of a value; numbers and booleans are stringified.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.inner.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Non-blank string view; whitespace-only strings count as absent.
    pub fn get_present(&self, key: &str) -> Option<String> {
        self.get_str(key).filter(|s| !s.trim().is_empty())
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.inner.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.inner.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Comma-separated list (or JSON array of strings), trimmed, blanks dropped.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        match self.inner.get(key) {
            Some(Value::String(s)) => s
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| match v {
                    Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.inner
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.inner.clone())
    }
}
