//! Normalized response envelope: pagination header, ordered result refs,
//! and per-key object buckets keyed by id.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Ordered pointer into a bucket, preserving the query's row order.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct ResultRef {
    pub key: String,
    pub id: String,
}

/// Top-level presentation envelope. Buckets serialize as additional
/// top-level keys after the fixed header fields.
#[derive(Clone, Debug, Default)]
pub struct Envelope {
    pub count: u64,
    pub page_number: u64,
    pub page_count: u64,
    pub page_size: u64,
    pub results: Vec<ResultRef>,
    buckets: BTreeMap<String, Map<String, Value>>,
}

impl Envelope {
    pub fn new(count: u64, page_number: u64, page_count: u64, page_size: u64) -> Self {
        Self {
            count,
            page_number,
            page_count,
            page_size,
            results: Vec::new(),
            buckets: BTreeMap::new(),
        }
    }

    /// Ensure a bucket exists, empty or not. Empty buckets still serialize,
    /// so clients see `{}` rather than a missing key.
    pub fn ensure_bucket(&mut self, key: &str) {
        self.buckets.entry(key.to_string()).or_default();
    }

    pub fn insert(&mut self, key: &str, id: &str, object: Value) {
        self.buckets
            .entry(key.to_string())
            .or_default()
            .insert(id.to_string(), object);
    }

    pub fn contains(&self, key: &str, id: &str) -> bool {
        self.buckets
            .get(key)
            .map(|bucket| bucket.contains_key(id))
            .unwrap_or(false)
    }

    pub fn bucket(&self, key: &str) -> Option<&Map<String, Value>> {
        self.buckets.get(key)
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(5 + self.buckets.len()))?;
        map.serialize_entry("count", &self.count)?;
        map.serialize_entry("page_number", &self.page_number)?;
        map.serialize_entry("page_count", &self.page_count)?;
        map.serialize_entry("page_size", &self.page_size)?;
        map.serialize_entry("results", &self.results)?;
        for (key, bucket) in &self.buckets {
            map.serialize_entry(key, bucket)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn buckets_flatten_into_top_level_keys() {
        let mut envelope = Envelope::new(1, 1, 1, 20);
        envelope.results.push(ResultRef {
            key: "tasks".to_string(),
            id: "1".to_string(),
        });
        envelope.insert("tasks", "1", json!({"id": "1", "title": "a"}));
        envelope.ensure_bucket("workspaces");

        let value = envelope.to_value();
        assert_eq!(value["count"], json!(1));
        assert_eq!(value["results"], json!([{"key": "tasks", "id": "1"}]));
        assert_eq!(value["tasks"]["1"]["title"], json!("a"));
        assert_eq!(value["workspaces"], json!({}));
    }

    #[test]
    fn empty_envelope_keeps_zeroed_pagination() {
        let envelope = Envelope::new(0, 0, 0, 20);
        let value = envelope.to_value();
        assert_eq!(value["page_number"], json!(0));
        assert_eq!(value["page_count"], json!(0));
        assert_eq!(value["results"], json!([]));
    }
}
