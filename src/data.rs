//! Data-layer collaborator contracts.
//!
//! The engine never talks to a concrete store; it consumes these narrow
//! capability interfaces: attribute access on models, immutable-transform
//! scopes for filtering/ordering/pagination, batch preloading, association
//! loading, and an optional search provider. `crate::memory` ships a
//! reference implementation.

use crate::error::PresenterError;
use crate::params::Params;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

pub type ModelRef = Arc<dyn Model>;
pub type ScopeRef = Arc<dyn Scope>;

/// Narrow accessor interface every presentable model implements.
pub trait Model: Send + Sync {
    /// Primary key value (string or number).
    fn id(&self) -> Value;

    /// Type tag used for presenter registry lookup (e.g. "Task").
    fn type_name(&self) -> &str;

    /// Attribute by name; `None` when the model has no such attribute.
    fn attribute(&self, name: &str) -> Option<AttrValue>;
}

/// Stringified primary key, the form every envelope id takes.
pub fn id_string(model: &dyn Model) -> String {
    value_id_string(&model.id())
}

pub fn value_id_string(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Attribute value: plain JSON, or typed date/time leaves that render to
/// canonical strings (date `%Y-%m-%d`, datetime RFC 3339). Collections may
/// nest typed leaves arbitrarily deep.
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    Json(Value),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    List(Vec<AttrValue>),
    Map(BTreeMap<String, AttrValue>),
}

impl AttrValue {
    /// Canonical JSON form, converting date/time leaves recursively.
    pub fn canonical(&self) -> Value {
        match self {
            AttrValue::Json(v) => v.clone(),
            AttrValue::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            AttrValue::DateTime(dt) => Value::String(dt.to_rfc3339()),
            AttrValue::List(items) => Value::Array(items.iter().map(AttrValue::canonical).collect()),
            AttrValue::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.canonical()))
                    .collect(),
            ),
        }
    }

    /// Truthiness used when a branch field is gated by its own value.
    pub fn is_present(&self) -> bool {
        match self {
            AttrValue::Json(Value::Null) => false,
            AttrValue::Json(Value::Bool(b)) => *b,
            AttrValue::Json(Value::String(s)) => !s.is_empty(),
            _ => true,
        }
    }
}

impl From<Value> for AttrValue {
    fn from(v: Value) -> Self {
        AttrValue::Json(v)
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Json(Value::String(s.to_string()))
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Json(Value::String(s))
    }
}

impl From<i64> for AttrValue {
    fn from(n: i64) -> Self {
        AttrValue::Json(Value::Number(n.into()))
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Json(Value::Bool(b))
    }
}

impl From<NaiveDate> for AttrValue {
    fn from(d: NaiveDate) -> Self {
        AttrValue::Date(d)
    }
}

impl From<DateTime<Utc>> for AttrValue {
    fn from(dt: DateTime<Utc>) -> Self {
        AttrValue::DateTime(dt)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    /// "desc" (any case) is descending; everything else ascending.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("desc") {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }
}

/// Query scope in immutable-transform style: every shaping call returns a
/// new scope, and execution happens only in `count`/`rows`.
#[async_trait]
pub trait Scope: Send + Sync {
    async fn count(&self) -> Result<u64, PresenterError>;

    /// Execute and return rows in the scope's current order.
    async fn rows(&self) -> Result<Vec<ModelRef>, PresenterError>;

    /// Fetch the given ids, returned in the order the ids were given.
    async fn rows_by_ids(&self, ids: &[Value]) -> Result<Vec<ModelRef>, PresenterError>;

    /// Apply a named scope/filter known to the data layer.
    fn named(&self, name: &str, arg: &Value) -> Result<ScopeRef, PresenterError>;

    /// Append an order level on a column expression.
    fn ordered(&self, expression: &str, direction: SortDirection) -> ScopeRef;

    fn paginated(&self, limit: u64, offset: u64) -> ScopeRef;

    /// Restrict to an explicit id list (the "only" query).
    fn restricted_to_ids(&self, ids: &[Value]) -> ScopeRef;

    /// Primary key column, used for the deterministic pagination tiebreaker.
    fn primary_key(&self) -> &str {
        "id"
    }
}

/// Resolved association payload.
#[derive(Clone)]
pub enum AssociationValue {
    None,
    One(ModelRef),
    Many(Vec<ModelRef>),
}

/// Nested preload request entry: a bare name or a name with sub-preloads.
#[derive(Clone, Debug, PartialEq)]
pub enum PreloadSpec {
    Name(String),
    Nested(String, Vec<PreloadSpec>),
}

impl PreloadSpec {
    pub fn name(&self) -> &str {
        match self {
            PreloadSpec::Name(n) => n,
            PreloadSpec::Nested(n, _) => n,
        }
    }

    pub fn nested(name: impl Into<String>, children: Vec<PreloadSpec>) -> Self {
        PreloadSpec::Nested(name.into(), children)
    }
}

impl From<&str> for PreloadSpec {
    fn from(s: &str) -> Self {
        PreloadSpec::Name(s.to_string())
    }
}

/// Batch loading and association resolution, the only write-shaped calls the
/// engine makes against the data layer.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Make the named associations available on `models` without further
    /// queries. Called at most once per render batch.
    async fn preload(
        &self,
        models: &[ModelRef],
        spec: &HashMap<String, Vec<PreloadSpec>>,
    ) -> Result<(), PresenterError>;

    /// Load one declared association of one model.
    async fn association(
        &self,
        model: &ModelRef,
        name: &str,
    ) -> Result<AssociationValue, PresenterError>;
}

/// What a search provider hands back: rows directly, or ordered ids for the
/// scope to fetch (order is authoritative either way).
pub enum SearchHits {
    Ids(Vec<Value>),
    Models(Vec<ModelRef>),
}

pub enum SearchOutcome {
    Results { hits: SearchHits, count: u64 },
    Unavailable,
}

/// Options forwarded to a presenter's search closure.
#[derive(Clone, Debug)]
pub struct SearchOptions {
    pub params: Params,
    /// Filter names the presenter declares (whitelist for the provider).
    pub filters: Vec<String>,
    pub sort_orders: Vec<String>,
    pub includes: Vec<String>,
    pub page: u64,
    pub per_page: u64,
}

pub type SearchFn = Arc<dyn Fn(&str, &SearchOptions) -> SearchOutcome + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_converts_nested_dates() {
        let mut map = BTreeMap::new();
        map.insert(
            "due_date".to_string(),
            AttrValue::Date(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()),
        );
        map.insert("title".to_string(), AttrValue::from("launch"));
        let value = AttrValue::List(vec![AttrValue::Map(map)]).canonical();
        assert_eq!(
            value,
            json!([{"due_date": "2024-03-09", "title": "launch"}])
        );
    }

    #[test]
    fn datetime_renders_rfc3339() {
        let dt = DateTime::parse_from_rfc3339("2024-03-09T10:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            AttrValue::DateTime(dt).canonical(),
            json!("2024-03-09T10:30:00+00:00")
        );
    }

    #[test]
    fn presence_follows_json_semantics() {
        assert!(!AttrValue::Json(Value::Null).is_present());
        assert!(!AttrValue::from("").is_present());
        assert!(!AttrValue::from(false).is_present());
        assert!(AttrValue::from(0i64).is_present());
        assert!(AttrValue::from("x").is_present());
    }
}
