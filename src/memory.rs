//! Reference in-memory data layer.
//!
//! Implements the collaborator contracts in `crate::data` over plain vectors:
//! attribute-sorted ordering, id restriction, registered named scopes, and a
//! lookup-table association loader. Used by the test suite and the example
//! consumer; production callers supply their own store.

use crate::data::{
    id_string, value_id_string, AssociationValue, AttrValue, DataSource, Model, ModelRef,
    PreloadSpec, Scope, ScopeRef, SortDirection,
};
use crate::error::PresenterError;
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// A model backed by a plain attribute map. The `id` attribute is the
/// primary key.
#[derive(Clone, Debug)]
pub struct MemoryModel {
    type_name: String,
    attributes: BTreeMap<String, AttrValue>,
}

impl MemoryModel {
    pub fn new(type_name: impl Into<String>, id: impl Into<Value>) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert("id".to_string(), AttrValue::Json(id.into()));
        Self {
            type_name: type_name.into(),
            attributes,
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

impl Model for MemoryModel {
    fn id(&self) -> Value {
        match self.attributes.get("id") {
            Some(attr) => attr.canonical(),
            None => Value::Null,
        }
    }

    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn attribute(&self, name: &str) -> Option<AttrValue> {
        self.attributes.get(name).cloned()
    }
}

pub type NamedScopeFn = Arc<dyn Fn(Vec<ModelRef>, &Value) -> Vec<ModelRef> + Send + Sync>;

/// In-memory store: models by type, association lookup tables, named scopes.
/// Build mutably at setup, then share behind `Arc`.
#[derive(Default)]
pub struct MemoryStore {
    models: HashMap<String, Vec<ModelRef>>,
    associations: HashMap<(String, String, String), AssociationValue>,
    named_scopes: HashMap<String, NamedScopeFn>,
    preload_log: Mutex<Vec<HashMap<String, Vec<PreloadSpec>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, model: MemoryModel) -> ModelRef {
        let type_name = model.type_name.clone();
        let model: ModelRef = Arc::new(model);
        self.models
            .entry(type_name)
            .or_default()
            .push(Arc::clone(&model));
        model
    }

    /// Register a singular association value for one model.
    pub fn link_one(&mut self, model: &ModelRef, association: &str, target: &ModelRef) {
        self.associations.insert(
            association_key(model, association),
            AssociationValue::One(Arc::clone(target)),
        );
    }

    /// Register a collection association value for one model.
    pub fn link_many(&mut self, model: &ModelRef, association: &str, targets: &[ModelRef]) {
        self.associations.insert(
            association_key(model, association),
            AssociationValue::Many(targets.to_vec()),
        );
    }

    /// Register a named scope usable as a filter fallback.
    pub fn named_scope<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(Vec<ModelRef>, &Value) -> Vec<ModelRef> + Send + Sync + 'static,
    {
        self.named_scopes.insert(name.into(), Arc::new(f));
    }

    /// All models of a type, in insertion order.
    pub fn scope(self: &Arc<Self>, type_name: &str) -> ScopeRef {
        let rows = self.models.get(type_name).cloned().unwrap_or_default();
        Arc::new(MemoryScope {
            store: Arc::clone(self),
            rows,
            order: Vec::new(),
            page: None,
        })
    }

    /// Preload invocations observed so far (for dedup/idempotence tests).
    pub fn preload_calls(&self) -> Vec<HashMap<String, Vec<PreloadSpec>>> {
        self.preload_log.lock().expect("preload log poisoned").clone()
    }
}

fn association_key(model: &ModelRef, association: &str) -> (String, String, String) {
    (
        model.type_name().to_string(),
        id_string(model.as_ref()),
        association.to_string(),
    )
}

#[async_trait]
impl DataSource for MemoryStore {
    async fn preload(
        &self,
        _models: &[ModelRef],
        spec: &HashMap<String, Vec<PreloadSpec>>,
    ) -> Result<(), PresenterError> {
        // Everything is already in memory; just record the call.
        self.preload_log
            .lock()
            .expect("preload log poisoned")
            .push(spec.clone());
        Ok(())
    }

    async fn association(
        &self,
        model: &ModelRef,
        name: &str,
    ) -> Result<AssociationValue, PresenterError> {
        Ok(self
            .associations
            .get(&association_key(model, name))
            .cloned()
            .unwrap_or(AssociationValue::None))
    }
}

/// Immutable-transform scope over a row snapshot.
pub struct MemoryScope {
    store: Arc<MemoryStore>,
    rows: Vec<ModelRef>,
    order: Vec<(String, SortDirection)>,
    page: Option<(u64, u64)>,
}

impl MemoryScope {
    fn derive(&self, rows: Vec<ModelRef>) -> MemoryScope {
        MemoryScope {
            store: Arc::clone(&self.store),
            rows,
            order: self.order.clone(),
            page: self.page,
        }
    }

    fn sorted_rows(&self) -> Vec<ModelRef> {
        let mut rows = self.rows.clone();
        if !self.order.is_empty() {
            rows.sort_by(|a, b| {
                for (expr, direction) in &self.order {
                    let ordering = compare_attrs(
                        a.attribute(expr).as_ref(),
                        b.attribute(expr).as_ref(),
                    );
                    let ordering = match direction {
                        SortDirection::Asc => ordering,
                        SortDirection::Desc => ordering.reverse(),
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }
        rows
    }
}

/// Total order over attribute values: null < bool < number < string, with
/// date/datetime compared via their canonical strings.
fn compare_attrs(a: Option<&AttrValue>, b: Option<&AttrValue>) -> Ordering {
    let a = a.map(AttrValue::canonical).unwrap_or(Value::Null);
    let b = b.map(AttrValue::canonical).unwrap_or(Value::Null);
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            _ => 4,
        }
    }
    match (&a, &b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(&a).cmp(&rank(&b)),
    }
}

#[async_trait]
impl Scope for MemoryScope {
    async fn count(&self) -> Result<u64, PresenterError> {
        Ok(self.rows.len() as u64)
    }

    async fn rows(&self) -> Result<Vec<ModelRef>, PresenterError> {
        let rows = self.sorted_rows();
        let rows = match self.page {
            Some((limit, offset)) => rows
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect(),
            None => rows,
        };
        Ok(rows)
    }

    async fn rows_by_ids(&self, ids: &[Value]) -> Result<Vec<ModelRef>, PresenterError> {
        let by_id: HashMap<String, ModelRef> = self
            .rows
            .iter()
            .map(|m| (id_string(m.as_ref()), Arc::clone(m)))
            .collect();
        Ok(ids
            .iter()
            .filter_map(|id| by_id.get(&value_id_string(id)).cloned())
            .collect())
    }

    fn named(&self, name: &str, arg: &Value) -> Result<ScopeRef, PresenterError> {
        let f = self.store.named_scopes.get(name).ok_or_else(|| {
            PresenterError::DataSource(format!("unknown named scope '{}'", name))
        })?;
        Ok(Arc::new(self.derive(f(self.rows.clone(), arg))))
    }

    fn ordered(&self, expression: &str, direction: SortDirection) -> ScopeRef {
        let mut scope = self.derive(self.rows.clone());
        scope.order.push((expression.to_string(), direction));
        Arc::new(scope)
    }

    fn paginated(&self, limit: u64, offset: u64) -> ScopeRef {
        let mut scope = self.derive(self.rows.clone());
        scope.page = Some((limit, offset));
        Arc::new(scope)
    }

    fn restricted_to_ids(&self, ids: &[Value]) -> ScopeRef {
        let wanted: Vec<String> = ids.iter().map(value_id_string).collect();
        let rows = self
            .rows
            .iter()
            .filter(|m| wanted.contains(&id_string(m.as_ref())))
            .cloned()
            .collect();
        Arc::new(self.derive(rows))
    }
}
