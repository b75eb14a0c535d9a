//! Immutable presenter definition backed by a configuration tree.

use crate::config::{ConfigNode, ResolvedEntry};
use crate::data::{PreloadSpec, SearchFn, SortDirection};
use crate::presenter::descriptors::{
    AssociationDescriptor, AssociationTarget, Cardinality, ConditionalDescriptor, FieldDescriptor,
    FilterDescriptor, SortOrderDescriptor,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Leaf type of a presenter's configuration tree.
#[derive(Clone)]
pub enum Setting {
    Value(Value),
    Field(Arc<FieldDescriptor>),
    Association(Arc<AssociationDescriptor>),
    Filter(Arc<FilterDescriptor>),
    SortOrder(Arc<SortOrderDescriptor>),
    Conditional(Arc<ConditionalDescriptor>),
    Preload(PreloadSpec),
    Search(SearchFn),
}

/// A registered presenter: typed, read-only accessors over its configuration
/// tree. Lookups walk the tree lazily, so `extends` chains keep full
/// inheritance semantics after registration.
pub struct PresenterDefinition {
    name: String,
    node: Arc<ConfigNode<Setting>>,
}

impl PresenterDefinition {
    pub(crate) fn new(name: String, node: Arc<ConfigNode<Setting>>) -> Self {
        Self { name, node }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn node(&self) -> &Arc<ConfigNode<Setting>> {
        &self.node
    }

    /// Registered key: envelope bucket name and the `key` of `{key, id}` refs.
    pub fn key(&self) -> String {
        match self.node.get("key") {
            Some(Setting::Value(Value::String(s))) => s,
            _ => self.name.to_lowercase(),
        }
    }

    /// Model type names this presenter presents.
    pub fn presents(&self) -> Vec<String> {
        match self.node.get("presents") {
            Some(Setting::Value(Value::Array(items))) => items
                .into_iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn fields(&self) -> HashMap<String, Arc<FieldDescriptor>> {
        self.descriptor_map("fields", |s| match s {
            Setting::Field(f) => Some(f),
            _ => None,
        })
    }

    pub fn field(&self, name: &str) -> Option<Arc<FieldDescriptor>> {
        match self.node.nested("fields")?.get(name) {
            Some(Setting::Field(f)) => Some(f),
            _ => None,
        }
    }

    pub fn associations(&self) -> HashMap<String, Arc<AssociationDescriptor>> {
        self.descriptor_map("associations", |s| match s {
            Setting::Association(a) => Some(a),
            _ => None,
        })
    }

    pub fn association(&self, name: &str) -> Option<Arc<AssociationDescriptor>> {
        match self.node.nested("associations")?.get(name) {
            Some(Setting::Association(a)) => Some(a),
            _ => None,
        }
    }

    /// Filters in declaration order, ancestors first. A redeclared name keeps
    /// its original position but takes the newest descriptor.
    pub fn filters(&self) -> Vec<Arc<FilterDescriptor>> {
        let items = self.node.list("filters").unwrap_or_default();
        let mut order: Vec<String> = Vec::new();
        let mut by_name: HashMap<String, Arc<FilterDescriptor>> = HashMap::new();
        for item in items {
            if let Setting::Filter(f) = item {
                if !by_name.contains_key(&f.name) {
                    order.push(f.name.clone());
                }
                by_name.insert(f.name.clone(), f);
            }
        }
        order
            .into_iter()
            .filter_map(|name| by_name.remove(&name))
            .collect()
    }

    pub fn filter(&self, name: &str) -> Option<Arc<FilterDescriptor>> {
        self.filters().into_iter().find(|f| f.name == name)
    }

    pub fn sort_orders(&self) -> HashMap<String, Arc<SortOrderDescriptor>> {
        self.descriptor_map("sort_orders", |s| match s {
            Setting::SortOrder(o) => Some(o),
            _ => None,
        })
    }

    pub fn sort_order(&self, name: &str) -> Option<Arc<SortOrderDescriptor>> {
        match self.node.nested("sort_orders")?.get(name) {
            Some(Setting::SortOrder(o)) => Some(o),
            _ => None,
        }
    }

    pub fn conditional(&self, name: &str) -> Option<Arc<ConditionalDescriptor>> {
        match self.node.nested("conditionals")?.get(name) {
            Some(Setting::Conditional(c)) => Some(c),
            _ => None,
        }
    }

    /// Presenter-level `"field:direction"` default sort, parsed.
    pub fn default_sort_order(&self) -> Option<(String, SortDirection)> {
        match self.node.get("default_sort_order") {
            Some(Setting::Value(Value::String(s))) => {
                let mut parts = s.splitn(2, ':');
                let field = parts.next()?.trim().to_string();
                let direction = SortDirection::parse(parts.next().unwrap_or("asc").trim());
                Some((field, direction))
            }
            _ => None,
        }
    }

    /// Associations the presenter always preloads, requested or not.
    pub fn preloads(&self) -> Vec<PreloadSpec> {
        self.node
            .list("preloads")
            .unwrap_or_default()
            .into_iter()
            .filter_map(|s| match s {
                Setting::Preload(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn search(&self) -> Option<SearchFn> {
        match self.node.get("search") {
            Some(Setting::Search(f)) => Some(f),
            _ => None,
        }
    }

    /// Snapshot consumed by external documentation formatters.
    pub fn metadata(&self) -> PresenterMetadata {
        let mut fields: Vec<FieldMeta> = self
            .fields()
            .values()
            .map(|f| FieldMeta {
                name: f.response_name().to_string(),
                field_type: f.field_type.as_str().to_string(),
                optional: f.optional,
                info: f.info.clone(),
            })
            .collect();
        fields.sort_by(|a, b| a.name.cmp(&b.name));

        let mut associations: Vec<AssociationMeta> = self
            .associations()
            .values()
            .map(|a| AssociationMeta {
                name: a.response_name().to_string(),
                target: match &a.target {
                    AssociationTarget::Single(t) => vec![t.clone()],
                    AssociationTarget::Polymorphic(ts) => ts.clone(),
                },
                polymorphic: a.is_polymorphic(),
                has_many: a.cardinality == Cardinality::HasMany,
                restrict_to_only: a.restrict_to_only,
                info: a.info.clone(),
            })
            .collect();
        associations.sort_by(|a, b| a.name.cmp(&b.name));

        let filters = self
            .filters()
            .iter()
            .map(|f| FilterMeta {
                name: f.name.clone(),
                default: f.default.clone(),
                info: f.info.clone(),
            })
            .collect();

        let mut sort_orders: Vec<SortOrderMeta> = self
            .sort_orders()
            .values()
            .map(|o| SortOrderMeta {
                name: o.name.clone(),
                info: o.info.clone(),
            })
            .collect();
        sort_orders.sort_by(|a, b| a.name.cmp(&b.name));

        PresenterMetadata {
            name: self.name.clone(),
            key: self.key(),
            presents: self.presents(),
            default_sort_order: self
                .default_sort_order()
                .map(|(f, d)| format!("{}:{}", f, if d == SortDirection::Desc { "desc" } else { "asc" })),
            fields,
            associations,
            filters,
            sort_orders,
        }
    }

    fn descriptor_map<T, F>(&self, nest: &str, pick: F) -> HashMap<String, T>
    where
        F: Fn(Setting) -> Option<T>,
    {
        let mut out = HashMap::new();
        let Some(node) = self.node.nested(nest) else {
            return out;
        };
        for (name, entry) in node.to_map() {
            if let ResolvedEntry::Leaf(setting) = entry {
                if let Some(descriptor) = pick(setting) {
                    out.insert(name, descriptor);
                }
            }
        }
        out
    }
}

/// Presenter/endpoint metadata for documentation formatters.
#[derive(Clone, Debug, Serialize)]
pub struct PresenterMetadata {
    pub name: String,
    pub key: String,
    pub presents: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_sort_order: Option<String>,
    pub fields: Vec<FieldMeta>,
    pub associations: Vec<AssociationMeta>,
    pub filters: Vec<FilterMeta>,
    pub sort_orders: Vec<SortOrderMeta>,
}

#[derive(Clone, Debug, Serialize)]
pub struct FieldMeta {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub optional: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct AssociationMeta {
    pub name: String,
    pub target: Vec<String>,
    pub polymorphic: bool,
    pub has_many: bool,
    pub restrict_to_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct FilterMeta {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SortOrderMeta {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}
