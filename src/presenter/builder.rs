//! One-time presenter registration builder.

use crate::config::ConfigNode;
use crate::data::{PreloadSpec, SearchFn, SearchOptions, SearchOutcome};
use crate::error::ConfigError;
use crate::presenter::definition::{PresenterDefinition, Setting};
use crate::presenter::descriptors::{
    AssociationDescriptor, ConditionalDescriptor, FieldDescriptor, FilterDescriptor,
    SortOrderDescriptor,
};
use serde_json::Value;
use std::sync::Arc;

/// Collects a presenter's declarations, then produces an immutable
/// [`PresenterDefinition`] when handed to the registry. No mutation happens
/// after registration.
pub struct PresenterBuilder {
    name: String,
    extends: Option<String>,
    presents: Vec<String>,
    key: Option<String>,
    fields: Vec<FieldDescriptor>,
    associations: Vec<AssociationDescriptor>,
    filters: Vec<FilterDescriptor>,
    sort_orders: Vec<SortOrderDescriptor>,
    conditionals: Vec<ConditionalDescriptor>,
    default_sort_order: Option<String>,
    preloads: Vec<PreloadSpec>,
    search: Option<SearchFn>,
}

impl PresenterBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            extends: None,
            presents: Vec::new(),
            key: None,
            fields: Vec::new(),
            associations: Vec::new(),
            filters: Vec::new(),
            sort_orders: Vec::new(),
            conditionals: Vec::new(),
            default_sort_order: None,
            preloads: Vec::new(),
            search: None,
        }
    }

    /// Inherit fields, filters, sorts, and settings from a registered
    /// presenter (configuration-tree chaining, resolved lazily on read).
    pub fn extends(mut self, parent_name: impl Into<String>) -> Self {
        self.extends = Some(parent_name.into());
        self
    }

    /// Declare a model type this presenter presents; may be repeated.
    pub fn presents(mut self, type_name: impl Into<String>) -> Self {
        self.presents.push(type_name.into());
        self
    }

    /// Registered key; defaults to a pluralized lowercase of the first
    /// presented type.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn association(mut self, association: AssociationDescriptor) -> Self {
        self.associations.push(association);
        self
    }

    pub fn filter(mut self, filter: FilterDescriptor) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn sort_order(mut self, sort_order: SortOrderDescriptor) -> Self {
        self.sort_orders.push(sort_order);
        self
    }

    pub fn conditional(mut self, conditional: ConditionalDescriptor) -> Self {
        self.conditionals.push(conditional);
        self
    }

    /// `"field:direction"`; direction defaults to ascending when omitted.
    pub fn default_sort_order(mut self, order: impl Into<String>) -> Self {
        self.default_sort_order = Some(order.into());
        self
    }

    /// Association preloaded on every render, requested or not.
    pub fn preload(mut self, spec: impl Into<PreloadSpec>) -> Self {
        self.preloads.push(spec.into());
        self
    }

    /// Declare search capability; its presence selects the search strategy
    /// whenever a request carries a non-blank `search` param.
    pub fn search<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &SearchOptions) -> SearchOutcome + Send + Sync + 'static,
    {
        self.search = Some(Arc::new(f));
        self
    }

    pub(crate) fn extends_name(&self) -> Option<&str> {
        self.extends.as_deref()
    }

    /// Materialize the configuration tree. Called by the registry with the
    /// parent presenter's node when `extends` was declared.
    pub(crate) fn build(
        self,
        parent: Option<&Arc<ConfigNode<Setting>>>,
    ) -> Result<PresenterDefinition, ConfigError> {
        if self.presents.is_empty() && parent.is_none() {
            return Err(ConfigError::NoPresentedTypes(self.name));
        }

        let node = match parent {
            Some(parent) => ConfigNode::inherit(parent),
            None => ConfigNode::new(),
        };

        // Identity settings are never inherited: a subclass presenting other
        // types must not pick up its parent's key or type list.
        let presents: Vec<Value> = self.presents.iter().map(|t| Value::String(t.clone())).collect();
        node.set_nonheritable("presents", Setting::Value(Value::Array(presents)))?;
        let key = self
            .key
            .unwrap_or_else(|| default_key(self.presents.first().map(String::as_str)));
        node.set_nonheritable("key", Setting::Value(Value::String(key)))?;

        let fields = node.nest("fields")?;
        for field in self.fields {
            fields.set(field.name.clone(), Setting::Field(Arc::new(field)))?;
        }

        let associations = node.nest("associations")?;
        for association in self.associations {
            associations.set(
                association.name.clone(),
                Setting::Association(Arc::new(association)),
            )?;
        }

        let filters = node.append_list("filters")?;
        for filter in self.filters {
            filters.push(Setting::Filter(Arc::new(filter)));
        }

        let sort_orders = node.nest("sort_orders")?;
        for sort_order in self.sort_orders {
            sort_orders.set(
                sort_order.name.clone(),
                Setting::SortOrder(Arc::new(sort_order)),
            )?;
        }

        let conditionals = node.nest("conditionals")?;
        for conditional in self.conditionals {
            conditionals.set(
                conditional.name.clone(),
                Setting::Conditional(Arc::new(conditional)),
            )?;
        }

        if let Some(order) = self.default_sort_order {
            node.set("default_sort_order", Setting::Value(Value::String(order)))?;
        }

        let preloads = node.append_list("preloads")?;
        for preload in self.preloads {
            preloads.push(Setting::Preload(preload));
        }

        if let Some(search) = self.search {
            node.set("search", Setting::Search(search))?;
        }

        Ok(PresenterDefinition::new(self.name, node))
    }
}

/// Naive pluralized key from a type name: "Task" -> "tasks".
fn default_key(type_name: Option<&str>) -> String {
    let base = type_name.unwrap_or("records").to_lowercase();
    if base.ends_with('s') {
        base
    } else {
        format!("{}s", base)
    }
}
