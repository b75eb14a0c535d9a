//! Batch rendering of models through their presenter's descriptors.

use crate::data::{
    id_string, AssociationValue, AttrValue, DataSource, Model, ModelRef, PreloadSpec,
};
use crate::error::{ConfigError, PresenterError};
use crate::presenter::{
    AssociationDescriptor, Cardinality, ConditionalKind, FieldDescriptor, FieldKind, Helper,
    PresenterDefinition, PresenterRegistry, RenderTarget,
};
use crate::service::preload::Preloader;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Sink for associated objects resolved during a render, keyed by registered
/// presenter key and deduplicated by id.
#[derive(Default)]
pub struct AssociatedObjects {
    buckets: HashMap<String, Vec<ModelRef>>,
    seen: HashSet<(String, String)>,
}

impl AssociatedObjects {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, key: &str, model: ModelRef) {
        let id = id_string(model.as_ref());
        if self.seen.insert((key.to_string(), id)) {
            self.buckets.entry(key.to_string()).or_default().push(model);
        }
    }

    pub fn into_buckets(self) -> HashMap<String, Vec<ModelRef>> {
        self.buckets
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// Memoized conditional results for one render batch. The model slot is
/// cleared per model; stale entries across models would leak one model's
/// visibility onto the next.
#[derive(Default)]
struct ConditionalCache {
    request: HashMap<String, bool>,
    model: HashMap<String, bool>,
}

pub struct Renderer<'a> {
    registry: &'a PresenterRegistry,
    data: &'a dyn DataSource,
}

impl<'a> Renderer<'a> {
    pub fn new(registry: &'a PresenterRegistry, data: &'a dyn DataSource) -> Self {
        Self { registry, data }
    }

    /// Render `models` through `presenter`, in input order. Requested
    /// association names not declared are silently ignored; optional fields
    /// render only when named in `optional_fields`. When a sink is supplied,
    /// explicitly requested association values are deposited into it.
    pub async fn group_present(
        &self,
        presenter: &PresenterDefinition,
        models: &[ModelRef],
        requested_associations: &[String],
        optional_fields: &[String],
        helper: &Helper,
        mut sink: Option<&mut AssociatedObjects>,
    ) -> Result<Vec<Map<String, Value>>, PresenterError> {
        let fields = presenter.fields();
        let associations = presenter.associations();
        let requested: HashSet<String> = requested_associations
            .iter()
            .filter(|name| associations.contains_key(*name))
            .cloned()
            .collect();
        let optional: HashSet<String> = optional_fields.iter().cloned().collect();

        // One batched preload: requested associations plus the presenter's
        // declared always-preloads.
        let mut preload_specs: Vec<PreloadSpec> = requested
            .iter()
            .map(|name| PreloadSpec::Name(name.clone()))
            .collect();
        preload_specs.extend(presenter.preloads());
        let valid: HashSet<String> = associations.keys().cloned().collect();
        Preloader::preload(self.data, models, &preload_specs, &valid).await?;

        let mut field_names: Vec<&String> = fields.keys().collect();
        field_names.sort();
        let mut association_names: Vec<&String> = associations.keys().collect();
        association_names.sort();

        let mut cache = ConditionalCache::default();
        let mut out = Vec::with_capacity(models.len());
        for model in models {
            cache.model.clear();
            let helper = helper.fresh();
            let mut rendered = Map::new();

            for name in &field_names {
                let field = &fields[*name];
                if field.optional && !optional.contains(*name) {
                    continue;
                }
                let target = RenderTarget::Model(model.as_ref());
                if let Some(value) =
                    self.render_field(presenter, field, &target, model.as_ref(), &helper, &mut cache)?
                {
                    rendered.insert(field.response_name().to_string(), value);
                }
            }

            // Id/ref derivation runs for every declared association, so
            // foreign-key shortcuts appear even when not requested.
            for name in &association_names {
                let association = &associations[*name];
                self.render_association(
                    association,
                    model,
                    &helper,
                    requested.contains(*name),
                    &mut rendered,
                    &mut sink,
                )
                .await?;
            }

            rendered.insert("id".to_string(), Value::String(id_string(model.as_ref())));
            out.push(rendered);
        }
        Ok(out)
    }

    fn render_field(
        &self,
        presenter: &PresenterDefinition,
        field: &FieldDescriptor,
        target: &RenderTarget<'_>,
        model: &dyn Model,
        helper: &Helper,
        cache: &mut ConditionalCache,
    ) -> Result<Option<Value>, PresenterError> {
        if !self.conditionals_hold(presenter, &field.conditionals, model, helper, cache)? {
            return Ok(None);
        }
        match &field.kind {
            FieldKind::Scalar(source) => Ok(Some(source.evaluate(target, helper).canonical())),
            FieldKind::Branch { via, children } => {
                let gated;
                let child_target = match via {
                    Some(source) => {
                        gated = source.evaluate(target, helper);
                        if !gated.is_present() {
                            return Ok(None);
                        }
                        RenderTarget::Item(&gated)
                    }
                    None => RenderTarget::Model(model),
                };
                // All children individually suppressed still yields an empty
                // map; the branch key's presence is part of the wire shape.
                let mut obj = Map::new();
                for child in children {
                    if let Some(value) =
                        self.render_field(presenter, child, &child_target, model, helper, cache)?
                    {
                        obj.insert(child.response_name().to_string(), value);
                    }
                }
                Ok(Some(Value::Object(obj)))
            }
            FieldKind::ArrayBranch { via, children } => {
                let value = via.evaluate(target, helper);
                let items: Vec<AttrValue> = match value {
                    AttrValue::List(items) => items,
                    AttrValue::Json(Value::Array(items)) => {
                        items.into_iter().map(AttrValue::Json).collect()
                    }
                    _ => Vec::new(),
                };
                let mut arr = Vec::with_capacity(items.len());
                for item in &items {
                    let child_target = RenderTarget::Item(item);
                    let mut obj = Map::new();
                    for child in children {
                        if let Some(value) = self.render_field(
                            presenter,
                            child,
                            &child_target,
                            model,
                            helper,
                            cache,
                        )? {
                            obj.insert(child.response_name().to_string(), value);
                        }
                    }
                    arr.push(Value::Object(obj));
                }
                Ok(Some(Value::Array(arr)))
            }
        }
    }

    fn conditionals_hold(
        &self,
        presenter: &PresenterDefinition,
        names: &[String],
        model: &dyn Model,
        helper: &Helper,
        cache: &mut ConditionalCache,
    ) -> Result<bool, PresenterError> {
        for name in names {
            let conditional = presenter.conditional(name).ok_or_else(|| {
                PresenterError::Config(ConfigError::Invalid(format!(
                    "unknown conditional '{}'",
                    name
                )))
            })?;
            let holds = match &conditional.kind {
                ConditionalKind::OnRequest(f) => match cache.request.get(name) {
                    Some(cached) => *cached,
                    None => {
                        let value = f(helper);
                        cache.request.insert(name.clone(), value);
                        value
                    }
                },
                ConditionalKind::OnModel(f) => match cache.model.get(name) {
                    Some(cached) => *cached,
                    None => {
                        let value = f(model, helper);
                        cache.model.insert(name.clone(), value);
                        value
                    }
                },
            };
            if !holds {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Id/ref derivation, in strict priority order: foreign-key shortcut,
    /// legacy polymorphic ref, explicit-request load, nothing.
    async fn render_association(
        &self,
        association: &AssociationDescriptor,
        model: &ModelRef,
        helper: &Helper,
        requested: bool,
        out: &mut Map<String, Value>,
        sink: &mut Option<&mut AssociatedObjects>,
    ) -> Result<(), PresenterError> {
        let response_name = association.response_name();
        let singular = association.cardinality != Cardinality::HasMany;
        // Plural names are singularized before the `_ids`/`_refs` suffix:
        // "followers" emits "follower_ids".
        let plural_stem = singularize(response_name);
        let foreign_key = (!association.is_polymorphic() && singular)
            .then(|| model.attribute(&association.foreign_key_column()))
            .flatten()
            .filter(|v| v.is_present());

        // Explicitly requested associations are always resolved so the
        // objects reach the side buckets, even when the emitted id comes
        // from the foreign-key column.
        let mut loaded = None;
        if requested {
            let value = self.load_association(association, model, helper).await?;
            if let Some(sink) = sink.as_deref_mut() {
                self.deposit(sink, &value)?;
            }
            loaded = Some(value);
        }

        if let Some(fk) = foreign_key {
            out.insert(
                format!("{}_id", response_name),
                Value::String(crate::data::value_id_string(&fk.canonical())),
            );
            return Ok(());
        }

        if association.is_polymorphic() && association.always_return_ref && !requested {
            let stored_id = model
                .attribute(&association.foreign_key_column())
                .filter(|v| v.is_present());
            let stored_type = model
                .attribute(&association.type_column())
                .and_then(|v| match v.canonical() {
                    Value::String(s) => Some(s),
                    _ => None,
                });
            if let (Some(id), Some(type_name)) = (stored_id, stored_type) {
                if let Some(target) = self.registry.get(&type_name) {
                    out.insert(
                        format!("{}_ref", response_name),
                        ref_value(&crate::data::value_id_string(&id.canonical()), &target.key()),
                    );
                }
            }
            return Ok(());
        }

        let Some(loaded) = loaded else {
            return Ok(());
        };
        match loaded {
            AssociationValue::None => {
                if singular {
                    let key = if association.is_polymorphic() { "_ref" } else { "_id" };
                    out.insert(format!("{}{}", response_name, key), Value::Null);
                } else {
                    let key = if association.is_polymorphic() { "_refs" } else { "_ids" };
                    out.insert(format!("{}{}", plural_stem, key), Value::Array(Vec::new()));
                }
            }
            AssociationValue::One(target) => {
                let id = id_string(target.as_ref());
                if association.is_polymorphic() {
                    let key = self.registry.presenter_for(target.type_name())?.key();
                    out.insert(format!("{}_ref", response_name), ref_value(&id, &key));
                } else {
                    out.insert(format!("{}_id", response_name), Value::String(id));
                }
            }
            AssociationValue::Many(targets) => {
                if association.is_polymorphic() {
                    let mut refs = Vec::with_capacity(targets.len());
                    for target in &targets {
                        let key = self.registry.presenter_for(target.type_name())?.key();
                        refs.push(ref_value(&id_string(target.as_ref()), &key));
                    }
                    out.insert(format!("{}_refs", plural_stem), Value::Array(refs));
                } else {
                    let ids = targets
                        .iter()
                        .map(|t| Value::String(id_string(t.as_ref())))
                        .collect();
                    out.insert(format!("{}_ids", plural_stem), Value::Array(ids));
                }
            }
        }
        Ok(())
    }

    async fn load_association(
        &self,
        association: &AssociationDescriptor,
        model: &ModelRef,
        helper: &Helper,
    ) -> Result<AssociationValue, PresenterError> {
        match &association.loader {
            Some(loader) => Ok(loader(model.as_ref(), helper)),
            None => self.data.association(model, &association.name).await,
        }
    }

    fn deposit(
        &self,
        sink: &mut AssociatedObjects,
        value: &AssociationValue,
    ) -> Result<(), PresenterError> {
        let mut push = |model: &ModelRef| -> Result<(), PresenterError> {
            let key = self.registry.presenter_for(model.type_name())?.key();
            sink.insert(&key, Arc::clone(model));
            Ok(())
        };
        match value {
            AssociationValue::None => Ok(()),
            AssociationValue::One(model) => push(model),
            AssociationValue::Many(models) => {
                for model in models {
                    push(model)?;
                }
                Ok(())
            }
        }
    }
}

fn ref_value(id: &str, key: &str) -> Value {
    serde_json::json!({ "id": id, "key": key })
}

/// Naive singular form, mirroring the registry's key pluralizer:
/// "followers" -> "follower".
fn singularize(name: &str) -> &str {
    name.strip_suffix('s').unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SortDirection;
    use crate::memory::{MemoryModel, MemoryStore};
    use crate::params::Params;
    use crate::presenter::{
        AssociationDescriptor, ConditionalDescriptor, FieldDescriptor, FieldType,
        PresenterBuilder, PresenterRegistry,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn registry_for_tasks() -> PresenterRegistry {
        let mut registry = PresenterRegistry::new();
        registry
            .register(
                PresenterBuilder::new("TaskPresenter")
                    .presents("Task")
                    .field(FieldDescriptor::property("title", FieldType::String))
                    .association(AssociationDescriptor::belongs_to("workspace", "Workspace")),
            )
            .unwrap();
        registry
            .register(
                PresenterBuilder::new("WorkspacePresenter")
                    .presents("Workspace")
                    .field(FieldDescriptor::property("name", FieldType::String)),
            )
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn foreign_key_shortcut_wins_even_when_requested() {
        let registry = registry_for_tasks();
        let mut store = MemoryStore::new();
        let workspace = store.insert(MemoryModel::new("Workspace", 9).with("name", "ops"));
        let task = store.insert(
            MemoryModel::new("Task", 1)
                .with("title", "ship it")
                .with("workspace_id", 9i64),
        );
        store.link_one(&task, "workspace", &workspace);
        let store = Arc::new(store);

        let presenter = registry.presenter_for("Task").unwrap();
        let renderer = Renderer::new(&registry, store.as_ref());
        let helper = Helper::new(Params::new());
        let mut sink = AssociatedObjects::new();
        let rendered = renderer
            .group_present(
                &presenter,
                &[task],
                &["workspace".to_string()],
                &[],
                &helper,
                Some(&mut sink),
            )
            .await
            .unwrap();

        assert_eq!(rendered[0]["workspace_id"], json!("9"));
        assert_eq!(rendered[0]["id"], json!("1"));
        let buckets = sink.into_buckets();
        assert_eq!(buckets["workspaces"].len(), 1);
    }

    #[tokio::test]
    async fn unrequested_association_still_emits_foreign_key() {
        let registry = registry_for_tasks();
        let mut store = MemoryStore::new();
        let task = store.insert(MemoryModel::new("Task", 1).with("workspace_id", 9i64));
        let store = Arc::new(store);
        drop(task);

        let presenter = registry.presenter_for("Task").unwrap();
        let renderer = Renderer::new(&registry, store.as_ref());
        let helper = Helper::new(Params::new());
        let models = store.scope("Task").rows().await.unwrap();
        let rendered = renderer
            .group_present(&presenter, &models, &[], &[], &helper, None)
            .await
            .unwrap();
        assert_eq!(rendered[0]["workspace_id"], json!("9"));
        assert_eq!(store.preload_calls().len(), 0);
    }

    #[tokio::test]
    async fn plural_association_keys_are_singularized() {
        let mut registry = PresenterRegistry::new();
        registry
            .register(
                PresenterBuilder::new("TaskPresenter")
                    .presents("Task")
                    .association(AssociationDescriptor::has_many("followers", "User")),
            )
            .unwrap();
        registry
            .register(PresenterBuilder::new("UserPresenter").presents("User"))
            .unwrap();

        let mut store = MemoryStore::new();
        let user = store.insert(MemoryModel::new("User", 77));
        let task = store.insert(MemoryModel::new("Task", 1));
        store.link_many(&task, "followers", &[user]);
        let empty = store.insert(MemoryModel::new("Task", 2));
        let store = Arc::new(store);

        let presenter = registry.presenter_for("Task").unwrap();
        let renderer = Renderer::new(&registry, store.as_ref());
        let helper = Helper::new(Params::new());
        let rendered = renderer
            .group_present(
                &presenter,
                &[task, empty],
                &["followers".to_string()],
                &[],
                &helper,
                None,
            )
            .await
            .unwrap();

        assert_eq!(rendered[0]["follower_ids"], json!(["77"]));
        assert!(rendered[0].get("followers_ids").is_none());
        assert_eq!(rendered[1]["follower_ids"], json!([]));
    }

    #[tokio::test]
    async fn polymorphic_legacy_ref_comes_from_stored_columns() {
        let mut registry = PresenterRegistry::new();
        registry
            .register(
                PresenterBuilder::new("CommentPresenter")
                    .presents("Comment")
                    .association(
                        AssociationDescriptor::polymorphic("subject", ["Task", "Post"])
                            .always_return_ref(),
                    ),
            )
            .unwrap();
        registry
            .register(PresenterBuilder::new("PostPresenter").presents("Post"))
            .unwrap();
        registry
            .register(PresenterBuilder::new("TaskPresenter").presents("Task"))
            .unwrap();

        let mut store = MemoryStore::new();
        store.insert(
            MemoryModel::new("Comment", 5)
                .with("subject_id", 42i64)
                .with("subject_type", "Post"),
        );
        let store = Arc::new(store);

        let presenter = registry.presenter_for("Comment").unwrap();
        let renderer = Renderer::new(&registry, store.as_ref());
        let helper = Helper::new(Params::new());
        let models = store.scope("Comment").rows().await.unwrap();
        let rendered = renderer
            .group_present(&presenter, &models, &[], &[], &helper, None)
            .await
            .unwrap();
        assert_eq!(
            rendered[0]["subject_ref"],
            json!({"id": "42", "key": "posts"})
        );
    }

    #[tokio::test]
    async fn conditionals_are_memoized_per_model() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_seen = Arc::clone(&calls);

        let mut registry = PresenterRegistry::new();
        registry
            .register(
                PresenterBuilder::new("TaskPresenter")
                    .presents("Task")
                    .conditional(ConditionalDescriptor::on_model("visible", move |model, _| {
                        calls_seen.fetch_add(1, Ordering::SeqCst);
                        model
                            .attribute("secret")
                            .map(|v| !v.is_present())
                            .unwrap_or(true)
                    }))
                    // two fields share one conditional
                    .field(
                        FieldDescriptor::property("title", FieldType::String)
                            .visible_if("visible"),
                    )
                    .field(
                        FieldDescriptor::property("body", FieldType::String)
                            .visible_if("visible"),
                    ),
            )
            .unwrap();

        let mut store = MemoryStore::new();
        store.insert(MemoryModel::new("Task", 1).with("title", "a").with("body", "x"));
        store.insert(
            MemoryModel::new("Task", 2)
                .with("title", "b")
                .with("body", "y")
                .with("secret", true),
        );
        let store = Arc::new(store);

        let registry_ref = &registry;
        let presenter = registry_ref.presenter_for("Task").unwrap();
        let renderer = Renderer::new(registry_ref, store.as_ref());
        let helper = Helper::new(Params::new());
        let models = store
            .scope("Task")
            .ordered("id", SortDirection::Asc)
            .rows()
            .await
            .unwrap();
        let rendered = renderer
            .group_present(&presenter, &models, &[], &[], &helper, None)
            .await
            .unwrap();

        // Once per model, not once per gated field.
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(rendered[0]["title"], json!("a"));
        assert!(!rendered[1].contains_key("title"));
        assert!(!rendered[1].contains_key("body"));
    }

    #[tokio::test]
    async fn visible_branch_with_all_children_suppressed_emits_empty_map() {
        let mut registry = PresenterRegistry::new();
        registry
            .register(
                PresenterBuilder::new("TaskPresenter")
                    .presents("Task")
                    .conditional(ConditionalDescriptor::on_request("never", |_| false))
                    .field(FieldDescriptor::branch(
                        "permissions",
                        vec![
                            FieldDescriptor::property("can_edit", FieldType::Boolean)
                                .visible_if("never"),
                        ],
                    )),
            )
            .unwrap();
        let mut store = MemoryStore::new();
        store.insert(MemoryModel::new("Task", 1).with("can_edit", true));
        let store = Arc::new(store);

        let presenter = registry.presenter_for("Task").unwrap();
        let renderer = Renderer::new(&registry, store.as_ref());
        let helper = Helper::new(Params::new());
        let models = store.scope("Task").rows().await.unwrap();
        let rendered = renderer
            .group_present(&presenter, &models, &[], &[], &helper, None)
            .await
            .unwrap();
        assert_eq!(rendered[0]["permissions"], json!({}));
    }

    #[tokio::test]
    async fn gated_branch_renders_against_its_value_or_vanishes() {
        let mut registry = PresenterRegistry::new();
        registry
            .register(
                PresenterBuilder::new("TaskPresenter")
                    .presents("Task")
                    .field(FieldDescriptor::branch_via(
                        "budget",
                        "budget_details",
                        vec![FieldDescriptor::property("amount", FieldType::Integer)],
                    )),
            )
            .unwrap();
        let mut store = MemoryStore::new();
        store.insert(
            MemoryModel::new("Task", 1)
                .with("budget_details", AttrValue::Json(json!({"amount": 120}))),
        );
        store.insert(MemoryModel::new("Task", 2));
        let store = Arc::new(store);

        let presenter = registry.presenter_for("Task").unwrap();
        let renderer = Renderer::new(&registry, store.as_ref());
        let helper = Helper::new(Params::new());
        let models = store
            .scope("Task")
            .ordered("id", SortDirection::Asc)
            .rows()
            .await
            .unwrap();
        let rendered = renderer
            .group_present(&presenter, &models, &[], &[], &helper, None)
            .await
            .unwrap();
        assert_eq!(rendered[0]["budget"], json!({"amount": 120}));
        assert!(!rendered[1].contains_key("budget"));
    }

    #[tokio::test]
    async fn optional_fields_render_only_when_requested() {
        let mut registry = PresenterRegistry::new();
        registry
            .register(
                PresenterBuilder::new("TaskPresenter")
                    .presents("Task")
                    .field(FieldDescriptor::property("title", FieldType::String))
                    .field(FieldDescriptor::property("body", FieldType::String).optional()),
            )
            .unwrap();
        let mut store = MemoryStore::new();
        store.insert(MemoryModel::new("Task", 1).with("title", "a").with("body", "long"));
        let store = Arc::new(store);

        let presenter = registry.presenter_for("Task").unwrap();
        let renderer = Renderer::new(&registry, store.as_ref());
        let helper = Helper::new(Params::new());
        let models = store.scope("Task").rows().await.unwrap();

        let plain = renderer
            .group_present(&presenter, &models, &[], &[], &helper, None)
            .await
            .unwrap();
        assert!(!plain[0].contains_key("body"));

        let with_optional = renderer
            .group_present(&presenter, &models, &[], &["body".to_string()], &helper, None)
            .await
            .unwrap();
        assert_eq!(with_optional[0]["body"], json!("long"));
    }
}
