//! Collection presentation: query, render, and assemble the envelope.

use crate::data::{id_string, DataSource, ModelRef, ScopeRef};
use crate::error::PresenterError;
use crate::params::Params;
use crate::presenter::{AssociationTarget, Helper, PresenterRegistry};
use crate::response::{Envelope, ResultRef};
use crate::service::query::{page_count, QueryOptions, QueryResult, QueryStrategy};
use crate::service::renderer::{AssociatedObjects, Renderer};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct CollectionOptions {
    pub default_per_page: u64,
    pub default_max_per_page: u64,
}

impl Default for CollectionOptions {
    fn default() -> Self {
        Self {
            default_per_page: 20,
            default_max_per_page: 200,
        }
    }
}

/// Per-request knobs for a `presenting` call.
pub struct PresentArgs {
    pub params: Params,
    pub helper: Option<Helper>,
    pub per_page: Option<u64>,
    pub max_per_page: Option<u64>,
    pub apply_default_filters: bool,
    /// Treat an empty result set as a not-found error.
    pub raise_on_empty_result: bool,
    pub empty_message: Option<String>,
}

impl Default for PresentArgs {
    fn default() -> Self {
        Self {
            params: Params::new(),
            helper: None,
            per_page: None,
            max_per_page: None,
            apply_default_filters: true,
            raise_on_empty_result: false,
            empty_message: None,
        }
    }
}

impl PresentArgs {
    pub fn with_params(params: Params) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }
}

/// Entry point tying a registry and a data source together.
pub struct PresenterCollection {
    registry: Arc<PresenterRegistry>,
    data: Arc<dyn DataSource>,
    options: CollectionOptions,
}

impl PresenterCollection {
    pub fn new(registry: Arc<PresenterRegistry>, data: Arc<dyn DataSource>) -> Self {
        Self::with_options(registry, data, CollectionOptions::default())
    }

    pub fn with_options(
        registry: Arc<PresenterRegistry>,
        data: Arc<dyn DataSource>,
        options: CollectionOptions,
    ) -> Self {
        Self {
            registry,
            data,
            options,
        }
    }

    pub fn registry(&self) -> &PresenterRegistry {
        &self.registry
    }

    /// Present `scope` through the presenter registered for `type_name`.
    pub async fn presenting(
        &self,
        type_name: &str,
        scope: ScopeRef,
        args: PresentArgs,
    ) -> Result<Envelope, PresenterError> {
        let presenter = self.registry.presenter_for(type_name)?;
        tracing::debug!(type_name, key = %presenter.key(), "presenting collection");

        let query_options = QueryOptions {
            default_per_page: self.options.default_per_page,
            default_max_per_page: self.options.default_max_per_page,
            per_page: args.per_page,
            max_per_page: args.max_per_page,
            apply_default_filters: args.apply_default_filters,
        };
        let result = QueryStrategy::run(&presenter, scope, &args.params, &query_options).await?;

        if result.rows.is_empty() && args.raise_on_empty_result {
            let message = args
                .empty_message
                .unwrap_or_else(|| format!("no {} found", presenter.key()));
            return Err(PresenterError::NotFound(message));
        }

        let helper = args
            .helper
            .unwrap_or_else(|| Helper::new(args.params.clone()));
        self.structure_response(type_name, result, &args.params, &helper)
            .await
    }

    /// Present exactly one model by id. Misses are a `NotFound`, and the
    /// only-query form unlocks restricted associations for the row.
    pub async fn presenting_one(
        &self,
        type_name: &str,
        scope: ScopeRef,
        id: &str,
        mut args: PresentArgs,
    ) -> Result<Envelope, PresenterError> {
        args.params.set("only", id.to_string());
        args.raise_on_empty_result = true;
        if args.empty_message.is_none() {
            args.empty_message = Some(format!("{} '{}' not found", type_name, id));
        }
        self.presenting(type_name, scope, args).await
    }

    async fn structure_response(
        &self,
        type_name: &str,
        result: QueryResult,
        params: &Params,
        helper: &Helper,
    ) -> Result<Envelope, PresenterError> {
        let presenter = self.registry.presenter_for(type_name)?;
        let primary_key = presenter.key();
        let associations = presenter.associations();

        // Unknown includes are dropped; restricted ones unlock only for
        // explicit only-by-id queries.
        let includes: Vec<String> = params
            .get_list("include")
            .into_iter()
            .filter(|name| {
                associations
                    .get(name)
                    .map(|a| !a.restrict_to_only || result.only_query)
                    .unwrap_or(false)
            })
            .collect();
        let optional_fields: Vec<String> = params
            .get_list("optional_fields")
            .into_iter()
            .filter(|name| presenter.field(name).map(|f| f.optional).unwrap_or(false))
            .collect();

        let page_number = if result.count == 0 { 0 } else { result.page };
        let pages = if result.count == 0 {
            0
        } else {
            page_count(result.count, result.per_page)
        };
        let mut envelope = Envelope::new(result.count, page_number, pages, result.per_page);

        // Skeleton buckets: the primary key always, plus the target key of
        // every requested concrete-typed association.
        envelope.ensure_bucket(&primary_key);
        for name in &includes {
            if let Some(association) = associations.get(name) {
                if let AssociationTarget::Single(target) = &association.target {
                    envelope.ensure_bucket(&self.registry.key_for(target)?);
                }
            }
        }
        if result.rows.is_empty() {
            return Ok(envelope);
        }

        let renderer = Renderer::new(&self.registry, self.data.as_ref());
        let mut sink = AssociatedObjects::new();
        let rendered = renderer
            .group_present(
                &presenter,
                &result.rows,
                &includes,
                &optional_fields,
                helper,
                Some(&mut sink),
            )
            .await?;
        for (model, object) in result.rows.iter().zip(rendered) {
            let id = id_string(model.as_ref());
            envelope.results.push(ResultRef {
                key: primary_key.clone(),
                id: id.clone(),
            });
            envelope.insert(&primary_key, &id, Value::Object(object));
        }

        self.render_associated(&renderer, sink, helper, &mut envelope)
            .await?;
        Ok(envelope)
    }

    /// Re-render the accumulated associated objects through their own
    /// presenters, skipping ids a bucket already holds.
    async fn render_associated(
        &self,
        renderer: &Renderer<'_>,
        sink: AssociatedObjects,
        helper: &Helper,
        envelope: &mut Envelope,
    ) -> Result<(), PresenterError> {
        for (key, models) in sink.into_buckets() {
            let mut by_type: HashMap<&str, Vec<ModelRef>> = HashMap::new();
            for model in &models {
                if envelope.contains(&key, &id_string(model.as_ref())) {
                    continue;
                }
                by_type
                    .entry(model.type_name())
                    .or_default()
                    .push(Arc::clone(model));
            }
            for (type_name, batch) in by_type {
                let presenter = self.registry.presenter_for(type_name)?;
                let rendered = renderer
                    .group_present(&presenter, &batch, &[], &[], helper, None)
                    .await?;
                for (model, object) in batch.iter().zip(rendered) {
                    envelope.insert(&key, &id_string(model.as_ref()), Value::Object(object));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PresenterError;
    use crate::memory::{MemoryModel, MemoryStore};
    use crate::presenter::{AssociationDescriptor, FieldDescriptor, FieldType, PresenterBuilder};
    use serde_json::json;

    fn fixture() -> (Arc<PresenterRegistry>, Arc<MemoryStore>) {
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

        let mut store = MemoryStore::new();
        let workspace = store.insert(MemoryModel::new("Workspace", 9).with("name", "ops"));
        for id in 1..=3i64 {
            let task = store.insert(
                MemoryModel::new("Task", id)
                    .with("title", format!("task {}", id))
                    .with("workspace_id", 9i64),
            );
            store.link_one(&task, "workspace", &workspace);
        }
        (Arc::new(registry), Arc::new(store))
    }

    #[tokio::test]
    async fn include_populates_a_side_bucket_once() {
        let (registry, store) = fixture();
        let collection = PresenterCollection::new(registry, store.clone());
        let params = Params::from_pairs([("include", json!("workspace"))]);
        let envelope = collection
            .presenting("Task", store.scope("Task"), PresentArgs::with_params(params))
            .await
            .unwrap();

        let value = envelope.to_value();
        assert_eq!(value["count"], json!(3));
        assert_eq!(value["tasks"]["1"]["workspace_id"], json!("9"));
        assert_eq!(value["workspaces"]["9"]["name"], json!("ops"));
        assert_eq!(value["workspaces"].as_object().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_result_keeps_skeleton_buckets_and_zeroed_pages() {
        let (registry, store) = fixture();
        let collection = PresenterCollection::new(registry, store.clone());
        let params = Params::from_pairs([
            ("include", json!("workspace")),
            ("only", json!("999")),
        ]);
        let envelope = collection
            .presenting("Task", store.scope("Task"), PresentArgs::with_params(params))
            .await
            .unwrap();

        let value = envelope.to_value();
        assert_eq!(value["count"], json!(0));
        assert_eq!(value["page_number"], json!(0));
        assert_eq!(value["page_count"], json!(0));
        assert_eq!(value["tasks"], json!({}));
        assert_eq!(value["workspaces"], json!({}));
    }

    #[tokio::test]
    async fn raise_on_empty_result_maps_to_not_found() {
        let (registry, store) = fixture();
        let collection = PresenterCollection::new(registry, store.clone());
        let args = PresentArgs {
            params: Params::from_pairs([("only", json!("999"))]),
            raise_on_empty_result: true,
            ..PresentArgs::default()
        };
        let err = collection
            .presenting("Task", store.scope("Task"), args)
            .await
            .unwrap_err();
        assert!(matches!(err, PresenterError::NotFound(_)));
    }

    #[tokio::test]
    async fn presenting_one_misses_as_not_found() {
        let (registry, store) = fixture();
        let collection = PresenterCollection::new(registry, store.clone());

        let envelope = collection
            .presenting_one("Task", store.scope("Task"), "2", PresentArgs::default())
            .await
            .unwrap();
        assert_eq!(envelope.results.len(), 1);
        assert_eq!(envelope.results[0].id, "2");

        let err = collection
            .presenting_one("Task", store.scope("Task"), "404", PresentArgs::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PresenterError::NotFound(_)));
    }

    #[tokio::test]
    async fn unknown_type_is_a_config_failure() {
        let (registry, store) = fixture();
        let collection = PresenterCollection::new(registry, store.clone());
        let err = collection
            .presenting("Widget", store.scope("Widget"), PresentArgs::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PresenterError::UnknownPresenter { .. }));
    }
}
