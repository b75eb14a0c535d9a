//! Example consumer: a separate Rust project that uses presenter-sdk as a dependency.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! Or from this directory: `cargo run`

use presenter_sdk::{
    AssociationDescriptor, AttrValue, FieldDescriptor, FieldType, FilterDescriptor, Params,
    PresentArgs, PresenterBuilder, PresenterCollection, PresenterRegistry, SortOrderDescriptor,
};
use presenter_sdk::memory::{MemoryModel, MemoryStore};
use serde_json::json;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("presenter_sdk=debug")),
        )
        .init();

    let mut registry = PresenterRegistry::new();
    registry.register(
        PresenterBuilder::new("WorkspacePresenter")
            .presents("Workspace")
            .field(FieldDescriptor::property("name", FieldType::String)),
    )?;
    registry.register(
        PresenterBuilder::new("TaskPresenter")
            .presents("Task")
            .field(FieldDescriptor::property("title", FieldType::String))
            .field(FieldDescriptor::property("done", FieldType::Boolean))
            .field(FieldDescriptor::property("due_on", FieldType::Date).optional())
            .association(AssociationDescriptor::belongs_to("workspace", "Workspace"))
            .filter(FilterDescriptor::scope("done").default(json!("false")))
            .sort_order(SortOrderDescriptor::column("title", "title"))
            .default_sort_order("title:asc"),
    )?;

    let mut store = MemoryStore::new();
    let workspace = store.insert(MemoryModel::new("Workspace", 9).with("name", "ops"));
    for (id, title, done) in [(1, "write docs", false), (2, "cut release", true), (3, "audit deps", false)] {
        let task = store.insert(
            MemoryModel::new("Task", id)
                .with("title", title)
                .with("done", done)
                .with("workspace_id", 9i64)
                .with("due_on", AttrValue::Json(json!("2026-09-01"))),
        );
        store.link_one(&task, "workspace", &workspace);
    }
    store.named_scope("done", |rows, arg| {
        let wanted = arg.as_str() == Some("true") || arg.as_bool() == Some(true);
        rows.into_iter()
            .filter(|m| {
                m.attribute("done")
                    .map(|v| v.is_present() == wanted)
                    .unwrap_or(!wanted)
            })
            .collect()
    });
    let store = Arc::new(store);

    let collection = PresenterCollection::new(Arc::new(registry), store.clone());
    let params = Params::from_pairs([
        ("include", json!("workspace")),
        ("optional_fields", json!("due_on")),
    ]);
    let envelope = collection
        .presenting("Task", store.scope("Task"), PresentArgs::with_params(params))
        .await?;

    tracing::info!(count = envelope.count, "presented tasks");
    println!("{}", serde_json::to_string_pretty(&envelope.to_value())?);
    Ok(())
}
