//! Explicit presenter registry: model type name -> presenter.

use crate::error::{ConfigError, PresenterError};
use crate::presenter::builder::PresenterBuilder;
use crate::presenter::definition::{PresenterDefinition, PresenterMetadata};
use std::collections::HashMap;
use std::sync::Arc;

/// Maps presented model types to their presenters. Constructed once at boot
/// and passed by reference to the orchestrator; there is no ambient global.
#[derive(Default)]
pub struct PresenterRegistry {
    by_type: HashMap<String, Arc<PresenterDefinition>>,
    by_name: HashMap<String, Arc<PresenterDefinition>>,
}

impl PresenterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a presenter, resolving its `extends` parent by presenter
    /// name. Parents must be registered first.
    pub fn register(
        &mut self,
        builder: PresenterBuilder,
    ) -> Result<Arc<PresenterDefinition>, ConfigError> {
        let parent = match builder.extends_name() {
            Some(parent_name) => Some(
                self.by_name
                    .get(parent_name)
                    .ok_or_else(|| ConfigError::UnknownParent(parent_name.to_string()))?
                    .node()
                    .clone(),
            ),
            None => None,
        };
        let definition = Arc::new(builder.build(parent.as_ref())?);

        for type_name in definition.presents() {
            if self.by_type.contains_key(&type_name) {
                return Err(ConfigError::DuplicatePresenter(type_name));
            }
        }
        if self.by_name.contains_key(definition.name()) {
            return Err(ConfigError::DuplicatePresenter(definition.name().to_string()));
        }

        for type_name in definition.presents() {
            self.by_type.insert(type_name, Arc::clone(&definition));
        }
        self.by_name
            .insert(definition.name().to_string(), Arc::clone(&definition));
        Ok(definition)
    }

    /// Required lookup: errors with the offending type name when absent.
    pub fn presenter_for(&self, type_name: &str) -> Result<Arc<PresenterDefinition>, PresenterError> {
        self.by_type
            .get(type_name)
            .cloned()
            .ok_or_else(|| PresenterError::UnknownPresenter {
                type_name: type_name.to_string(),
            })
    }

    /// Optional lookup.
    pub fn get(&self, type_name: &str) -> Option<Arc<PresenterDefinition>> {
        self.by_type.get(type_name).cloned()
    }

    pub fn by_name(&self, presenter_name: &str) -> Option<Arc<PresenterDefinition>> {
        self.by_name.get(presenter_name).cloned()
    }

    /// Registered key for a model type (required lookup).
    pub fn key_for(&self, type_name: &str) -> Result<String, PresenterError> {
        Ok(self.presenter_for(type_name)?.key())
    }

    /// Metadata for every registered presenter, for documentation output.
    pub fn metadata(&self) -> Vec<PresenterMetadata> {
        let mut out: Vec<PresenterMetadata> =
            self.by_name.values().map(|d| d.metadata()).collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }
}
