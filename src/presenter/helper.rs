//! Per-render helper handed to field/filter/sort closures.

use crate::params::Params;
use std::any::Any;
use std::sync::Arc;

/// The shared `self` every declared closure receives: the request params
/// plus an opaque caller-supplied context (current user, locale, etc.).
/// A fresh instance is handed out per model during batch rendering; it
/// carries no per-model state of its own.
#[derive(Clone, Default)]
pub struct Helper {
    params: Params,
    context: Option<Arc<dyn Any + Send + Sync>>,
}

impl Helper {
    pub fn new(params: Params) -> Self {
        Self {
            params,
            context: None,
        }
    }

    pub fn with_context<T: Any + Send + Sync>(params: Params, context: T) -> Self {
        Self {
            params,
            context: Some(Arc::new(context)),
        }
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Downcast the caller-supplied context, if one was provided.
    pub fn context<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.context.as_deref().and_then(|c| c.downcast_ref())
    }

    /// A throwaway instance for one model's render.
    pub fn fresh(&self) -> Helper {
        self.clone()
    }
}
