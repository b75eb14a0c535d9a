//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Boot-time failures: registration and DSL misuse. Fatal, never recovered.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot override a nested value: {0}")]
    NestedOverride(String),
    #[error("cannot override an appended list: {0}")]
    ListOverride(String),
    #[error("duplicate presenter registration for type '{0}'")]
    DuplicatePresenter(String),
    #[error("unknown parent presenter: {0}")]
    UnknownParent(String),
    #[error("presenter '{0}' declares no presented types")]
    NoPresentedTypes(String),
    #[error("config: {0}")]
    Invalid(String),
}

/// Request-time failures raised by the presenting pipeline.
#[derive(Error, Debug)]
pub enum PresenterError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("no presenter registered for type '{type_name}'")]
    UnknownPresenter { type_name: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation failed")]
    Validation(ValidationErrors),
    #[error("search is unavailable")]
    SearchUnavailable,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("data source: {0}")]
    DataSource(String),
}

/// Aggregated request-shape violations. Entries are either plain key names
/// (strings) or `{parent_key: [...]}` maps attributing nested violations.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ValidationErrors {
    pub unknown_params: Vec<Value>,
    pub malformed_params: Vec<Value>,
}

impl ValidationErrors {
    pub fn is_empty(&self) -> bool {
        self.unknown_params.is_empty() && self.malformed_params.is_empty()
    }

    pub fn unknown(&mut self, key: impl Into<String>) {
        self.unknown_params.push(Value::String(key.into()));
    }

    pub fn malformed(&mut self, entry: impl Into<Value>) {
        self.malformed_params.push(entry.into());
    }

    /// Merge a child's violations under `parent_key`, preserving nesting.
    pub fn merge_under(&mut self, parent_key: &str, child: ValidationErrors) {
        if !child.unknown_params.is_empty() {
            self.unknown_params
                .push(serde_json::json!({ parent_key: child.unknown_params }));
        }
        if !child.malformed_params.is_empty() {
            self.malformed_params
                .push(serde_json::json!({ parent_key: child.malformed_params }));
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl IntoResponse for PresenterError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            PresenterError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            PresenterError::UnknownPresenter { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "unknown_presenter")
            }
            PresenterError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            PresenterError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            PresenterError::SearchUnavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, "search_unavailable")
            }
            PresenterError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            PresenterError::DataSource(_) => (StatusCode::INTERNAL_SERVER_ERROR, "data_source_error"),
        };
        let details = match &self {
            PresenterError::Validation(errors) => serde_json::to_value(errors).ok(),
            _ => None,
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details,
            },
        };
        (status, Json(body)).into_response()
    }
}
