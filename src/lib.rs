//! Presenter SDK: declarative model-to-JSON presentation library.

pub mod config;
pub mod data;
pub mod error;
pub mod memory;
pub mod params;
pub mod presenter;
pub mod response;
pub mod service;
pub mod validator;

pub use data::{
    AssociationValue, AttrValue, DataSource, Model, ModelRef, PreloadSpec, Scope, ScopeRef,
    SearchHits, SearchOptions, SearchOutcome, SortDirection,
};
pub use error::{ConfigError, PresenterError, ValidationErrors};
pub use params::Params;
pub use presenter::{
    AssociationDescriptor, ConditionalDescriptor, FieldDescriptor, FieldType, FilterDescriptor,
    Helper, PresenterBuilder, PresenterDefinition, PresenterRegistry, SortOrderDescriptor,
};
pub use response::{Envelope, ResultRef};
pub use service::{CollectionOptions, PresentArgs, PresenterCollection};
pub use validator::{FormatRules, ParamSpec, ParamsValidator, ValidationMode};
