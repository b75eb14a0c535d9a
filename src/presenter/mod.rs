//! Presenter definitions: descriptors, builder, registry.

mod builder;
mod definition;
mod descriptors;
mod helper;
mod registry;

pub use builder::PresenterBuilder;
pub use definition::{
    AssociationMeta, FieldMeta, FilterMeta, PresenterDefinition, PresenterMetadata, Setting,
    SortOrderMeta,
};
pub use descriptors::{
    AssociationDescriptor, AssociationLoaderFn, AssociationTarget, Cardinality,
    ConditionalDescriptor, ConditionalKind, FieldDescriptor, FieldFn, FieldKind, FieldSource,
    FieldType, FilterApply, FilterDescriptor, FilterFn, ModelConditionalFn, RenderTarget,
    RequestConditionalFn, SortExpr, SortFn, SortOrderDescriptor,
};
pub use helper::Helper;
pub use registry::PresenterRegistry;
