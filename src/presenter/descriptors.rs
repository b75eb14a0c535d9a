//! Field, association, filter, sort, and conditional descriptors.
//!
//! Descriptors are the typed leaves of a presenter's configuration tree,
//! built once at registration and read-only afterward. Closures are stored
//! behind `Arc` so a subclass presenter can share its parent's descriptors.

use crate::data::{AssociationValue, AttrValue, Model, ScopeRef, SortDirection};
use crate::error::PresenterError;
use crate::params::Params;
use crate::presenter::helper::Helper;
use serde_json::Value;
use std::sync::Arc;

/// What a field renders against: a model, or one element of an
/// array-branch's collection.
pub enum RenderTarget<'a> {
    Model(&'a dyn Model),
    Item(&'a AttrValue),
}

impl RenderTarget<'_> {
    pub fn attribute(&self, name: &str) -> Option<AttrValue> {
        match self {
            RenderTarget::Model(model) => model.attribute(name),
            RenderTarget::Item(AttrValue::Map(map)) => map.get(name).cloned(),
            RenderTarget::Item(AttrValue::Json(Value::Object(obj))) => {
                obj.get(name).cloned().map(AttrValue::Json)
            }
            RenderTarget::Item(_) => None,
        }
    }

    pub fn model(&self) -> Option<&dyn Model> {
        match self {
            RenderTarget::Model(model) => Some(*model),
            RenderTarget::Item(_) => None,
        }
    }
}

pub type FieldFn = Arc<dyn Fn(&RenderTarget<'_>, &Helper) -> AttrValue + Send + Sync>;
pub type ModelConditionalFn = Arc<dyn Fn(&dyn Model, &Helper) -> bool + Send + Sync>;
pub type RequestConditionalFn = Arc<dyn Fn(&Helper) -> bool + Send + Sync>;
pub type FilterFn =
    Arc<dyn Fn(ScopeRef, &Value, Option<&Params>) -> Result<ScopeRef, PresenterError> + Send + Sync>;
pub type SortFn = Arc<dyn Fn(ScopeRef, SortDirection) -> ScopeRef + Send + Sync>;
pub type AssociationLoaderFn =
    Arc<dyn Fn(&dyn Model, &Helper) -> AssociationValue + Send + Sync>;

/// Declared type of a field, carried for documentation output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Decimal,
    Boolean,
    Date,
    Datetime,
    Array,
    Hash,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Decimal => "decimal",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Datetime => "datetime",
            FieldType::Array => "array",
            FieldType::Hash => "hash",
        }
    }
}

/// Where a field's value comes from.
#[derive(Clone)]
pub enum FieldSource {
    /// Named attribute on the render target.
    Property(String),
    Computed(FieldFn),
}

impl FieldSource {
    pub fn evaluate(&self, target: &RenderTarget<'_>, helper: &Helper) -> AttrValue {
        match self {
            FieldSource::Property(name) => target
                .attribute(name)
                .unwrap_or(AttrValue::Json(Value::Null)),
            FieldSource::Computed(f) => f(target, helper),
        }
    }
}

#[derive(Clone)]
pub enum FieldKind {
    Scalar(FieldSource),
    /// Nested map of child fields. When `via` is set, the branch is gated on
    /// that value being present, and children render against it.
    Branch {
        via: Option<FieldSource>,
        children: Vec<Arc<FieldDescriptor>>,
    },
    /// `via` must yield a list; children render once per element.
    ArrayBranch {
        via: FieldSource,
        children: Vec<Arc<FieldDescriptor>>,
    },
}

#[derive(Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    pub kind: FieldKind,
    /// Names of conditionals that must all hold for the field to render.
    pub conditionals: Vec<String>,
    /// Rendered only when the request asks for it via `optional_fields`.
    pub optional: bool,
    /// Key emitted in the output, when different from `name`.
    pub response_key: Option<String>,
    pub info: Option<String>,
}

impl FieldDescriptor {
    /// Scalar field reading the attribute of the same name.
    pub fn property(name: impl Into<String>, field_type: FieldType) -> Self {
        let name = name.into();
        let source = FieldSource::Property(name.clone());
        Self::scalar(name, field_type, source)
    }

    /// Scalar field reading a differently-named attribute.
    pub fn property_via(
        name: impl Into<String>,
        field_type: FieldType,
        accessor: impl Into<String>,
    ) -> Self {
        Self::scalar(name.into(), field_type, FieldSource::Property(accessor.into()))
    }

    pub fn computed<F>(name: impl Into<String>, field_type: FieldType, f: F) -> Self
    where
        F: Fn(&RenderTarget<'_>, &Helper) -> AttrValue + Send + Sync + 'static,
    {
        Self::scalar(name.into(), field_type, FieldSource::Computed(Arc::new(f)))
    }

    pub fn branch(name: impl Into<String>, children: Vec<FieldDescriptor>) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Hash,
            kind: FieldKind::Branch {
                via: None,
                children: children.into_iter().map(Arc::new).collect(),
            },
            conditionals: Vec::new(),
            optional: false,
            response_key: None,
            info: None,
        }
    }

    /// Branch gated on (and rendered against) an accessor's value.
    pub fn branch_via(
        name: impl Into<String>,
        accessor: impl Into<String>,
        children: Vec<FieldDescriptor>,
    ) -> Self {
        let mut field = Self::branch(name, children);
        if let FieldKind::Branch { via, .. } = &mut field.kind {
            *via = Some(FieldSource::Property(accessor.into()));
        }
        field
    }

    /// Array of sub-objects, one per element of the accessor's collection.
    pub fn array(
        name: impl Into<String>,
        accessor: impl Into<String>,
        children: Vec<FieldDescriptor>,
    ) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Array,
            kind: FieldKind::ArrayBranch {
                via: FieldSource::Property(accessor.into()),
                children: children.into_iter().map(Arc::new).collect(),
            },
            conditionals: Vec::new(),
            optional: false,
            response_key: None,
            info: None,
        }
    }

    fn scalar(name: String, field_type: FieldType, source: FieldSource) -> Self {
        Self {
            name,
            field_type,
            kind: FieldKind::Scalar(source),
            conditionals: Vec::new(),
            optional: false,
            response_key: None,
            info: None,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Gate on a named conditional; may be called repeatedly (all must hold).
    pub fn visible_if(mut self, conditional: impl Into<String>) -> Self {
        self.conditionals.push(conditional.into());
        self
    }

    pub fn with_response_key(mut self, key: impl Into<String>) -> Self {
        self.response_key = Some(key.into());
        self
    }

    pub fn info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }

    pub fn response_name(&self) -> &str {
        self.response_key.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Cardinality {
    BelongsTo,
    HasOne,
    HasMany,
}

#[derive(Clone, Debug)]
pub enum AssociationTarget {
    /// Single concrete type name.
    Single(String),
    /// Polymorphic, with the candidate type list.
    Polymorphic(Vec<String>),
}

#[derive(Clone)]
pub struct AssociationDescriptor {
    pub name: String,
    pub target: AssociationTarget,
    pub cardinality: Cardinality,
    /// Foreign-key column override; defaults to `<name>_id`.
    pub foreign_key: Option<String>,
    /// Only available when the request is an only-by-id query.
    pub restrict_to_only: bool,
    /// Legacy: polymorphic refs are synthesized from stored columns even
    /// when the association was not requested.
    pub always_return_ref: bool,
    /// Dynamic loader overriding the data layer's association lookup.
    pub loader: Option<AssociationLoaderFn>,
    pub response_key: Option<String>,
    pub info: Option<String>,
}

impl AssociationDescriptor {
    pub fn belongs_to(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, AssociationTarget::Single(target.into()), Cardinality::BelongsTo)
    }

    pub fn has_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, AssociationTarget::Single(target.into()), Cardinality::HasOne)
    }

    pub fn has_many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, AssociationTarget::Single(target.into()), Cardinality::HasMany)
    }

    pub fn polymorphic<I, S>(name: impl Into<String>, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let candidates = candidates.into_iter().map(Into::into).collect();
        Self::new(name, AssociationTarget::Polymorphic(candidates), Cardinality::BelongsTo)
    }

    fn new(name: impl Into<String>, target: AssociationTarget, cardinality: Cardinality) -> Self {
        Self {
            name: name.into(),
            target,
            cardinality,
            foreign_key: None,
            restrict_to_only: false,
            always_return_ref: false,
            loader: None,
            response_key: None,
            info: None,
        }
    }

    pub fn has_many_cardinality(mut self) -> Self {
        self.cardinality = Cardinality::HasMany;
        self
    }

    pub fn foreign_key(mut self, column: impl Into<String>) -> Self {
        self.foreign_key = Some(column.into());
        self
    }

    pub fn restrict_to_only(mut self) -> Self {
        self.restrict_to_only = true;
        self
    }

    pub fn always_return_ref(mut self) -> Self {
        self.always_return_ref = true;
        self
    }

    pub fn loader<F>(mut self, f: F) -> Self
    where
        F: Fn(&dyn Model, &Helper) -> AssociationValue + Send + Sync + 'static,
    {
        self.loader = Some(Arc::new(f));
        self
    }

    pub fn with_response_key(mut self, key: impl Into<String>) -> Self {
        self.response_key = Some(key.into());
        self
    }

    pub fn info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }

    pub fn is_polymorphic(&self) -> bool {
        matches!(self.target, AssociationTarget::Polymorphic(_))
    }

    pub fn response_name(&self) -> &str {
        self.response_key.as_deref().unwrap_or(&self.name)
    }

    /// Column consulted for the no-load id shortcut.
    pub fn foreign_key_column(&self) -> String {
        self.foreign_key
            .clone()
            .unwrap_or_else(|| format!("{}_id", self.name))
    }

    /// Column holding the stored type tag of a polymorphic association.
    pub fn type_column(&self) -> String {
        format!("{}_type", self.name)
    }
}

#[derive(Clone)]
pub enum FilterApply {
    Closure(FilterFn),
    /// Fall back to a named scope the data layer knows.
    NamedScope(String),
}

#[derive(Clone)]
pub struct FilterDescriptor {
    pub name: String,
    pub default: Option<Value>,
    pub apply: FilterApply,
    /// Forward the whole params bag alongside the primary argument.
    pub include_params: bool,
    pub info: Option<String>,
}

impl FilterDescriptor {
    /// Filter delegating to the data layer's named scope of the same name.
    pub fn scope(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            apply: FilterApply::NamedScope(name.clone()),
            name,
            default: None,
            include_params: false,
            info: None,
        }
    }

    pub fn closure<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(ScopeRef, &Value, Option<&Params>) -> Result<ScopeRef, PresenterError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            default: None,
            apply: FilterApply::Closure(Arc::new(f)),
            include_params: false,
            info: None,
        }
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn include_params(mut self) -> Self {
        self.include_params = true;
        self
    }

    pub fn info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }
}

#[derive(Clone)]
pub enum SortExpr {
    /// Literal column/expression string handed to the scope.
    Column(String),
    Closure(SortFn),
}

#[derive(Clone)]
pub struct SortOrderDescriptor {
    pub name: String,
    pub expr: SortExpr,
    pub info: Option<String>,
}

impl SortOrderDescriptor {
    pub fn column(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expr: SortExpr::Column(expression.into()),
            info: None,
        }
    }

    pub fn closure<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(ScopeRef, SortDirection) -> ScopeRef + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            expr: SortExpr::Closure(Arc::new(f)),
            info: None,
        }
    }

    pub fn info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }
}

/// Scope a conditional evaluates against, which also scopes its memoization:
/// request-scoped results are cached once per render, model-scoped results
/// once per model.
#[derive(Clone)]
pub enum ConditionalKind {
    OnModel(ModelConditionalFn),
    OnRequest(RequestConditionalFn),
}

#[derive(Clone)]
pub struct ConditionalDescriptor {
    pub name: String,
    pub kind: ConditionalKind,
    pub info: Option<String>,
}

impl ConditionalDescriptor {
    pub fn on_model<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&dyn Model, &Helper) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind: ConditionalKind::OnModel(Arc::new(f)),
            info: None,
        }
    }

    pub fn on_request<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Helper) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind: ConditionalKind::OnRequest(Arc::new(f)),
            info: None,
        }
    }

    pub fn info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }
}
