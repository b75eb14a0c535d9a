//! Declarative parameter schema tree.

use crate::validator::format::FormatRules;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Decimal,
    Boolean,
    Datetime,
    Hash,
    Array,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Decimal => "decimal",
            ParamType::Boolean => "boolean",
            ParamType::Datetime => "datetime",
            ParamType::Hash => "hash",
            ParamType::Array => "array",
        }
    }
}

/// One node of the schema tree. `recursive` nodes accept a child keyed by
/// their own name, validated against this same node, to unbounded depth.
#[derive(Clone)]
pub struct ParamSpec {
    pub name: String,
    pub param_type: ParamType,
    pub required: bool,
    pub recursive: bool,
    /// Actions this key is accepted for; empty means all.
    pub only: Vec<String>,
    /// Wildcard node matching any otherwise-unknown key at its level.
    pub dynamic_key: bool,
    pub children: Vec<ParamSpec>,
    pub rules: Option<FormatRules>,
}

impl ParamSpec {
    fn leaf(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: false,
            recursive: false,
            only: Vec::new(),
            dynamic_key: false,
            children: Vec::new(),
            rules: None,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::leaf(name, ParamType::String)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::leaf(name, ParamType::Integer)
    }

    pub fn decimal(name: impl Into<String>) -> Self {
        Self::leaf(name, ParamType::Decimal)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::leaf(name, ParamType::Boolean)
    }

    pub fn datetime(name: impl Into<String>) -> Self {
        Self::leaf(name, ParamType::Datetime)
    }

    pub fn hash(name: impl Into<String>, children: Vec<ParamSpec>) -> Self {
        let mut spec = Self::leaf(name, ParamType::Hash);
        spec.children = children;
        spec
    }

    pub fn array(name: impl Into<String>, children: Vec<ParamSpec>) -> Self {
        let mut spec = Self::leaf(name, ParamType::Array);
        spec.children = children;
        spec
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn recursive(mut self) -> Self {
        self.recursive = true;
        self
    }

    pub fn only<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.only = actions.into_iter().map(Into::into).collect();
        self
    }

    pub fn dynamic_key(mut self) -> Self {
        self.dynamic_key = true;
        self
    }

    pub fn rules(mut self, rules: FormatRules) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn applies_to(&self, action: &str) -> bool {
        self.only.is_empty() || self.only.iter().any(|a| a == action)
    }
}
