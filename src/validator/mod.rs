//! Recursive request-shape validation against a declared schema tree.
//!
//! The walk returns the accepted subset plus an error accumulator; nested
//! violations merge upward attributed under their parent key, never
//! flattened.

pub mod format;
mod schema;

pub use format::{Format, FormatRules};
pub use schema::{ParamSpec, ParamType};

use crate::error::{PresenterError, ValidationErrors};
use serde_json::{json, Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationMode {
    /// Collect every violation, then fail with the aggregate.
    Strict,
    /// Drop unknown and malformed entries, keep the rest.
    Lenient,
}

pub struct ParamsValidator;

impl ParamsValidator {
    /// Validate `input` for `action`, returning the accepted subset. A
    /// non-object or empty top level fails immediately, before any per-key
    /// work, in both modes.
    pub fn validate(
        schema: &[ParamSpec],
        action: &str,
        input: &Value,
        mode: ValidationMode,
    ) -> Result<Value, PresenterError> {
        let object = match input {
            Value::Object(object) if !object.is_empty() => object,
            _ => {
                return Err(PresenterError::BadRequest(
                    "params must be a non-empty object".to_string(),
                ))
            }
        };
        let (valid, errors) = walk(schema, None, action, object);
        if mode == ValidationMode::Strict && !errors.is_empty() {
            return Err(PresenterError::Validation(errors));
        }
        Ok(Value::Object(valid))
    }
}

/// Validate one object level. `recursive_self` is the enclosing node when it
/// declared `recursive`; a key matching its name re-enters the same node.
fn walk(
    children: &[ParamSpec],
    recursive_self: Option<&ParamSpec>,
    action: &str,
    object: &Map<String, Value>,
) -> (Map<String, Value>, ValidationErrors) {
    let mut valid = Map::new();
    let mut errors = ValidationErrors::default();

    for spec in children {
        if spec.required && spec.applies_to(action) && !object.contains_key(&spec.name) {
            errors.malformed(json!({ &spec.name: "is required" }));
        }
    }

    let wildcard = children
        .iter()
        .find(|s| s.dynamic_key && s.applies_to(action));
    for (key, value) in object {
        let spec = children
            .iter()
            .find(|s| !s.dynamic_key && s.name == *key)
            .filter(|s| s.applies_to(action))
            .or_else(|| recursive_self.filter(|s| s.name == *key))
            .or(wildcard);
        match spec {
            None => errors.unknown(key.clone()),
            Some(spec) => accept(spec, action, key, value, &mut valid, &mut errors),
        }
    }
    (valid, errors)
}

fn accept(
    spec: &ParamSpec,
    action: &str,
    key: &str,
    value: &Value,
    valid: &mut Map<String, Value>,
    errors: &mut ValidationErrors,
) {
    match spec.param_type {
        ParamType::Hash => match value {
            Value::Object(object) if !object.is_empty() => {
                let recursive_self = spec.recursive.then_some(spec);
                let (child_valid, child_errors) =
                    walk(&spec.children, recursive_self, action, object);
                errors.merge_under(key, child_errors);
                valid.insert(key.to_string(), Value::Object(child_valid));
            }
            _ => errors.malformed(json!({ key: "must be a non-empty object" })),
        },
        ParamType::Array => match value {
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                let mut element_errors = ValidationErrors::default();
                for item in items {
                    if spec.children.is_empty() {
                        out.push(item.clone());
                        continue;
                    }
                    match item {
                        Value::Object(object) if !object.is_empty() => {
                            let (child_valid, child_errors) =
                                walk(&spec.children, None, action, object);
                            element_errors.unknown_params.extend(child_errors.unknown_params);
                            element_errors
                                .malformed_params
                                .extend(child_errors.malformed_params);
                            out.push(Value::Object(child_valid));
                        }
                        _ => element_errors.malformed(json!("must be a non-empty object")),
                    }
                }
                errors.merge_under(key, element_errors);
                valid.insert(key.to_string(), Value::Array(out));
            }
            _ => errors.malformed(json!({ key: "must be an array" })),
        },
        _ => match format::check(spec, value) {
            Ok(()) => {
                valid.insert(key.to_string(), value.clone());
            }
            Err(messages) => errors.malformed(json!({ key: messages })),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lenient_mode_drops_unknown_keys() {
        let schema = vec![ParamSpec::integer("known")];
        let valid = ParamsValidator::validate(
            &schema,
            "create",
            &json!({"known": 1, "bogus": 2}),
            ValidationMode::Lenient,
        )
        .unwrap();
        assert_eq!(valid, json!({"known": 1}));
    }

    #[test]
    fn strict_mode_aggregates_all_violations() {
        let schema = vec![
            ParamSpec::integer("page"),
            ParamSpec::string("title").required(),
        ];
        let err = ParamsValidator::validate(
            &schema,
            "create",
            &json!({"page": "three", "bogus": 2}),
            ValidationMode::Strict,
        )
        .unwrap_err();
        let PresenterError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors.unknown_params, vec![json!("bogus")]);
        assert_eq!(errors.malformed_params.len(), 2);
    }

    #[test]
    fn recursive_violations_attribute_three_levels_deep() {
        let schema = vec![ParamSpec::hash("comment", vec![ParamSpec::string("body")])
            .recursive()];
        let err = ParamsValidator::validate(
            &schema,
            "create",
            &json!({"comment": {"comment": {"comment": {"unknown_x": 1}}}}),
            ValidationMode::Strict,
        )
        .unwrap_err();
        let PresenterError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(
            errors.unknown_params,
            vec![json!({"comment": [{"comment": [{"comment": ["unknown_x"]}]}]})]
        );
    }

    #[test]
    fn only_restriction_makes_a_key_unknown_for_other_actions() {
        let schema = vec![ParamSpec::string("status").only(["update"])];
        let err = ParamsValidator::validate(
            &schema,
            "create",
            &json!({"status": "open"}),
            ValidationMode::Strict,
        )
        .unwrap_err();
        let PresenterError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors.unknown_params, vec![json!("status")]);

        let valid = ParamsValidator::validate(
            &schema,
            "update",
            &json!({"status": "open"}),
            ValidationMode::Strict,
        )
        .unwrap();
        assert_eq!(valid, json!({"status": "open"}));
    }

    #[test]
    fn dynamic_key_wildcard_accepts_arbitrary_keys() {
        let schema = vec![ParamSpec::hash(
            "settings",
            vec![ParamSpec::string("value").dynamic_key()],
        )];
        let valid = ParamsValidator::validate(
            &schema,
            "create",
            &json!({"settings": {"theme": "dark", "locale": "en"}}),
            ValidationMode::Strict,
        )
        .unwrap();
        assert_eq!(
            valid,
            json!({"settings": {"theme": "dark", "locale": "en"}})
        );
    }

    #[test]
    fn top_level_must_be_a_non_empty_object() {
        let schema = vec![ParamSpec::string("title")];
        for input in [json!(null), json!([]), json!({}), json!("title")] {
            let err =
                ParamsValidator::validate(&schema, "create", &input, ValidationMode::Lenient)
                    .unwrap_err();
            assert!(matches!(err, PresenterError::BadRequest(_)));
        }
    }

    #[test]
    fn array_elements_validate_against_children() {
        let schema = vec![ParamSpec::array(
            "assignees",
            vec![ParamSpec::integer("user_id").required()],
        )];
        let err = ParamsValidator::validate(
            &schema,
            "create",
            &json!({"assignees": [{"user_id": 1}, {"nickname": "zz"}]}),
            ValidationMode::Strict,
        )
        .unwrap_err();
        let PresenterError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors.unknown_params, vec![json!({"assignees": ["nickname"]})]);
    }
}
