use serde_json::{json, Map, Value};
use tracing::warn;

use crate::error::ApiError;

/// Key under which undeclared parameters are reported when extras are allowed
pub const REDUNDANT_KEY: &str = "redundant_dict";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Int,
    Float,
    Str,
    List,
    Dict,
    Bool,
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Str => "str",
            FieldType::List => "list",
            FieldType::Dict => "dict",
            FieldType::Bool => "bool",
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldType::Int => value.is_i64() || value.is_u64(),
            FieldType::Float => value.is_f64(),
            FieldType::Str => value.is_string(),
            FieldType::List => value.is_array(),
            FieldType::Dict => value.is_object(),
            FieldType::Bool => value.is_boolean(),
        }
    }

    /// Lenient conversion for values that arrive as text (query strings,
    /// form fields) or with a neighbouring numeric type
    fn coerce(&self, field: &str, value: &Value) -> Result<Value, String> {
        let format_err = || format!("parameter {} should be in {} format", field, self.name());
        match (self, value) {
            (FieldType::Float, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(|f| serde_json::Number::from_f64(f).map(Value::Number))
                .ok_or_else(format_err),
            (FieldType::Float, Value::Number(n)) => n
                .as_f64()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(format_err),
            (FieldType::Int, Value::String(s)) => s.trim().parse::<i64>().map(Value::from).map_err(|_| format_err()),
            (FieldType::Int, Value::Number(n)) => n
                .as_f64()
                .filter(|f| f.is_finite())
                .map(|f| Value::from(f.trunc() as i64))
                .ok_or_else(format_err),
            (FieldType::List, Value::String(s)) => match serde_json::from_str::<Value>(s) {
                Ok(list @ Value::Array(_)) => Ok(list),
                _ => Err(format_err()),
            },
            _ => Err(format!("parameter {} should be of type {}", field, self.name())),
        }
    }
}

/// Declared request fields, in declaration order, plus defaults for the
/// optional ones
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<(String, FieldType)>,
    defaults: Map<String, Value>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a required field
    pub fn field(mut self, name: &str, ty: FieldType) -> Self {
        self.declare(name, ty);
        self
    }

    /// Declare a field filled with `default` when absent
    pub fn optional(mut self, name: &str, ty: FieldType, default: impl Into<Value>) -> Self {
        self.declare(name, ty);
        self.defaults.insert(name.to_string(), default.into());
        self
    }

    fn declare(&mut self, name: &str, ty: FieldType) {
        self.fields.retain(|(n, _)| n != name);
        self.fields.push((name.to_string(), ty));
    }

    pub fn type_of(&self, name: &str) -> Option<FieldType> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, t)| *t)
    }

    pub fn is_optional(&self, name: &str) -> bool {
        self.defaults.contains_key(name)
    }

    pub fn defaults(&self) -> &Map<String, Value> {
        &self.defaults
    }

    /// Shown to callers who omit a declared field
    fn describe(&self) -> Value {
        let all: Map<String, Value> = self
            .fields
            .iter()
            .map(|(n, t)| (n.clone(), Value::String(t.name().to_string())))
            .collect();
        json!({ "All Parameters": all, "Optional": self.defaults })
    }
}

/// Declared fields after defaults and coercion, with undeclared fields kept
/// apart
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedParams {
    values: Map<String, Value>,
    redundant: Map<String, Value>,
}

impl ValidatedParams {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.values.get(field).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, field: &str) -> Option<f64> {
        self.values.get(field).and_then(Value::as_f64)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.values.get(field).and_then(Value::as_str)
    }

    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn redundant(&self) -> &Map<String, Value> {
        &self.redundant
    }

    /// Flat mapping with undeclared fields nested under `redundant_dict`
    pub fn to_value(&self) -> Value {
        let mut out = self.values.clone();
        out.insert(REDUNDANT_KEY.to_string(), Value::Object(self.redundant.clone()));
        Value::Object(out)
    }
}

pub(super) fn reject(message: &str, prompt: Value) -> ApiError {
    warn!("{}: {}", message, prompt);
    ApiError::bad_request(message).with_prompt(prompt)
}

/// Check `input` against `schema`.
///
/// Absent optional fields take their defaults; every declared field must then
/// be present. Text values are coerced to numbers and lists where the schema
/// asks for them. Required string fields must be non-blank unless
/// `allow_null_strings`. Undeclared fields are an error unless `allow_extra`,
/// in which case they are returned separately.
pub fn validate(
    input: &Value,
    schema: &Schema,
    allow_null_strings: bool,
    allow_extra: bool,
) -> Result<ValidatedParams, ApiError> {
    let Some(raw) = input.as_object() else {
        return Err(reject("malformed request parameters", Value::String(input.to_string())));
    };

    let mut checking = raw.clone();
    for (name, default) in &schema.defaults {
        if !checking.contains_key(name) {
            checking.insert(name.clone(), default.clone());
        }
    }

    if schema.fields.iter().any(|(name, _)| !checking.contains_key(name)) {
        return Err(reject("incomplete request parameters", schema.describe()));
    }

    let mut out = ValidatedParams::default();
    for (name, value) in checking {
        let Some(ty) = schema.type_of(&name) else {
            if allow_extra {
                out.redundant.insert(name, value);
                continue;
            }
            return Err(reject("unexpected request parameter", Value::String(name)));
        };

        let value = if ty.accepts(&value) {
            value
        } else {
            ty.coerce(&name, &value)
                .map_err(|msg| reject("request parameter type check failed", Value::String(msg)))?
        };

        if ty == FieldType::Str && !allow_null_strings && !schema.is_optional(&name) {
            if value.as_str().map(|s| s.trim().is_empty()).unwrap_or(false) {
                return Err(reject(
                    "request parameter type check failed",
                    Value::String(format!("parameter {} cannot be an empty string", name)),
                ));
            }
        }

        out.values.insert(name, value);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new()
            .field("name", FieldType::Str)
            .field("age", FieldType::Int)
            .optional("score", FieldType::Float, 0.0)
            .optional("tags", FieldType::List, json!([]))
    }

    #[test]
    fn coerces_text_and_injects_defaults() {
        let out = validate(&json!({"name": "LaoXu", "age": "8", "tags": "[1,2]"}), &schema(), false, false).unwrap();
        assert_eq!(out.get_i64("age"), Some(8));
        assert_eq!(out.get("tags"), Some(&json!([1, 2])));
        assert_eq!(out.get_f64("score"), Some(0.0));
    }

    #[test]
    fn int_truncates_floats() {
        let out = validate(&json!({"name": "a", "age": 8.9}), &schema(), false, false).unwrap();
        assert_eq!(out.get_i64("age"), Some(8));
    }

    #[test]
    fn missing_field_lists_schema() {
        let err = validate(&json!({"name": "a"}), &schema(), false, false).unwrap_err();
        assert_eq!(err.status_code(), 400);
        let prompt = err.prompt().unwrap();
        assert_eq!(prompt["All Parameters"]["age"], "int");
        assert_eq!(prompt["Optional"]["score"], 0.0);
    }

    #[test]
    fn bad_coercion_names_the_field() {
        let err = validate(&json!({"name": "a", "age": "eight"}), &schema(), false, false).unwrap_err();
        assert!(err.prompt().unwrap().as_str().unwrap().contains("age"));
        let err = validate(&json!({"name": "a", "age": 1, "tags": "{}"}), &schema(), false, false).unwrap_err();
        assert!(err.prompt().unwrap().as_str().unwrap().contains("tags"));
    }

    #[test]
    fn blank_required_strings() {
        assert!(validate(&json!({"name": "  ", "age": 1}), &schema(), false, false).is_err());
        assert!(validate(&json!({"name": "  ", "age": 1}), &schema(), true, false).is_ok());
    }

    #[test]
    fn extras_are_rejected_or_collected() {
        let input = json!({"name": "a", "age": 1, "color": "red"});
        assert!(validate(&input, &schema(), false, false).is_err());
        let out = validate(&input, &schema(), false, true).unwrap();
        assert_eq!(out.redundant().get("color"), Some(&json!("red")));
        assert_eq!(out.to_value()[REDUNDANT_KEY]["color"], "red");
        assert!(out.get("color").is_none());
    }

    #[test]
    fn non_mapping_input_is_rejected() {
        assert_eq!(validate(&json!([1]), &schema(), false, false).unwrap_err().status_code(), 400);
    }
}
