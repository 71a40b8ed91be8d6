use serde_json::{json, Map, Value};

use super::dates::is_date;
use super::error::FilterError;
use super::identifiers::parse_id;
use super::types::{FilterOp, FilterSpec, FilterValue, IdPredicate};

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty() && self.fields.is_empty()
    }

    pub fn ids(&self) -> &[IdPredicate] {
        &self.ids
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &FilterValue)> {
        self.fields.iter()
    }

    pub fn get(&self, field: &str) -> Option<&FilterValue> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: FilterValue) -> &mut Self {
        self.fields.insert(field.into(), value);
        self
    }

    pub fn remove(&mut self, field: &str) -> Option<FilterValue> {
        self.fields.remove(field)
    }

    pub fn push_id(&mut self, predicate: IdPredicate) -> &mut Self {
        self.ids.push(predicate);
        self
    }

    /// Fold another spec in; its field predicates win over existing ones
    pub fn merge(&mut self, other: FilterSpec) -> &mut Self {
        self.ids.extend(other.ids);
        self.fields.extend(other.fields);
        self
    }

    /// Parse a raw filter mapping. Identifier keys are kept as ordinary
    /// fields until the identifier normalizer runs.
    pub fn from_json(raw: &Value) -> Result<Self, FilterError> {
        let obj = raw
            .as_object()
            .ok_or_else(|| FilterError::NotAnObject(type_name(raw).to_string()))?;
        let mut spec = Self::new();
        for (key, value) in obj {
            validate_field(key)?;
            spec.fields.insert(key.clone(), FilterValue::from_json(value)?);
        }
        Ok(spec)
    }

    /// Add free-form request fields: numbers, booleans and mappings pass
    /// through, `id`/`_id` strings match the identifier exactly, lists match
    /// any shared element and non-blank strings match as substrings.
    pub fn merge_redundant(&mut self, redundant: &Map<String, Value>) -> Result<&mut Self, FilterError> {
        for (key, value) in redundant {
            validate_field(key)?;
            match value {
                Value::String(s) if key == "id" || key == "_id" => {
                    self.ids.retain(|p| !matches!(p, IdPredicate::Eq(_)));
                    self.ids.push(IdPredicate::Eq(parse_id(&Value::String(s.clone()))?));
                }
                Value::Number(_) | Value::Bool(_) | Value::Object(_) | Value::Array(_) if key == "id" || key == "_id" => {
                    return Err(FilterError::InvalidIdentifier(format!(
                        "expected string, got {}",
                        type_name(value)
                    )));
                }
                Value::Number(_) | Value::Bool(_) | Value::Object(_) => {
                    self.fields.insert(key.clone(), FilterValue::from_json(value)?);
                }
                Value::Array(items) => {
                    self.fields.insert(key.clone(), FilterValue::AnyOf(items.clone()));
                }
                Value::String(s) => {
                    if !s.trim().is_empty() {
                        let pattern = s.replace('(', "\\(").replace(')', "\\)");
                        self.fields.insert(key.clone(), FilterValue::RegexMatch(pattern));
                    }
                }
                Value::Null => {}
            }
        }
        Ok(self)
    }

    /// Extended-JSON rendering, for logs and diagnostics
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        if !self.ids.is_empty() {
            let mut id_ops = Map::new();
            for predicate in &self.ids {
                match predicate {
                    IdPredicate::Eq(id) => id_ops.insert("$eq".into(), json!(id.to_string())),
                    IdPredicate::Ne(id) => id_ops.insert("$ne".into(), json!(id.to_string())),
                    IdPredicate::In(ids) => id_ops.insert("$in".into(), json!(ids.iter().map(|i| i.to_string()).collect::<Vec<_>>())),
                    IdPredicate::Nin(ids) => id_ops.insert("$nin".into(), json!(ids.iter().map(|i| i.to_string()).collect::<Vec<_>>())),
                };
            }
            out.insert("_id".into(), Value::Object(id_ops));
        }
        for (field, value) in &self.fields {
            let rendered = match value {
                FilterValue::Literal(v) => v.clone(),
                FilterValue::AnyOf(items) => json!({ "$elemMatch": { "$in": items } }),
                FilterValue::RegexMatch(p) => json!({ "$regex": p }),
                FilterValue::Operator(ops) => {
                    let mut m = Map::new();
                    for (op, v) in ops {
                        m.insert(op.as_str().to_string(), v.clone());
                    }
                    Value::Object(m)
                }
            };
            out.insert(field.clone(), rendered);
        }
        Value::Object(out)
    }
}

impl FilterValue {
    /// An object whose keys are all operators becomes `Operator`; a stored
    /// date-time or any other value is matched literally
    pub fn from_json(value: &Value) -> Result<Self, FilterError> {
        let obj = match value {
            Value::Object(obj) if !obj.is_empty() && !is_date(value) => obj,
            _ => return Ok(FilterValue::Literal(value.clone())),
        };

        let operator_keys = obj.keys().filter(|k| k.starts_with('$')).count();
        if operator_keys == 0 {
            return Ok(FilterValue::Literal(value.clone()));
        }
        if operator_keys != obj.len() {
            return Err(FilterError::InvalidOperatorData(format!(
                "cannot mix operators and fields in {}",
                value
            )));
        }

        let mut ops = Vec::with_capacity(obj.len());
        for (key, operand) in obj {
            let op = FilterOp::parse(key)?;
            match op {
                FilterOp::In | FilterOp::Nin if !operand.is_array() => {
                    return Err(FilterError::InvalidOperatorData(format!("{} requires array", key)));
                }
                FilterOp::Regex if !operand.is_string() => {
                    return Err(FilterError::InvalidOperatorData(format!("{} requires string", key)));
                }
                _ => {}
            }
            ops.push((op, operand.clone()));
        }
        Ok(FilterValue::Operator(ops))
    }
}

pub(crate) fn validate_field(field: &str) -> Result<(), FilterError> {
    if field.trim().is_empty() || field.starts_with('$') || field.contains('\0') {
        return Err(FilterError::InvalidField(field.to_string()));
    }
    Ok(())
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_literals_and_operators() {
        let spec = FilterSpec::from_json(&json!({
            "name": "LaoXu",
            "age": {"$gte": 18, "$lt": 30},
            "meta": {"kind": "plain"},
        }))
        .unwrap();
        assert_eq!(spec.get("name"), Some(&FilterValue::Literal(json!("LaoXu"))));
        assert_eq!(
            spec.get("age"),
            Some(&FilterValue::Operator(vec![(FilterOp::Gte, json!(18)), (FilterOp::Lt, json!(30))]))
        );
        assert_eq!(spec.get("meta"), Some(&FilterValue::Literal(json!({"kind": "plain"}))));
    }

    #[test]
    fn rejects_top_level_operators_and_mixed_maps() {
        assert!(matches!(
            FilterSpec::from_json(&json!({"$or": []})),
            Err(FilterError::InvalidField(_))
        ));
        assert!(FilterSpec::from_json(&json!({"a": {"$gt": 1, "b": 2}})).is_err());
        assert!(FilterSpec::from_json(&json!({"a": {"$near": 1}})).is_err());
        assert!(matches!(FilterSpec::from_json(&json!([1])), Err(FilterError::NotAnObject(_))));
    }

    #[test]
    fn redundant_fields_follow_construction_rules() {
        let mut redundant = Map::new();
        redundant.insert("age".into(), json!(8));
        redundant.insert("active".into(), json!(true));
        redundant.insert("tags".into(), json!(["a", "b"]));
        redundant.insert("name".into(), json!("Lao(Xu)"));
        redundant.insert("blank".into(), json!("   "));
        redundant.insert("range".into(), json!({"$gt": 3}));
        redundant.insert("id".into(), json!("600535c4-9495-4e1c-8bec-763560000000"));

        let mut spec = FilterSpec::new();
        spec.merge_redundant(&redundant).unwrap();

        assert_eq!(spec.get("age"), Some(&FilterValue::Literal(json!(8))));
        assert_eq!(spec.get("active"), Some(&FilterValue::Literal(json!(true))));
        assert_eq!(spec.get("tags"), Some(&FilterValue::AnyOf(vec![json!("a"), json!("b")])));
        assert_eq!(spec.get("name"), Some(&FilterValue::RegexMatch("Lao\\(Xu\\)".into())));
        assert!(!spec.contains("blank"));
        assert_eq!(spec.get("range"), Some(&FilterValue::Operator(vec![(FilterOp::Gt, json!(3))])));
        assert_eq!(spec.ids().len(), 1);
    }

    #[test]
    fn redundant_malformed_id_fails() {
        let mut redundant = Map::new();
        redundant.insert("_id".into(), json!("123123"));
        assert!(matches!(
            FilterSpec::new().merge_redundant(&redundant),
            Err(FilterError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn redundant_non_string_id_fails() {
        for (key, value) in [("id", json!(42)), ("_id", json!(true)), ("id", json!(["a"]))] {
            let mut redundant = Map::new();
            redundant.insert(key.into(), value);
            assert!(matches!(
                FilterSpec::new().merge_redundant(&redundant),
                Err(FilterError::InvalidIdentifier(_))
            ));
        }
    }

    #[test]
    fn date_literals_are_not_operators() {
        let spec = FilterSpec::from_json(&json!({"update_time": {"$date": 5}})).unwrap();
        assert_eq!(spec.get("update_time"), Some(&FilterValue::Literal(json!({"$date": 5}))));
    }
}
