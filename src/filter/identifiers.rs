use serde_json::{Map, Value};
use uuid::Uuid;

use super::error::FilterError;
use super::filter::type_name;
use super::types::{FilterOp, FilterSpec, FilterValue, IdPredicate};

/// Parse an external identifier string into the native identifier
pub fn parse_id(value: &Value) -> Result<Uuid, FilterError> {
    match value {
        Value::String(s) => Uuid::parse_str(s.trim())
            .map_err(|e| FilterError::InvalidIdentifier(format!("{}: {}", s, e))),
        other => Err(FilterError::InvalidIdentifier(format!(
            "expected string, got {}",
            type_name(other)
        ))),
    }
}

fn parse_id_list(value: &Value) -> Result<Vec<Uuid>, FilterError> {
    value
        .as_array()
        .ok_or_else(|| FilterError::InvalidIdentifier(format!("expected list, got {}", type_name(value))))?
        .iter()
        .map(parse_id)
        .collect()
}

/// Move the `_id` (or, failing that, `id`) predicate out of the field map
/// and into native identifier predicates, descending into operators
pub fn normalize(spec: &mut FilterSpec) -> Result<(), FilterError> {
    let taken = spec.remove("_id").or_else(|| spec.remove("id"));
    let Some(value) = taken else {
        return Ok(());
    };

    match value {
        FilterValue::Literal(v) => {
            spec.push_id(IdPredicate::Eq(parse_id(&v)?));
        }
        FilterValue::AnyOf(items) => {
            spec.push_id(IdPredicate::In(parse_id_list(&Value::Array(items))?));
        }
        FilterValue::Operator(ops) => {
            for (op, operand) in ops {
                let predicate = match op {
                    FilterOp::Eq => IdPredicate::Eq(parse_id(&operand)?),
                    FilterOp::Ne => IdPredicate::Ne(parse_id(&operand)?),
                    FilterOp::In => IdPredicate::In(parse_id_list(&operand)?),
                    FilterOp::Nin => IdPredicate::Nin(parse_id_list(&operand)?),
                    other => {
                        return Err(FilterError::UnsupportedOperator(format!(
                            "{} on identifier",
                            other.as_str()
                        )))
                    }
                };
                spec.push_id(predicate);
            }
        }
        FilterValue::RegexMatch(_) => {
            return Err(FilterError::UnsupportedOperator("$regex on identifier".to_string()));
        }
    }
    Ok(())
}

/// Pull a caller-chosen identifier out of a document about to be inserted
pub fn take_document_id(doc: &mut Map<String, Value>) -> Result<Option<Uuid>, FilterError> {
    if let Some(v) = doc.remove("_id") {
        return parse_id(&v).map(Some);
    }
    if let Some(v) = doc.remove("id") {
        return parse_id(&v).map(Some);
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ID: &str = "600535c4-9495-4e1c-8bec-763560000000";

    fn id() -> Uuid {
        Uuid::parse_str(ID).unwrap()
    }

    #[test]
    fn plain_and_underscore_ids_normalize() {
        let mut a = FilterSpec::from_json(&json!({"_id": ID})).unwrap();
        normalize(&mut a).unwrap();
        let mut b = FilterSpec::from_json(&json!({"id": ID})).unwrap();
        normalize(&mut b).unwrap();
        assert_eq!(a.ids(), &[IdPredicate::Eq(id())]);
        assert_eq!(a, b);
    }

    #[test]
    fn underscore_id_wins_and_leaves_id_as_field() {
        let mut spec = FilterSpec::from_json(&json!({"_id": ID, "id": "12345"})).unwrap();
        normalize(&mut spec).unwrap();
        assert_eq!(spec.ids(), &[IdPredicate::Eq(id())]);
        assert!(spec.contains("id"));
    }

    #[test]
    fn nested_operators_normalize() {
        let mut spec = FilterSpec::from_json(&json!({"_id": {"$ne": ID, "$in": [ID]}})).unwrap();
        normalize(&mut spec).unwrap();
        assert_eq!(spec.ids(), &[IdPredicate::Ne(id()), IdPredicate::In(vec![id()])]);
    }

    #[test]
    fn other_fields_are_untouched() {
        let mut spec = FilterSpec::from_json(&json!({"name": "xiaoyang", "age": 8})).unwrap();
        let before = spec.clone();
        normalize(&mut spec).unwrap();
        assert_eq!(spec, before);
    }

    #[test]
    fn malformed_ids_fail() {
        for raw in [json!({"_id": "123"}), json!({"id": 42}), json!({"_id": {"$gt": ID}})] {
            let mut spec = FilterSpec::from_json(&raw).unwrap();
            assert!(normalize(&mut spec).is_err(), "{} should fail", raw);
        }
    }

    #[test]
    fn document_ids_are_extracted() {
        let mut doc = json!({"id": ID, "name": "LaoXu"}).as_object().cloned().unwrap();
        assert_eq!(take_document_id(&mut doc).unwrap(), Some(id()));
        assert!(!doc.contains_key("id"));
        let mut plain = json!({"name": "LaoXu"}).as_object().cloned().unwrap();
        assert_eq!(take_document_id(&mut plain).unwrap(), None);
    }
}
