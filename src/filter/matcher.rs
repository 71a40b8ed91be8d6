use std::cmp::Ordering;

use regex::Regex;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::dates::date_millis;
use super::error::FilterError;
use super::filter_where::truthy;
use super::types::{FilterOp, FilterSpec, FilterValue, IdPredicate, SortDirection, SortSpec};

/// Value at a dotted path; `None` when any segment is missing
pub fn lookup<'a>(doc: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    let mut parts = field.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Evaluate a filter against one stored document, with the same meaning the
/// Postgres translation gives it
pub fn matches(spec: &FilterSpec, id: &Uuid, doc: &Map<String, Value>) -> Result<bool, FilterError> {
    for predicate in spec.ids() {
        let ok = match predicate {
            IdPredicate::Eq(other) => id == other,
            IdPredicate::Ne(other) => id != other,
            IdPredicate::In(ids) => ids.contains(id),
            IdPredicate::Nin(ids) => !ids.contains(id),
        };
        if !ok {
            return Ok(false);
        }
    }

    for (field, value) in spec.fields() {
        let current = lookup(doc, field);
        let ok = match value {
            FilterValue::Literal(v) => literal(current, v),
            FilterValue::AnyOf(items) => any_of(current, items),
            FilterValue::RegexMatch(pattern) => regex(current, pattern)?,
            FilterValue::Operator(ops) => {
                let mut all = true;
                for (op, operand) in ops {
                    if !operator(current, *op, operand)? {
                        all = false;
                        break;
                    }
                }
                all
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

fn literal(current: Option<&Value>, expected: &Value) -> bool {
    match current {
        None => expected.is_null(),
        Some(Value::Array(items)) if !expected.is_array() => items.iter().any(|i| values_equal(i, expected)),
        Some(v) => values_equal(v, expected),
    }
}

fn any_of(current: Option<&Value>, items: &[Value]) -> bool {
    match current {
        Some(Value::Array(elements)) => elements
            .iter()
            .any(|e| items.iter().any(|i| values_equal(e, i))),
        _ => false,
    }
}

fn regex(current: Option<&Value>, pattern: &str) -> Result<bool, FilterError> {
    let re = Regex::new(pattern).map_err(|e| FilterError::InvalidRegex(e.to_string()))?;
    Ok(matches!(current, Some(Value::String(s)) if re.is_match(s)))
}

fn in_list(current: Option<&Value>, operand: &Value) -> bool {
    let Some(candidates) = operand.as_array() else {
        return false;
    };
    let Some(current) = current else {
        return false;
    };
    candidates.iter().any(|c| {
        values_equal(current, c)
            || matches!(current, Value::Array(items) if items.iter().any(|i| values_equal(i, c)))
    })
}

fn operator(current: Option<&Value>, op: FilterOp, operand: &Value) -> Result<bool, FilterError> {
    Ok(match op {
        FilterOp::Eq => literal(current, operand),
        FilterOp::Ne => !literal(current, operand),
        FilterOp::In => in_list(current, operand),
        FilterOp::Nin => !in_list(current, operand),
        FilterOp::Exists => current.is_some() == truthy(operand),
        FilterOp::Regex => {
            let pattern = operand
                .as_str()
                .ok_or_else(|| FilterError::InvalidOperatorData("$regex requires string".to_string()))?;
            regex(current, pattern)?
        }
        FilterOp::Gt | FilterOp::Gte | FilterOp::Lt | FilterOp::Lte => {
            let Some(ordering) = typed_ordering(current, op, operand)? else {
                return Ok(false);
            };
            match op {
                FilterOp::Gt => ordering == Ordering::Greater,
                FilterOp::Gte => ordering != Ordering::Less,
                FilterOp::Lt => ordering == Ordering::Less,
                _ => ordering != Ordering::Greater,
            }
        }
    })
}

/// Ordering of the field against the operand when both have the operand's
/// type; `None` when the field has some other type
fn typed_ordering(current: Option<&Value>, op: FilterOp, operand: &Value) -> Result<Option<Ordering>, FilterError> {
    if let Some(bound) = date_millis(operand) {
        return Ok(current.and_then(date_millis).map(|v| v.cmp(&bound)));
    }
    match operand {
        Value::Number(n) => {
            let bound = n.as_f64().unwrap_or(0.0);
            Ok(current
                .and_then(Value::as_f64)
                .and_then(|v| v.partial_cmp(&bound)))
        }
        Value::String(bound) => Ok(current.and_then(Value::as_str).map(|v| v.cmp(bound.as_str()))),
        other => Err(FilterError::InvalidOperatorData(format!(
            "{} cannot compare against {}",
            op.as_str(),
            other
        ))),
    }
}

/// JSON equality where numbers compare by value (`1 == 1.0`)
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| values_equal(l, r))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter().all(|(k, v)| y.get(k).map(|w| values_equal(v, w)).unwrap_or(false))
        }
        _ => a == b,
    }
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::String(_) => 1,
        Value::Number(_) => 2,
        Value::Bool(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values following Postgres `jsonb` ordering:
/// null < string < number < bool < array < object
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .unwrap_or(0.0)
            .partial_cmp(&y.as_f64().unwrap_or(0.0))
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x.len().cmp(&y.len()).then_with(|| {
            x.iter()
                .zip(y)
                .map(|(l, r)| compare_values(l, r))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        }),
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()).then_with(|| {
            let mut xk: Vec<_> = x.iter().collect();
            let mut yk: Vec<_> = y.iter().collect();
            xk.sort_by(|l, r| l.0.cmp(r.0));
            yk.sort_by(|l, r| l.0.cmp(r.0));
            xk.iter()
                .zip(&yk)
                .map(|(l, r)| l.0.cmp(r.0).then_with(|| compare_values(l.1, r.1)))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        }),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Compare two documents under a sort spec. Missing fields sort after every
/// value when ascending and before every value when descending.
pub fn compare_documents(sort: &SortSpec, a: &Map<String, Value>, b: &Map<String, Value>) -> Ordering {
    for key in sort.keys() {
        let ordering = match (lookup(a, &key.field), lookup(b, &key.field)) {
            (Some(x), Some(y)) => compare_values(x, y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        let ordering = match key.sort {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}
