use serde_json::Value;

use super::types::{FilterOp, FilterSpec, FilterValue};

/// Presence of this field marks a document as soft-deleted
pub const REMOVE_TIME: &str = "remove_time";

fn exists(present: bool) -> FilterValue {
    FilterValue::Operator(vec![(FilterOp::Exists, Value::Bool(present))])
}

/// Restrict to active documents unless the caller already constrains `remove_time`
pub fn apply(spec: &mut FilterSpec) {
    if !spec.contains(REMOVE_TIME) {
        spec.insert(REMOVE_TIME, exists(false));
    }
}

pub fn active_only() -> FilterSpec {
    let mut spec = FilterSpec::new();
    spec.insert(REMOVE_TIME, exists(false));
    spec
}

pub fn removed_only() -> FilterSpec {
    let mut spec = FilterSpec::new();
    spec.insert(REMOVE_TIME, exists(true));
    spec
}
