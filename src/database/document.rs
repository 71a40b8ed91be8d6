use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::backend::StoredDocument;
use crate::filter::dates::{date_millis, date_value};
use crate::filter::identifiers::take_document_id;
use crate::filter::FilterError;

pub const CREATION_TIME: &str = "creation_time";
pub const UPDATE_TIME: &str = "update_time";

/// Copy a caller's document into stored form: identifier pulled out (or
/// generated) and both timestamps stamped unless already present
pub fn to_stored(doc: &Map<String, Value>, now: DateTime<Utc>) -> Result<StoredDocument, FilterError> {
    let mut fields = doc.clone();
    let id = take_document_id(&mut fields)?.unwrap_or_else(Uuid::new_v4);
    for key in [CREATION_TIME, UPDATE_TIME] {
        if !fields.contains_key(key) {
            fields.insert(key.to_string(), date_value(now));
        }
    }
    Ok(StoredDocument { id, fields })
}

/// Client-facing form: `id` as a string and date-times as epoch millis.
/// Documents missing a timestamp report the current time for it.
pub fn to_external(doc: StoredDocument) -> Map<String, Value> {
    let now = date_value(Utc::now());
    let mut out: Map<String, Value> = doc
        .fields
        .into_iter()
        .filter(|(k, _)| k != "_id")
        .map(|(k, v)| (k, externalize(v)))
        .collect();
    for key in [CREATION_TIME, UPDATE_TIME] {
        if !out.contains_key(key) {
            out.insert(key.to_string(), externalize(now.clone()));
        }
    }
    out.insert("id".to_string(), Value::String(doc.id.to_string()));
    out
}

fn externalize(value: Value) -> Value {
    if let Some(millis) = date_millis(&value) {
        return Value::from(millis);
    }
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(externalize).collect()),
        Value::Object(map) => Value::Object(map.into_iter().map(|(k, v)| (k, externalize(v))).collect()),
        other => other,
    }
}
