use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::manager::DatabaseError;
use crate::filter::{FilterSpec, SortSpec};

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// A document as the backend holds it: native id plus the remaining fields
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: Uuid,
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, Default)]
pub struct FindQuery {
    pub filter: FilterSpec,
    /// Empty means the backend's natural order
    pub sort: SortSpec,
    pub skip: u64,
    pub limit: Option<u64>,
}

impl FindQuery {
    pub fn new(filter: FilterSpec) -> Self {
        Self { filter, ..Self::default() }
    }
}

/// Field replacements and numeric increments applied to each matched
/// document. Keys are top-level field names.
#[derive(Debug, Clone, Default)]
pub struct UpdateSpec {
    pub set: Map<String, Value>,
    pub inc: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UpdateOutcome {
    pub matched_count: u64,
    pub modified_count: u64,
}

/// Storage for one collection of JSON documents
#[async_trait]
pub trait DocumentBackend: Send + Sync + 'static {
    /// Name of the collection this backend serves
    fn collection(&self) -> &str;

    async fn insert_one(&self, doc: StoredDocument) -> DatabaseResult<Uuid>;

    /// Inserts in order and stops at the first failure; earlier inserts stay
    async fn insert_many(&self, docs: Vec<StoredDocument>) -> DatabaseResult<Vec<Uuid>>;

    async fn find(&self, query: &FindQuery) -> DatabaseResult<Vec<StoredDocument>>;

    async fn count(&self, filter: &FilterSpec) -> DatabaseResult<u64>;

    /// Apply `update` to the first match, or to every match when `many`
    async fn update(&self, filter: &FilterSpec, update: &UpdateSpec, many: bool) -> DatabaseResult<UpdateOutcome>;

    /// Remove the first match, or every match when `many`; returns the number removed
    async fn delete(&self, filter: &FilterSpec, many: bool) -> DatabaseResult<u64>;

    /// Number of distinct values of `field` across the whole collection,
    /// counting array elements individually
    async fn distinct_count(&self, field: &str) -> DatabaseResult<u64>;
}

/// New value of a field after adding `delta`; integers stay integers
pub(crate) fn increment(field: &str, current: Option<&Value>, delta: &Value) -> DatabaseResult<Value> {
    let not_numeric = |what: &str| DatabaseError::QueryError(format!("cannot increment {} with non-numeric {}", field, what));
    let Value::Number(delta_num) = delta else {
        return Err(not_numeric("delta"));
    };
    let current = match current {
        None | Some(Value::Null) => return Ok(Value::Number(delta_num.clone())),
        Some(Value::Number(n)) => n,
        Some(_) => return Err(not_numeric("value")),
    };

    if let (Some(a), Some(b)) = (current.as_i64(), delta_num.as_i64()) {
        if let Some(sum) = a.checked_add(b) {
            return Ok(Value::from(sum));
        }
    }
    let sum = current.as_f64().unwrap_or(0.0) + delta_num.as_f64().unwrap_or(0.0);
    serde_json::Number::from_f64(sum)
        .map(Value::Number)
        .ok_or_else(|| not_numeric("result"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn increments_keep_integer_types() {
        assert_eq!(increment("n", Some(&json!(2)), &json!(3)).unwrap(), json!(5));
        assert_eq!(increment("n", None, &json!(1)).unwrap(), json!(1));
        assert_eq!(increment("n", Some(&json!(1.5)), &json!(1)).unwrap(), json!(2.5));
        assert!(increment("n", Some(&json!("x")), &json!(1)).is_err());
        assert!(increment("n", Some(&json!(1)), &json!("1")).is_err());
    }
}
