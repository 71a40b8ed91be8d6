use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{error, warn};

use super::backend::{DocumentBackend, FindQuery, UpdateOutcome, UpdateSpec};
use super::document::{to_external, to_stored, UPDATE_TIME};
use super::memory::MemoryDocumentBackend;
use super::postgres::PgDocumentBackend;
use super::manager::DatabaseError;
use crate::error::{ApiError, StoreOp};
use crate::filter::dates::date_value;
use crate::filter::filter::{type_name, validate_field};
use crate::filter::identifiers::{normalize, parse_id};
use crate::filter::soft_delete::{self, REMOVE_TIME};
use crate::filter::{FilterSpec, IdPredicate};

/// Result of a delete. `soft_delete` is reported as `false_delete` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    pub deleted_count: u64,
    #[serde(rename = "false_delete")]
    pub soft_delete: bool,
}

/// CRUD over one collection. Identifier normalization and the soft-delete
/// default are applied here so every caller sees the same visibility rules.
#[derive(Clone)]
pub struct DocumentStore {
    backend: Arc<dyn DocumentBackend>,
}

impl DocumentStore {
    pub fn new(backend: Arc<dyn DocumentBackend>) -> Self {
        Self { backend }
    }

    pub fn memory(collection: &str) -> Self {
        Self::new(MemoryDocumentBackend::new_shared(collection))
    }

    pub async fn postgres(db_name: &str, collection: &str) -> Result<Self, DatabaseError> {
        Ok(Self::new(Arc::new(PgDocumentBackend::open(db_name, collection).await?)))
    }

    pub fn collection(&self) -> &str {
        self.backend.collection()
    }

    pub fn backend(&self) -> &Arc<dyn DocumentBackend> {
        &self.backend
    }

    /// Identifier normalization followed by the soft-delete default
    pub(crate) fn scoped_filter(filter: &Value) -> Result<FilterSpec, ApiError> {
        let mut spec = FilterSpec::from_json(filter)?;
        normalize(&mut spec)?;
        soft_delete::apply(&mut spec);
        Ok(spec)
    }

    fn object<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>, ApiError> {
        value.as_object().ok_or_else(|| {
            ApiError::bad_request(format!("{} must be a mapping", what)).with_prompt(type_name(value))
        })
    }

    pub async fn insert(&self, doc: &Value) -> Result<String, ApiError> {
        let doc = doc.as_object().ok_or_else(|| {
            ApiError::internal_error("document store write error")
                .with_prompt(format!("document must be a mapping, got {}", type_name(doc)))
        })?;
        let stored = to_stored(doc, Utc::now())?;
        let id = self
            .backend
            .insert_one(stored)
            .await
            .map_err(|e| ApiError::from_store(StoreOp::Write, e))?;
        Ok(id.to_string())
    }

    /// Inserts every document or stops at the first failure; documents
    /// written before the failure are kept
    pub async fn insert_many(&self, docs: &Value) -> Result<Vec<String>, ApiError> {
        let shape_error = || {
            ApiError::internal_error("document store write error")
                .with_prompt(serde_json::json!({ "docu_list": docs }))
        };
        let list = docs.as_array().ok_or_else(shape_error)?;
        let now = Utc::now();
        let mut stored = Vec::with_capacity(list.len());
        for doc in list {
            let doc = doc.as_object().ok_or_else(shape_error)?;
            stored.push(to_stored(doc, now)?);
        }
        let ids = self
            .backend
            .insert_many(stored)
            .await
            .map_err(|e| ApiError::from_store(StoreOp::Write, e))?;
        Ok(ids.into_iter().map(|id| id.to_string()).collect())
    }

    /// True when any document matches. Soft-deleted documents count unless
    /// the filter says otherwise.
    pub async fn exists(&self, filter: &Value) -> Result<bool, ApiError> {
        let mut spec = FilterSpec::from_json(filter)?;
        normalize(&mut spec)?;
        let count = self
            .backend
            .count(&spec)
            .await
            .map_err(|e| ApiError::from_store(StoreOp::Read, e))?;
        Ok(count > 0)
    }

    /// Replace the patch's fields on the first (or every) active match,
    /// stamping `update_time` unless the patch carries one
    pub async fn update(&self, filter: &Value, patch: &Value, many: bool) -> Result<UpdateOutcome, ApiError> {
        let mut set = Self::object(patch, "update patch")?.clone();
        if !set.contains_key(UPDATE_TIME) {
            set.insert(UPDATE_TIME.to_string(), date_value(Utc::now()));
        }
        let spec = Self::scoped_filter(filter)?;
        self.backend
            .update(&spec, &UpdateSpec { set, inc: Map::new() }, many)
            .await
            .map_err(|e| ApiError::from_store(StoreOp::Update, e))
    }

    /// Add the given amounts to numeric fields; `update_time` is always re-stamped
    pub async fn update_increment(&self, filter: &Value, deltas: &Value, many: bool) -> Result<UpdateOutcome, ApiError> {
        let inc = Self::object(deltas, "increment")?.clone();
        let mut set = Map::new();
        set.insert(UPDATE_TIME.to_string(), date_value(Utc::now()));
        let spec = Self::scoped_filter(filter)?;
        self.backend
            .update(&spec, &UpdateSpec { set, inc }, many)
            .await
            .map_err(|e| ApiError::from_store(StoreOp::Update, e))
    }

    /// Soft delete stamps `remove_time` through `update`; hard delete removes
    /// matching active documents for good
    pub async fn delete(&self, filter: &Value, many: bool, soft_delete: bool) -> Result<DeleteOutcome, ApiError> {
        if soft_delete {
            let mut patch = Map::new();
            patch.insert(REMOVE_TIME.to_string(), date_value(Utc::now()));
            let outcome = self.update(filter, &Value::Object(patch), many).await?;
            if outcome.modified_count == 0 {
                warn!("soft delete on {} matched no documents", self.collection());
            }
            return Ok(DeleteOutcome { deleted_count: outcome.modified_count, soft_delete });
        }

        let spec = Self::scoped_filter(filter)?;
        let deleted = self
            .backend
            .delete(&spec, many)
            .await
            .map_err(|e| ApiError::from_store(StoreOp::Delete, e))?;
        if deleted == 0 {
            error!("hard delete on {} removed no documents", self.collection());
        }
        Ok(DeleteOutcome { deleted_count: deleted, soft_delete })
    }

    /// Active matches in external form; at most one unless `many`
    pub async fn find(&self, filter: &Value, many: bool) -> Result<Vec<Map<String, Value>>, ApiError> {
        let spec = Self::scoped_filter(filter)?;
        let mut query = FindQuery::new(spec);
        if !many {
            query.limit = Some(1);
        }
        self.find_query(&query).await
    }

    pub(crate) async fn find_query(&self, query: &FindQuery) -> Result<Vec<Map<String, Value>>, ApiError> {
        let docs = self
            .backend
            .find(query)
            .await
            .map_err(|e| ApiError::from_store(StoreOp::Read, e))?;
        Ok(docs.into_iter().map(to_external).collect())
    }

    /// Distinct values of `field` over the whole collection
    pub async fn find_distinct_count(&self, field: &str) -> Result<u64, ApiError> {
        validate_field(field)?;
        self.backend
            .distinct_count(field)
            .await
            .map_err(|e| ApiError::from_store(StoreOp::Read, e))
    }

    /// `Ok(None)` for a well-formed id with no active document, unless
    /// `raise_on_missing`
    pub async fn find_by_id(&self, id: &Value, raise_on_missing: bool) -> Result<Option<Map<String, Value>>, ApiError> {
        let Some(raw) = id.as_str() else {
            return Err(ApiError::bad_request(format!("type error, expected string, got {}", type_name(id))));
        };
        let mut filter = Map::new();
        filter.insert("id".to_string(), Value::String(raw.to_string()));
        let mut found = self.find(&Value::Object(filter), false).await?;
        if found.is_empty() {
            if raise_on_missing {
                return Err(ApiError::not_found(format!("no record with id = {}", raw)));
            }
            return Ok(None);
        }
        Ok(Some(found.swap_remove(0)))
    }

    /// Active documents whose id is in `ids` (a list of identifier strings)
    pub async fn find_by_ids(&self, ids: &Value) -> Result<Vec<Map<String, Value>>, ApiError> {
        let Some(list) = ids.as_array() else {
            return Err(ApiError::bad_request(format!("type error, expected list, got {}", type_name(ids))));
        };
        if list.is_empty() {
            return Ok(Vec::new());
        }
        let mut parsed = Vec::with_capacity(list.len());
        for id in list {
            if !id.is_string() {
                return Err(ApiError::bad_request(format!("type error, expected string, got {}", type_name(id))));
            }
            parsed.push(parse_id(id)?);
        }
        let mut spec = FilterSpec::new();
        spec.push_id(IdPredicate::In(parsed));
        soft_delete::apply(&mut spec);
        self.find_query(&FindQuery::new(spec)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn exists_sees_soft_deleted_documents() {
        let store = DocumentStore::memory("people");
        let id = store.insert(&json!({"name": "a"})).await.unwrap();
        store.delete(&json!({"id": id}), false, true).await.unwrap();
        assert!(store.exists(&json!({"name": "a"})).await.unwrap());
        assert!(store.find(&json!({"name": "a"}), true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn find_one_limits_results() {
        let store = DocumentStore::memory("people");
        store.insert_many(&json!([{"k": 1}, {"k": 1}])).await.unwrap();
        assert_eq!(store.find(&json!({"k": 1}), false).await.unwrap().len(), 1);
        assert_eq!(store.find(&json!({"k": 1}), true).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn non_mapping_patches_are_rejected() {
        let store = DocumentStore::memory("people");
        let err = store.update(&json!({}), &json!([1]), false).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn distinct_field_names_are_validated() {
        let store = DocumentStore::memory("people");
        assert_eq!(store.find_distinct_count("$where").await.unwrap_err().status_code(), 400);
        assert_eq!(store.find_distinct_count("name").await.unwrap(), 0);
    }
}
