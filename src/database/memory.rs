//! In-process document backend. Filters are evaluated with the same
//! semantics the Postgres translation has, so tests written against it carry
//! over.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::backend::{increment, DatabaseResult, DocumentBackend, FindQuery, StoredDocument, UpdateOutcome, UpdateSpec};
use super::manager::DatabaseError;
use crate::filter::matcher::{compare_documents, lookup, matches, values_equal};
use crate::filter::FilterSpec;

/// Documents kept in insertion order, which is the natural order for `find`
#[derive(Debug, Default)]
pub struct MemoryDocumentBackend {
    collection: String,
    docs: RwLock<Vec<StoredDocument>>,
}

impl MemoryDocumentBackend {
    pub fn new(collection: impl Into<String>) -> Self {
        Self { collection: collection.into(), docs: RwLock::new(Vec::new()) }
    }

    pub fn new_shared(collection: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(collection))
    }

    /// Every stored document, soft-deleted ones included
    pub async fn snapshot(&self) -> Vec<StoredDocument> {
        self.docs.read().await.clone()
    }
}

fn matching_indexes(docs: &[StoredDocument], filter: &FilterSpec, many: bool) -> DatabaseResult<Vec<usize>> {
    let mut out = Vec::new();
    for (i, doc) in docs.iter().enumerate() {
        if matches(filter, &doc.id, &doc.fields)? {
            out.push(i);
            if !many {
                break;
            }
        }
    }
    Ok(out)
}

#[async_trait]
impl DocumentBackend for MemoryDocumentBackend {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn insert_one(&self, doc: StoredDocument) -> DatabaseResult<Uuid> {
        let mut docs = self.docs.write().await;
        if docs.iter().any(|d| d.id == doc.id) {
            return Err(DatabaseError::QueryError(format!("duplicate key: {}", doc.id)));
        }
        let id = doc.id;
        docs.push(doc);
        Ok(id)
    }

    async fn insert_many(&self, docs: Vec<StoredDocument>) -> DatabaseResult<Vec<Uuid>> {
        let mut ids = Vec::with_capacity(docs.len());
        for doc in docs {
            ids.push(self.insert_one(doc).await?);
        }
        Ok(ids)
    }

    async fn find(&self, query: &FindQuery) -> DatabaseResult<Vec<StoredDocument>> {
        let docs = self.docs.read().await;
        let mut found = Vec::new();
        for doc in docs.iter() {
            if matches(&query.filter, &doc.id, &doc.fields)? {
                found.push(doc.clone());
            }
        }
        if !query.sort.is_empty() {
            found.sort_by(|a, b| compare_documents(&query.sort, &a.fields, &b.fields));
        }
        let skip = usize::try_from(query.skip).unwrap_or(usize::MAX);
        let limit = query
            .limit
            .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);
        Ok(found.into_iter().skip(skip).take(limit).collect())
    }

    async fn count(&self, filter: &FilterSpec) -> DatabaseResult<u64> {
        let docs = self.docs.read().await;
        Ok(matching_indexes(&docs, filter, true)?.len() as u64)
    }

    async fn update(&self, filter: &FilterSpec, update: &UpdateSpec, many: bool) -> DatabaseResult<UpdateOutcome> {
        let mut docs = self.docs.write().await;
        let indexes = matching_indexes(&docs, filter, many)?;

        let mut outcome = UpdateOutcome { matched_count: indexes.len() as u64, modified_count: 0 };
        for i in indexes {
            let doc = &mut docs[i];
            let mut next = doc.fields.clone();
            for (key, value) in &update.set {
                next.insert(key.clone(), value.clone());
            }
            for (key, delta) in &update.inc {
                let value = increment(key, doc.fields.get(key), delta)?;
                next.insert(key.clone(), value);
            }
            if !values_equal(&Value::Object(next.clone()), &Value::Object(doc.fields.clone())) {
                doc.fields = next;
                outcome.modified_count += 1;
            }
        }
        Ok(outcome)
    }

    async fn delete(&self, filter: &FilterSpec, many: bool) -> DatabaseResult<u64> {
        let mut docs = self.docs.write().await;
        let indexes = matching_indexes(&docs, filter, many)?;
        for i in indexes.iter().rev() {
            docs.remove(*i);
        }
        Ok(indexes.len() as u64)
    }

    async fn distinct_count(&self, field: &str) -> DatabaseResult<u64> {
        let docs = self.docs.read().await;
        let mut seen: Vec<&Value> = Vec::new();
        for doc in docs.iter() {
            let values: Vec<&Value> = match lookup(&doc.fields, field) {
                None => continue,
                Some(Value::Array(items)) => items.iter().collect(),
                Some(v) => vec![v],
            };
            for v in values {
                if !seen.iter().any(|s| values_equal(s, v)) {
                    seen.push(v);
                }
            }
        }
        Ok(seen.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterOrder, FilterValue};
    use serde_json::json;

    fn doc(v: Value) -> StoredDocument {
        StoredDocument { id: Uuid::new_v4(), fields: v.as_object().cloned().unwrap() }
    }

    #[tokio::test]
    async fn find_sorts_skips_and_limits() {
        let backend = MemoryDocumentBackend::new("people");
        for age in [3, 1, 2] {
            backend.insert_one(doc(json!({"age": age}))).await.unwrap();
        }
        let query = FindQuery {
            sort: FilterOrder::parse("age desc").unwrap(),
            skip: 1,
            limit: Some(1),
            ..FindQuery::default()
        };
        let found = backend.find(&query).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].fields["age"], 2);
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let backend = MemoryDocumentBackend::new("people");
        let d = doc(json!({}));
        backend.insert_one(d.clone()).await.unwrap();
        assert!(backend.insert_one(d).await.is_err());
    }

    #[tokio::test]
    async fn update_one_touches_first_match_only() {
        let backend = MemoryDocumentBackend::new("people");
        backend.insert_many(vec![doc(json!({"n": 1})), doc(json!({"n": 1}))]).await.unwrap();
        let update = UpdateSpec { inc: json!({"n": 2}).as_object().cloned().unwrap(), ..UpdateSpec::default() };
        let outcome = backend.update(&FilterSpec::new(), &update, false).await.unwrap();
        assert_eq!(outcome, UpdateOutcome { matched_count: 1, modified_count: 1 });
        let values: Vec<_> = backend.snapshot().await.iter().map(|d| d.fields["n"].clone()).collect();
        assert_eq!(values, vec![json!(3), json!(1)]);
    }

    #[tokio::test]
    async fn unchanged_documents_are_matched_not_modified() {
        let backend = MemoryDocumentBackend::new("people");
        backend.insert_one(doc(json!({"name": "a"}))).await.unwrap();
        let update = UpdateSpec { set: json!({"name": "a"}).as_object().cloned().unwrap(), ..UpdateSpec::default() };
        let outcome = backend.update(&FilterSpec::new(), &update, true).await.unwrap();
        assert_eq!(outcome, UpdateOutcome { matched_count: 1, modified_count: 0 });
    }

    #[tokio::test]
    async fn distinct_flattens_arrays() {
        let backend = MemoryDocumentBackend::new("people");
        backend
            .insert_many(vec![doc(json!({"tag": ["a", "b"]})), doc(json!({"tag": "a"})), doc(json!({"other": 1}))])
            .await
            .unwrap();
        assert_eq!(backend.distinct_count("tag").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn delete_many_removes_matches() {
        let backend = MemoryDocumentBackend::new("people");
        backend.insert_many(vec![doc(json!({"k": 1})), doc(json!({"k": 2})), doc(json!({"k": 1}))]).await.unwrap();
        let mut filter = FilterSpec::new();
        filter.insert("k", FilterValue::Literal(json!(1)));
        assert_eq!(backend.delete(&filter, true).await.unwrap(), 2);
        assert_eq!(backend.count(&FilterSpec::new()).await.unwrap(), 1);
    }
}
