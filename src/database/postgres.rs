//! Postgres document backend: one table per collection holding
//! `(id uuid PRIMARY KEY, data jsonb)`.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{postgres::PgArguments, Arguments, PgPool};
use tracing::debug;
use uuid::Uuid;

use super::backend::{DatabaseResult, DocumentBackend, FindQuery, StoredDocument, UpdateOutcome, UpdateSpec};
use super::manager::{is_valid_identifier, quote_identifier, DatabaseError, DatabaseManager};
use crate::filter::{FilterOrder, FilterSpec, FilterWhere, SqlParam, SqlResult};

#[derive(Debug, Clone)]
pub struct PgDocumentBackend {
    pool: PgPool,
    collection: String,
    table: String,
}

impl PgDocumentBackend {
    /// Bind to `collection` on `pool`, creating its table when missing
    pub async fn new(pool: PgPool, collection: &str) -> DatabaseResult<Self> {
        if !is_valid_identifier(collection) {
            return Err(DatabaseError::InvalidCollectionName(collection.to_string()));
        }
        let backend = Self {
            pool,
            collection: collection.to_string(),
            table: quote_identifier(collection),
        };
        backend.ensure_table().await?;
        Ok(backend)
    }

    /// Open `collection` in database `db_name` through the shared pool manager
    pub async fn open(db_name: &str, collection: &str) -> DatabaseResult<Self> {
        let pool = DatabaseManager::pool(db_name).await?;
        Self::new(pool, collection).await
    }

    async fn ensure_table(&self) -> DatabaseResult<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (id uuid PRIMARY KEY, data jsonb NOT NULL DEFAULT '{{}}'::jsonb)",
            self.table
        );
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    fn select_sql(&self, query: &FindQuery) -> DatabaseResult<SqlResult> {
        let mut sql = FilterWhere::new();
        let where_clause = sql.generate(&query.filter)?;
        let order_clause = FilterOrder::generate(&query.sort, &mut sql);

        let mut text = format!("SELECT id, data FROM {} WHERE {}", self.table, where_clause);
        if !order_clause.is_empty() {
            text.push(' ');
            text.push_str(&order_clause);
        }
        if query.skip > 0 {
            let p = sql.param(SqlParam::BigInt(to_i64(query.skip)));
            text.push_str(&format!(" OFFSET {}", p));
        }
        if let Some(limit) = query.limit {
            let p = sql.param(SqlParam::BigInt(to_i64(limit)));
            text.push_str(&format!(" LIMIT {}", p));
        }
        Ok(SqlResult { query: text, params: sql.into_params() })
    }

    fn update_sql(&self, filter: &FilterSpec, update: &UpdateSpec, many: bool) -> DatabaseResult<SqlResult> {
        let mut sql = FilterWhere::new();
        let where_clause = sql.generate(filter)?;
        let limit = if many { "" } else { " LIMIT 1" };

        let set = sql.param(SqlParam::Json(Value::Object(update.set.clone())));
        let mut data = format!("(m.data || {}::jsonb)", set);
        for (field, delta) in &update.inc {
            let key = sql.param(SqlParam::Text(field.clone()));
            let amount = sql.param(SqlParam::Json(delta.clone()));
            data = format!(
                "jsonb_set({data}, ARRAY[{key}::text], to_jsonb(COALESCE((m.data ->> {key}::text)::numeric, 0) + ({amount}::jsonb #>> '{{}}')::numeric))",
                data = data,
                key = key,
                amount = amount
            );
        }

        let text = format!(
            "WITH m AS (SELECT id, data FROM {table} WHERE {where_clause}{limit} FOR UPDATE), \
             changed AS (UPDATE {table} AS t SET data = {data} FROM m WHERE t.id = m.id \
             RETURNING (t.data IS DISTINCT FROM m.data) AS modified) \
             SELECT COUNT(*), COUNT(*) FILTER (WHERE modified) FROM changed",
            table = self.table,
            where_clause = where_clause,
            limit = limit,
            data = data
        );
        Ok(SqlResult { query: text, params: sql.into_params() })
    }

    fn delete_sql(&self, filter: &FilterSpec, many: bool) -> DatabaseResult<SqlResult> {
        let mut sql = FilterWhere::new();
        let where_clause = sql.generate(filter)?;
        let text = if many {
            format!("DELETE FROM {} WHERE {}", self.table, where_clause)
        } else {
            format!(
                "DELETE FROM {table} WHERE id IN (SELECT id FROM {table} WHERE {where_clause} LIMIT 1)",
                table = self.table,
                where_clause = where_clause
            )
        };
        Ok(SqlResult { query: text, params: sql.into_params() })
    }

    fn distinct_sql(&self, field: &str) -> SqlResult {
        let mut sql = FilterWhere::new();
        let path = sql.path(field);
        let text = format!(
            "SELECT COUNT(DISTINCT v) FROM (\
             SELECT jsonb_array_elements({p}) AS v FROM {table} WHERE jsonb_typeof({p}) = 'array' \
             UNION ALL \
             SELECT {p} AS v FROM {table} WHERE jsonb_typeof({p}) <> 'array') d",
            p = path,
            table = self.table
        );
        SqlResult { query: text, params: sql.into_params() }
    }
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn arguments(params: Vec<SqlParam>) -> PgArguments {
    let mut args = PgArguments::default();
    for param in params {
        match param {
            SqlParam::Json(v) => args.add(v),
            SqlParam::Text(s) => args.add(s),
            SqlParam::Path(p) => args.add(p),
            SqlParam::BigInt(n) => args.add(n),
            SqlParam::Float(f) => args.add(f),
            SqlParam::Uuid(u) => args.add(u),
            SqlParam::UuidList(l) => args.add(l),
        }
    }
    args
}

#[async_trait]
impl DocumentBackend for PgDocumentBackend {
    fn collection(&self) -> &str {
        &self.collection
    }

    async fn insert_one(&self, doc: StoredDocument) -> DatabaseResult<Uuid> {
        let sql = format!("INSERT INTO {} (id, data) VALUES ($1, $2)", self.table);
        sqlx::query(&sql)
            .bind(doc.id)
            .bind(Value::Object(doc.fields))
            .execute(&self.pool)
            .await?;
        Ok(doc.id)
    }

    async fn insert_many(&self, docs: Vec<StoredDocument>) -> DatabaseResult<Vec<Uuid>> {
        let mut ids = Vec::with_capacity(docs.len());
        for doc in docs {
            ids.push(self.insert_one(doc).await?);
        }
        Ok(ids)
    }

    async fn find(&self, query: &FindQuery) -> DatabaseResult<Vec<StoredDocument>> {
        let SqlResult { query: text, params } = self.select_sql(query)?;
        debug!("find on {}: {}", self.collection, text);
        let rows: Vec<(Uuid, Value)> = sqlx::query_as_with(&text, arguments(params))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|(id, data)| match data {
                Value::Object(fields) => Ok(StoredDocument { id, fields }),
                other => Err(DatabaseError::QueryError(format!("document {} is not an object: {}", id, other))),
            })
            .collect()
    }

    async fn count(&self, filter: &FilterSpec) -> DatabaseResult<u64> {
        let mut sql = FilterWhere::new();
        let where_clause = sql.generate(filter)?;
        let text = format!("SELECT COUNT(*) FROM {} WHERE {}", self.table, where_clause);
        let count: i64 = sqlx::query_scalar_with(&text, arguments(sql.into_params()))
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn update(&self, filter: &FilterSpec, update: &UpdateSpec, many: bool) -> DatabaseResult<UpdateOutcome> {
        let SqlResult { query: text, params } = self.update_sql(filter, update, many)?;
        debug!("update on {}: {}", self.collection, text);
        let (matched, modified): (i64, i64) = sqlx::query_as_with(&text, arguments(params))
            .fetch_one(&self.pool)
            .await?;
        Ok(UpdateOutcome {
            matched_count: matched.max(0) as u64,
            modified_count: modified.max(0) as u64,
        })
    }

    async fn delete(&self, filter: &FilterSpec, many: bool) -> DatabaseResult<u64> {
        let SqlResult { query: text, params } = self.delete_sql(filter, many)?;
        debug!("delete on {}: {}", self.collection, text);
        let result = sqlx::query_with(&text, arguments(params)).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn distinct_count(&self, field: &str) -> DatabaseResult<u64> {
        let SqlResult { query: text, params } = self.distinct_sql(field);
        let count: i64 = sqlx::query_scalar_with(&text, arguments(params))
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}
