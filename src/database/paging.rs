use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::backend::FindQuery;
use super::store::DocumentStore;
use crate::error::{ApiError, StoreOp};
use crate::filter::dates::{date_value, parse_date, DateBound};
use crate::filter::filter::validate_field;
use crate::filter::{soft_delete, FilterError, FilterOp, FilterOrder, FilterSpec, FilterValue, SortSpec};
use crate::params::{validate, FieldType, RequestParams, Schema, ValidatedParams};

/// Recognized pagination parameters; anything else is a filter field
pub fn pagination_schema() -> Schema {
    Schema::new()
        .optional("limit", FieldType::Int, 10)
        .optional("offset", FieldType::Int, 0)
        .optional("orderby", FieldType::Str, "")
        .optional("start_date", FieldType::Str, "")
        .optional("date_type", FieldType::Str, "update_time")
        .optional("end_date", FieldType::Str, "")
}

/// A fully planned page query
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub limit: u64,
    pub offset: u64,
    pub sort: SortSpec,
    pub filter: FilterSpec,
}

/// One page of results. `soft_deleted_count` is the number of soft-deleted
/// documents in the whole collection, not only those the filter would match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub total: u64,
    pub items: Vec<Map<String, Value>>,
    #[serde(rename = "dummy_remove")]
    pub soft_deleted_count: u64,
}

impl PageRequest {
    /// Plan a page from validated parameters. Every failure is reported as a
    /// single bad request carrying the underlying message.
    pub fn from_params(params: &ValidatedParams) -> Result<Self, ApiError> {
        Self::plan(params).map_err(|e| {
            ApiError::bad_request("pagination parameter computation error").with_prompt(e.to_string())
        })
    }

    /// Validate the request's parameters (query string for GET, JSON body
    /// otherwise) and plan the page
    pub fn from_request(request: &RequestParams) -> Result<Self, ApiError> {
        Self::from_value(&request.checking())
    }

    pub fn from_value(input: &Value) -> Result<Self, ApiError> {
        let params = validate(input, &pagination_schema(), false, true)?;
        Self::from_params(&params)
    }

    /// Restrict the page further, e.g. with a data-visibility filter. The
    /// scope's predicates replace request predicates on the same fields.
    pub fn with_scope(mut self, scope: FilterSpec) -> Self {
        self.filter.merge(scope);
        self
    }

    fn plan(params: &ValidatedParams) -> Result<Self, FilterError> {
        let limit = page_number(params, "limit", 10).map_err(FilterError::InvalidLimit)?;
        let offset = page_number(params, "offset", 0).map_err(FilterError::InvalidOffset)?;
        if limit < 1 {
            return Err(FilterError::InvalidLimit(format!("page size must start from 1, got {}", limit)));
        }
        if offset < 0 {
            return Err(FilterError::InvalidOffset(format!("offset must start from 0, got {}", offset)));
        }

        let sort = FilterOrder::parse(params.get_str("orderby").unwrap_or(""))?;
        let start = parse_date(params.get_str("start_date").unwrap_or(""), DateBound::Start)?;
        let end = parse_date(params.get_str("end_date").unwrap_or(""), DateBound::End)?;

        let mut filter = soft_delete::active_only();
        filter.merge_redundant(params.redundant())?;

        if let (Some(start), Some(end)) = (start, end) {
            let field = params.get_str("date_type").unwrap_or("update_time");
            validate_field(field)?;
            filter.insert(field, date_range(start, end));
        }

        Ok(Self { limit: limit as u64, offset: offset as u64, sort, filter })
    }
}

/// Integer pagination parameter; values beyond `i64` are refused, not defaulted
fn page_number(params: &ValidatedParams, field: &str, default: i64) -> Result<i64, String> {
    match params.get(field) {
        None => Ok(default),
        Some(value) => value
            .as_i64()
            .ok_or_else(|| format!("{} out of range, got {}", field, value)),
    }
}

fn date_range(start: DateTime<Utc>, end: DateTime<Utc>) -> FilterValue {
    FilterValue::Operator(vec![(FilterOp::Gte, date_value(start)), (FilterOp::Lte, date_value(end))])
}

impl DocumentStore {
    /// Run a planned page query
    pub async fn find_page(&self, request: &PageRequest) -> Result<Page, ApiError> {
        debug!("paged query on {}: {}", self.collection(), request.filter.to_json());
        let backend = self.backend();
        let soft_deleted_count = backend
            .count(&soft_delete::removed_only())
            .await
            .map_err(|e| ApiError::from_store(StoreOp::Read, e))?;

        let total = backend
            .count(&request.filter)
            .await
            .map_err(|e| ApiError::from_store(StoreOp::Read, e))?;
        if total == 0 {
            return Ok(Page { total: 0, items: Vec::new(), soft_deleted_count });
        }

        let query = FindQuery {
            filter: request.filter.clone(),
            sort: request.sort.clone(),
            skip: request.offset,
            limit: Some(request.limit),
        };
        let items = self.find_query(&query).await?;
        Ok(Page { total, items, soft_deleted_count })
    }

    /// Validate raw pagination parameters and run the page query
    pub async fn find_paged(&self, input: &Value) -> Result<Page, ApiError> {
        let request = PageRequest::from_value(input)?;
        self.find_page(&request).await
    }
}
