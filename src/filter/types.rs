use std::collections::BTreeMap;

use serde_json::Value;
use uuid::Uuid;

use super::error::FilterError;

/// Query operators accepted inside a nested operator mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
    Exists,
    Regex,
}

impl FilterOp {
    pub fn parse(key: &str) -> Result<Self, FilterError> {
        Ok(match key {
            "$eq" => FilterOp::Eq,
            "$ne" | "$neq" => FilterOp::Ne,
            "$gt" => FilterOp::Gt,
            "$gte" => FilterOp::Gte,
            "$lt" => FilterOp::Lt,
            "$lte" => FilterOp::Lte,
            "$in" => FilterOp::In,
            "$nin" => FilterOp::Nin,
            "$exists" => FilterOp::Exists,
            "$regex" => FilterOp::Regex,
            other => return Err(FilterError::UnsupportedOperator(other.to_string())),
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "$eq",
            FilterOp::Ne => "$ne",
            FilterOp::Gt => "$gt",
            FilterOp::Gte => "$gte",
            FilterOp::Lt => "$lt",
            FilterOp::Lte => "$lte",
            FilterOp::In => "$in",
            FilterOp::Nin => "$nin",
            FilterOp::Exists => "$exists",
            FilterOp::Regex => "$regex",
        }
    }
}

/// Predicate on a single field
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// Field equals the value, or is an array holding it
    Literal(Value),
    /// Field is an array sharing at least one element with the list
    AnyOf(Vec<Value>),
    /// Field is a string matching the pattern anywhere
    RegexMatch(String),
    /// All operator conditions hold
    Operator(Vec<(FilterOp, Value)>),
}

/// Predicate on the native document identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdPredicate {
    Eq(Uuid),
    Ne(Uuid),
    In(Vec<Uuid>),
    Nin(Vec<Uuid>),
}

/// Query predicate passed to store operations. Field keys are unique;
/// inserting an existing key replaces its predicate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    pub(crate) ids: Vec<IdPredicate>,
    pub(crate) fields: BTreeMap<String, FilterValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOrderInfo {
    pub field: String,
    pub sort: SortDirection,
}

/// Ordered sort keys; empty means the store's natural order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSpec(pub Vec<FilterOrderInfo>);

impl SortSpec {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> &[FilterOrderInfo] {
        &self.0
    }
}

/// Parameterised SQL fragment with its bind values
#[derive(Debug, Clone)]
pub struct SqlResult {
    pub query: String,
    pub params: Vec<SqlParam>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Json(Value),
    Text(String),
    Path(Vec<String>),
    BigInt(i64),
    Float(f64),
    Uuid(Uuid),
    UuidList(Vec<Uuid>),
}
