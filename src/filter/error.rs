use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("filter must be an object, got {0}")]
    NotAnObject(String),

    #[error("invalid field name: {0}")]
    InvalidField(String),

    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("invalid operator data: {0}")]
    InvalidOperatorData(String),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("invalid regular expression: {0}")]
    InvalidRegex(String),

    #[error("sort parameter does not match \"field asc|desc,...\": \"{0}\"")]
    InvalidSort(String),

    #[error("invalid date string: {0}")]
    InvalidDate(String),

    #[error("invalid limit: {0}")]
    InvalidLimit(String),

    #[error("invalid offset: {0}")]
    InvalidOffset(String),
}
