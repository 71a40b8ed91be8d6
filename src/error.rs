// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{Map, Value};

use crate::api::envelope;
use crate::cache::CacheError;
use crate::database::DatabaseError;
use crate::filter::FilterError;

/// Boundary error carrying a client-facing message and an optional `prompt`
/// with the underlying detail
#[derive(Debug, Clone)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest { message: String, prompt: Option<Value> },

    // 401 Unauthorized
    Unauthorized { message: String, prompt: Option<Value> },

    // 403 Forbidden
    Forbidden { message: String, prompt: Option<Value> },

    // Reported as 400, not 404, for compatibility with existing clients
    NotFound { message: String, prompt: Option<Value> },

    // 500 Internal Server Error
    InternalError { message: String, prompt: Option<Value> },
}

/// Which kind of store operation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Write,
    Read,
    Update,
    Delete,
}

impl StoreOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreOp::Write => "write",
            StoreOp::Read => "read",
            StoreOp::Update => "update",
            StoreOp::Delete => "delete",
        }
    }
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest { .. } => 400,
            ApiError::Unauthorized { .. } => 401,
            ApiError::Forbidden { .. } => 403,
            ApiError::NotFound { .. } => 400,
            ApiError::InternalError { .. } => 500,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest { message, .. }
            | ApiError::Unauthorized { message, .. }
            | ApiError::Forbidden { message, .. }
            | ApiError::NotFound { message, .. }
            | ApiError::InternalError { message, .. } => message,
        }
    }

    pub fn prompt(&self) -> Option<&Value> {
        match self {
            ApiError::BadRequest { prompt, .. }
            | ApiError::Unauthorized { prompt, .. }
            | ApiError::Forbidden { prompt, .. }
            | ApiError::NotFound { prompt, .. }
            | ApiError::InternalError { prompt, .. } => prompt.as_ref(),
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest { .. } => "BAD_REQUEST",
            ApiError::Unauthorized { .. } => "UNAUTHORIZED",
            ApiError::Forbidden { .. } => "FORBIDDEN",
            ApiError::NotFound { .. } => "NOT_FOUND",
            ApiError::InternalError { .. } => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Convert to the standard JSON envelope
    pub fn to_json(&self) -> Value {
        let mut extra = Map::new();
        if let Some(prompt) = self.prompt() {
            extra.insert("prompt".to_string(), prompt.clone());
        }
        envelope(self.status_code(), self.message(), Some(&extra))
    }

    /// Attach the underlying detail shown to the caller as `prompt`
    pub fn with_prompt(mut self, value: impl Into<Value>) -> Self {
        let value = value.into();
        match &mut self {
            ApiError::BadRequest { prompt, .. }
            | ApiError::Unauthorized { prompt, .. }
            | ApiError::Forbidden { prompt, .. }
            | ApiError::NotFound { prompt, .. }
            | ApiError::InternalError { prompt, .. } => *prompt = Some(value),
        }
        self
    }

    /// Wrap a store failure with the operation kind and the original message
    pub fn from_store(op: StoreOp, err: DatabaseError) -> Self {
        match err {
            DatabaseError::Filter(e) => ApiError::from(e),
            other => {
                tracing::error!("document store {} error: {}", op.as_str(), other);
                ApiError::internal_error(format!("document store {} error", op.as_str()))
                    .with_prompt(other.to_string())
            }
        }
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest { message: message.into(), prompt: None }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized { message: message.into(), prompt: None }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden { message: message.into(), prompt: None }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound { message: message.into(), prompt: None }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        ApiError::InternalError { message: message.into(), prompt: None }
    }
}

// Filter problems always come from caller input
impl From<FilterError> for ApiError {
    fn from(err: FilterError) -> Self {
        ApiError::bad_request("invalid query filter").with_prompt(err.to_string())
    }
}

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        tracing::error!("Cache error: {}", err);
        ApiError::internal_error("key-value cache error").with_prompt(err.to_string())
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.prompt() {
            Some(prompt) => write!(f, "{} ({})", self.message(), prompt),
            None => write!(f, "{}", self.message()),
        }
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        tracing::warn!("{}", self);
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}
