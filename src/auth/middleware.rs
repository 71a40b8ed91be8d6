use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use serde::Serialize;

use super::bootstrap::PermissionDefault;
use super::center::{AuthorizationCenter, Identity, PermissionGrant, Session};
use crate::error::ApiError;
use crate::filter::FilterSpec;

/// Resolved caller context placed in request extensions by `require_session`
#[derive(Debug, Clone, Serialize)]
pub struct RequestSession {
    pub identity: Identity,
    pub group_list: Vec<String>,
    /// Grants keyed by each permission default's `session_key`
    pub permissions: BTreeMap<String, PermissionGrant>,
    #[serde(skip)]
    session: Session,
}

impl RequestSession {
    pub fn grant(&self, session_key: &str) -> Option<&PermissionGrant> {
        self.permissions.get(session_key)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Data-visibility filter for the grant stored under `session_key`
    pub fn data_filter(
        &self,
        center: &AuthorizationCenter,
        session_key: &str,
        user_field: &str,
    ) -> Result<FilterSpec, ApiError> {
        let grant = self
            .grant(session_key)
            .ok_or_else(|| ApiError::internal_error(format!("no permission resolved for {}", session_key)))?;
        center.session_filter(&self.session, grant, user_field)
    }
}

/// State for `require_session`
#[derive(Clone)]
pub struct AuthGate {
    center: Arc<AuthorizationCenter>,
    defaults: Arc<Vec<PermissionDefault>>,
    allow_list: Arc<Vec<String>>,
}

impl AuthGate {
    pub fn new(center: Arc<AuthorizationCenter>, defaults: Vec<PermissionDefault>, allow_list: Vec<String>) -> Self {
        Self {
            center,
            defaults: Arc::new(defaults),
            allow_list: Arc::new(allow_list),
        }
    }

    pub fn center(&self) -> &Arc<AuthorizationCenter> {
        &self.center
    }

    /// Allow-list entries match exactly, except that an entry ending in
    /// `/<param>` matches any final path segment
    pub fn is_allowed(&self, path: &str) -> bool {
        self.allow_list.iter().any(|entry| match entry.split_once("/<") {
            Some((prefix, _)) => path.rsplit_once('/').map(|(parent, _)| parent) == Some(prefix),
            None => path == entry,
        })
    }

    /// Resolve the caller and every declared permission
    pub async fn authorize(&self, headers: &HeaderMap) -> Result<RequestSession, ApiError> {
        let credential = extract_credential(headers);
        let identity = self.center.resolve_identity(credential.as_deref()).await?;
        let session = self.center.load_session(identity).await?;

        let mut permissions = BTreeMap::new();
        for per in self.defaults.iter() {
            let grant = self
                .center
                .resolve_permissions(&session, &per.center_name, &per.permission_name)
                .await?;
            permissions.insert(per.session_key.clone(), grant);
        }

        Ok(RequestSession {
            identity: session.identity.clone(),
            group_list: session.group_list.clone(),
            permissions,
            session,
        })
    }
}

/// Middleware for `axum::middleware::from_fn_with_state` that rejects
/// requests without a valid session, except on allow-listed paths
pub async fn require_session(
    State(gate): State<AuthGate>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if gate.is_allowed(request.uri().path()) {
        return Ok(next.run(request).await);
    }
    let session = gate.authorize(request.headers()).await?;
    request.extensions_mut().insert(session);
    Ok(next.run(request).await)
}

/// Credential from the `token` header, or a bearer `Authorization` header
fn extract_credential(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = headers.get("token").and_then(|v| v.to_str().ok()) {
        return Some(token.to_string());
    }
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}
