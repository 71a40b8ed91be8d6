use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::warn;

use super::token::{TokenCodec, SUBJECT_SEPARATOR};
use crate::cache::{KeyValueCache, RedisCache};
use crate::config::AppConfig;
use crate::database::{DatabaseError, DocumentStore};
use crate::error::ApiError;
use crate::filter::{FilterSpec, FilterValue};

/// Field of a data record listing the groups allowed to see it
pub const GROUP_FIELD: &str = "group_list";

/// Field naming a record's author, used when a role cannot see all data
pub const DEFAULT_USER_FIELD: &str = "creator";

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub debug: bool,
    pub debug_permission: Vec<u32>,
    pub proxy_none_response: bool,
    pub admin_users: Vec<String>,
    pub secret_key: String,
    pub token_expiration_secs: u64,
    pub bootstrap_delay: Duration,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            debug: false,
            debug_permission: vec![0, 1, 2, 4, 8, 16, 32],
            proxy_none_response: true,
            admin_users: Vec::new(),
            secret_key: String::new(),
            token_expiration_secs: 60 * 60 * 24 * 7,
            bootstrap_delay: Duration::from_secs(10),
        }
    }
}

impl AuthSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            debug: config.security.debug,
            debug_permission: config.security.debug_permission.clone(),
            proxy_none_response: config.security.proxy_none_response,
            admin_users: config.security.admin_users.clone(),
            secret_key: config.security.secret_key.clone(),
            token_expiration_secs: config.security.token_expiration_secs,
            bootstrap_delay: Duration::from_secs(config.bootstrap.delay_secs),
        }
    }

    /// Debug mode is on when configured, and always on Windows hosts
    pub fn debug_mode(&self) -> bool {
        self.debug || cfg!(target_os = "windows")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub token_id: String,
    pub user_name: String,
    pub real_name: String,
}

impl Identity {
    fn debug_stub() -> Self {
        Self {
            token_id: "0f0f0f0f0f0f0f0f0f0f0f0f".to_string(),
            user_name: "tmp_use".to_string(),
            real_name: "debug account".to_string(),
        }
    }
}

/// Identity plus the role and group names loaded from the user record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    pub identity: Identity,
    pub role_names: Vec<String>,
    pub group_list: Vec<String>,
}

/// Permissions a session holds for one (center, permission) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionGrant {
    pub permission_list: BTreeSet<u32>,
    pub is_all_data: bool,
}

impl PermissionGrant {
    pub fn allows(&self, status: u32) -> bool {
        self.permission_list.contains(&status)
    }
}

/// Resolves credentials to sessions and sessions to permissions. Holds no
/// per-request state, so one instance serves every request.
#[derive(Clone)]
pub struct AuthorizationCenter {
    settings: AuthSettings,
    tokens: TokenCodec,
    cache: Option<Arc<dyn KeyValueCache>>,
    users: Option<DocumentStore>,
    roles: Option<DocumentStore>,
    permissions: Option<DocumentStore>,
    permission_sets: Option<DocumentStore>,
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

impl AuthorizationCenter {
    pub fn new(settings: AuthSettings) -> Self {
        let tokens = TokenCodec::new(settings.secret_key.clone(), settings.token_expiration_secs);
        Self {
            settings,
            tokens,
            cache: None,
            users: None,
            roles: None,
            permissions: None,
            permission_sets: None,
        }
    }

    /// Build from configuration, opening a Postgres collection for every
    /// record collection that is configured. Without an explicit cache the
    /// configured Redis server is used; if it is unreachable the center is
    /// still built and login checks answer 500.
    pub async fn connect(config: &AppConfig, cache: Option<Arc<dyn KeyValueCache>>) -> Result<Self, DatabaseError> {
        let mut center = Self::new(AuthSettings::from_config(config));
        center.cache = match cache {
            Some(cache) => Some(cache),
            None if center.settings.debug_mode() => None,
            None => match RedisCache::connect(&config.cache).await {
                Ok(redis) => Some(Arc::new(redis) as Arc<dyn KeyValueCache>),
                Err(e) => {
                    warn!("session cache unavailable: {}", e);
                    None
                }
            },
        };

        let collections = &config.collections;
        let Some(db_name) = collections.db_name.as_deref() else {
            warn!("AUTH_DB_NAME not set; authorization record collections are not connected");
            return Ok(center);
        };
        if let Some(name) = &collections.user {
            center.users = Some(DocumentStore::postgres(db_name, name).await?);
        }
        if let Some(name) = &collections.role {
            center.roles = Some(DocumentStore::postgres(db_name, name).await?);
        }
        if let Some(name) = &collections.permission {
            center.permissions = Some(DocumentStore::postgres(db_name, name).await?);
        }
        if let Some(name) = &collections.permission_set {
            center.permission_sets = Some(DocumentStore::postgres(db_name, name).await?);
        }
        Ok(center)
    }

    pub fn with_cache(mut self, cache: Arc<dyn KeyValueCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_users(mut self, store: DocumentStore) -> Self {
        self.users = Some(store);
        self
    }

    pub fn with_roles(mut self, store: DocumentStore) -> Self {
        self.roles = Some(store);
        self
    }

    pub fn with_permissions(mut self, store: DocumentStore) -> Self {
        self.permissions = Some(store);
        self
    }

    pub fn with_permission_sets(mut self, store: DocumentStore) -> Self {
        self.permission_sets = Some(store);
        self
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    pub fn tokens(&self) -> &TokenCodec {
        &self.tokens
    }

    pub(crate) fn permission_store(&self) -> Option<&DocumentStore> {
        self.permissions.as_ref()
    }

    pub(crate) fn permission_set_store(&self) -> Option<&DocumentStore> {
        self.permission_sets.as_ref()
    }

    fn require_cache(&self) -> Result<&Arc<dyn KeyValueCache>, ApiError> {
        self.cache.as_ref().ok_or_else(|| {
            ApiError::internal_error("not connected to the authentication cache; cannot verify credentials")
        })
    }

    /// Verify a signed credential and check it is still the user's current
    /// session in the cache
    pub async fn resolve_identity(&self, credential: Option<&str>) -> Result<Identity, ApiError> {
        if self.settings.debug_mode() {
            return Ok(Identity::debug_stub());
        }
        let cache = self.require_cache()?;

        let token = credential.map(str::trim).filter(|t| !t.is_empty()).ok_or_else(|| {
            ApiError::unauthorized("token verification failed").with_prompt("missing token")
        })?;
        let claims = self
            .tokens
            .decode(token)
            .map_err(|e| ApiError::unauthorized("token verification failed").with_prompt(e.to_string()))?;

        let subject = claims.id;
        // the real name is the remainder and may itself contain the separator
        let parts: Vec<&str> = subject.splitn(3, SUBJECT_SEPARATOR).collect();
        let [token_id, user_name, real_name] = parts.as_slice() else {
            return Err(ApiError::unauthorized("token verification failed").with_prompt("malformed token subject"));
        };

        let current = cache.get(token_id).await?;
        if current.as_deref() != Some(subject.as_str()) {
            return Err(ApiError::unauthorized("session invalidated, please re-authenticate"));
        }

        Ok(Identity {
            token_id: token_id.to_string(),
            user_name: user_name.to_string(),
            real_name: real_name.to_string(),
        })
    }

    /// Load role and group names from the user record
    pub async fn load_session(&self, identity: Identity) -> Result<Session, ApiError> {
        if self.settings.debug_mode() {
            return Ok(Session { identity, role_names: Vec::new(), group_list: Vec::new() });
        }
        self.require_cache()?;
        if self.roles.is_none() {
            return Err(ApiError::internal_error(
                "not connected to the role collection; cannot verify permissions",
            ));
        }
        let users = self.users.as_ref().ok_or_else(|| {
            ApiError::internal_error("not connected to the user collection; cannot verify permissions")
        })?;

        let user = users
            .find_by_id(&Value::String(identity.token_id.clone()), true)
            .await?
            .unwrap_or_default();

        Ok(Session {
            identity,
            role_names: string_list(user.get("role_name")),
            group_list: string_list(user.get("group_name")),
        })
    }

    /// Merge the session's roles' permissions for one center/permission.
    ///
    /// Status codes are unioned across every matching role record. Data scope
    /// is all-data only when every matching record grants it. An empty or
    /// `{0}` result is refused when denials are proxied.
    pub async fn resolve_permissions(
        &self,
        session: &Session,
        center_name: &str,
        permission_name: &str,
    ) -> Result<PermissionGrant, ApiError> {
        if self.settings.debug_mode() {
            return Ok(PermissionGrant {
                permission_list: self.settings.debug_permission.iter().copied().collect(),
                is_all_data: true,
            });
        }
        self.require_cache()?;
        let roles = self.roles.as_ref().ok_or_else(|| {
            ApiError::internal_error("not connected to the role collection; cannot verify permissions")
        })?;

        let mut permission_list = BTreeSet::new();
        let mut all_data_flags = BTreeSet::new();
        for role_name in &session.role_names {
            let filter = json!({
                "role_name": role_name,
                "center_name": center_name,
                "permission_name": permission_name,
            });
            let Some(record) = roles.find(&filter, false).await?.into_iter().next() else {
                continue;
            };
            permission_list.extend(
                record
                    .get("permission_status")
                    .and_then(Value::as_array)
                    .into_iter()
                    .flatten()
                    .filter_map(Value::as_u64)
                    .filter_map(|s| u32::try_from(s).ok()),
            );
            all_data_flags.insert(record.get("is_all_data").and_then(Value::as_bool).unwrap_or(false));
        }

        let is_all_data = all_data_flags.len() == 1 && all_data_flags.contains(&true);

        let no_access = permission_list.is_empty() || permission_list.iter().eq([0u32].iter());
        if self.settings.proxy_none_response && no_access {
            let listed: Vec<u32> = permission_list.iter().copied().collect();
            return Err(ApiError::forbidden(format!(
                "no access to \"{}-{}\" ({:?})",
                center_name, permission_name, listed
            ))
            .with_prompt(json!({
                "center_name": center_name,
                "permission_name": permission_name,
                "permission_list": listed,
            })));
        }

        Ok(PermissionGrant { permission_list, is_all_data })
    }

    /// Data-visibility filter for a user. Admins see everything; others see
    /// records shared with one of their groups, and only their own records
    /// unless their roles grant all data.
    pub fn filter_verify(
        &self,
        group_list: &[String],
        is_all_data: bool,
        user_name: &str,
        user_field: &str,
    ) -> Result<FilterSpec, ApiError> {
        let mut filter = FilterSpec::new();
        let is_admin = self.settings.admin_users.iter().any(|admin| admin == user_name);
        if !is_admin {
            if group_list.is_empty() {
                return Err(ApiError::forbidden("user has no group permission; cannot operate on data"));
            }
            let groups = group_list.iter().cloned().map(Value::String).collect();
            filter.insert(GROUP_FIELD, FilterValue::AnyOf(groups));
        }

        if !is_all_data {
            filter.insert(user_field, FilterValue::Literal(Value::String(user_name.to_string())));
        }
        Ok(filter)
    }

    /// `filter_verify` for a loaded session and one of its grants
    pub fn session_filter(&self, session: &Session, grant: &PermissionGrant, user_field: &str) -> Result<FilterSpec, ApiError> {
        self.filter_verify(&session.group_list, grant.is_all_data, &session.identity.user_name, user_field)
    }
}

/// Record describing a permission, as written by the bootstrap task
pub(crate) fn permission_record(center_name: &str, permission_name: &str) -> Map<String, Value> {
    let mut record = Map::new();
    record.insert("center_name".to_string(), Value::String(center_name.to_string()));
    record.insert("permission_name".to_string(), Value::String(permission_name.to_string()));
    record
}
