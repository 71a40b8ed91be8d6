#![allow(dead_code)]

use std::sync::{Arc, Once};

use anyhow::{Context, Result};
use serde_json::{json, Value};

use docgate::auth::{AuthSettings, AuthorizationCenter, TokenCodec};
use docgate::cache::{KeyValueCache, MemoryCache};
use docgate::database::DocumentStore;

pub const SECRET: &str = "test-secret";

static LOGGING: Once = Once::new();

pub fn init_logging() {
    LOGGING.call_once(docgate::logging::init);
}

pub fn store(collection: &str) -> DocumentStore {
    init_logging();
    DocumentStore::memory(collection)
}

pub fn settings() -> AuthSettings {
    AuthSettings {
        secret_key: SECRET.to_string(),
        token_expiration_secs: 600,
        ..AuthSettings::default()
    }
}

/// Authorization center wired to in-memory collaborators
pub struct AuthFixture {
    pub center: Arc<AuthorizationCenter>,
    pub cache: Arc<MemoryCache>,
    pub users: DocumentStore,
    pub roles: DocumentStore,
    pub permissions: DocumentStore,
    pub permission_sets: DocumentStore,
}

impl AuthFixture {
    pub fn new(settings: AuthSettings) -> Self {
        init_logging();
        let cache = MemoryCache::new_shared();
        let users = DocumentStore::memory("users");
        let roles = DocumentStore::memory("roles");
        let permissions = DocumentStore::memory("permissions");
        let permission_sets = DocumentStore::memory("permission_sets");
        let center = AuthorizationCenter::new(settings)
            .with_cache(cache.clone())
            .with_users(users.clone())
            .with_roles(roles.clone())
            .with_permissions(permissions.clone())
            .with_permission_sets(permission_sets.clone());
        Self {
            center: Arc::new(center),
            cache,
            users,
            roles,
            permissions,
            permission_sets,
        }
    }

    /// Create a user record and a live cached session; returns the token
    pub async fn login(&self, user_name: &str, roles: &[&str], groups: &[&str]) -> Result<String> {
        let id = self
            .users
            .insert(&json!({"user_name": user_name, "role_name": roles, "group_name": groups}))
            .await
            .context("insert user")?;
        let subject = TokenCodec::subject(&id, user_name, "Real Name");
        self.cache.set(&id, &subject, None).await?;
        Ok(TokenCodec::new(SECRET, 600).encode(&subject)?)
    }

    pub async fn grant(&self, role: &str, center: &str, permission: &str, status: Value, all_data: bool) -> Result<()> {
        self.roles
            .insert(&json!({
                "role_name": role,
                "center_name": center,
                "permission_name": permission,
                "permission_status": status,
                "is_all_data": all_data,
            }))
            .await?;
        Ok(())
    }
}
