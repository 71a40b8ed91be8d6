use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub collections: CollectionConfig,
    pub cache: CacheConfig,
    pub bootstrap: BootstrapConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Base connection URL; the path is swapped per database name
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub secret_key: String,
    /// Token lifetime in seconds
    pub token_expiration_secs: u64,
    pub debug: bool,
    pub debug_permission: Vec<u32>,
    pub proxy_none_response: bool,
    pub admin_users: Vec<String>,
}

/// Where the authorization center keeps its records. Any collection left
/// unset means that collaborator is not configured.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub db_name: Option<String>,
    pub permission: Option<String>,
    pub permission_set: Option<String>,
    pub role: Option<String>,
    pub user: Option<String>,
}

/// Key-value cache holding live login sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub host: String,
    pub port: u16,
    pub db: i64,
    /// Connect without authentication when unset
    pub password: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            db: 0,
            password: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    pub delay_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v);
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }

        // Security overrides
        if let Ok(v) = env::var("SECRET_KEY") {
            self.security.secret_key = v;
        }
        if let Ok(v) = env::var("EXPIRATION") {
            self.security.token_expiration_secs = v.parse().unwrap_or(self.security.token_expiration_secs);
        }
        if let Ok(v) = env::var("AUTH_DEBUG") {
            self.security.debug = parse_flag("AUTH_DEBUG", &v, self.security.debug);
        }
        if let Ok(v) = env::var("AUTH_PROXY_NONE_RESPONSE") {
            self.security.proxy_none_response =
                parse_flag("AUTH_PROXY_NONE_RESPONSE", &v, self.security.proxy_none_response);
        }
        if let Ok(v) = env::var("ADMIN_USER") {
            self.security.admin_users = split_list(&v);
        }

        // Collection overrides
        self.collections.db_name = env::var("AUTH_DB_NAME").ok().or(self.collections.db_name);
        self.collections.permission = env::var("AUTH_PERMISSION_COLLECTION").ok().or(self.collections.permission);
        self.collections.permission_set = env::var("AUTH_PERMISSION_SET_COLLECTION").ok().or(self.collections.permission_set);
        self.collections.role = env::var("AUTH_ROLE_COLLECTION").ok().or(self.collections.role);
        self.collections.user = env::var("AUTH_USER_COLLECTION").ok().or(self.collections.user);

        // Cache overrides
        if let Ok(v) = env::var("REDIS_HOST") {
            self.cache.host = v;
        }
        if let Ok(v) = env::var("REDIS_PORT") {
            self.cache.port = v.parse().unwrap_or(self.cache.port);
        }
        if let Ok(v) = env::var("REDIS_DB") {
            self.cache.db = v.parse().unwrap_or(self.cache.db);
        }
        self.cache.password = env::var("REDIS_PASSWORD")
            .ok()
            .filter(|v| !v.is_empty())
            .or(self.cache.password);

        // Bootstrap overrides
        if let Ok(v) = env::var("PERMISSION_BOOTSTRAP_DELAY_SECS") {
            self.bootstrap.delay_secs = v.parse().unwrap_or(self.bootstrap.delay_secs);
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
            },
            security: SecurityConfig {
                secret_key: String::new(),
                token_expiration_secs: 60 * 60 * 24 * 7, // 1 week
                debug: false,
                debug_permission: default_debug_permission(),
                proxy_none_response: true,
                admin_users: vec![],
            },
            collections: CollectionConfig::default(),
            cache: CacheConfig::default(),
            bootstrap: BootstrapConfig { delay_secs: 10 },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig {
                url: None,
                max_connections: 20,
            },
            security: SecurityConfig {
                secret_key: String::new(),
                token_expiration_secs: 60 * 60 * 24,
                debug: false,
                debug_permission: default_debug_permission(),
                proxy_none_response: true,
                admin_users: vec![],
            },
            collections: CollectionConfig::default(),
            cache: CacheConfig::default(),
            bootstrap: BootstrapConfig { delay_secs: 10 },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                url: None,
                max_connections: 50,
            },
            security: SecurityConfig {
                secret_key: String::new(),
                token_expiration_secs: 60 * 60 * 4,
                debug: false,
                debug_permission: default_debug_permission(),
                proxy_none_response: true,
                admin_users: vec![],
            },
            collections: CollectionConfig::default(),
            cache: CacheConfig::default(),
            bootstrap: BootstrapConfig { delay_secs: 10 },
        }
    }
}

fn default_debug_permission() -> Vec<u32> {
    vec![0, 1, 2, 4, 8, 16, 32]
}

/// Boolean switch from the environment. Unrecognized values keep `current`.
fn parse_flag(name: &str, raw: &str, current: bool) -> bool {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" | "" => false,
        other => {
            warn!("ignoring {}={:?}; expected true/false, yes/no, on/off or 1/0", name, other);
            current
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// Global singleton config - initialized once at first access
pub static CONFIG: Lazy<AppConfig> = Lazy::new(|| {
    let _ = dotenvy::dotenv();
    AppConfig::from_env()
});

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
