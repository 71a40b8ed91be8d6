use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, FromRedisValue, RedisError};
use tracing::{error, info};

use super::{CacheError, CacheResult, KeyValueCache};
use crate::config::CacheConfig;

/// Cache backed by a Redis server. The connection manager reconnects on its
/// own, so one instance is shared by every request.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache").finish_non_exhaustive()
    }
}

/// `redis://[:password@]host:port/db`; the password is percent-encoded
pub fn connection_url(config: &CacheConfig) -> CacheResult<String> {
    let mut url = url::Url::parse(&format!("redis://{}:{}/{}", config.host, config.port, config.db))
        .map_err(|e| CacheError::Backend(format!("invalid cache address {}:{}: {}", config.host, config.port, e)))?;
    if let Some(password) = config.password.as_deref() {
        url.set_password(Some(password))
            .map_err(|_| CacheError::Backend("cannot attach cache password".to_string()))?;
    }
    Ok(url.into())
}

/// Server replies that name a wrong-typed key or a non-integer value keep
/// their meaning; everything else is a backend failure
fn classify(err: RedisError) -> CacheError {
    let message = err.to_string();
    if message.contains("WRONGTYPE") {
        CacheError::WrongType(message)
    } else if message.contains("not an integer") {
        CacheError::NotAnInteger(message)
    } else {
        CacheError::Backend(message)
    }
}

fn millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

impl RedisCache {
    pub async fn connect(config: &CacheConfig) -> CacheResult<Self> {
        let client = Client::open(connection_url(config)?).map_err(classify)?;
        let conn = ConnectionManager::new(client).await.map_err(|e| {
            error!("cache connection to {}:{} failed: {}", config.host, config.port, e);
            classify(e)
        })?;
        let cache = Self { conn };
        // fail now rather than on the first login check
        cache.get("usability_testing").await?;
        info!("Connected to cache at {}:{}/{}", config.host, config.port, config.db);
        Ok(cache)
    }

    async fn run<T: FromRedisValue>(&self, cmd: &redis::Cmd) -> CacheResult<T> {
        let mut conn = self.conn.clone();
        cmd.query_async(&mut conn).await.map_err(classify)
    }
}

#[async_trait]
impl KeyValueCache for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.run(redis::cmd("GET").arg(key)).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(millis(ttl));
        }
        self.run(&cmd).await
    }

    async fn getset(&self, key: &str, value: &str) -> CacheResult<Option<String>> {
        self.run(redis::cmd("GETSET").arg(key).arg(value)).await
    }

    async fn mget(&self, keys: &[&str]) -> CacheResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        self.run(redis::cmd("MGET").arg(keys)).await
    }

    async fn mset(&self, pairs: &[(&str, &str)]) -> CacheResult<()> {
        if pairs.is_empty() {
            return Ok(());
        }
        let mut cmd = redis::cmd("MSET");
        for (key, value) in pairs {
            cmd.arg(*key).arg(*value);
        }
        self.run(&cmd).await
    }

    async fn incr(&self, key: &str, amount: i64) -> CacheResult<i64> {
        self.run(redis::cmd("INCRBY").arg(key).arg(amount)).await
    }

    async fn decr(&self, key: &str, amount: i64) -> CacheResult<i64> {
        self.run(redis::cmd("DECRBY").arg(key).arg(amount)).await
    }

    async fn delete(&self, keys: &[&str]) -> CacheResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.run(redis::cmd("DEL").arg(keys)).await
    }

    async fn exists(&self, keys: &[&str]) -> CacheResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.run(redis::cmd("EXISTS").arg(keys)).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        self.run(redis::cmd("PEXPIRE").arg(key).arg(millis(ttl))).await
    }

    async fn lpush(&self, key: &str, values: &[&str]) -> CacheResult<u64> {
        if values.is_empty() {
            return self.run(redis::cmd("LLEN").arg(key)).await;
        }
        self.run(redis::cmd("LPUSH").arg(key).arg(values)).await
    }

    async fn rpush(&self, key: &str, values: &[&str]) -> CacheResult<u64> {
        if values.is_empty() {
            return self.run(redis::cmd("LLEN").arg(key)).await;
        }
        self.run(redis::cmd("RPUSH").arg(key).arg(values)).await
    }

    async fn lpop(&self, key: &str) -> CacheResult<Option<String>> {
        self.run(redis::cmd("LPOP").arg(key)).await
    }

    async fn rpop(&self, key: &str) -> CacheResult<Option<String>> {
        self.run(redis::cmd("RPOP").arg(key)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redis::ErrorKind;

    fn config(password: Option<&str>) -> CacheConfig {
        CacheConfig {
            host: "cache.internal".to_string(),
            port: 6380,
            db: 2,
            password: password.map(str::to_string),
        }
    }

    #[test]
    fn url_without_password() {
        assert_eq!(connection_url(&config(None)).unwrap(), "redis://cache.internal:6380/2");
    }

    #[test]
    fn url_with_encoded_password() {
        let url = connection_url(&config(Some("p@ss/word"))).unwrap();
        assert_eq!(url, "redis://:p%40ss%2Fword@cache.internal:6380/2");
    }

    #[test]
    fn server_errors_keep_their_kind() {
        let wrong = RedisError::from((
            ErrorKind::ExtensionError,
            "WRONGTYPE",
            "Operation against a key holding the wrong kind of value".to_string(),
        ));
        assert!(matches!(classify(wrong), CacheError::WrongType(_)));

        let not_int = RedisError::from((
            ErrorKind::ResponseError,
            "An error was signalled by the server",
            "value is not an integer or out of range".to_string(),
        ));
        assert!(matches!(classify(not_int), CacheError::NotAnInteger(_)));

        let io = RedisError::from((ErrorKind::IoError, "connection refused"));
        assert!(matches!(classify(io), CacheError::Backend(_)));
    }

    #[test]
    fn expiry_is_at_least_one_millisecond() {
        assert_eq!(millis(Duration::ZERO), 1);
        assert_eq!(millis(Duration::from_secs(2)), 2000);
    }
}
