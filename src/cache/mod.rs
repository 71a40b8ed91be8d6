//! Key-value cache capability consumed by the authorization center. Live
//! deployments use Redis; the in-process implementation serves tests and
//! embedders.

mod memory;
mod redis_cache;

pub use memory::MemoryCache;
pub use redis_cache::{connection_url, RedisCache};

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CacheError {
    #[error("operation against a key holding the wrong kind of value: {0}")]
    WrongType(String),

    #[error("value is not an integer or out of range: {0}")]
    NotAnInteger(String),

    #[error("cache backend error: {0}")]
    Backend(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// String-keyed cache of string values and string lists, with optional expiry
#[async_trait]
pub trait KeyValueCache: Send + Sync + 'static {
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Store `value`, replacing any previous value and expiry
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()>;

    /// Store `value` and return the previous one
    async fn getset(&self, key: &str, value: &str) -> CacheResult<Option<String>>;

    async fn mget(&self, keys: &[&str]) -> CacheResult<Vec<Option<String>>>;

    async fn mset(&self, pairs: &[(&str, &str)]) -> CacheResult<()>;

    /// Add `amount` to the integer at `key`, treating a missing key as 0
    async fn incr(&self, key: &str, amount: i64) -> CacheResult<i64>;

    async fn decr(&self, key: &str, amount: i64) -> CacheResult<i64>;

    /// Number of keys removed
    async fn delete(&self, keys: &[&str]) -> CacheResult<u64>;

    /// Number of the given keys that exist
    async fn exists(&self, keys: &[&str]) -> CacheResult<u64>;

    /// False when the key does not exist
    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool>;

    /// Push each value onto the head of the list in turn; returns the new length
    async fn lpush(&self, key: &str, values: &[&str]) -> CacheResult<u64>;

    async fn rpush(&self, key: &str, values: &[&str]) -> CacheResult<u64>;

    async fn lpop(&self, key: &str) -> CacheResult<Option<String>>;

    async fn rpop(&self, key: &str) -> CacheResult<Option<String>>;
}
