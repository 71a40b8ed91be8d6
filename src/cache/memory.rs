use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{CacheError, CacheResult, KeyValueCache};

#[derive(Debug, Clone)]
enum Stored {
    Text(String),
    List(VecDeque<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Stored,
    expires_at: Option<Instant>,
}

impl Entry {
    fn live(&self, now: Instant) -> bool {
        self.expires_at.map(|at| at > now).unwrap_or(true)
    }
}

/// Cache held in process memory. Expired keys are dropped lazily on access.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

/// Live entry for `key`, removing it first if it has expired
fn live_entry<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> Option<&'a mut Entry> {
    let now = Instant::now();
    if entries.get(key).map(|e| !e.live(now)).unwrap_or(false) {
        entries.remove(key);
    }
    entries.get_mut(key)
}

fn text(entry: Option<&mut Entry>, key: &str) -> CacheResult<Option<String>> {
    match entry.map(|e| &e.value) {
        None => Ok(None),
        Some(Stored::Text(s)) => Ok(Some(s.clone())),
        Some(Stored::List(_)) => Err(CacheError::WrongType(key.to_string())),
    }
}

fn list<'a>(entries: &'a mut HashMap<String, Entry>, key: &str) -> CacheResult<&'a mut VecDeque<String>> {
    if live_entry(entries, key).is_none() {
        entries.insert(key.to_string(), Entry { value: Stored::List(VecDeque::new()), expires_at: None });
    }
    match entries.get_mut(key).map(|e| &mut e.value) {
        Some(Stored::List(items)) => Ok(items),
        _ => Err(CacheError::WrongType(key.to_string())),
    }
}

impl MemoryCache {
    async fn add(&self, key: &str, amount: i64) -> CacheResult<i64> {
        let mut entries = self.entries.lock().await;
        let current = match text(live_entry(&mut entries, key), key)? {
            None => 0,
            Some(s) => s.parse::<i64>().map_err(|_| CacheError::NotAnInteger(s))?,
        };
        let next = current
            .checked_add(amount)
            .ok_or_else(|| CacheError::NotAnInteger(format!("{} + {}", current, amount)))?;
        let expires_at = entries.get(key).and_then(|e| e.expires_at);
        entries.insert(key.to_string(), Entry { value: Stored::Text(next.to_string()), expires_at });
        Ok(next)
    }

    async fn pop(&self, key: &str, front: bool) -> CacheResult<Option<String>> {
        let mut entries = self.entries.lock().await;
        let popped = match live_entry(&mut entries, key) {
            None => return Ok(None),
            Some(Entry { value: Stored::List(items), .. }) => {
                if front {
                    items.pop_front()
                } else {
                    items.pop_back()
                }
            }
            Some(_) => return Err(CacheError::WrongType(key.to_string())),
        };
        if matches!(entries.get(key), Some(Entry { value: Stored::List(items), .. }) if items.is_empty()) {
            entries.remove(key);
        }
        Ok(popped)
    }
}

#[async_trait]
impl KeyValueCache for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut entries = self.entries.lock().await;
        text(live_entry(&mut entries, key), key)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: Stored::Text(value.to_string()),
                expires_at: ttl.map(|t| Instant::now() + t),
            },
        );
        Ok(())
    }

    async fn getset(&self, key: &str, value: &str) -> CacheResult<Option<String>> {
        let mut entries = self.entries.lock().await;
        let previous = text(live_entry(&mut entries, key), key)?;
        entries.insert(key.to_string(), Entry { value: Stored::Text(value.to_string()), expires_at: None });
        Ok(previous)
    }

    async fn mget(&self, keys: &[&str]) -> CacheResult<Vec<Option<String>>> {
        let mut entries = self.entries.lock().await;
        // Non-text values read as missing, like a multi-get does
        Ok(keys
            .iter()
            .map(|k| text(live_entry(&mut entries, k), k).ok().flatten())
            .collect())
    }

    async fn mset(&self, pairs: &[(&str, &str)]) -> CacheResult<()> {
        let mut entries = self.entries.lock().await;
        for (key, value) in pairs {
            entries.insert(key.to_string(), Entry { value: Stored::Text(value.to_string()), expires_at: None });
        }
        Ok(())
    }

    async fn incr(&self, key: &str, amount: i64) -> CacheResult<i64> {
        self.add(key, amount).await
    }

    async fn decr(&self, key: &str, amount: i64) -> CacheResult<i64> {
        let negated = amount
            .checked_neg()
            .ok_or_else(|| CacheError::NotAnInteger(amount.to_string()))?;
        self.add(key, negated).await
    }

    async fn delete(&self, keys: &[&str]) -> CacheResult<u64> {
        let mut entries = self.entries.lock().await;
        let mut removed = 0;
        for key in keys {
            if live_entry(&mut entries, key).is_some() {
                entries.remove(*key);
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn exists(&self, keys: &[&str]) -> CacheResult<u64> {
        let mut entries = self.entries.lock().await;
        Ok(keys.iter().filter(|k| live_entry(&mut entries, k).is_some()).count() as u64)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        let mut entries = self.entries.lock().await;
        match live_entry(&mut entries, key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn lpush(&self, key: &str, values: &[&str]) -> CacheResult<u64> {
        let mut entries = self.entries.lock().await;
        let items = list(&mut entries, key)?;
        for v in values {
            items.push_front(v.to_string());
        }
        Ok(items.len() as u64)
    }

    async fn rpush(&self, key: &str, values: &[&str]) -> CacheResult<u64> {
        let mut entries = self.entries.lock().await;
        let items = list(&mut entries, key)?;
        for v in values {
            items.push_back(v.to_string());
        }
        Ok(items.len() as u64)
    }

    async fn lpop(&self, key: &str) -> CacheResult<Option<String>> {
        self.pop(key, true).await
    }

    async fn rpop(&self, key: &str) -> CacheResult<Option<String>> {
        self.pop(key, false).await
    }
}
