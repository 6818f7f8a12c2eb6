//! In-process [`KeyValueStore`] implementation.
//!
//! Backed by a mutexed map with lazy TTL expiry: entries are purged on
//! access once their deadline has passed. Uses `tokio::time::Instant`
//! so tests can pause and advance the clock.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{KeyValueStore, StoreError};

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Hash(HashMap<String, u64>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Instant,
}

impl Entry {
    fn expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

/// In-memory store with per-entry TTLs and atomic counters.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Drop the entry at `key` if its deadline has passed.
fn purge_expired(entries: &mut HashMap<String, Entry>, key: &str, now: Instant) {
    if entries.get(key).is_some_and(|e| e.expired(now)) {
        entries.remove(key);
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("store lock poisoned");
        purge_expired(&mut entries, key, now);
        match entries.get(key) {
            Some(Entry {
                value: Value::Text(s),
                ..
            }) => Ok(Some(s.clone())),
            _ => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().expect("store lock poisoned");
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .expect("store lock poisoned")
            .remove(key);
        Ok(())
    }

    async fn incr_expire(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("store lock poisoned");
        let count = match entries.get(key) {
            Some(entry) if !entry.expired(now) => match &entry.value {
                Value::Text(s) => s.parse::<u64>().unwrap_or(0) + 1,
                Value::Hash(_) => 1,
            },
            _ => 1,
        };
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(count.to_string()),
                expires_at: now + ttl,
            },
        );
        Ok(count)
    }

    async fn decr(&self, key: &str) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("store lock poisoned");
        match entries.get_mut(key) {
            Some(entry) if !entry.expired(now) => {
                if let Value::Text(s) = &entry.value {
                    let count = s.parse::<u64>().unwrap_or(0).saturating_sub(1);
                    entry.value = Value::Text(count.to_string());
                    return Ok(count);
                }
                Ok(0)
            }
            _ => Ok(0),
        }
    }

    async fn hash_incr(
        &self,
        key: &str,
        field: &str,
        by: u64,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("store lock poisoned");
        let mut hash = match entries.get(key) {
            Some(entry) if !entry.expired(now) => match &entry.value {
                Value::Hash(h) => h.clone(),
                Value::Text(_) => HashMap::new(),
            },
            _ => HashMap::new(),
        };
        *hash.entry(field.to_string()).or_insert(0) += by;
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Hash(hash),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, u64>, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().expect("store lock poisoned");
        purge_expired(&mut entries, key, now);
        match entries.get(key) {
            Some(Entry {
                value: Value::Hash(h),
                ..
            }) => Ok(h.clone()),
            _ => Ok(HashMap::new()),
        }
    }
}
