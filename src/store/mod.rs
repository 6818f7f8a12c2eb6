//! Shared key-value store boundary.
//!
//! All cross-request state (rate counters, cached completions, cached
//! tool listings, usage counters, token→identity mappings) lives behind
//! [`KeyValueStore`] and is mutated only through its atomic primitives.
//! Components hold keys, never copies of authoritative state, so
//! concurrent requests sharing a key correctly race on the same counter
//! without client-side locking.
//!
//! [`MemoryStore`] is the in-process implementation injected by default
//! and in tests. A networked store (redis-style) implements the same
//! trait; the key design is backend-agnostic.
//!
//! # Key namespaces
//!
//! - `token:` — credential→identity mapping, configurable TTL
//! - `cache:` — fingerprinted completions and cached tool listings
//! - `rate:` — fixed-window rate counters
//! - `usage:{identity}:{provider}:{date}` — per-day token usage

pub mod memory;

pub use memory::MemoryStore;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

/// The store is an infrastructure dependency: its failures are absorbed
/// at the component boundary (fail-open) and never reach the caller.
#[derive(Debug, thiserror::Error)]
#[error("store unavailable: {0}")]
pub struct StoreError(pub String);

/// Low-latency key-value store with atomic counter support.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Set `key` to `value` with a TTL.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Atomically increment the counter at `key` and refresh its expiry
    /// in one indivisible operation, returning the new count.
    ///
    /// The expiry refresh must happen in the same operation as the
    /// increment; otherwise a counter can be incremented and never
    /// expire.
    async fn incr_expire(&self, key: &str, ttl: Duration) -> Result<u64, StoreError>;

    /// Decrement the counter at `key`, flooring at zero. Best-effort:
    /// used only by the skip-on-outcome rate limiter mode.
    async fn decr(&self, key: &str) -> Result<u64, StoreError>;

    /// Increment a field of a hash, refreshing the hash's expiry.
    async fn hash_incr(
        &self,
        key: &str,
        field: &str,
        by: u64,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// All fields of a hash; empty map when absent.
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, u64>, StoreError>;

    // Token namespace helpers (credential→identity mapping).

    async fn set_token(&self, token: &str, identity: &str, ttl: Duration) -> Result<(), StoreError> {
        self.set_ex(&keys::token(token), identity, ttl).await
    }

    async fn get_token(&self, token: &str) -> Result<Option<String>, StoreError> {
        self.get(&keys::token(token)).await
    }

    async fn delete_token(&self, token: &str) -> Result<(), StoreError> {
        self.delete(&keys::token(token)).await
    }
}

/// Key namespace constructors.
pub mod keys {
    use chrono::NaiveDate;

    pub fn token(token: &str) -> String {
        format!("token:{token}")
    }

    pub fn cache(key: &str) -> String {
        format!("cache:{key}")
    }

    pub fn rate(key: &str) -> String {
        format!("rate:{key}")
    }

    pub fn usage(identity: &str, provider: &str, date: NaiveDate) -> String {
        format!("usage:{identity}:{provider}:{date}")
    }
}
