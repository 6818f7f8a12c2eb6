//! Distributed fixed-window rate limiter.
//!
//! Every inbound request passes through [`RateLimiter::check`], which
//! atomically increments a per-key counter in the shared store and
//! refreshes its expiry in the same operation. The counter is scoped by
//! key, never by connection, so concurrent requests sharing a key race
//! on the same atomic counter.
//!
//! # Fail-open policy
//!
//! If the store is unreachable the limiter logs and allows. An
//! unavailable counter backend must never block traffic.
//!
//! # Skip-on-outcome
//!
//! With [`RateLimiterConfig::skip_successful`] or `skip_failed` set,
//! [`RateLimiter::record_outcome`] decrements the just-incremented
//! counter after the response status class is known. The decrement
//! races with expiry and concurrent increments, so this mode is
//! best-effort accounting only — a failed decrement never fails the
//! request.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::store::{keys, KeyValueStore};
use crate::telemetry;

/// Rate-limit key, derived from the authenticated identity when
/// present, else the caller's network address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateKey(String);

impl RateKey {
    pub fn user(id: &str) -> Self {
        Self(format!("user:{id}"))
    }

    pub fn ip(addr: &str) -> Self {
        Self(format!("ip:{addr}"))
    }

    /// Derive from an optional identity, falling back to the address.
    pub fn derive(identity: Option<&str>, addr: &str) -> Self {
        match identity {
            Some(id) => Self::user(id),
            None => Self::ip(addr),
        }
    }

    /// Scope the key to a specific endpoint so limits are independent
    /// per route.
    pub fn scoped(self, endpoint: &str) -> Self {
        Self(format!("{}:{endpoint}", self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Outcome of a rate-limit check. Header values for the response are
/// derived from these fields (limit, remaining, reset timestamp).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    /// Populated on rejection: seconds until the window rolls over.
    pub retry_after: Option<Duration>,
}

/// Parameters for one limiter profile.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Profile name, used in logs and metrics.
    pub name: &'static str,
    pub window: Duration,
    pub max_requests: u32,
    pub skip_successful: bool,
    pub skip_failed: bool,
}

impl RateLimiterConfig {
    pub fn new(name: &'static str, window: Duration, max_requests: u32) -> Self {
        Self {
            name,
            window,
            max_requests,
            skip_successful: false,
            skip_failed: false,
        }
    }

    pub fn skip_successful(mut self) -> Self {
        self.skip_successful = true;
        self
    }

    pub fn skip_failed(mut self) -> Self {
        self.skip_failed = true;
        self
    }
}

/// Fixed-window request counter backed by the shared store.
pub struct RateLimiter {
    store: Arc<dyn KeyValueStore>,
    config: RateLimiterConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KeyValueStore>, config: RateLimiterConfig) -> Self {
        Self { store, config }
    }

    /// Strict profile for sensitive endpoints: 10 requests per minute.
    pub fn strict(store: Arc<dyn KeyValueStore>) -> Self {
        Self::new(
            store,
            RateLimiterConfig::new("strict", Duration::from_secs(60), 10),
        )
    }

    /// Standard profile with caller-supplied parameters.
    pub fn standard(store: Arc<dyn KeyValueStore>, window: Duration, max_requests: u32) -> Self {
        Self::new(store, RateLimiterConfig::new("standard", window, max_requests))
    }

    /// Lenient profile for low-risk endpoints: 200 requests per minute.
    pub fn lenient(store: Arc<dyn KeyValueStore>) -> Self {
        Self::new(
            store,
            RateLimiterConfig::new("lenient", Duration::from_secs(60), 200),
        )
    }

    /// Per-endpoint profile: one-minute window with a custom cap, named
    /// after the endpoint. Pair with [`RateKey::scoped`] so the counter
    /// is independent of other routes.
    pub fn for_endpoint(
        store: Arc<dyn KeyValueStore>,
        endpoint: &'static str,
        max_requests: u32,
    ) -> Self {
        Self::new(
            store,
            RateLimiterConfig::new(endpoint, Duration::from_secs(60), max_requests),
        )
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Count this request against `key` and decide whether it may pass.
    pub async fn check(&self, key: &RateKey) -> RateDecision {
        let store_key = keys::rate(key.as_str());
        let count = match self.store.incr_expire(&store_key, self.config.window).await {
            Ok(count) => count,
            Err(err) => {
                // Fail open: the limiter must never block traffic
                // because its backend is down.
                warn!(profile = self.config.name, key = key.as_str(), %err,
                    "rate limit store unreachable, allowing request");
                metrics::counter!(telemetry::RATE_LIMIT_ALLOWED_TOTAL,
                    "profile" => self.config.name)
                .increment(1);
                return self.allow_all();
            }
        };

        let limit = self.config.max_requests;
        let reset_at = Utc::now()
            + chrono::Duration::from_std(self.config.window)
                .unwrap_or_else(|_| chrono::Duration::seconds(60));

        if count > u64::from(limit) {
            warn!(profile = self.config.name, key = key.as_str(), count,
                "rate limit exceeded");
            metrics::counter!(telemetry::RATE_LIMIT_REJECTED_TOTAL,
                "profile" => self.config.name)
            .increment(1);
            return RateDecision {
                allowed: false,
                limit,
                remaining: 0,
                reset_at,
                retry_after: Some(self.config.window),
            };
        }

        metrics::counter!(telemetry::RATE_LIMIT_ALLOWED_TOTAL,
            "profile" => self.config.name)
        .increment(1);
        RateDecision {
            allowed: true,
            limit,
            remaining: limit.saturating_sub(count as u32),
            reset_at,
            retry_after: None,
        }
    }

    /// Un-count this request if the configured skip mode matches the
    /// response status class. Best-effort: decrement failures are
    /// logged and swallowed.
    pub async fn record_outcome(&self, key: &RateKey, status: u16) {
        let skip = (self.config.skip_successful && status < 400)
            || (self.config.skip_failed && status >= 400);
        if !skip {
            return;
        }
        let store_key = keys::rate(key.as_str());
        if let Err(err) = self.store.decr(&store_key).await {
            warn!(key = key.as_str(), %err, "failed to decrement rate limit counter");
        }
    }

    fn allow_all(&self) -> RateDecision {
        RateDecision {
            allowed: true,
            limit: self.config.max_requests,
            remaining: self.config.max_requests,
            reset_at: Utc::now()
                + chrono::Duration::from_std(self.config.window)
                    .unwrap_or_else(|_| chrono::Duration::seconds(60)),
            retry_after: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_prefer_identity_over_address() {
        assert_eq!(
            RateKey::derive(Some("u1"), "10.0.0.1"),
            RateKey::user("u1")
        );
        assert_eq!(RateKey::derive(None, "10.0.0.1"), RateKey::ip("10.0.0.1"));
    }

    #[test]
    fn scoped_keys_are_per_endpoint() {
        let a = RateKey::user("u1").scoped("process");
        let b = RateKey::user("u1").scoped("tools");
        assert_ne!(a, b);
        assert_eq!(a.as_str(), "user:u1:process");
    }
}
