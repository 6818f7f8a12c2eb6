//! Fingerprint-keyed response cache for deterministic chat calls.
//!
//! Only responses to non-streaming, temperature-zero requests are
//! cached — the one case where the backend is expected to be
//! deterministic. Everything else bypasses the cache on both read and
//! write.
//!
//! The fingerprint is a pure function of the normalized request
//! (provider, model, full message list, temperature, max_tokens,
//! top_p) and never of the caller's identity, so identical prompts
//! from different callers share an entry.
//!
//! Eviction is TTL-only, delegated to the shared store; there is no
//! LRU or size bound. Callers needing bounded memory size TTL and
//! volume accordingly.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::store::{keys, KeyValueStore};
use crate::telemetry;
use crate::types::{ChatOptions, ChatResponse, Message};

/// Deterministic identity of a cacheable chat call.
///
/// Two fingerprints are equal iff provider, model, the ordered message
/// list, temperature, max_tokens and top_p are all equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint for a normalized request.
    ///
    /// A missing temperature normalizes to 0 so that "unset" and
    /// "explicitly zero" share an entry.
    pub fn compute(provider: &str, messages: &[Message], options: &ChatOptions) -> Self {
        #[derive(Serialize)]
        struct Canonical<'a> {
            provider: &'a str,
            model: &'a str,
            messages: &'a [Message],
            temperature: f32,
            max_tokens: Option<u32>,
            top_p: Option<f32>,
        }

        let canonical = Canonical {
            provider,
            model: &options.model,
            messages,
            temperature: options.temperature.unwrap_or(0.0),
            max_tokens: options.max_tokens,
            top_p: options.top_p,
        };
        // Canonical struct serialization cannot fail.
        let json = serde_json::to_vec(&canonical).unwrap_or_default();
        let digest = Sha256::digest(&json);
        Fingerprint(hex::encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Is this request eligible for the cache at all?
pub fn cacheable(options: &ChatOptions, stream: bool) -> bool {
    options.temperature.unwrap_or(0.0) == 0.0 && !stream
}

/// TTL-bounded completion cache over the shared store.
pub struct ResponseCache {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl ResponseCache {
    /// Default TTL for cached completions: 5 minutes.
    pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_ttl(store, Self::DEFAULT_TTL)
    }

    pub fn with_ttl(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Look up a cached completion. Store outages and corrupt entries
    /// read as misses — a cache failure must never fail the request.
    pub async fn get(&self, fingerprint: &Fingerprint) -> Option<ChatResponse> {
        let key = keys::cache(&format!("llm:{}", fingerprint.as_str()));
        let raw = match self.store.get(&key).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(%err, "response cache unreachable, treating as miss");
                None
            }
        };
        match raw.and_then(|s| serde_json::from_str::<ChatResponse>(&s).ok()) {
            Some(response) => {
                debug!(fingerprint = fingerprint.as_str(), "response cache hit");
                metrics::counter!(telemetry::CACHE_HITS_TOTAL).increment(1);
                Some(response)
            }
            None => {
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL).increment(1);
                None
            }
        }
    }

    /// Store a completion. Failures are logged and swallowed.
    pub async fn put(&self, fingerprint: &Fingerprint, response: &ChatResponse) {
        let key = keys::cache(&format!("llm:{}", fingerprint.as_str()));
        let json = match serde_json::to_string(response) {
            Ok(json) => json,
            Err(err) => {
                warn!(%err, "failed to serialize response for cache");
                return;
            }
        };
        if let Err(err) = self.store.set_ex(&key, &json, self.ttl).await {
            warn!(%err, "failed to store cached response");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> ChatOptions {
        ChatOptions::default().model("gpt-4").temperature(0.0)
    }

    fn msgs() -> Vec<Message> {
        vec![Message::system("sys"), Message::user("hi")]
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let a = Fingerprint::compute("openai", &msgs(), &opts());
        let b = Fingerprint::compute("openai", &msgs(), &opts());
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_differs_on_provider_and_model() {
        let a = Fingerprint::compute("openai", &msgs(), &opts());
        let b = Fingerprint::compute("anthropic", &msgs(), &opts());
        assert_ne!(a, b);
        let c = Fingerprint::compute("openai", &msgs(), &opts().model("gpt-4-turbo"));
        assert_ne!(a, c);
    }

    #[test]
    fn fingerprint_is_sensitive_to_message_order() {
        let forward = msgs();
        let mut reversed = msgs();
        reversed.reverse();
        let a = Fingerprint::compute("openai", &forward, &opts());
        let b = Fingerprint::compute("openai", &reversed, &opts());
        assert_ne!(a, b);
    }

    #[test]
    fn unset_temperature_normalizes_to_zero() {
        let unset = ChatOptions::default().model("gpt-4");
        let zero = ChatOptions::default().model("gpt-4").temperature(0.0);
        let a = Fingerprint::compute("openai", &msgs(), &unset);
        let b = Fingerprint::compute("openai", &msgs(), &zero);
        assert_eq!(a, b);
    }

    #[test]
    fn identity_never_affects_the_fingerprint() {
        let anonymous = opts();
        let named = opts().user("caller-1");
        let a = Fingerprint::compute("openai", &msgs(), &anonymous);
        let b = Fingerprint::compute("openai", &msgs(), &named);
        assert_eq!(a, b);
    }

    #[test]
    fn only_deterministic_non_streaming_requests_are_cacheable() {
        assert!(cacheable(&opts(), false));
        assert!(!cacheable(&opts(), true));
        assert!(!cacheable(&opts().temperature(0.7), false));
        // Unset temperature defaults to 0 and is cacheable.
        assert!(cacheable(&ChatOptions::default().model("m"), false));
    }
}
