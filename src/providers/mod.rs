//! Provider adapters and the LLM service that fronts them.
//!
//! Each vendor adapter implements [`ChatProvider`] and is responsible
//! only for wire-format translation and for classifying vendor HTTP
//! failures into gateway error kinds. The supported set is closed:
//! [`Provider`] is a tagged variant type selected once at startup,
//! never looked up by string per call.
//!
//! [`LlmService`] wraps the configured providers with the response
//! cache and usage accounting; the orchestrator talks to it, never to
//! an adapter directly.

pub mod anthropic;
pub mod openai;
pub mod sse;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAiProvider;
pub use sse::FragmentStream;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use crate::cache::{cacheable, Fingerprint, ResponseCache};
use crate::error::{GatewayError, Result};
use crate::store::{keys, KeyValueStore, MemoryStore};
use crate::telemetry;
use crate::types::{ChatOptions, ChatResponse, Message, Usage};

/// Usage hash retention: 30 days.
const USAGE_TTL: Duration = Duration::from_secs(86_400 * 30);

/// Uniform interface over one LLM backend.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Provider name for logging, metrics and cache fingerprints.
    fn name(&self) -> &'static str;

    /// Non-streaming chat completion.
    async fn chat(&self, messages: &[Message], options: &ChatOptions) -> Result<ChatResponse>;

    /// Streaming chat completion as a lazy sequence of text fragments.
    async fn chat_stream(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<FragmentStream>;
}

/// Names one supported backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Anthropic => "anthropic",
        }
    }
}

/// A configured backend. Closed set: adding a vendor means adding a
/// variant, which the compiler then tracks through every dispatch site.
pub enum Provider {
    OpenAi(OpenAiProvider),
    Anthropic(AnthropicProvider),
}

impl Provider {
    pub fn kind(&self) -> ProviderKind {
        match self {
            Provider::OpenAi(_) => ProviderKind::OpenAi,
            Provider::Anthropic(_) => ProviderKind::Anthropic,
        }
    }
}

#[async_trait]
impl ChatProvider for Provider {
    fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    async fn chat(&self, messages: &[Message], options: &ChatOptions) -> Result<ChatResponse> {
        match self {
            Provider::OpenAi(p) => p.chat(messages, options).await,
            Provider::Anthropic(p) => p.chat(messages, options).await,
        }
    }

    async fn chat_stream(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<FragmentStream> {
        match self {
            Provider::OpenAi(p) => p.chat_stream(messages, options).await,
            Provider::Anthropic(p) => p.chat_stream(messages, options).await,
        }
    }
}

/// Map a non-2xx vendor response to a gateway error kind.
///
/// The classification, not the raw status code, is what the
/// orchestrator sees.
pub(crate) async fn classify_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs);

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            v["error"]["message"]
                .as_str()
                .or(v["message"].as_str())
                .map(String::from)
        })
        .unwrap_or(body);

    match status.as_u16() {
        401 | 403 => Err(GatewayError::ProviderAuthFailed),
        429 => Err(GatewayError::ProviderRateLimited { retry_after }),
        400 => Err(GatewayError::ProviderBadRequest(message)),
        code => Err(GatewayError::ProviderServiceError {
            status: code,
            message,
        }),
    }
}

/// Chat gateway over the configured providers, with response caching
/// and per-identity usage accounting.
pub struct LlmService {
    providers: Vec<Provider>,
    cache: ResponseCache,
    store: Arc<dyn KeyValueStore>,
}

impl LlmService {
    pub fn builder() -> LlmServiceBuilder {
        LlmServiceBuilder::new()
    }

    fn provider(&self, kind: ProviderKind) -> Result<&Provider> {
        self.providers
            .iter()
            .find(|p| p.kind() == kind)
            .ok_or(GatewayError::NoProvider)
    }

    /// Which backends are configured.
    pub fn available(&self) -> Vec<ProviderKind> {
        self.providers.iter().map(Provider::kind).collect()
    }

    /// Non-streaming chat through the response cache.
    ///
    /// Deterministic requests (temperature 0) are served from the cache
    /// when possible; the hit is semantically indistinguishable from a
    /// fresh call.
    pub async fn chat(
        &self,
        kind: ProviderKind,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<ChatResponse> {
        let provider = self.provider(kind)?;
        options.validate(messages)?;

        let fingerprint = if cacheable(options, false) {
            let fp = Fingerprint::compute(provider.name(), messages, options);
            if let Some(cached) = self.cache.get(&fp).await {
                return Ok(cached);
            }
            Some(fp)
        } else {
            None
        };

        let start = std::time::Instant::now();
        let result = provider.chat(messages, options).await;
        let elapsed = start.elapsed();

        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(telemetry::REQUESTS_TOTAL,
            "provider" => provider.name(), "status" => status)
        .increment(1);
        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS,
            "provider" => provider.name())
        .record(elapsed.as_secs_f64());

        let response = result?;
        info!(provider = provider.name(), model = %options.model,
            duration_ms = elapsed.as_millis() as u64, "chat completed");

        if let Some(fp) = fingerprint {
            self.cache.put(&fp, &response).await;
        }
        if let (Some(identity), Some(usage)) = (options.user.as_deref(), response.usage) {
            self.track_usage(identity, provider.name(), usage).await;
        }

        Ok(response)
    }

    /// Streaming chat. Never touches the response cache.
    pub async fn chat_stream(
        &self,
        kind: ProviderKind,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<FragmentStream> {
        let provider = self.provider(kind)?;
        options.validate(messages)?;
        provider.chat_stream(messages, options).await
    }

    /// Record token usage per identity, provider and day.
    /// Best-effort: a store failure is logged and swallowed.
    async fn track_usage(&self, identity: &str, provider: &str, usage: Usage) {
        metrics::counter!(telemetry::TOKENS_TOTAL,
            "provider" => provider.to_string(), "direction" => "prompt")
        .increment(u64::from(usage.prompt_tokens));
        metrics::counter!(telemetry::TOKENS_TOTAL,
            "provider" => provider.to_string(), "direction" => "completion")
        .increment(u64::from(usage.completion_tokens));

        let key = keys::usage(identity, provider, Utc::now().date_naive());
        let fields = [
            ("prompt_tokens", usage.prompt_tokens),
            ("completion_tokens", usage.completion_tokens),
            ("total_tokens", usage.total_tokens),
        ];
        for (field, value) in fields {
            if value == 0 {
                continue;
            }
            if let Err(err) = self
                .store
                .hash_incr(&key, field, u64::from(value), USAGE_TTL)
                .await
            {
                warn!(%err, identity, provider, "failed to record usage");
                return;
            }
        }
    }

    /// Aggregate usage for an identity over the trailing `days` days.
    pub async fn usage(&self, identity: &str, kind: ProviderKind, days: u32) -> Usage {
        let mut total = Usage::default();
        let today = Utc::now().date_naive();
        for offset in 0..days {
            let Some(date) = today.checked_sub_days(chrono::Days::new(u64::from(offset))) else {
                break;
            };
            let key = keys::usage(identity, kind.as_str(), date);
            let day: HashMap<String, u64> = match self.store.hash_get_all(&key).await {
                Ok(day) => day,
                Err(err) => {
                    warn!(%err, identity, "usage store unreachable");
                    break;
                }
            };
            total.prompt_tokens += day.get("prompt_tokens").copied().unwrap_or(0) as u32;
            total.completion_tokens += day.get("completion_tokens").copied().unwrap_or(0) as u32;
            total.total_tokens += day.get("total_tokens").copied().unwrap_or(0) as u32;
        }
        total
    }
}

/// Builder for [`LlmService`].
pub struct LlmServiceBuilder {
    providers: Vec<Provider>,
    store: Option<Arc<dyn KeyValueStore>>,
    cache_ttl: Duration,
}

impl LlmServiceBuilder {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            store: None,
            cache_ttl: ResponseCache::DEFAULT_TTL,
        }
    }

    /// Configure the OpenAI backend.
    pub fn openai(mut self, api_key: impl Into<String>) -> Self {
        self.providers.push(Provider::OpenAi(OpenAiProvider::new(api_key)));
        self
    }

    /// Configure the OpenAI backend against a custom base URL.
    pub fn openai_at(mut self, api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        self.providers.push(Provider::OpenAi(OpenAiProvider::with_base_url(
            api_key, base_url,
        )));
        self
    }

    /// Configure the Anthropic backend.
    pub fn anthropic(mut self, api_key: impl Into<String>) -> Self {
        self.providers
            .push(Provider::Anthropic(AnthropicProvider::new(api_key)));
        self
    }

    /// Configure the Anthropic backend against a custom base URL.
    pub fn anthropic_at(
        mut self,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        self.providers
            .push(Provider::Anthropic(AnthropicProvider::with_base_url(
                api_key, base_url,
            )));
        self
    }

    /// Inject the shared store. Defaults to a fresh [`MemoryStore`].
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// TTL for cached completions.
    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn build(self) -> Result<LlmService> {
        if self.providers.is_empty() {
            return Err(GatewayError::NoProvider);
        }
        let store = self.store.unwrap_or_else(|| Arc::new(MemoryStore::new()));
        Ok(LlmService {
            providers: self.providers,
            cache: ResponseCache::with_ttl(store.clone(), self.cache_ttl),
            store,
        })
    }
}

impl Default for LlmServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn building_without_providers_fails() {
        assert!(matches!(
            LlmService::builder().build(),
            Err(GatewayError::NoProvider)
        ));
    }

    #[test]
    fn configured_backends_are_reported() {
        let service = LlmService::builder()
            .openai("sk-test")
            .anthropic("sk-ant-test")
            .build()
            .unwrap();
        assert_eq!(
            service.available(),
            vec![ProviderKind::OpenAi, ProviderKind::Anthropic]
        );
    }

    #[tokio::test]
    async fn unconfigured_kind_is_rejected() {
        let service = LlmService::builder().openai("sk-test").build().unwrap();
        let err = service
            .chat(
                ProviderKind::Anthropic,
                &[Message::user("hi")],
                &ChatOptions::default().model("claude-3-haiku"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NoProvider));
    }
}
