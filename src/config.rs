//! Configuration loading for the gateway.
//!
//! Configuration is loaded from a TOML file; every section and field
//! has a default, so an empty file is a valid configuration (with no
//! providers, which [`LlmService`](crate::LlmService) will reject at
//! build time).

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{GatewayError, Result};
use crate::orchestrator::OrchestratorConfig;
use crate::providers::ProviderKind;

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub tool_server: ToolServerConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorSection,
}

impl GatewayConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref()).map_err(|e| {
            GatewayError::Configuration(format!("{}: {e}", path.as_ref().display()))
        })?;
        Self::from_toml(&raw)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| GatewayError::Configuration(e.to_string()))
    }
}

/// Provider credentials and endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openai: Option<ApiProviderConfig>,
    #[serde(default)]
    pub anthropic: Option<ApiProviderConfig>,
}

/// One provider's credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiProviderConfig {
    pub api_key: String,
    /// Override the vendor base URL (primarily for testing).
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Tool server endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolServerConfig {
    #[serde(default = "default_tool_server_url")]
    pub base_url: String,
    #[serde(default = "default_tool_server_timeout_secs")]
    pub timeout_secs: u64,
}

impl ToolServerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ToolServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_tool_server_url(),
            timeout_secs: default_tool_server_timeout_secs(),
        }
    }
}

fn default_tool_server_url() -> String {
    "http://localhost:9999".to_string()
}

fn default_tool_server_timeout_secs() -> u64 {
    30
}

/// Standard-profile rate limit parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            max_requests: default_max_requests(),
        }
    }
}

fn default_window_ms() -> u64 {
    60_000
}

fn default_max_requests() -> u32 {
    100
}

/// TTLs for the two store-backed caches.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_response_ttl_secs")]
    pub response_ttl_secs: u64,
    #[serde(default = "default_tool_listing_ttl_secs")]
    pub tool_listing_ttl_secs: u64,
}

impl CacheConfig {
    pub fn response_ttl(&self) -> Duration {
        Duration::from_secs(self.response_ttl_secs)
    }

    pub fn tool_listing_ttl(&self) -> Duration {
        Duration::from_secs(self.tool_listing_ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            response_ttl_secs: default_response_ttl_secs(),
            tool_listing_ttl_secs: default_tool_listing_ttl_secs(),
        }
    }
}

fn default_response_ttl_secs() -> u64 {
    300
}

fn default_tool_listing_ttl_secs() -> u64 {
    3600
}

/// Orchestrator model selection, mirrored into [`OrchestratorConfig`].
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorSection {
    #[serde(default = "default_provider")]
    pub provider: ProviderKind,
    #[serde(default = "default_decision_model")]
    pub decision_model: String,
    #[serde(default = "default_default_model")]
    pub default_model: String,
    #[serde(default = "default_default_temperature")]
    pub default_temperature: f32,
    #[serde(default = "default_default_max_tokens")]
    pub default_max_tokens: u32,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            decision_model: default_decision_model(),
            default_model: default_default_model(),
            default_temperature: default_default_temperature(),
            default_max_tokens: default_default_max_tokens(),
        }
    }
}

impl From<&OrchestratorSection> for OrchestratorConfig {
    fn from(section: &OrchestratorSection) -> Self {
        OrchestratorConfig {
            provider: section.provider,
            decision_model: section.decision_model.clone(),
            default_model: section.default_model.clone(),
            default_temperature: section.default_temperature,
            default_max_tokens: section.default_max_tokens,
            ..OrchestratorConfig::default()
        }
    }
}

fn default_provider() -> ProviderKind {
    ProviderKind::OpenAi
}

fn default_decision_model() -> String {
    "gpt-4".to_string()
}

fn default_default_model() -> String {
    "gpt-4".to_string()
}

fn default_default_temperature() -> f32 {
    0.7
}

fn default_default_max_tokens() -> u32 {
    1000
}
