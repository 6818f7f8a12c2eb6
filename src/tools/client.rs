//! RPC client for the external tool server.
//!
//! Every call forwards the caller's credential (see
//! [`Credential`](crate::types::Credential) for the selection
//! priority). Tool listings are cached in the shared store under a
//! single global key — deliberately not per-credential, matching the
//! observed behavior of the upstream server; callers with differing
//! entitlements may therefore be served another caller's listing from
//! cache.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::ToolDescriptor;
use crate::error::{GatewayError, Result};
use crate::store::{keys, KeyValueStore};
use crate::telemetry;
use crate::types::Credential;

/// Fixed ceiling on every tool-server call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Cached tool listings live for an hour.
const LISTING_TTL: Duration = Duration::from_secs(3600);

/// Global cache key for the tool listing.
const LISTING_KEY: &str = "tools:list";

/// HTTP client for a tool server exposing `/tools`, `/tools/call` and
/// `/health`.
pub struct ToolClient {
    http: Client,
    base_url: String,
    store: Arc<dyn KeyValueStore>,
    listing_ttl: Duration,
}

impl ToolClient {
    pub fn new(base_url: impl Into<String>, store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_timeout(base_url, store, REQUEST_TIMEOUT)
    }

    /// Construct with a custom per-request timeout.
    pub fn with_timeout(
        base_url: impl Into<String>,
        store: Arc<dyn KeyValueStore>,
        timeout: Duration,
    ) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build HTTP client");
        Self {
            http,
            base_url: base_url.into(),
            store,
            listing_ttl: LISTING_TTL,
        }
    }

    /// Override the tool-listing cache TTL.
    pub fn listing_ttl(mut self, ttl: Duration) -> Self {
        self.listing_ttl = ttl;
        self
    }

    fn request(
        &self,
        builder: reqwest::RequestBuilder,
        credential: &Credential,
    ) -> reqwest::RequestBuilder {
        let (name, value) = credential.header();
        builder.header(name, value)
    }

    /// List the tools the server advertises, from cache when possible.
    pub async fn list_tools(&self, credential: &Credential) -> Result<Vec<ToolDescriptor>> {
        let cache_key = keys::cache(LISTING_KEY);
        match self.store.get(&cache_key).await {
            Ok(Some(raw)) => {
                if let Ok(tools) = serde_json::from_str::<Vec<ToolDescriptor>>(&raw) {
                    debug!(count = tools.len(), "tool listing cache hit");
                    return Ok(tools);
                }
            }
            Ok(None) => {}
            Err(err) => warn!(%err, "tool listing cache unreachable"),
        }

        let url = format!("{}/tools", self.base_url);
        let response = self
            .request(self.http.get(&url), credential)
            .send()
            .await
            .map_err(|e| GatewayError::ToolListUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::ToolListUnavailable(format!(
                "tool server returned {status}: {}",
                error_detail(&body)
            )));
        }

        let listing: ToolListing = response
            .json()
            .await
            .map_err(|e| GatewayError::ToolListUnavailable(e.to_string()))?;
        info!(count = listing.tools.len(), "fetched tool listing");

        if let Ok(json) = serde_json::to_string(&listing.tools)
            && let Err(err) = self.store.set_ex(&cache_key, &json, self.listing_ttl).await
        {
            warn!(%err, "failed to cache tool listing");
        }

        Ok(listing.tools)
    }

    /// Execute a named tool. Never cached.
    ///
    /// Non-2xx responses become [`GatewayError::ToolServer`] carrying
    /// the server's own error detail, so diagnostics stay actionable.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: &serde_json::Value,
        credential: &Credential,
    ) -> Result<serde_json::Value> {
        let url = format!("{}/tools/call", self.base_url);
        let body = ToolCallRequest {
            tool_name: name,
            arguments,
        };
        debug!(tool = name, %arguments, "tool call request");

        let result = self
            .request(self.http.post(&url), credential)
            .json(&body)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                metrics::counter!(telemetry::TOOL_CALLS_TOTAL,
                    "tool" => name.to_string(), "status" => "error")
                .increment(1);
                return Err(GatewayError::Http(err.to_string()));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = error_detail(&body);
            warn!(tool = name, status = status.as_u16(), %detail, "tool call failed");
            metrics::counter!(telemetry::TOOL_CALLS_TOTAL,
                "tool" => name.to_string(), "status" => "error")
            .increment(1);
            return Err(GatewayError::ToolServer {
                status: status.as_u16(),
                detail,
            });
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Http(e.to_string()))?;
        info!(tool = name, "tool call succeeded");
        metrics::counter!(telemetry::TOOL_CALLS_TOTAL,
            "tool" => name.to_string(), "status" => "ok")
        .increment(1);
        Ok(payload)
    }

    /// Liveness probe. Any failure reads as unhealthy.
    pub async fn health_check(&self, credential: &Credential) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.request(self.http.get(&url), credential).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                warn!(%err, "tool server health check failed");
                false
            }
        }
    }
}

/// Extract the most specific error detail the server offered.
///
/// Priority: a structured `errors` field, then `message`, then `error`,
/// then the raw body.
fn error_detail(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.to_string();
    };
    if let Some(errors) = value.get("errors") {
        return serde_json::to_string(errors).unwrap_or_else(|_| body.to_string());
    }
    if let Some(message) = value.get("message").and_then(|m| m.as_str()) {
        return message.to_string();
    }
    if let Some(error) = value.get("error").and_then(|e| e.as_str()) {
        return error.to_string();
    }
    body.to_string()
}

#[derive(Serialize)]
struct ToolCallRequest<'a> {
    #[serde(rename = "toolName")]
    tool_name: &'a str,
    arguments: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct ToolListing {
    #[serde(default)]
    tools: Vec<ToolDescriptor>,
}
