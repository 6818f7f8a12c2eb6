//! Anthropic messages API adapter.
//!
//! Anthropic takes the system prompt as a dedicated request field
//! rather than as a message, and requires `max_tokens`; this adapter
//! performs both translations and classifies vendor failures the same
//! way the OpenAI adapter does.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::sse::{fragment_stream, FragmentStream, SseEvent};
use super::{classify_status, ChatProvider};
use crate::error::{GatewayError, Result};
use crate::types::{ChatOptions, ChatResponse, FinishReason, Message, Role, Usage};

/// Default base URL for the Anthropic API
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

const API_VERSION: &str = "2023-06-01";

/// `max_tokens` is mandatory on this API; applied when the caller
/// leaves it unset.
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Client for the Anthropic messages API.
#[derive(Clone)]
pub struct AnthropicProvider {
    api_key: String,
    http: Client,
    base_url: String,
}

impl AnthropicProvider {
    /// Create a new provider with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Create a provider with a custom base URL (for testing with wiremock).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("failed to build HTTP client");
        Self {
            api_key: api_key.into(),
            http,
            base_url: base_url.into(),
        }
    }

    async fn send(
        &self,
        messages: &[Message],
        options: &ChatOptions,
        stream: bool,
    ) -> Result<reqwest::Response> {
        let (system, turns) = split_system(messages);
        let url = format!("{}/v1/messages", self.base_url);
        let body = MessagesRequest {
            model: &options.model,
            messages: turns,
            system,
            max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: options.temperature,
            top_p: options.top_p,
            stream,
            metadata: options.user.as_deref().map(|user_id| Metadata { user_id }),
        };

        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Http(e.to_string()))?;

        classify_status(response).await
    }
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    async fn chat(&self, messages: &[Message], options: &ChatOptions) -> Result<ChatResponse> {
        options.validate(messages)?;

        let response = self.send(messages, options, false).await?;
        let data: MessagesResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Http(e.to_string()))?;

        let content = data
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        Ok(ChatResponse {
            id: data.id,
            model: data.model,
            content,
            finish_reason: FinishReason::from_vendor(data.stop_reason.as_deref().unwrap_or("")),
            usage: data.usage.map(|u| Usage {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
                total_tokens: u.input_tokens + u.output_tokens,
            }),
        })
    }

    async fn chat_stream(
        &self,
        messages: &[Message],
        options: &ChatOptions,
    ) -> Result<FragmentStream> {
        options.validate(messages)?;

        let response = self.send(messages, options, true).await?;
        Ok(fragment_stream(response.bytes_stream(), decode_payload))
    }
}

/// Split out the system prompt and convert the remaining turns.
/// A later system message overrides an earlier one.
fn split_system(messages: &[Message]) -> (Option<&str>, Vec<Turn<'_>>) {
    let mut system = None;
    let mut turns = Vec::with_capacity(messages.len());
    for message in messages {
        match message.role {
            Role::System => system = Some(message.content.as_str()),
            Role::User => turns.push(Turn {
                role: "user",
                content: &message.content,
            }),
            Role::Assistant => turns.push(Turn {
                role: "assistant",
                content: &message.content,
            }),
        }
    }
    (system, turns)
}

/// Decode one Anthropic SSE payload: `content_block_delta` yields text,
/// `message_stop` terminates, everything else is skipped.
fn decode_payload(payload: &str) -> SseEvent {
    let Ok(event) = serde_json::from_str::<serde_json::Value>(payload) else {
        return SseEvent::Ignore;
    };
    match event["type"].as_str() {
        Some("content_block_delta") => match event["delta"]["text"].as_str() {
            Some(text) if !text.is_empty() => SseEvent::Fragment(text.to_string()),
            _ => SseEvent::Ignore,
        },
        Some("message_stop") => SseEvent::Done,
        _ => SseEvent::Ignore,
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    messages: Vec<Turn<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<Metadata<'a>>,
}

#[derive(Serialize)]
struct Turn<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct Metadata<'a> {
    user_id: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    input_tokens: u32,
    output_tokens: u32,
}
