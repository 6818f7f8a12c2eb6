//! Orchestration unit of work: request, response, stream events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FieldError, GatewayError, Result};
use crate::types::{ChatResponse, Credential};

/// Inbound orchestration request. Read-only once constructed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProcessRequest {
    pub prompt: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Credential forwarded to the tool server. Without one, the
    /// request degrades to a plain LLM answer (no tool discovery).
    #[serde(default)]
    pub credential: Option<Credential>,
    /// Authenticated identity, used for rate limiting and usage
    /// accounting. Never part of the cache fingerprint.
    #[serde(default)]
    pub identity: Option<String>,
    #[serde(default)]
    pub stream: bool,
}

impl ProcessRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    /// Validate the request body, collecting every field error rather
    /// than stopping at the first.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        if self.prompt.trim().is_empty() {
            errors.push(FieldError::new("prompt", "prompt must not be empty"));
        }
        if let Some(t) = self.temperature
            && !(0.0..=2.0).contains(&t)
        {
            errors.push(FieldError::new(
                "temperature",
                "temperature must be between 0 and 2",
            ));
        }
        if let Some(m) = self.max_tokens
            && !(1..=4096).contains(&m)
        {
            errors.push(FieldError::new(
                "max_tokens",
                "max_tokens must be between 1 and 4096",
            ));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(GatewayError::ValidationFailed(errors))
        }
    }
}

/// Final orchestration result for non-streaming requests.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessResponse {
    pub response: ChatResponse,
    /// Results collected from tool execution, keyed by tool name.
    /// Failed tools appear as `{"error": "..."}` entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    pub tools_used: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// One frame of a streaming response.
///
/// Serialized as server-sent-event frames tagged by `type`, terminated
/// by a literal `[DONE]` sentinel frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "tools_used")]
    ToolsUsed { tools: Vec<String> },
    #[serde(rename = "mcp_data")]
    Data { data: serde_json::Value },
    #[serde(rename = "llm_chunk")]
    Chunk { content: String },
    #[serde(rename = "error")]
    Error { error: String },
    #[serde(rename = "done", skip_deserializing)]
    Done,
}

impl StreamEvent {
    /// Encode as an SSE frame. `Done` encodes as the `[DONE]` sentinel,
    /// not as JSON.
    pub fn to_sse_frame(&self) -> String {
        match self {
            StreamEvent::Done => "data: [DONE]\n\n".to_string(),
            event => {
                // Serialization of these variants cannot fail.
                let json = serde_json::to_string(event).unwrap_or_default();
                format!("data: {json}\n\n")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_request_passes() {
        let req = ProcessRequest::new("What is 2+2?");
        assert!(req.validate().is_ok());
    }

    #[test]
    fn empty_prompt_is_itemized() {
        let mut req = ProcessRequest::new("  ");
        req.temperature = Some(3.0);
        let err = req.validate().unwrap_err();
        match err {
            GatewayError::ValidationFailed(fields) => {
                assert_eq!(fields.len(), 2);
                assert_eq!(fields[0].field, "prompt");
                assert_eq!(fields[1].field, "temperature");
            }
            other => panic!("expected ValidationFailed, got {other:?}"),
        }
    }

    #[test]
    fn max_tokens_bounds() {
        let mut req = ProcessRequest::new("hi");
        req.max_tokens = Some(0);
        assert!(req.validate().is_err());
        req.max_tokens = Some(4096);
        assert!(req.validate().is_ok());
        req.max_tokens = Some(4097);
        assert!(req.validate().is_err());
    }

    #[test]
    fn stream_events_carry_type_discriminator() {
        let event = StreamEvent::ToolsUsed {
            tools: vec!["get_weather".into()],
        };
        let frame = event.to_sse_frame();
        assert!(frame.starts_with("data: "));
        assert!(frame.ends_with("\n\n"));
        let json: serde_json::Value =
            serde_json::from_str(frame.trim_start_matches("data: ").trim()).unwrap();
        assert_eq!(json["type"], "tools_used");
        assert_eq!(json["tools"], json!(["get_weather"]));
    }

    #[test]
    fn done_encodes_as_sentinel() {
        assert_eq!(StreamEvent::Done.to_sse_frame(), "data: [DONE]\n\n");
    }

    #[test]
    fn chunk_frame_shape() {
        let frame = StreamEvent::Chunk {
            content: "hello".into(),
        }
        .to_sse_frame();
        assert_eq!(frame, "data: {\"type\":\"llm_chunk\",\"content\":\"hello\"}\n\n");
    }
}
