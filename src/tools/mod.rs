//! Tool server integration: descriptors, invocation parsing, RPC client.

pub mod client;
pub mod parser;

pub use client::ToolClient;
pub use parser::{extract_tool_calls, ParsedToolCall};

use serde::{Deserialize, Serialize};

/// Advertised capability of the tool server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON schema of the tool's arguments.
    #[serde(rename = "inputSchema", skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<serde_json::Value>,
}

/// Outcome of executing one parsed tool call. Exactly one of payload
/// or error is set.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub name: String,
    outcome: Result<serde_json::Value, String>,
}

impl ToolResult {
    pub fn success(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            outcome: Ok(payload),
        }
    }

    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcome: Err(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn payload(&self) -> Option<&serde_json::Value> {
        self.outcome.as_ref().ok()
    }

    /// The value folded into the composed LLM context: the payload on
    /// success, an `{"error": ...}` object on failure.
    pub fn as_data(&self) -> serde_json::Value {
        match &self.outcome {
            Ok(payload) => payload.clone(),
            Err(message) => serde_json::json!({ "error": message }),
        }
    }
}
