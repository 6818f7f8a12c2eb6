//! Chat response types

use serde::{Deserialize, Serialize};

/// Non-streaming chat response, normalized across providers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub id: String,
    pub model: String,
    pub content: String,
    #[serde(default)]
    pub finish_reason: FinishReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Reason the model stopped generating
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    #[default]
    Stop,
    Length,
    ContentFilter,
}

impl FinishReason {
    /// Parse a vendor finish reason, defaulting to `Stop` for anything
    /// unrecognized (vendors keep adding values).
    pub fn from_vendor(s: &str) -> Self {
        match s {
            "length" | "max_tokens" => FinishReason::Length,
            "content_filter" => FinishReason::ContentFilter,
            _ => FinishReason::Stop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_finish_reasons_normalize() {
        assert_eq!(FinishReason::from_vendor("stop"), FinishReason::Stop);
        assert_eq!(FinishReason::from_vendor("end_turn"), FinishReason::Stop);
        assert_eq!(FinishReason::from_vendor("length"), FinishReason::Length);
        assert_eq!(
            FinishReason::from_vendor("max_tokens"),
            FinishReason::Length
        );
        assert_eq!(
            FinishReason::from_vendor("content_filter"),
            FinishReason::ContentFilter
        );
    }
}
