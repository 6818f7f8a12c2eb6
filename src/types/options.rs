//! Chat options and shared precondition validation

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};
use crate::types::Message;

/// Options for chat requests (provider-agnostic)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatOptions {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    /// End-user identity forwarded to the vendor for abuse attribution
    /// and used for usage accounting. Never part of the cache key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl ChatOptions {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn top_p(mut self, p: f32) -> Self {
        self.top_p = Some(p);
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Shared preconditions, validated once before any provider dispatch.
    pub fn validate(&self, messages: &[Message]) -> Result<()> {
        if self.model.is_empty() {
            return Err(GatewayError::InvalidInput("model is required".into()));
        }
        if messages.is_empty() {
            return Err(GatewayError::InvalidInput("messages are required".into()));
        }
        if let Some(t) = self.temperature
            && !(0.0..=2.0).contains(&t)
        {
            return Err(GatewayError::InvalidInput(
                "temperature must be between 0 and 2".into(),
            ));
        }
        if let Some(p) = self.top_p
            && !(0.0..=1.0).contains(&p)
        {
            return Err(GatewayError::InvalidInput(
                "top_p must be between 0 and 1".into(),
            ));
        }
        Ok(())
    }
}
