//! Muninn - Tool-augmented orchestration gateway for LLM APIs
//!
//! This crate implements the control loop behind a prompt gateway: it
//! discovers which external tools are available, asks an LLM to decide
//! whether and how to invoke them, executes the chosen calls against a
//! tool server under the caller's credential, and folds the results
//! into a final LLM answer — returned whole or streamed. Every request
//! passes through two store-backed gates: a fixed-window rate limiter
//! and a fingerprint-keyed response cache.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use muninn::{
//!     LlmService, MemoryStore, Orchestrator, OrchestratorConfig, ProcessRequest, ToolClient,
//! };
//!
//! #[tokio::main]
//! async fn main() -> muninn::Result<()> {
//!     let store = Arc::new(MemoryStore::new());
//!     let llm = Arc::new(
//!         LlmService::builder()
//!             .openai("sk-your-key")
//!             .store(store.clone())
//!             .build()?,
//!     );
//!     let tools = Arc::new(ToolClient::new("http://localhost:9999", store));
//!     let orchestrator = Orchestrator::new(llm, tools, OrchestratorConfig::default());
//!
//!     let response = orchestrator
//!         .process(ProcessRequest::new("What is the capital of France?"))
//!         .await?;
//!     println!("{}", response.response.content);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod limiter;
pub mod orchestrator;
pub mod providers;
pub mod store;
pub mod telemetry;
pub mod tools;
pub mod types;

// Re-export main types at crate root
pub use cache::{Fingerprint, ResponseCache};
pub use config::GatewayConfig;
pub use error::{ErrorBody, FieldError, GatewayError, Result};
pub use limiter::{RateDecision, RateKey, RateLimiter, RateLimiterConfig};
pub use orchestrator::{EventStream, Orchestrator, OrchestratorConfig};
pub use providers::{
    AnthropicProvider, ChatProvider, LlmService, LlmServiceBuilder, OpenAiProvider, Provider,
    ProviderKind,
};
pub use store::{KeyValueStore, MemoryStore, StoreError};
pub use tools::{ParsedToolCall, ToolClient, ToolDescriptor, ToolResult};

// Re-export core types
pub use types::{
    ChatOptions, ChatResponse, Credential, FinishReason, Message, ProcessRequest, ProcessResponse,
    Role, StreamEvent, Usage,
};
