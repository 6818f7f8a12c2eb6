//! The orchestration core: tool discovery, decision, execution, and
//! final composition.
//!
//! One request flows through five stages:
//!
//! 1. **CollectTools** — with a credential, fetch the tool listing;
//!    failure degrades to a plain LLM answer.
//! 2. **DecideTools** — one low-temperature LLM call whose system
//!    prompt enumerates the available tools and the invocation block
//!    format. Skipped entirely when no tools are available.
//! 3. **Parse** — tolerant scan of the decision text; malformed blocks
//!    are dropped silently.
//! 4. **ExecuteTools** — sequential, in issuance order; each failure is
//!    captured as an in-band error entry, never aborting the batch.
//! 5. **ComposeFinal / Deliver** — a second LLM call grounded in the
//!    collected data, returned whole or streamed as SSE events.
//!
//! All dependencies are injected at construction; the orchestrator
//! holds no global state. Per-request conversation state is owned by
//! the request future, so dropping it (client disconnect) aborts any
//! in-flight provider call without leaking connections.

use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use futures_util::{future, Stream, StreamExt};
use tracing::{info, warn};

use crate::error::Result;
use crate::providers::{FragmentStream, LlmService, ProviderKind};
use crate::tools::{extract_tool_calls, ToolClient, ToolDescriptor, ToolResult};
use crate::types::{
    ChatOptions, Credential, Message, ProcessRequest, ProcessResponse, StreamEvent,
};

/// Stream of orchestration events; errors are delivered in-band as
/// [`StreamEvent::Error`] frames.
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Tunable models and sampling parameters for the two LLM calls.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub provider: ProviderKind,
    /// Model for the tool-decision call.
    pub decision_model: String,
    /// Pinned low to stabilize the decision across repeated runs.
    pub decision_temperature: f32,
    pub decision_max_tokens: u32,
    /// Default model for the final answer when the request names none.
    pub default_model: String,
    pub default_temperature: f32,
    pub default_max_tokens: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::OpenAi,
            decision_model: "gpt-4".to_string(),
            decision_temperature: 0.1,
            decision_max_tokens: 500,
            default_model: "gpt-4".to_string(),
            default_temperature: 0.7,
            default_max_tokens: 1000,
        }
    }
}

/// The control loop composing the LLM service and tool client into a
/// single request lifecycle.
pub struct Orchestrator {
    llm: Arc<LlmService>,
    tools: Arc<ToolClient>,
    config: OrchestratorConfig,
}

/// What the tool phase produced: which tools ran, and their results
/// keyed by tool name.
struct ToolPhase {
    tools_used: Vec<String>,
    data: Option<serde_json::Map<String, serde_json::Value>>,
}

impl ToolPhase {
    fn empty() -> Self {
        Self {
            tools_used: Vec::new(),
            data: None,
        }
    }
}

impl Orchestrator {
    pub fn new(llm: Arc<LlmService>, tools: Arc<ToolClient>, config: OrchestratorConfig) -> Self {
        Self { llm, tools, config }
    }

    /// Run the full pipeline and return the composed answer.
    pub async fn process(&self, request: ProcessRequest) -> Result<ProcessResponse> {
        request.validate()?;
        let start = std::time::Instant::now();
        info!(
            has_credential = request.credential.is_some(),
            prompt_len = request.prompt.len(),
            "processing request"
        );

        let phase = match &request.credential {
            Some(credential) => self.run_tool_phase(&request, credential).await?,
            None => ToolPhase::empty(),
        };

        let messages = compose_final(&request.prompt, phase.data.as_ref());
        let options = self.final_options(&request);
        let response = self.llm.chat(self.config.provider, &messages, &options).await?;

        info!(
            duration_ms = start.elapsed().as_millis() as u64,
            tools_used = phase.tools_used.len(),
            "request processed"
        );
        Ok(ProcessResponse {
            response,
            data: phase.data.map(serde_json::Value::Object),
            tools_used: phase.tools_used,
            timestamp: Utc::now(),
        })
    }

    /// Run the pipeline and stream the final answer.
    ///
    /// Tool discovery, decision and execution complete before the first
    /// fragment is emitted — the tool-augmented context must be fixed
    /// before generation begins. The tool phase is absorbed on failure
    /// here (the stream degrades to a plain answer); errors after the
    /// stream opens surface as in-band `error` frames.
    ///
    /// A `tools_used` frame is emitted only when at least one call
    /// succeeded; attempted-but-failed calls are reported solely
    /// through the data frame's `{"error": ...}` entries.
    pub async fn process_stream(&self, request: ProcessRequest) -> Result<EventStream> {
        request.validate()?;

        let phase = match &request.credential {
            Some(credential) => match self.run_tool_phase(&request, credential).await {
                Ok(phase) => phase,
                Err(err) => {
                    warn!(%err, "tool phase failed in stream, continuing without tools");
                    ToolPhase::empty()
                }
            },
            None => ToolPhase::empty(),
        };

        let mut preamble = Vec::new();
        if !phase.tools_used.is_empty() {
            preamble.push(StreamEvent::ToolsUsed {
                tools: phase.tools_used.clone(),
            });
        }
        if let Some(data) = &phase.data {
            preamble.push(StreamEvent::Data {
                data: serde_json::Value::Object(data.clone()),
            });
        }

        let messages = compose_final(&request.prompt, phase.data.as_ref());
        let options = self.final_options(&request);
        let fragments = self
            .llm
            .chat_stream(self.config.provider, &messages, &options)
            .await?;

        Ok(deliver(preamble, fragments))
    }

    /// Stages 1–4: discover, decide, parse, execute.
    async fn run_tool_phase(
        &self,
        request: &ProcessRequest,
        credential: &Credential,
    ) -> Result<ToolPhase> {
        let available = match self.tools.list_tools(credential).await {
            Ok(tools) => tools,
            Err(err) => {
                warn!(%err, "failed to fetch tools, continuing without");
                return Ok(ToolPhase::empty());
            }
        };
        if available.is_empty() {
            return Ok(ToolPhase::empty());
        }
        info!(count = available.len(), "tools available");

        let decision_messages = [
            Message::system(build_system_prompt(&available)),
            Message::user(&request.prompt),
        ];
        let decision_options = ChatOptions::default()
            .model(&self.config.decision_model)
            .temperature(self.config.decision_temperature)
            .max_tokens(self.config.decision_max_tokens);
        let decision_options = match &request.identity {
            Some(identity) => decision_options.user(identity),
            None => decision_options,
        };
        let decision = self
            .llm
            .chat(self.config.provider, &decision_messages, &decision_options)
            .await?;

        let calls = extract_tool_calls(&decision.content);
        if calls.is_empty() {
            return Ok(ToolPhase::empty());
        }
        info!(count = calls.len(), "executing tool calls");

        let mut tools_used = Vec::new();
        let mut data = serde_json::Map::new();
        for call in calls {
            let result = match self
                .tools
                .call_tool(&call.name, &call.arguments, credential)
                .await
            {
                Ok(payload) => {
                    tools_used.push(call.name.clone());
                    ToolResult::success(&call.name, payload)
                }
                Err(err) => {
                    warn!(tool = %call.name, %err, "tool call failed");
                    ToolResult::error(&call.name, err.to_string())
                }
            };
            data.insert(result.name.clone(), result.as_data());
        }

        Ok(ToolPhase {
            tools_used,
            data: Some(data),
        })
    }

    fn final_options(&self, request: &ProcessRequest) -> ChatOptions {
        let options = ChatOptions::default()
            .model(
                request
                    .model
                    .clone()
                    .unwrap_or_else(|| self.config.default_model.clone()),
            )
            .temperature(
                request
                    .temperature
                    .unwrap_or(self.config.default_temperature),
            )
            .max_tokens(request.max_tokens.unwrap_or(self.config.default_max_tokens));
        match &request.identity {
            Some(identity) => options.user(identity),
            None => options,
        }
    }
}

/// Splice preamble events, the fragment body, and the terminal marker
/// into one event sequence. The first fragment error becomes an
/// in-band `error` frame and ends the body; `Done` always follows, so
/// the transport is never poisoned mid-stream.
fn deliver(preamble: Vec<StreamEvent>, fragments: FragmentStream) -> EventStream {
    let body = fragments.scan(false, |errored, item| {
        if *errored {
            return future::ready(None);
        }
        let event = match item {
            Ok(content) => StreamEvent::Chunk { content },
            Err(err) => {
                *errored = true;
                StreamEvent::Error {
                    error: err.to_string(),
                }
            }
        };
        future::ready(Some(event))
    });

    Box::pin(
        futures_util::stream::iter(preamble)
            .chain(body)
            .chain(futures_util::stream::once(future::ready(StreamEvent::Done))),
    )
}

/// System prompt for the tool-decision call, enumerating each tool's
/// name, description and parameter schema plus the invocation format.
fn build_system_prompt(tools: &[ToolDescriptor]) -> String {
    let descriptions = tools
        .iter()
        .map(|tool| {
            let properties = tool
                .input_schema
                .as_ref()
                .and_then(|schema| schema.get("properties").cloned())
                .unwrap_or_else(|| serde_json::json!({}));
            format!(
                "- {}: {}\n  Parameters: {}",
                tool.name, tool.description, properties
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are an AI assistant with access to the following tools:

{descriptions}

When the user asks a question that would benefit from using these tools, respond with tool calls in the following format:
[TOOL_CALL: tool_name]
{{
  "argument1": "value1",
  "argument2": "value2"
}}
[/TOOL_CALL]

You can call multiple tools if needed. Only call tools when they would help answer the user's question.
If the question doesn't require tools, just answer directly."#
    )
}

/// Final message sequence: generic guidance plus the original prompt,
/// and — only when tools produced data — an assistant turn carrying the
/// serialized results and a user turn asking for a grounded answer.
fn compose_final(
    prompt: &str,
    data: Option<&serde_json::Map<String, serde_json::Value>>,
) -> Vec<Message> {
    let mut messages = vec![
        Message::system(
            "You are a helpful assistant. Use the provided data to answer \
             the user's question comprehensively.",
        ),
        Message::user(prompt),
    ];
    if let Some(data) = data
        && !data.is_empty()
    {
        let serialized = serde_json::to_string_pretty(&serde_json::Value::Object(data.clone()))
            .unwrap_or_default();
        messages.push(Message::assistant(format!(
            "I've retrieved the following data:\n{serialized}"
        )));
        messages.push(Message::user(
            "Based on this data, please provide a comprehensive answer to my original question.",
        ));
    }
    messages
}
