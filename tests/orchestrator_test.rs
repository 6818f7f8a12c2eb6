//! End-to-end orchestration against mocked LLM and tool servers: tool
//! discovery, the decision call, execution, degraded modes, and the
//! streaming event sequence.

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use muninn::{
    Credential, LlmService, MemoryStore, Orchestrator, OrchestratorConfig, ProcessRequest,
    StreamEvent, ToolClient,
};
use futures_util::StreamExt;

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "model": "gpt-4",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    })
}

fn weather_listing() -> serde_json::Value {
    json!({
        "tools": [{
            "name": "get_weather",
            "description": "Current weather for a city",
            "inputSchema": {
                "type": "object",
                "properties": {"city": {"type": "string"}}
            }
        }]
    })
}

/// Matcher fragment unique to the decision call's system prompt.
const DECISION_MARKER: &str = "access to the following tools";
/// Matcher fragment unique to the final call's system prompt.
const FINAL_MARKER: &str = "Use the provided data";

fn orchestrator(llm_server: &MockServer, tool_server: &MockServer) -> Orchestrator {
    let store = Arc::new(MemoryStore::new());
    let llm = Arc::new(
        LlmService::builder()
            .openai_at("sk-test", llm_server.uri())
            .store(store.clone())
            .build()
            .unwrap(),
    );
    let tools = Arc::new(ToolClient::new(tool_server.uri(), store));
    Orchestrator::new(llm, tools, OrchestratorConfig::default())
}

#[tokio::test]
async fn without_credential_the_answer_is_a_single_llm_call() {
    let llm_server = MockServer::start().await;
    let tool_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains(FINAL_MARKER))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("4")))
        .expect(1)
        .mount(&llm_server)
        .await;
    // The tool server must never be contacted.
    Mock::given(method("GET"))
        .and(path("/tools"))
        .respond_with(ResponseTemplate::new(200).set_body_json(weather_listing()))
        .expect(0)
        .mount(&tool_server)
        .await;

    let orchestrator = orchestrator(&llm_server, &tool_server);
    let response = orchestrator
        .process(ProcessRequest::new("What is 2+2?"))
        .await
        .unwrap();

    assert_eq!(response.response.content, "4");
    assert!(response.tools_used.is_empty());
    assert!(response.data.is_none());
}

#[tokio::test]
async fn empty_tool_listing_skips_the_decision_call() {
    let llm_server = MockServer::start().await;
    let tool_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/tools"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"tools": []})))
        .expect(1)
        .mount(&tool_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains(DECISION_MARKER))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("unused")))
        .expect(0)
        .mount(&llm_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains(FINAL_MARKER))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("plain answer")))
        .expect(1)
        .mount(&llm_server)
        .await;

    let orchestrator = orchestrator(&llm_server, &tool_server);
    let mut request = ProcessRequest::new("hello");
    request.credential = Some(Credential::Bearer("t0ken".into()));
    let response = orchestrator.process(request).await.unwrap();

    assert_eq!(response.response.content, "plain answer");
    assert!(response.tools_used.is_empty());
}

#[tokio::test]
async fn tool_results_ground_the_final_answer() {
    let llm_server = MockServer::start().await;
    let tool_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/tools"))
        .and(header("Authorization", "Bearer t0ken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(weather_listing()))
        .mount(&tool_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tools/call"))
        .and(header("Authorization", "Bearer t0ken"))
        .and(body_partial_json(json!({
            "toolName": "get_weather",
            "arguments": {"city": "Seoul"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"temp_c": 21})))
        .expect(1)
        .mount(&tool_server)
        .await;

    let decision = concat!(
        "I'll check the weather.\n",
        "[TOOL_CALL: get_weather]\n",
        "{\"city\": \"Seoul\"}\n",
        "[/TOOL_CALL]"
    );
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains(DECISION_MARKER))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(decision)))
        .expect(1)
        .mount(&llm_server)
        .await;
    // The final call carries the collected data as conversation turns.
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("retrieved the following data"))
        .and(body_string_contains("temp_c"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(completion("It is 21°C in Seoul.")),
        )
        .expect(1)
        .mount(&llm_server)
        .await;

    let orchestrator = orchestrator(&llm_server, &tool_server);
    let mut request = ProcessRequest::new("Weather in Seoul?");
    request.credential = Some(Credential::Bearer("t0ken".into()));
    let response = orchestrator.process(request).await.unwrap();

    assert_eq!(response.response.content, "It is 21°C in Seoul.");
    assert_eq!(response.tools_used, vec!["get_weather"]);
    let data = response.data.unwrap();
    assert_eq!(data["get_weather"]["temp_c"], 21);
}

#[tokio::test]
async fn failed_tools_become_error_entries_not_failures() {
    let llm_server = MockServer::start().await;
    let tool_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/tools"))
        .respond_with(ResponseTemplate::new(200).set_body_json(weather_listing()))
        .mount(&tool_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tools/call"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({"message": "upstream exploded"})),
        )
        .mount(&tool_server)
        .await;

    let decision = "[TOOL_CALL: get_weather]\n{\"city\": \"Seoul\"}\n[/TOOL_CALL]";
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains(DECISION_MARKER))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(decision)))
        .mount(&llm_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains(FINAL_MARKER))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(completion("I couldn't fetch the weather.")),
        )
        .expect(1)
        .mount(&llm_server)
        .await;

    let orchestrator = orchestrator(&llm_server, &tool_server);
    let mut request = ProcessRequest::new("Weather in Seoul?");
    request.credential = Some(Credential::Bearer("t0ken".into()));
    let response = orchestrator.process(request).await.unwrap();

    // The batch survives the failure; the error travels in the data.
    assert!(response.tools_used.is_empty());
    let data = response.data.unwrap();
    let error = data["get_weather"]["error"].as_str().unwrap();
    assert!(error.contains("upstream exploded"));
}

#[tokio::test]
async fn tool_server_outage_degrades_to_a_plain_answer() {
    let llm_server = MockServer::start().await;
    let tool_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/tools"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&tool_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains(FINAL_MARKER))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("best effort")))
        .expect(1)
        .mount(&llm_server)
        .await;

    let orchestrator = orchestrator(&llm_server, &tool_server);
    let mut request = ProcessRequest::new("hello");
    request.credential = Some(Credential::Bearer("t0ken".into()));
    let response = orchestrator.process(request).await.unwrap();

    assert_eq!(response.response.content, "best effort");
    assert!(response.tools_used.is_empty());
    assert!(response.data.is_none());
}

#[tokio::test]
async fn decision_without_tool_calls_answers_plainly() {
    let llm_server = MockServer::start().await;
    let tool_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/tools"))
        .respond_with(ResponseTemplate::new(200).set_body_json(weather_listing()))
        .mount(&tool_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tools/call"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&tool_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains(DECISION_MARKER))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(completion("No tools needed for this.")),
        )
        .expect(1)
        .mount(&llm_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains(FINAL_MARKER))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("direct answer")))
        .expect(1)
        .mount(&llm_server)
        .await;

    let orchestrator = orchestrator(&llm_server, &tool_server);
    let mut request = ProcessRequest::new("What is the meaning of life?");
    request.credential = Some(Credential::Bearer("t0ken".into()));
    let response = orchestrator.process(request).await.unwrap();

    assert_eq!(response.response.content, "direct answer");
    assert!(response.data.is_none());
}

#[tokio::test]
async fn invalid_requests_never_reach_a_backend() {
    let llm_server = MockServer::start().await;
    let tool_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("unused")))
        .expect(0)
        .mount(&llm_server)
        .await;

    let orchestrator = orchestrator(&llm_server, &tool_server);
    let err = orchestrator
        .process(ProcessRequest::new("   "))
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn streaming_emits_tools_data_chunks_then_done() {
    let llm_server = MockServer::start().await;
    let tool_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/tools"))
        .respond_with(ResponseTemplate::new(200).set_body_json(weather_listing()))
        .mount(&tool_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tools/call"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"temp_c": 21})))
        .mount(&tool_server)
        .await;

    let decision = "[TOOL_CALL: get_weather]\n{\"city\": \"Seoul\"}\n[/TOOL_CALL]";
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains(DECISION_MARKER))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(decision)))
        .mount(&llm_server)
        .await;
    let sse = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"It is \"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"21C\"}}]}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
        .mount(&llm_server)
        .await;

    let orchestrator = orchestrator(&llm_server, &tool_server);
    let mut request = ProcessRequest::new("Weather in Seoul?");
    request.credential = Some(Credential::Bearer("t0ken".into()));
    request.stream = true;

    let events: Vec<StreamEvent> = orchestrator
        .process_stream(request)
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(
        events,
        vec![
            StreamEvent::ToolsUsed {
                tools: vec!["get_weather".into()],
            },
            StreamEvent::Data {
                data: json!({"get_weather": {"temp_c": 21}}),
            },
            StreamEvent::Chunk {
                content: "It is ".into(),
            },
            StreamEvent::Chunk {
                content: "21C".into(),
            },
            StreamEvent::Done,
        ]
    );
}

#[tokio::test]
async fn streaming_with_only_failed_tools_omits_the_tools_frame() {
    let llm_server = MockServer::start().await;
    let tool_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/tools"))
        .respond_with(ResponseTemplate::new(200).set_body_json(weather_listing()))
        .mount(&tool_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tools/call"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({"message": "upstream exploded"})),
        )
        .mount(&tool_server)
        .await;

    let decision = "[TOOL_CALL: get_weather]\n{\"city\": \"Seoul\"}\n[/TOOL_CALL]";
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains(DECISION_MARKER))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(decision)))
        .mount(&llm_server)
        .await;
    let sse = "data: {\"choices\":[{\"delta\":{\"content\":\"sorry\"}}]}\n\ndata: [DONE]\n\n";
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
        .mount(&llm_server)
        .await;

    let orchestrator = orchestrator(&llm_server, &tool_server);
    let mut request = ProcessRequest::new("Weather in Seoul?");
    request.credential = Some(Credential::Bearer("t0ken".into()));
    request.stream = true;

    let events: Vec<StreamEvent> = orchestrator
        .process_stream(request)
        .await
        .unwrap()
        .collect()
        .await;

    // No call succeeded, so no tools frame; the failure still travels
    // in the data frame.
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, StreamEvent::ToolsUsed { .. }))
    );
    match &events[0] {
        StreamEvent::Data { data } => {
            let error = data["get_weather"]["error"].as_str().unwrap();
            assert!(error.contains("upstream exploded"));
        }
        other => panic!("expected data frame first, got {other:?}"),
    }
    assert_eq!(events.last(), Some(&StreamEvent::Done));
}

#[tokio::test]
async fn streaming_without_credential_is_chunks_and_done() {
    let llm_server = MockServer::start().await;
    let tool_server = MockServer::start().await;

    let sse = "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n\ndata: [DONE]\n\n";
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
        .mount(&llm_server)
        .await;

    let orchestrator = orchestrator(&llm_server, &tool_server);
    let mut request = ProcessRequest::new("hello");
    request.stream = true;

    let events: Vec<StreamEvent> = orchestrator
        .process_stream(request)
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(
        events,
        vec![
            StreamEvent::Chunk {
                content: "hi".into(),
            },
            StreamEvent::Done,
        ]
    );
}
