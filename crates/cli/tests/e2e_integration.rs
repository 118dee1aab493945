//! End-to-end tests for the deposition assistant.
//!
//! These drive the real tool adapters, session stores and trace engine
//! through the HTTP surface and the dispatch façade, with only the chat
//! model scripted.

use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use depo_agent::{AgentRunner, LoopEngine, PromptResolver, TurnInput, assemble_with_provider};
use depo_config::AppConfig;
use depo_core::error::ProviderError;
use depo_core::message::{Message, MessageToolCall, Role};
use depo_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use depo_gateway::{GatewayState, build_router};
use http_body_util::BodyExt;
use tower::ServiceExt;

const DEPOSITION: &str = "DEPOSITION OF OFFICER R. MALLORY\n\n\
Q. Who was the main witness to the collision?\n\
A. The main witness was Jane Doe. She was standing at the intersection of Fifth and Main.\n\n\
Q. What did she report?\n\
A. She reported that the blue sedan ran the red light.\n";

// ── Mock Provider ────────────────────────────────────────────────────────

/// Returns scripted responses in sequence and keeps every request.
struct ScriptedProvider {
    responses: Vec<ProviderResponse>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn jane_doe() -> Self {
        Self::new(vec![
            tool_response(vec![MessageToolCall::new(
                "call_1",
                "search_document",
                serde_json::json!({"query": "main witness"}),
            )]),
            text_response("The main witness is Jane Doe (source: doc)."),
        ])
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request(&self, index: usize) -> ProviderRequest {
        self.requests.lock().unwrap()[index].clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let index = requests.len();
        requests.push(request);
        self.responses
            .get(index)
            .cloned()
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 500,
                message: format!("script exhausted at call #{index}"),
            })
    }
}

fn usage() -> Option<Usage> {
    Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: usage(),
        model: "mock".into(),
    }
}

fn tool_response(tool_calls: Vec<MessageToolCall>) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant_with_tools("", tool_calls),
        usage: usage(),
        model: "mock".into(),
    }
}

fn test_config(dir: &std::path::Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.retrieval.embedding_model = None;
    config.retrieval.default_document = dir.join("missing.txt").display().to_string();
    config.session.db_path = dir.join("sessions.db").display().to_string();
    config.gateway.uploads_dir = dir.join("uploads").display().to_string();
    config
}

fn tool_results(request: &ProviderRequest) -> Vec<&Message> {
    request.messages.iter().filter(|m| m.role == Role::Tool).collect()
}

async fn post(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&body).unwrap())
}

fn upload_request(conversation_id: &str, filename: &str, content: &str) -> Request<Body> {
    let boundary = "e2e-boundary";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"conversation_id\"\r\n\r\n{conversation_id}\r\n\
         --{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: text/plain\r\n\r\n{content}\r\n\
         --{boundary}--\r\n"
    );
    Request::builder()
        .method("POST")
        .uri("/upload")
        .header("content-type", format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(body))
        .unwrap()
}

fn json_request(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

// ── E2E: upload, chat, feedback over HTTP ────────────────────────────────

#[tokio::test]
async fn e2e_upload_then_ask_about_the_witness() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::jane_doe());
    let assembly = assemble_with_provider(test_config(dir.path()), provider.clone())
        .await
        .unwrap();
    let telemetry = assembly.telemetry.clone();
    let app = build_router(Arc::new(GatewayState::from_assembly(&assembly)), &[]);

    let (status, upload) = post(&app, upload_request("case-42", "depo.txt", DEPOSITION)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(upload["status"], "ok");

    let (status, chat) = post(
        &app,
        json_request(
            "/chat",
            serde_json::json!({"conversation_id": "case-42", "message": "Who is the main witness?"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(chat["assistant_message"], "The main witness is Jane Doe (source: doc).");
    assert_eq!(provider.calls(), 2);

    // The document directive leads the turn and the tool read the upload.
    let first = provider.request(0);
    assert!(first.messages.iter().any(|m| m.role == Role::System && m.content.contains("depo.txt")));
    let second = provider.request(1);
    let results = tool_results(&second);
    assert_eq!(results.len(), 1);
    assert!(results[0].content.contains("Jane Doe"));

    // The tool span records which document was searched.
    let root_span_id = chat["root_span_id"].as_str().unwrap();
    let trace = telemetry.trace(root_span_id).unwrap();
    let tool_span = trace.named("search_document")[0];
    assert!(tool_span.metadata["document_ref"].as_str().unwrap().ends_with("_depo.txt"));

    let span_id = chat["span_id"].as_str().unwrap();
    let (status, feedback) = post(
        &app,
        json_request("/feedback", serde_json::json!({"span_id": span_id, "rating": "up"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(feedback["status"], "ok");
    assert_eq!(telemetry.feedback_for(span_id)[0].tags, vec!["thumbs_up"]);
}

#[tokio::test]
async fn e2e_sessions_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();

    let first = {
        let provider = Arc::new(ScriptedProvider::new(vec![text_response("First answer.")]));
        let assembly = assemble_with_provider(test_config(dir.path()), provider).await.unwrap();
        assembly.orchestrator.handle_turn("case-7", "hello").await.unwrap()
    };

    let provider = Arc::new(ScriptedProvider::new(vec![text_response("Second answer.")]));
    let assembly = assemble_with_provider(test_config(dir.path()), provider).await.unwrap();
    let second = assembly.orchestrator.handle_turn("case-7", "again").await.unwrap();

    assert_eq!(first.thread_id, second.thread_id);
    assert_eq!(first.root_span_id, second.root_span_id);

    let record = assembly.sessions.get("case-7").await.unwrap().unwrap();
    let contents: Vec<_> = record.transcript.iter().map(|e| e.content.as_str()).collect();
    assert_eq!(contents, vec!["hello", "First answer.", "again", "Second answer."]);

    // The root span lives on in the new process as a restored span.
    let root = assembly.telemetry.span(second.root_span_id.as_deref().unwrap()).unwrap();
    assert_eq!(root.output.unwrap()["messages"].as_array().unwrap().len(), 4);
}

// ── E2E: every strategy against the real tools ───────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn e2e_strategies_agree_on_the_jane_doe_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let document = dir.path().join("depo.pdf.txt");
    std::fs::write(&document, DEPOSITION).unwrap();
    let config = test_config(dir.path());

    for strategy in ["graph", "managed-sync", "managed-stream"] {
        let provider = Arc::new(ScriptedProvider::jane_doe());
        let tools = depo_tools::default_registry(&config, None).unwrap();
        let engine = Arc::new(LoopEngine::new(provider.clone(), Arc::new(tools)));
        let runner = AgentRunner::new(engine, PromptResolver::default(), "mock");

        let result = runner
            .run_turn(
                strategy,
                TurnInput {
                    conversation_id: "case-1".into(),
                    thread_id: "thread-1".into(),
                    message: "Who is the main witness?".into(),
                    document_ref: Some(document.display().to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(result.text, "The main witness is Jane Doe (source: doc).", "{strategy}");
        assert_eq!(result.llm_calls, 2, "{strategy}");
        assert!(!result.degraded, "{strategy}");
        let results = tool_results(&provider.request(1)).len();
        assert_eq!(results, 1, "{strategy}");
    }
}

#[tokio::test]
async fn e2e_unknown_tool_and_unknown_strategy() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_response(vec![MessageToolCall::new("call_x", "delete_case", serde_json::json!({}))]),
        text_response("I cannot do that."),
    ]));
    let tools = depo_tools::default_registry(&config, None).unwrap();
    let engine = Arc::new(LoopEngine::new(provider.clone(), Arc::new(tools)));
    let runner = AgentRunner::new(engine, PromptResolver::default(), "mock");

    let err = runner
        .run_turn("autogen", TurnInput::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("autogen"));
    assert_eq!(provider.calls(), 0);

    let result = runner
        .run_turn(
            "graph",
            TurnInput {
                conversation_id: "c".into(),
                thread_id: "t".into(),
                message: "Delete the case".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(result.text, "I cannot do that.");
    let results = tool_results(&provider.request(1)).iter().map(|m| m.content.clone()).collect::<Vec<_>>();
    assert_eq!(results, vec!["Unknown tool: delete_case".to_string()]);
}
