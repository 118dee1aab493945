//! Shared test helpers: scripted providers, recording tools, contexts.

use crate::engine::TurnContext;
use async_trait::async_trait;
use depo_core::error::{ProviderError, ToolError};
use depo_core::message::{Message, MessageToolCall};
use depo_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use depo_core::tool::{Tool, ToolCall, ToolRegistry, ToolResult};
use std::sync::{Arc, Mutex};

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue. A
/// looping provider repeats its single response forever.
pub struct SequentialMockProvider {
    responses: Vec<ProviderResponse>,
    repeat_last: bool,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses,
            repeat_last: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A single text response (no tool calls).
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![make_text_response(text)])
    }

    /// First the tool calls, then a final answer.
    pub fn tool_then_answer(tool_calls: Vec<MessageToolCall>, answer: &str) -> Self {
        Self::new(vec![make_tool_call_response(tool_calls, ""), make_text_response(answer)])
    }

    /// A model that never stops asking for `call`.
    pub fn looping(call: MessageToolCall) -> Self {
        Self {
            repeat_last: true,
            ..Self::new(vec![make_tool_call_response(vec![call], "Let me look that up.")])
        }
    }

    /// Answers every call with the same text.
    pub fn looping_text(text: &str) -> Self {
        Self {
            repeat_last: true,
            ..Self::single_text(text)
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<ProviderRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let index = requests.len();
        requests.push(request);

        let response = if self.repeat_last {
            self.responses.last()
        } else {
            self.responses.get(index)
        };
        match response {
            Some(response) => Ok(response.clone()),
            None => panic!(
                "SequentialMockProvider: no more responses (call #{index}, have {})",
                self.responses.len()
            ),
        }
    }
}

/// A provider that always fails.
pub struct FailingProvider;

#[async_trait]
impl Provider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::ApiError {
            status_code: 503,
            message: "upstream unavailable".into(),
        })
    }
}

pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>, thought: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant_with_tools(thought, tool_calls),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

pub fn make_tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    make_tool_call_with_id(&format!("call_{name}"), name, args)
}

pub fn make_tool_call_with_id(id: &str, name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall::new(id, name, args)
}

/// Arguments each recording tool received, in call order.
pub type CallLog = Arc<Mutex<Vec<(String, serde_json::Value)>>>;

struct RecordingTool {
    name: &'static str,
    reply: &'static str,
    log: CallLog,
}

#[async_trait]
impl Tool for RecordingTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "recording test tool"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {"query": {"type": "string"}}})
    }

    async fn execute(&self, call: ToolCall) -> Result<ToolResult, ToolError> {
        self.log
            .lock()
            .unwrap()
            .push((self.name.to_string(), call.arguments.clone()));
        Ok(ToolResult::ok(call.id, self.reply))
    }
}

struct BrokenTool(&'static str);

#[async_trait]
impl Tool for BrokenTool {
    fn name(&self) -> &str {
        self.0
    }

    fn description(&self) -> &str {
        "always fails"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }

    async fn execute(&self, _call: ToolCall) -> Result<ToolResult, ToolError> {
        Err(ToolError::ExecutionFailed {
            tool_name: self.0.into(),
            reason: "backend down".into(),
        })
    }
}

/// `search_document` and `search_web` stand-ins that record their arguments.
pub fn recording_registry() -> (ToolRegistry, CallLog) {
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(RecordingTool {
        name: "search_document",
        reply: "Jane Doe was the eyewitness at the intersection.",
        log: log.clone(),
    }));
    registry.register(Arc::new(RecordingTool {
        name: "search_web",
        reply: "- Statute (https://example.com): Two years.",
        log: log.clone(),
    }));
    (registry, log)
}

pub fn failing_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(BrokenTool("search_document")));
    registry.register(Arc::new(BrokenTool("search_web")));
    registry
}

pub fn test_context() -> TurnContext {
    TurnContext {
        conversation_id: "conv-test".into(),
        thread_id: "thread-test".into(),
        system_prompt: "You are a legal assistant.".into(),
        model: "mock-model".into(),
        observers: None,
        trace: None,
    }
}
