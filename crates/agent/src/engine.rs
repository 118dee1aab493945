//! The bounded tool-use loop shared by every strategy.
//!
//! One iteration is a *reason step* (system prompt + messages to the model,
//! tools declared) followed, when the model asked for tools, by a *tool
//! step* that answers every request in the order it was emitted. The loop
//! ends when a reason step produces no tool requests, or when `max_rounds`
//! reason steps have run.

use crate::state::TurnState;
use chrono::Utc;
use depo_core::error::Result;
use depo_core::event::{EventBus, TurnEvent};
use depo_core::message::{Message, MessageToolCall};
use depo_core::provider::{Provider, ProviderRequest, ToolDefinition};
use depo_core::tool::{ToolCall, ToolRegistry};
use depo_core::trace::{SpanHandle, SpanUpdate, TraceSink};
use depo_tools::{DOCUMENT_REF_ARG, SEARCH_DOCUMENT};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Returned when the round cap stops a turn that never produced text.
pub const ROUND_LIMIT_NOTICE: &str =
    "I could not finish researching this question within the allowed number of steps. Please try rephrasing it.";

const ROUND_LIMIT_TOOL_RESULT: &str = "Tool call skipped: the step limit for this turn was reached.";

pub const DEFAULT_MAX_ROUNDS: u32 = 8;

/// A span the engine hangs tool spans under.
#[derive(Clone)]
pub struct TraceParent {
    pub sink: Arc<dyn TraceSink>,
    pub export: String,
}

impl std::fmt::Debug for TraceParent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceParent").field("export", &self.export).finish()
    }
}

/// Everything about the current turn that is not message history.
#[derive(Debug, Clone)]
pub struct TurnContext {
    pub conversation_id: String,
    pub thread_id: String,
    pub system_prompt: String,
    pub model: String,
    pub observers: Option<Arc<EventBus>>,
    pub trace: Option<TraceParent>,
}

impl TurnContext {
    pub fn publish(&self, event: TurnEvent) {
        if let Some(bus) = &self.observers {
            bus.publish(event);
        }
    }
}

/// How a loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopOutcome {
    pub text: String,
    /// The round cap stopped the loop.
    pub degraded: bool,
}

/// Force the bound document into `search_document` arguments.
///
/// Whatever the model put under `document_ref` is discarded; without a
/// bound document the key is removed.
pub fn inject_document_ref(tool_name: &str, arguments: Value, document_ref: Option<&str>) -> Value {
    if tool_name != SEARCH_DOCUMENT {
        return arguments;
    }
    let mut map = match arguments {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };
    match document_ref {
        Some(doc) => {
            map.insert(DOCUMENT_REF_ARG.into(), Value::String(doc.to_string()));
        }
        None => {
            map.remove(DOCUMENT_REF_ARG);
        }
    }
    Value::Object(map)
}

/// The tool-use loop over one provider and one tool set.
pub struct LoopEngine {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    temperature: f32,
    max_rounds: u32,
}

impl LoopEngine {
    pub fn new(provider: Arc<dyn Provider>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            provider,
            tools,
            temperature: 0.0,
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Cap on reason steps per turn (at least 1).
    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.definitions()
    }

    /// The model request for the next reason step.
    pub fn request(&self, ctx: &TurnContext, state: &TurnState) -> ProviderRequest {
        let mut messages = Vec::with_capacity(state.messages.len() + 1);
        messages.push(Message::system(&ctx.system_prompt));
        messages.extend(state.messages.iter().cloned());
        ProviderRequest::new(&ctx.model, messages)
            .with_tools(self.tool_definitions())
            .with_temperature(self.temperature)
    }

    /// Whether another reason step is allowed.
    pub fn may_reason(&self, state: &TurnState) -> bool {
        state.llm_calls < self.max_rounds
    }

    /// Run one reason step. Returns `true` when the model asked for tools.
    pub async fn reason(&self, ctx: &TurnContext, state: &mut TurnState) -> Result<bool> {
        let response = self.provider.complete(self.request(ctx, state)).await?;
        Ok(self.record_reply(ctx, state, response.message))
    }

    /// Run one reason step over the provider's streaming interface.
    pub async fn reason_streamed(&self, ctx: &TurnContext, state: &mut TurnState) -> Result<bool> {
        let mut request = self.request(ctx, state);
        request.stream = true;
        let mut rx = self.provider.stream(request).await?;

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        while let Some(chunk) = rx.recv().await {
            let chunk = chunk?;
            if let Some(delta) = chunk.content {
                content.push_str(&delta);
            }
            tool_calls.extend(chunk.tool_calls);
            if chunk.done {
                break;
            }
        }
        let message = Message::assistant_with_tools(content, tool_calls);
        Ok(self.record_reply(ctx, state, message))
    }

    fn record_reply(&self, ctx: &TurnContext, state: &mut TurnState, mut message: Message) -> bool {
        message.role = depo_core::message::Role::Assistant;
        let wants_tools = message.has_tool_calls();
        let tool_calls = message.tool_calls.len();
        state.push(message);
        state.llm_calls += 1;

        debug!(
            conversation_id = %ctx.conversation_id,
            llm_calls = state.llm_calls,
            tool_calls,
            "Reason step"
        );
        ctx.publish(TurnEvent::ReasonStep {
            conversation_id: ctx.conversation_id.clone(),
            llm_calls: state.llm_calls,
            tool_calls,
            timestamp: Utc::now(),
        });
        wants_tools
    }

    /// Run the tool step: one result per pending request, in order.
    pub async fn act(&self, ctx: &TurnContext, state: &mut TurnState) {
        for call in state.pending_tool_calls() {
            let output = self.invoke(ctx, &call, state.document_ref.as_deref()).await;
            state.push(Message::tool_result(&call, output));
        }
    }

    /// Answer pending requests without running them. Used when the round
    /// cap stops the loop so the history stays well paired.
    pub fn skip_pending(&self, state: &mut TurnState) {
        for call in state.pending_tool_calls() {
            state.push(Message::tool_result(&call, ROUND_LIMIT_TOOL_RESULT));
        }
    }

    /// Invoke one tool request and return the text the model will see.
    pub async fn invoke(&self, ctx: &TurnContext, call: &MessageToolCall, document_ref: Option<&str>) -> String {
        let arguments = inject_document_ref(&call.name, call.parsed_arguments(), document_ref);

        let Some(tool) = self.tools.get(&call.name) else {
            warn!(tool = %call.name, conversation_id = %ctx.conversation_id, "Model requested unknown tool");
            return format!("Unknown tool: {}", call.name);
        };

        let span = self.open_tool_span(ctx, &call.name, &arguments, document_ref);
        let start = Instant::now();
        let result = tool
            .execute(ToolCall {
                id: call.id.clone(),
                name: call.name.clone(),
                arguments,
            })
            .await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let (output, success) = match result {
            Ok(result) => (result.output, result.success),
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                (format!("Tool error: {e}"), false)
            }
        };

        ctx.publish(TurnEvent::ToolExecuted {
            conversation_id: ctx.conversation_id.clone(),
            tool_name: call.name.clone(),
            success,
            duration_ms,
            timestamp: Utc::now(),
        });
        if let Some(span) = span {
            close_tool_span(&span, &output, success);
        }
        output
    }

    fn open_tool_span(
        &self,
        ctx: &TurnContext,
        name: &str,
        arguments: &Value,
        document_ref: Option<&str>,
    ) -> Option<SpanHandle> {
        let parent = ctx.trace.as_ref()?;
        let span = match SpanHandle::start(parent.sink.clone(), name, Some(&parent.export)) {
            Ok(span) => span,
            Err(e) => {
                warn!(tool = name, error = %e, "Could not open tool span");
                return None;
            }
        };
        let mut update = SpanUpdate::input(json!({ "query": arguments.get("query").cloned().unwrap_or(Value::Null) }));
        if name == SEARCH_DOCUMENT {
            update.metadata = Some(json!({ "document_ref": document_ref }));
        }
        if let Err(e) = span.log(update) {
            warn!(tool = name, error = %e, "Could not log tool span input");
        }
        Some(span)
    }

    /// Drive the whole loop to completion on `state`.
    pub async fn run(&self, ctx: &TurnContext, state: &mut TurnState) -> Result<LoopOutcome> {
        loop {
            let wants_tools = self.reason(ctx, state).await?;
            if !wants_tools {
                return Ok(final_outcome(state));
            }
            if !self.may_reason(state) {
                self.skip_pending(state);
                return Ok(capped_outcome(ctx, state));
            }
            self.act(ctx, state).await;
        }
    }
}

fn close_tool_span(span: &SpanHandle, output: &str, success: bool) {
    let update = SpanUpdate {
        output: Some(json!(output)),
        metadata: Some(json!({ "success": success })),
        ..Default::default()
    };
    if let Err(e) = span.log(update).and_then(|_| span.end()) {
        warn!(span_id = span.span_id(), error = %e, "Could not close tool span");
    }
}

/// The last message is the answer.
pub fn final_outcome(state: &TurnState) -> LoopOutcome {
    LoopOutcome {
        text: state.last().map(|m| m.content.clone()).unwrap_or_default(),
        degraded: false,
    }
}

/// The round cap fired: best available text, marked degraded.
pub fn capped_outcome(ctx: &TurnContext, state: &TurnState) -> LoopOutcome {
    warn!(
        conversation_id = %ctx.conversation_id,
        llm_calls = state.llm_calls,
        "Round limit reached, returning best available answer"
    );
    LoopOutcome {
        text: state
            .last_assistant_text()
            .map(String::from)
            .unwrap_or_else(|| ROUND_LIMIT_NOTICE.to_string()),
        degraded: true,
    }
}
