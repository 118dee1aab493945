//! Turn orchestration around the runner: session bookkeeping, thread
//! assignment, the conversation's root span, the per-turn span, and the
//! persisted transcript.
//!
//! Session lookups happen before the model is invoked. The transcript is
//! written before the root span is updated. Trace failures are logged and
//! never fail a turn.

use crate::engine::TraceParent;
use crate::runner::{AgentRunner, TurnInput};
use depo_core::error::Result;
use depo_core::event::EventBus;
use depo_core::session::{SessionStore, TranscriptEntry};
use depo_core::strategy::StrategyKind;
use depo_core::trace::{SpanHandle, SpanUpdate, TraceSink};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Name of the span that spans a whole conversation.
pub const ROOT_SPAN_NAME: &str = "deposition_assistant";

/// Name of the span opened for every turn.
pub const TURN_SPAN_NAME: &str = "chat_turn";

/// What a caller gets back from one turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatOutcome {
    pub conversation_id: String,
    pub assistant_message: String,
    /// The turn span, when tracing succeeded.
    pub span_id: Option<String>,
    pub root_span_id: Option<String>,
    pub thread_id: String,
    pub strategy: StrategyKind,
    pub degraded: bool,
}

pub struct TurnOrchestrator {
    sessions: Arc<dyn SessionStore>,
    runner: Arc<AgentRunner>,
    trace: Option<Arc<dyn TraceSink>>,
    strategy: StrategyKind,
    observers: Option<Arc<EventBus>>,
}

impl TurnOrchestrator {
    pub fn new(sessions: Arc<dyn SessionStore>, runner: Arc<AgentRunner>, strategy: StrategyKind) -> Self {
        Self {
            sessions,
            runner,
            trace: None,
            strategy,
            observers: None,
        }
    }

    pub fn with_trace(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.trace = Some(sink);
        self
    }

    pub fn with_observers(mut self, bus: Arc<EventBus>) -> Self {
        self.observers = Some(bus);
        self
    }

    pub fn strategy(&self) -> StrategyKind {
        self.strategy
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    pub fn trace_sink(&self) -> Option<&Arc<dyn TraceSink>> {
        self.trace.as_ref()
    }

    /// Settle the thread id: the stored one, or a fresh one claimed now.
    async fn thread_id(&self, conversation_id: &str, stored: Option<String>) -> Result<String> {
        if let Some(thread_id) = stored {
            return Ok(thread_id);
        }
        let fresh = uuid::Uuid::new_v4().to_string();
        self.sessions.update_thread_id(conversation_id, &fresh).await?;
        // another turn may have claimed it first
        let settled = self
            .sessions
            .get(conversation_id)
            .await?
            .and_then(|r| r.thread_id)
            .unwrap_or(fresh);
        debug!(conversation_id, thread_id = %settled, "Thread assigned");
        Ok(settled)
    }

    /// The conversation's root span, creating and claiming one if needed.
    async fn root_span(
        &self,
        sink: &Arc<dyn TraceSink>,
        conversation_id: &str,
        thread_id: &str,
        stored: Option<(String, String)>,
    ) -> Result<Option<(String, String)>> {
        if stored.is_some() {
            return Ok(stored);
        }
        let span = match SpanHandle::start(sink.clone(), ROOT_SPAN_NAME, None) {
            Ok(span) => span,
            Err(e) => {
                warn!(conversation_id, error = %e, "Could not start root span");
                return Ok(None);
            }
        };
        let settled = self
            .sessions
            .claim_root_span(conversation_id, span.span_id(), span.export())
            .await?;
        let (Some(span_id), Some(export)) = (settled.root_span_id, settled.root_span_export) else {
            return Ok(None);
        };
        if span_id != span.span_id() {
            debug!(conversation_id, "Root span claimed by a concurrent turn");
            if let Err(e) = span.end() {
                warn!(conversation_id, error = %e, "Could not end unclaimed root span");
            }
        } else {
            info!(conversation_id, root_span_id = %span_id, "Root span created");
        }
        if let Err(e) = sink.update_span(
            &export,
            SpanUpdate::metadata(json!({ "conversation_id": conversation_id, "thread_id": thread_id })),
        ) {
            warn!(conversation_id, error = %e, "Could not log root span metadata");
        }
        Ok(Some((span_id, export)))
    }

    fn open_turn_span(
        sink: &Arc<dyn TraceSink>,
        parent: Option<&str>,
        conversation_id: &str,
        thread_id: &str,
        message: &str,
        document_ref: Option<&str>,
    ) -> Option<SpanHandle> {
        let span = match SpanHandle::start(sink.clone(), TURN_SPAN_NAME, parent) {
            Ok(span) => span,
            Err(e) => {
                warn!(conversation_id, error = %e, "Could not start turn span");
                return None;
            }
        };
        let update = SpanUpdate {
            input: Some(json!({
                "conversation_id": conversation_id,
                "thread_id": thread_id,
                "message": message,
                "document_path": document_ref,
            })),
            metadata: Some(json!({ "conversation_id": conversation_id, "thread_id": thread_id })),
            output: None,
        };
        if let Err(e) = span.log(update) {
            warn!(conversation_id, error = %e, "Could not log turn span input");
        }
        Some(span)
    }

    fn close_span(span: &SpanHandle, output: serde_json::Value) {
        if let Err(e) = span.log(SpanUpdate::output(output)) {
            warn!(span_id = %span.span_id(), error = %e, "Could not log span output");
        }
        if let Err(e) = span.end() {
            warn!(span_id = %span.span_id(), error = %e, "Could not end span");
        }
    }

    /// Run one user turn of `conversation_id` under the configured strategy.
    pub async fn handle_turn(&self, conversation_id: &str, message: &str) -> Result<ChatOutcome> {
        let record = self.sessions.get_or_create(conversation_id).await?;
        let thread_id = self.thread_id(conversation_id, record.thread_id.clone()).await?;
        let document_ref = record.document_ref.clone();

        let root = match &self.trace {
            Some(sink) => {
                let stored = record.root_span_id.clone().zip(record.root_span_export.clone());
                self.root_span(sink, conversation_id, &thread_id, stored).await?
            }
            None => None,
        };

        let turn_span = self.trace.as_ref().and_then(|sink| {
            Self::open_turn_span(
                sink,
                root.as_ref().map(|(_, export)| export.as_str()),
                conversation_id,
                &thread_id,
                message,
                document_ref.as_deref(),
            )
        });
        let trace_parent = match (&self.trace, &turn_span) {
            (Some(sink), Some(span)) => Some(TraceParent {
                sink: sink.clone(),
                export: span.export().to_string(),
            }),
            _ => None,
        };

        let result = self
            .runner
            .run(
                self.strategy,
                TurnInput {
                    conversation_id: conversation_id.to_string(),
                    thread_id: thread_id.clone(),
                    message: message.to_string(),
                    document_ref,
                    model: None,
                    observers: self.observers.clone(),
                    trace_parent,
                },
            )
            .await;

        let result = match result {
            Ok(result) => result,
            Err(e) => {
                error!(conversation_id, thread_id = %thread_id, error = %e, "Turn failed");
                if let Some(span) = &turn_span {
                    Self::close_span(span, json!({ "error": e.to_string() }));
                }
                return Err(e);
            }
        };
        if let Some(span) = &turn_span {
            Self::close_span(span, json!({ "assistant_message": result.text }));
        }

        let transcript = self
            .sessions
            .append_transcript(
                conversation_id,
                &[TranscriptEntry::user(message), TranscriptEntry::assistant(result.text.clone())],
            )
            .await?;
        let input_messages = &transcript[..transcript.len() - 1];

        if let (Some(sink), Some((_, export))) = (&self.trace, &root) {
            let update = SpanUpdate {
                input: Some(json!({ "messages": input_messages })),
                output: Some(json!({ "messages": transcript })),
                metadata: Some(json!({ "conversation_id": conversation_id, "thread_id": thread_id })),
            };
            if let Err(e) = sink.update_span(export, update) {
                warn!(conversation_id, error = %e, "Could not update root span");
            }
        }

        info!(
            conversation_id,
            thread_id = %thread_id,
            strategy = %result.strategy,
            llm_calls = result.llm_calls,
            "Turn complete"
        );
        Ok(ChatOutcome {
            conversation_id: conversation_id.to_string(),
            assistant_message: result.text,
            span_id: turn_span.as_ref().map(|s| s.span_id().to_string()),
            root_span_id: root.map(|(span_id, _)| span_id),
            thread_id,
            strategy: result.strategy,
            degraded: result.degraded,
        })
    }
}
