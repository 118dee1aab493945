//! Managed streaming strategy.
//!
//! The loop is delegated to a [`StreamRunner`] that reports progress as a
//! stream of [`RunnerEvent`]s. The strategy drains the stream, keeping the
//! last non-empty text it saw as the answer. History lives in an in-memory
//! session per (conversation, thread), created on first use; only the most
//! recently used sessions are kept.
//!
//! Dropping the turn future drops the stream receiver; the runner task
//! notices the closed channel and stops before its next model call.

use super::managed_sync::RunnerInput;
use super::{AgentStrategy, StrategyInput, StrategyOutput};
use crate::engine::LoopEngine;
use crate::state::TurnState;
use async_trait::async_trait;
use depo_core::error::Result;
use depo_core::message::Message;
use depo_core::strategy::StrategyKind;
use futures::StreamExt;
use futures::stream::BoxStream;
use crate::cache::LruMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

pub const NO_RESPONSE_TEXT: &str = "I could not produce a response.";

/// Progress reported by a streaming runner.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunnerEvent {
    /// A message was appended to the run.
    Item { message: Message },
    /// The model produced text.
    Text { text: String },
    /// The round cap stopped the run.
    Degraded,
    /// The run finished.
    Completed { llm_calls: u32 },
}

#[async_trait]
pub trait StreamRunner: Send + Sync {
    async fn run_stream(&self, input: RunnerInput) -> Result<BoxStream<'static, Result<RunnerEvent>>>;
}

/// Runs the shared loop engine in a spawned task, streaming model calls
/// and reporting every step as an event.
pub struct StreamingLoopRunner {
    engine: Arc<LoopEngine>,
}

impl StreamingLoopRunner {
    pub fn new(engine: Arc<LoopEngine>) -> Self {
        Self { engine }
    }
}

type EventTx = mpsc::Sender<Result<RunnerEvent>>;

/// Send or report that the consumer is gone.
async fn emit(tx: &EventTx, event: RunnerEvent) -> bool {
    tx.send(Ok(event)).await.is_ok()
}

async fn drive(engine: Arc<LoopEngine>, input: RunnerInput, tx: EventTx) {
    let ctx = input.ctx;
    let mut state = TurnState::from_history(input.messages, input.document_ref);

    loop {
        if tx.is_closed() {
            debug!(conversation_id = %ctx.conversation_id, "Stream consumer gone, stopping run");
            return;
        }
        let wants_tools = match engine.reason_streamed(&ctx, &mut state).await {
            Ok(wants_tools) => wants_tools,
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                return;
            }
        };
        let Some(reply) = state.last().cloned() else {
            return;
        };
        if !reply.content.trim().is_empty() && !emit(&tx, RunnerEvent::Text { text: reply.content.clone() }).await {
            return;
        }
        if !emit(&tx, RunnerEvent::Item { message: reply }).await {
            return;
        }
        if !wants_tools {
            break;
        }
        if !engine.may_reason(&state) {
            let before = state.messages.len();
            engine.skip_pending(&mut state);
            for message in state.messages[before..].to_vec() {
                emit(&tx, RunnerEvent::Item { message }).await;
            }
            warn!(conversation_id = %ctx.conversation_id, llm_calls = state.llm_calls, "Round limit reached in streamed run");
            emit(&tx, RunnerEvent::Degraded).await;
            break;
        }

        let before = state.messages.len();
        engine.act(&ctx, &mut state).await;
        for message in state.messages[before..].to_vec() {
            if !emit(&tx, RunnerEvent::Item { message }).await {
                return;
            }
        }
    }
    emit(&tx, RunnerEvent::Completed { llm_calls: state.llm_calls }).await;
}

#[async_trait]
impl StreamRunner for StreamingLoopRunner {
    async fn run_stream(&self, input: RunnerInput) -> Result<BoxStream<'static, Result<RunnerEvent>>> {
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(drive(self.engine.clone(), input, tx));
        Ok(ReceiverStream::new(rx).boxed())
    }
}

type SessionKey = (String, String);

pub struct ManagedStreamStrategy {
    runner: Arc<dyn StreamRunner>,
    sessions: Mutex<LruMap<SessionKey, Vec<Message>>>,
}

impl ManagedStreamStrategy {
    pub fn new(runner: Arc<dyn StreamRunner>) -> Self {
        Self {
            runner,
            sessions: Mutex::new(LruMap::default()),
        }
    }

    /// Keep at most `threads` sessions; the least recently used goes first.
    pub fn with_capacity(mut self, threads: usize) -> Self {
        self.sessions = Mutex::new(LruMap::new(threads));
        self
    }

    /// Number of (conversation, thread) sessions currently held.
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    async fn history(&self, key: &SessionKey) -> Vec<Message> {
        self.sessions.lock().await.get(key).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl AgentStrategy for ManagedStreamStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ManagedStream
    }

    async fn run(&self, input: StrategyInput) -> Result<StrategyOutput> {
        let key = (input.ctx.conversation_id.clone(), input.ctx.thread_id.clone());
        let mut state = TurnState::from_history(self.history(&key).await, input.document_ref.clone());
        state.begin_turn(&input.message);

        let mut items = state.messages.clone();
        let mut stream = self
            .runner
            .run_stream(RunnerInput {
                ctx: input.ctx,
                messages: state.messages,
                document_ref: input.document_ref,
            })
            .await?;

        let mut final_text = String::new();
        let mut degraded = false;
        let mut llm_calls = 0;
        let mut events = 0usize;
        while let Some(event) = stream.next().await {
            events += 1;
            match event? {
                RunnerEvent::Text { text } if !text.trim().is_empty() => final_text = text,
                RunnerEvent::Text { .. } => {}
                RunnerEvent::Item { message } => items.push(message),
                RunnerEvent::Degraded => degraded = true,
                RunnerEvent::Completed { llm_calls: n } => llm_calls = n,
            }
        }

        let text = match final_text.trim() {
            "" => {
                warn!(events, "Stream ended without any text");
                NO_RESPONSE_TEXT.to_string()
            }
            trimmed => trimmed.to_string(),
        };
        let item_count = items.len();
        self.sessions.lock().await.insert(key, items);

        Ok(StrategyOutput {
            text,
            llm_calls,
            degraded,
            raw_trace: Some(serde_json::json!({ "events": events, "items": item_count })),
        })
    }
}
