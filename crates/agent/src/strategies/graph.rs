//! Graph strategy: a two-node state machine.
//!
//! ```text
//! START -> reason --(tool requests)--> tools -> reason
//!                 \--(text only)-----> END
//! ```
//!
//! The state is checkpointed after every node under the thread id. A new
//! turn on the same thread resumes from the last checkpointed messages.

use super::{AgentStrategy, StrategyInput, StrategyOutput};
use crate::engine::{LoopEngine, LoopOutcome, capped_outcome, final_outcome};
use crate::state::TurnState;
use async_trait::async_trait;
use depo_core::error::Result;
use depo_core::strategy::StrategyKind;
use serde::{Deserialize, Serialize};
use crate::cache::LruMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Reason,
    Tools,
    End,
}

/// Saved graph state for one thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: String,
    pub state: TurnState,
    /// Node the graph would run next.
    pub next: Node,
    /// Nodes executed since the thread began.
    pub step: u64,
}

#[async_trait]
pub trait Checkpointer: Send + Sync {
    async fn load(&self, thread_id: &str) -> Option<Checkpoint>;

    async fn save(&self, checkpoint: Checkpoint);
}

/// Checkpoints held in process memory, bounded to the most recently used
/// threads.
#[derive(Default)]
pub struct InMemoryCheckpointer {
    checkpoints: Mutex<LruMap<String, Checkpoint>>,
}

impl InMemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(threads: usize) -> Self {
        Self {
            checkpoints: Mutex::new(LruMap::new(threads)),
        }
    }

    pub async fn threads(&self) -> usize {
        self.checkpoints.lock().await.len()
    }
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn load(&self, thread_id: &str) -> Option<Checkpoint> {
        self.checkpoints.lock().await.get(&thread_id.to_string()).cloned()
    }

    async fn save(&self, checkpoint: Checkpoint) {
        self.checkpoints
            .lock()
            .await
            .insert(checkpoint.thread_id.clone(), checkpoint);
    }
}

pub struct GraphStrategy {
    engine: Arc<LoopEngine>,
    checkpointer: Arc<dyn Checkpointer>,
}

impl GraphStrategy {
    pub fn new(engine: Arc<LoopEngine>) -> Self {
        Self {
            engine,
            checkpointer: Arc::new(InMemoryCheckpointer::new()),
        }
    }

    pub fn with_checkpointer(mut self, checkpointer: Arc<dyn Checkpointer>) -> Self {
        self.checkpointer = checkpointer;
        self
    }

    /// Conditional edge out of `reason`.
    fn route(state: &TurnState) -> Node {
        if state.pending_tool_calls().is_empty() {
            Node::End
        } else {
            Node::Tools
        }
    }
}

#[async_trait]
impl AgentStrategy for GraphStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Graph
    }

    async fn run(&self, input: StrategyInput) -> Result<StrategyOutput> {
        let ctx = &input.ctx;
        let (mut state, mut step) = match self.checkpointer.load(&ctx.thread_id).await {
            Some(checkpoint) => (
                TurnState::from_history(checkpoint.state.messages, input.document_ref.clone()),
                checkpoint.step,
            ),
            None => (TurnState::new(input.document_ref.clone()), 0),
        };
        state.begin_turn(&input.message);

        let mut path = Vec::new();
        let mut node = Node::Reason;
        let mut outcome: Option<LoopOutcome> = None;

        while node != Node::End {
            let next = match node {
                Node::Reason => {
                    self.engine.reason(ctx, &mut state).await?;
                    match Self::route(&state) {
                        Node::Tools if !self.engine.may_reason(&state) => {
                            self.engine.skip_pending(&mut state);
                            outcome = Some(capped_outcome(ctx, &state));
                            Node::End
                        }
                        next => next,
                    }
                }
                Node::Tools => {
                    self.engine.act(ctx, &mut state).await;
                    Node::Reason
                }
                Node::End => Node::End,
            };
            path.push(node);
            step += 1;
            debug!(thread_id = %ctx.thread_id, ?node, ?next, step, "Graph node finished");
            self.checkpointer
                .save(Checkpoint {
                    thread_id: ctx.thread_id.clone(),
                    state: state.clone(),
                    next,
                    step,
                })
                .await;
            node = next;
        }

        let outcome = outcome.unwrap_or_else(|| final_outcome(&state));
        let mut raw = state.to_value();
        if let serde_json::Value::Object(map) = &mut raw {
            map.insert("thread_id".into(), ctx.thread_id.clone().into());
            map.insert("nodes".into(), serde_json::to_value(&path)?);
        }

        Ok(StrategyOutput {
            text: outcome.text,
            llm_calls: state.llm_calls,
            degraded: outcome.degraded,
            raw_trace: Some(raw),
        })
    }
}
