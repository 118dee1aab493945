//! Interchangeable turn-execution strategies.
//!
//! All three honor the same tool set, the same `document_ref` injection
//! rule and the same termination criterion; they differ in who owns the
//! loop and how history carries over between turns.
//!
//! - [`GraphStrategy`]: explicit `reason`/`tools` state machine with a
//!   per-thread checkpointer
//! - [`ManagedSyncStrategy`]: hands the turn to a synchronous runner on
//!   the blocking pool; stateless across turns
//! - [`ManagedStreamStrategy`]: drains an event stream from an async
//!   runner, keeping an in-memory session per conversation and thread

pub mod graph;
pub mod managed_stream;
pub mod managed_sync;

pub use graph::{Checkpoint, Checkpointer, GraphStrategy, InMemoryCheckpointer, Node};
pub use managed_stream::{ManagedStreamStrategy, RunnerEvent, StreamRunner, StreamingLoopRunner};
pub use managed_sync::{BlockingLoopRunner, ManagedSyncStrategy, RunnerInput, RunnerOutput, SyncRunner};

use crate::engine::TurnContext;
use async_trait::async_trait;
use depo_core::error::Result;
use depo_core::strategy::StrategyKind;

/// One turn as handed to a strategy.
#[derive(Debug, Clone)]
pub struct StrategyInput {
    pub ctx: TurnContext,
    pub message: String,
    pub document_ref: Option<String>,
}

/// What a strategy hands back.
#[derive(Debug, Clone)]
pub struct StrategyOutput {
    pub text: String,
    pub llm_calls: u32,
    pub degraded: bool,
    /// Strategy-specific diagnostics (final state, node path, item counts).
    pub raw_trace: Option<serde_json::Value>,
}

#[async_trait]
pub trait AgentStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    async fn run(&self, input: StrategyInput) -> Result<StrategyOutput>;
}
