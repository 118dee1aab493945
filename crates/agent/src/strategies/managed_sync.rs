//! Managed synchronous strategy.
//!
//! The whole tool loop is delegated to a [`SyncRunner`]: a single blocking
//! call that takes the instructions and the turn's input items and returns
//! the final output. The strategy runs it on tokio's blocking pool. Nothing
//! carries over between turns; each run sees only the new message.

use super::{AgentStrategy, StrategyInput, StrategyOutput};
use crate::engine::{LoopEngine, TurnContext};
use crate::state::TurnState;
use async_trait::async_trait;
use depo_core::error::{Error, Result};
use depo_core::message::Message;
use depo_core::strategy::StrategyKind;
use serde_json::json;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::debug;

/// Input handed to a managed runner.
#[derive(Debug, Clone)]
pub struct RunnerInput {
    pub ctx: TurnContext,
    /// Items the run starts from (history, directive, user message).
    pub messages: Vec<Message>,
    pub document_ref: Option<String>,
}

/// Result of a completed managed run.
#[derive(Debug, Clone)]
pub struct RunnerOutput {
    pub final_output: String,
    pub llm_calls: u32,
    pub degraded: bool,
    /// Every item of the run, inputs included.
    pub items: Vec<Message>,
}

/// A runner that executes a whole turn in one blocking call.
pub trait SyncRunner: Send + Sync {
    fn run_sync(&self, input: RunnerInput) -> Result<RunnerOutput>;
}

/// Runs the shared loop engine to completion on the calling thread.
///
/// Must be called from a thread that can block: a `spawn_blocking` task
/// or a thread outside the runtime.
pub struct BlockingLoopRunner {
    engine: Arc<LoopEngine>,
    handle: Handle,
}

impl BlockingLoopRunner {
    pub fn new(engine: Arc<LoopEngine>, handle: Handle) -> Self {
        Self { engine, handle }
    }

    /// Bind to the runtime of the caller.
    pub fn current(engine: Arc<LoopEngine>) -> Result<Self> {
        let handle = Handle::try_current().map_err(|e| Error::Internal(format!("no tokio runtime: {e}")))?;
        Ok(Self::new(engine, handle))
    }
}

impl SyncRunner for BlockingLoopRunner {
    fn run_sync(&self, input: RunnerInput) -> Result<RunnerOutput> {
        let mut state = TurnState::from_history(input.messages, input.document_ref);
        let outcome = self.handle.block_on(self.engine.run(&input.ctx, &mut state))?;
        Ok(RunnerOutput {
            final_output: outcome.text,
            llm_calls: state.llm_calls,
            degraded: outcome.degraded,
            items: state.messages,
        })
    }
}

pub struct ManagedSyncStrategy {
    runner: Arc<dyn SyncRunner>,
}

impl ManagedSyncStrategy {
    pub fn new(runner: Arc<dyn SyncRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl AgentStrategy for ManagedSyncStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ManagedSync
    }

    async fn run(&self, input: StrategyInput) -> Result<StrategyOutput> {
        let mut state = TurnState::new(input.document_ref.clone());
        state.begin_turn(&input.message);

        let runner = self.runner.clone();
        let runner_input = RunnerInput {
            ctx: input.ctx,
            messages: state.messages,
            document_ref: input.document_ref,
        };
        let output = tokio::task::spawn_blocking(move || runner.run_sync(runner_input))
            .await
            .map_err(|e| Error::Internal(format!("managed runner panicked: {e}")))??;

        debug!(items = output.items.len(), llm_calls = output.llm_calls, "Managed sync run finished");
        Ok(StrategyOutput {
            raw_trace: Some(json!({
                "final_output": output.final_output,
                "items": output.items.len(),
                "llm_calls": output.llm_calls,
            })),
            text: output.final_output,
            llm_calls: output.llm_calls,
            degraded: output.degraded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use depo_core::message::Role;

    fn strategy_with(provider: Arc<SequentialMockProvider>) -> (ManagedSyncStrategy, CallLog) {
        let (registry, log) = recording_registry();
        let engine = Arc::new(LoopEngine::new(provider, Arc::new(registry)));
        let runner = BlockingLoopRunner::current(engine).unwrap();
        (ManagedSyncStrategy::new(Arc::new(runner)), log)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn runs_the_loop_off_the_async_workers() {
        let calls = vec![make_tool_call(
            "search_document",
            serde_json::json!({"query": "witness", "document_ref": "forged.txt"}),
        )];
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(calls, "Jane Doe."));
        let (strategy, log) = strategy_with(provider.clone());

        let output = strategy
            .run(StrategyInput {
                ctx: test_context(),
                message: "Who is the witness?".into(),
                document_ref: Some("depo.pdf".into()),
            })
            .await
            .unwrap();

        assert_eq!(output.text, "Jane Doe.");
        assert_eq!(output.llm_calls, 2);
        assert_eq!(log.lock().unwrap()[0].1["document_ref"], "depo.pdf");
        assert_eq!(output.raw_trace.unwrap()["items"], 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn turns_do_not_share_history() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_text_response("one"),
            make_text_response("two"),
        ]));
        let (strategy, _) = strategy_with(provider.clone());
        for message in ["first", "second"] {
            strategy
                .run(StrategyInput {
                    ctx: test_context(),
                    message: message.into(),
                    document_ref: None,
                })
                .await
                .unwrap();
        }
        let request = provider.last_request().unwrap();
        let roles: Vec<_> = request.messages.iter().map(|m| m.role.clone()).collect();
        assert_eq!(roles, vec![Role::System, Role::User]);
        assert_eq!(request.messages[1].content, "second");
    }

    struct FixedRunner;

    impl SyncRunner for FixedRunner {
        fn run_sync(&self, input: RunnerInput) -> Result<RunnerOutput> {
            Ok(RunnerOutput {
                final_output: format!("echo: {}", input.messages.last().unwrap().content),
                llm_calls: 1,
                degraded: false,
                items: input.messages,
            })
        }
    }

    #[tokio::test]
    async fn any_sync_runner_plugs_in() {
        let strategy = ManagedSyncStrategy::new(Arc::new(FixedRunner));
        let output = strategy
            .run(StrategyInput {
                ctx: test_context(),
                message: "ping".into(),
                document_ref: None,
            })
            .await
            .unwrap();
        assert_eq!(output.text, "echo: ping");
        assert_eq!(strategy.kind(), StrategyKind::ManagedSync);
    }
}
