//! The dispatch façade: pick a strategy by id, run the turn, normalize
//! the result.

use crate::engine::{LoopEngine, TraceParent, TurnContext};
use crate::prompt::PromptResolver;
use crate::strategies::{
    AgentStrategy, BlockingLoopRunner, GraphStrategy, ManagedStreamStrategy, ManagedSyncStrategy, StrategyInput,
    StreamingLoopRunner,
};
use chrono::Utc;
use depo_core::error::Result;
use depo_core::event::{EventBus, TurnEvent};
use depo_core::strategy::StrategyKind;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{info, warn};

/// One turn as requested by the caller.
#[derive(Debug, Clone, Default)]
pub struct TurnInput {
    pub conversation_id: String,
    pub thread_id: String,
    pub message: String,
    pub document_ref: Option<String>,
    /// Overrides the configured model for this turn.
    pub model: Option<String>,
    pub observers: Option<Arc<EventBus>>,
    /// Span the turn runs under; tool spans and prompt metadata land here.
    pub trace_parent: Option<TraceParent>,
}

/// The normalized result of any strategy.
#[derive(Debug, Clone)]
pub struct TurnResult {
    pub text: String,
    pub raw_trace: Option<serde_json::Value>,
    pub strategy: StrategyKind,
    pub llm_calls: u32,
    pub degraded: bool,
}

pub struct AgentRunner {
    graph: Arc<dyn AgentStrategy>,
    managed_sync: Arc<dyn AgentStrategy>,
    managed_stream: Arc<dyn AgentStrategy>,
    prompts: PromptResolver,
    default_model: String,
    stream_model: Option<String>,
}

impl AgentRunner {
    /// Wire the three built-in strategies around one loop engine.
    ///
    /// Must be called inside a tokio runtime (the synchronous strategy
    /// binds to it).
    pub fn new(engine: Arc<LoopEngine>, prompts: PromptResolver, default_model: impl Into<String>) -> Self {
        let sync_runner = BlockingLoopRunner::new(engine.clone(), Handle::current());
        Self {
            graph: Arc::new(GraphStrategy::new(engine.clone())),
            managed_sync: Arc::new(ManagedSyncStrategy::new(Arc::new(sync_runner))),
            managed_stream: Arc::new(ManagedStreamStrategy::new(Arc::new(StreamingLoopRunner::new(engine)))),
            prompts,
            default_model: default_model.into(),
            stream_model: None,
        }
    }

    /// Replace the strategy registered for its kind.
    pub fn with_strategy(mut self, strategy: Arc<dyn AgentStrategy>) -> Self {
        match strategy.kind() {
            StrategyKind::Graph => self.graph = strategy,
            StrategyKind::ManagedSync => self.managed_sync = strategy,
            StrategyKind::ManagedStream => self.managed_stream = strategy,
        }
        self
    }

    /// Default model for the streaming strategy when none is given per turn.
    pub fn with_stream_model(mut self, model: Option<String>) -> Self {
        self.stream_model = model;
        self
    }

    pub fn supported() -> &'static [StrategyKind] {
        &StrategyKind::ALL
    }

    fn strategy(&self, kind: StrategyKind) -> &Arc<dyn AgentStrategy> {
        match kind {
            StrategyKind::Graph => &self.graph,
            StrategyKind::ManagedSync => &self.managed_sync,
            StrategyKind::ManagedStream => &self.managed_stream,
        }
    }

    fn model_for(&self, kind: StrategyKind, requested: Option<String>) -> String {
        requested
            .or_else(|| match kind {
                StrategyKind::ManagedStream => self.stream_model.clone(),
                _ => None,
            })
            .unwrap_or_else(|| self.default_model.clone())
    }

    /// Validate `strategy_id` and run the turn. An unknown id is a
    /// configuration error raised before any model call.
    pub async fn run_turn(&self, strategy_id: &str, input: TurnInput) -> Result<TurnResult> {
        let kind: StrategyKind = strategy_id.parse()?;
        self.run(kind, input).await
    }

    pub async fn run(&self, kind: StrategyKind, input: TurnInput) -> Result<TurnResult> {
        let prompt = self.prompts.resolve().await;
        if let Some(parent) = &input.trace_parent {
            prompt.log_to(parent.sink.as_ref(), &parent.export);
        }

        let ctx = TurnContext {
            conversation_id: input.conversation_id,
            thread_id: input.thread_id,
            system_prompt: prompt.text,
            model: self.model_for(kind, input.model),
            observers: input.observers,
            trace: input.trace_parent,
        };
        info!(
            conversation_id = %ctx.conversation_id,
            thread_id = %ctx.thread_id,
            strategy = %kind,
            model = %ctx.model,
            "Running turn"
        );

        let observers = ctx.observers.clone();
        let conversation_id = ctx.conversation_id.clone();
        let output = self
            .strategy(kind)
            .run(StrategyInput {
                ctx,
                message: input.message,
                document_ref: input.document_ref,
            })
            .await?;

        if output.degraded {
            warn!(conversation_id = %conversation_id, strategy = %kind, "Turn ended at the round limit");
        }
        if let Some(bus) = observers {
            bus.publish(TurnEvent::TurnCompleted {
                conversation_id,
                strategy: kind.to_string(),
                llm_calls: output.llm_calls,
                degraded: output.degraded,
                timestamp: Utc::now(),
            });
        }

        Ok(TurnResult {
            text: output.text,
            raw_trace: output.raw_trace,
            strategy: kind,
            llm_calls: output.llm_calls,
            degraded: output.degraded,
        })
    }
}
