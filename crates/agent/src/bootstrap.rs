//! Wiring the agent stack from configuration.

use crate::engine::LoopEngine;
use crate::orchestration::TurnOrchestrator;
use crate::prompt::{PromptResolver, PromptSource};
use crate::runner::AgentRunner;
use crate::strategies::{GraphStrategy, InMemoryCheckpointer, ManagedStreamStrategy, StreamingLoopRunner};
use depo_config::AppConfig;
use depo_core::error::Result;
use depo_core::event::EventBus;
use depo_core::provider::Provider;
use depo_core::session::SessionStore;
use depo_core::strategy::StrategyKind;
use depo_telemetry::TelemetryEngine;
use std::sync::Arc;
use tracing::info;

/// Every long-lived piece a front end needs.
pub struct Assembly {
    pub config: AppConfig,
    pub strategy: StrategyKind,
    pub runner: Arc<AgentRunner>,
    pub orchestrator: Arc<TurnOrchestrator>,
    pub sessions: Arc<dyn SessionStore>,
    pub telemetry: Arc<TelemetryEngine>,
    pub observers: Arc<EventBus>,
}

/// Build the stack with the provider described by `config`. Fails on a
/// missing credential or an unknown strategy before anything is served.
pub async fn assemble(config: AppConfig) -> Result<Assembly> {
    let provider = depo_providers::from_config(&config)?;
    assemble_with_provider(config, provider).await
}

/// Build the stack around an already constructed provider.
pub async fn assemble_with_provider(config: AppConfig, provider: Arc<dyn Provider>) -> Result<Assembly> {
    let strategy = config.strategy()?;

    let tools = depo_tools::default_registry(&config, Some(provider.clone()))?;
    let engine = LoopEngine::new(provider, Arc::new(tools))
        .with_temperature(config.default_temperature)
        .with_max_rounds(config.agent.max_rounds);

    let source = depo_telemetry::prompt_source_from_config(&config.tracing)?
        .map(|source| Arc::new(source) as Arc<dyn PromptSource>);
    let prompts = PromptResolver::new(source).with_slug(config.agent.prompt_slug.clone());

    let engine = Arc::new(engine);
    let threads = config.agent.max_threads;
    let graph = GraphStrategy::new(engine.clone())
        .with_checkpointer(Arc::new(InMemoryCheckpointer::with_capacity(threads)));
    let streaming = ManagedStreamStrategy::new(Arc::new(StreamingLoopRunner::new(engine.clone())))
        .with_capacity(threads);
    let runner = Arc::new(
        AgentRunner::new(engine, prompts, config.default_model.clone())
            .with_strategy(Arc::new(graph))
            .with_strategy(Arc::new(streaming))
            .with_stream_model(config.agent.stream_model.clone()),
    );

    let sessions = depo_session::from_config(&config.session).await?;
    let telemetry = Arc::new(depo_telemetry::engine_from_config(&config.tracing)?);
    let observers = Arc::new(EventBus::default());

    let orchestrator = Arc::new(
        TurnOrchestrator::new(sessions.clone(), runner.clone(), strategy)
            .with_trace(telemetry.clone())
            .with_observers(observers.clone()),
    );

    info!(
        strategy = %strategy,
        model = %config.default_model,
        sessions = sessions.name(),
        max_rounds = config.agent.max_rounds,
        max_threads = threads,
        "Agent stack ready"
    );
    Ok(Assembly {
        config,
        strategy,
        runner,
        orchestrator,
        sessions,
        telemetry,
        observers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use depo_core::error::Error;

    fn memory_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.session.backend = "memory".into();
        config
    }

    #[tokio::test]
    async fn missing_credential_fails_fast() {
        let err = assemble(memory_config()).await.err().unwrap();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn unknown_strategy_fails_fast() {
        let mut config = memory_config();
        config.agent.strategy = "crewai".into();
        let provider = Arc::new(SequentialMockProvider::single_text("x"));
        let err = assemble_with_provider(config, provider.clone()).await.err().unwrap();
        assert!(err.to_string().contains("crewai"));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn assembled_stack_answers_a_turn() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.session.db_path = dir.path().join("sessions.db").display().to_string();
        config.agent.strategy = "google_adk".into();

        let provider = Arc::new(SequentialMockProvider::single_text("Hello."));
        let assembly = assemble_with_provider(config, provider).await.unwrap();
        assert_eq!(assembly.strategy, StrategyKind::ManagedStream);
        assert_eq!(assembly.sessions.name(), "sqlite");

        let outcome = assembly.orchestrator.handle_turn("conv-1", "hi").await.unwrap();
        assert_eq!(outcome.assistant_message, "Hello.");
        assert_eq!(assembly.telemetry.recent_roots(10).len(), 1);
    }
}
