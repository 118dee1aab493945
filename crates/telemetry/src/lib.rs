//! Tracing and feedback capture for the deposition assistant.
//!
//! [`TelemetryEngine`] implements the core `TraceSink`: spans form one tree
//! per conversation (root, per-turn child, per-tool grandchild) addressed by
//! opaque export tokens. Events are optionally mirrored to a remote backend,
//! which also serves prompt templates through [`HttpPromptSource`].

pub mod engine;
pub mod model;
pub mod prompts;
pub mod remote;

pub use engine::{DEFAULT_MAX_SPANS, TelemetryEngine};
pub use model::{ExportToken, FeedbackEntry, Span, Trace};
pub use prompts::{HttpPromptSource, RemotePrompt};
pub use remote::{ExportEvent, RemoteExporter};

use depo_config::TracingConfig;
use depo_core::error::TraceError;

/// Build the engine, attaching a remote exporter when `api_url` is set.
pub fn engine_from_config(config: &TracingConfig) -> Result<TelemetryEngine, TraceError> {
    let engine = TelemetryEngine::new(&config.project).with_capacity(config.max_spans);
    match &config.api_url {
        Some(url) => {
            let exporter = RemoteExporter::spawn(url, config.api_key.clone(), &config.project)?;
            Ok(engine.with_exporter(exporter))
        }
        None => Ok(engine),
    }
}

/// The remote prompt source, if a backend is configured.
pub fn prompt_source_from_config(config: &TracingConfig) -> Result<Option<HttpPromptSource>, TraceError> {
    config
        .api_url
        .as_ref()
        .map(|url| {
            HttpPromptSource::new(
                url.clone(),
                config.api_key.clone(),
                config.project.clone(),
                config.prompt_environment.clone(),
            )
        })
        .transpose()
}
