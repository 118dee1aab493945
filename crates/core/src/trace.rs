//! Trace sink trait: the write-only observability log.
//!
//! Spans form a tree: one root span per conversation, one child span per
//! turn, and grandchildren for tool invocations. A span is addressed later by
//! its export token, an opaque string the session store persists.
//!
//! Callers treat every sink operation as fire-and-forget: failures are
//! logged, never allowed to fail a turn.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Identity of a span as returned by the sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanContext {
    pub span_id: String,
    pub root_span_id: String,
    /// Opaque token that re-addresses this span (used as a parent or for updates)
    pub export: String,
}

/// A partial update to a span. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpanUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl SpanUpdate {
    pub fn input(value: serde_json::Value) -> Self {
        Self {
            input: Some(value),
            ..Self::default()
        }
    }

    pub fn output(value: serde_json::Value) -> Self {
        Self {
            output: Some(value),
            ..Self::default()
        }
    }

    pub fn metadata(value: serde_json::Value) -> Self {
        Self {
            metadata: Some(value),
            ..Self::default()
        }
    }
}

/// A feedback event attached to a span.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub span_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// The sink contract.
pub trait TraceSink: Send + Sync {
    /// Start a span. Without a parent it becomes a new root.
    fn start_span(&self, name: &str, parent_export: Option<&str>) -> Result<SpanContext>;

    /// Merge `update` into the span addressed by `export`.
    fn update_span(&self, export: &str, update: SpanUpdate) -> Result<()>;

    /// Mark the span finished.
    fn end_span(&self, export: &str) -> Result<()>;

    /// Attach feedback (scores, comment, tags) to a span.
    fn log_feedback(&self, feedback: FeedbackRecord) -> Result<()>;
}

/// An open span bound to the sink that created it.
#[derive(Clone)]
pub struct SpanHandle {
    context: SpanContext,
    sink: Arc<dyn TraceSink>,
}

impl SpanHandle {
    /// Start a span on `sink` and wrap it.
    pub fn start(sink: Arc<dyn TraceSink>, name: &str, parent_export: Option<&str>) -> Result<Self> {
        let context = sink.start_span(name, parent_export)?;
        Ok(Self { context, sink })
    }

    pub fn span_id(&self) -> &str {
        &self.context.span_id
    }

    pub fn root_span_id(&self) -> &str {
        &self.context.root_span_id
    }

    /// The token that re-addresses this span.
    pub fn export(&self) -> &str {
        &self.context.export
    }

    pub fn context(&self) -> &SpanContext {
        &self.context
    }

    /// Log input/output/metadata onto this span.
    pub fn log(&self, update: SpanUpdate) -> Result<()> {
        self.sink.update_span(&self.context.export, update)
    }

    pub fn end(&self) -> Result<()> {
        self.sink.end_span(&self.context.export)
    }
}

impl std::fmt::Debug for SpanHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpanHandle").field("context", &self.context).finish()
    }
}
