//! Thread-safe telemetry engine: collects spans into per-conversation trees,
//! records feedback, and mirrors every event to the remote exporter when
//! one is configured.

use crate::model::{ExportToken, FeedbackEntry, Span, Trace};
use crate::remote::{ExportEvent, RemoteExporter};
use chrono::Utc;
use depo_core::error::{Result, TraceError};
use depo_core::trace::{FeedbackRecord, SpanContext, SpanUpdate, TraceSink};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Spans (and feedback entries) retained when no capacity is configured.
pub const DEFAULT_MAX_SPANS: usize = 50_000;

/// The in-process trace sink.
///
/// Memory is bounded: once `capacity` spans are held, the oldest ended spans
/// are dropped first, then the oldest open ones. An evicted span that is
/// addressed again is restored from its export token.
pub struct TelemetryEngine {
    project: String,
    capacity: usize,
    /// All spans, oldest first.
    spans: RwLock<Vec<Span>>,
    feedback: RwLock<Vec<FeedbackEntry>>,
    exporter: Option<RemoteExporter>,
}

/// Shrink `spans` so one more fits under `capacity`, dropping a tenth of
/// the capacity at a time.
fn make_room(spans: &mut Vec<Span>, capacity: usize) -> usize {
    if spans.len() < capacity {
        return 0;
    }
    let before = spans.len();
    let target = capacity - (capacity / 10).max(1);
    let mut excess = spans.len() - target;
    spans.retain(|s| {
        if excess == 0 || s.ended_at.is_none() {
            return true;
        }
        excess -= 1;
        false
    });
    if spans.len() > target {
        let open = spans.len() - target;
        spans.drain(..open);
    }
    let removed = before - spans.len();
    debug!(removed, capacity, "Evicted old spans");
    removed
}

impl TelemetryEngine {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            capacity: DEFAULT_MAX_SPANS,
            spans: RwLock::new(Vec::new()),
            feedback: RwLock::new(Vec::new()),
            exporter: None,
        }
    }

    /// Keep at most `max_spans` spans and as many feedback entries.
    pub fn with_capacity(mut self, max_spans: usize) -> Self {
        self.capacity = max_spans.max(1);
        self
    }

    /// Mirror every span and feedback event to `exporter`.
    pub fn with_exporter(mut self, exporter: RemoteExporter) -> Self {
        self.exporter = Some(exporter);
        self
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    fn spans_read(&self) -> RwLockReadGuard<'_, Vec<Span>> {
        self.spans.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn spans_write(&self) -> RwLockWriteGuard<'_, Vec<Span>> {
        self.spans.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn export(&self, event: ExportEvent) {
        if let Some(exporter) = &self.exporter {
            exporter.send(event);
        }
    }

    fn token_for(&self, span: &Span) -> ExportToken {
        ExportToken {
            project: self.project.clone(),
            root_span_id: span.root_id.clone(),
            span_id: span.id.clone(),
        }
    }

    /// Apply `f` to the span addressed by `export`. Spans known only through
    /// a token from an earlier process are restored as placeholders.
    fn with_span<T>(&self, export: &str, f: impl FnOnce(&mut Span) -> T) -> Result<T> {
        let token = ExportToken::decode(export)?;
        if token.project != self.project {
            debug!(token_project = %token.project, project = %self.project, "Span token from another project");
        }
        let mut spans = self.spans_write();
        let index = match spans.iter().rposition(|s| s.id == token.span_id) {
            Some(index) => index,
            None => {
                debug!(span_id = %token.span_id, "Restoring span from export token");
                make_room(&mut spans, self.capacity);
                spans.push(Span::restored(&token));
                spans.len() - 1
            }
        };
        Ok(f(&mut spans[index]))
    }

    // ── Queries ───────────────────────────────────────────────────────

    pub fn span(&self, span_id: &str) -> Option<Span> {
        self.spans_read().iter().find(|s| s.id == span_id).cloned()
    }

    /// Every span under `root_span_id`, in start order.
    pub fn trace(&self, root_span_id: &str) -> Option<Trace> {
        let spans: Vec<Span> = self
            .spans_read()
            .iter()
            .filter(|s| s.root_id == root_span_id)
            .cloned()
            .collect();
        (!spans.is_empty()).then(|| Trace {
            root_span_id: root_span_id.to_string(),
            spans,
        })
    }

    /// Most recent root spans first.
    pub fn recent_roots(&self, limit: usize) -> Vec<Span> {
        self.spans_read()
            .iter()
            .rev()
            .filter(|s| s.is_root())
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn span_count(&self) -> usize {
        self.spans_read().len()
    }

    pub fn feedback_for(&self, span_id: &str) -> Vec<FeedbackEntry> {
        self.feedback
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|f| f.span_id == span_id)
            .cloned()
            .collect()
    }

}

impl TraceSink for TelemetryEngine {
    fn start_span(&self, name: &str, parent_export: Option<&str>) -> Result<SpanContext> {
        let span = match parent_export {
            Some(parent) => Span::child_of(name, &ExportToken::decode(parent)?),
            None => Span::root(name),
        };
        let token = self.token_for(&span);
        let context = SpanContext {
            span_id: span.id.clone(),
            root_span_id: span.root_id.clone(),
            export: token.encode(),
        };
        debug!(span = name, span_id = %span.id, root_span_id = %span.root_id, "Span started");

        {
            let mut spans = self.spans_write();
            make_room(&mut spans, self.capacity);
            spans.push(span.clone());
        }

        self.export(ExportEvent::SpanStarted { span });
        Ok(context)
    }

    fn update_span(&self, export: &str, update: SpanUpdate) -> Result<()> {
        let span_id = self.with_span(export, |span| {
            if let Some(input) = update.input.clone() {
                span.input = Some(input);
            }
            if let Some(output) = update.output.clone() {
                span.output = Some(output);
            }
            if let Some(metadata) = update.metadata.clone() {
                span.merge_metadata(metadata);
            }
            span.id.clone()
        })?;
        self.export(ExportEvent::SpanUpdated { span_id, update });
        Ok(())
    }

    fn end_span(&self, export: &str) -> Result<()> {
        let (span_id, ended_at) = self.with_span(export, |span| {
            span.end();
            (span.id.clone(), span.ended_at.unwrap_or_else(Utc::now))
        })?;
        self.export(ExportEvent::SpanEnded { span_id, ended_at });
        Ok(())
    }

    fn log_feedback(&self, feedback: FeedbackRecord) -> Result<()> {
        if feedback.span_id.trim().is_empty() {
            return Err(TraceError::UnknownSpan("empty span id".into()).into());
        }
        let entry = FeedbackEntry {
            span_id: feedback.span_id,
            scores: feedback.scores.unwrap_or_default(),
            comment: feedback.comment,
            tags: feedback.tags.unwrap_or_default(),
            received_at: Utc::now(),
        };
        debug!(span_id = %entry.span_id, tags = ?entry.tags, "Feedback recorded");
        {
            let mut feedback = self.feedback.write().unwrap_or_else(PoisonError::into_inner);
            if feedback.len() >= self.capacity {
                let oldest = feedback.len() + 1 - self.capacity;
                feedback.drain(..oldest);
            }
            feedback.push(entry.clone());
        }
        self.export(ExportEvent::Feedback { feedback: entry });
        Ok(())
    }
}
