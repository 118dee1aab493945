//! Data model for spans, traces, feedback and export tokens.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use depo_core::error::TraceError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Export token ──────────────────────────────────────────────────────────

/// The decoded form of a span export token.
///
/// Tokens are URL-safe base64 of this struct's JSON. They are persisted in
/// the session store, so they must stay decodable across restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportToken {
    pub project: String,
    pub root_span_id: String,
    pub span_id: String,
}

impl ExportToken {
    pub fn encode(&self) -> String {
        // Serializing three strings cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(token: &str) -> Result<Self, TraceError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|e| TraceError::InvalidExport(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| TraceError::InvalidExport(e.to_string()))
    }
}

// ── Span ──────────────────────────────────────────────────────────────────

/// A single traced unit of work: a conversation root, a turn, or a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub id: String,
    pub root_id: String,
    /// Parent span id (None for root spans).
    pub parent_id: Option<String>,
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub input: Option<serde_json::Value>,
    pub output: Option<serde_json::Value>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Span {
    /// Create a root span.
    pub fn root(name: impl Into<String>) -> Self {
        let id = Uuid::new_v4().to_string();
        Self {
            root_id: id.clone(),
            id,
            parent_id: None,
            name: name.into(),
            started_at: Utc::now(),
            ended_at: None,
            duration_ms: None,
            input: None,
            output: None,
            metadata: serde_json::Map::new(),
        }
    }

    /// Create a span under `parent`.
    pub fn child_of(name: impl Into<String>, parent: &ExportToken) -> Self {
        Self {
            root_id: parent.root_span_id.clone(),
            parent_id: Some(parent.span_id.clone()),
            ..Self::root(name)
        }
    }

    /// A placeholder for a span created by an earlier process, known only
    /// through its export token.
    pub fn restored(token: &ExportToken) -> Self {
        let mut span = Self::root("restored");
        span.id = token.span_id.clone();
        span.root_id = token.root_span_id.clone();
        if token.span_id != token.root_span_id {
            span.parent_id = Some(token.root_span_id.clone());
        }
        span
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Mark the span as ended. Ending twice keeps the first timestamp.
    pub fn end(&mut self) {
        if self.ended_at.is_some() {
            return;
        }
        let now = Utc::now();
        self.ended_at = Some(now);
        self.duration_ms = Some(now.signed_duration_since(self.started_at).num_milliseconds().max(0) as u64);
    }

    /// Merge metadata keys; non-object values land under `"value"`.
    pub fn merge_metadata(&mut self, metadata: serde_json::Value) {
        match metadata {
            serde_json::Value::Object(map) => self.metadata.extend(map),
            other => {
                self.metadata.insert("value".into(), other);
            }
        }
    }
}

// ── Feedback ──────────────────────────────────────────────────────────────

/// Feedback as stored by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub span_id: String,
    pub scores: serde_json::Map<String, serde_json::Value>,
    pub comment: Option<String>,
    pub tags: Vec<String>,
    pub received_at: DateTime<Utc>,
}

// ── Trace ─────────────────────────────────────────────────────────────────

/// All spans sharing one root, in start order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub root_span_id: String,
    pub spans: Vec<Span>,
}

impl Trace {
    pub fn root(&self) -> Option<&Span> {
        self.spans.iter().find(|s| s.id == self.root_span_id)
    }

    pub fn children_of(&self, span_id: &str) -> Vec<&Span> {
        self.spans
            .iter()
            .filter(|s| s.parent_id.as_deref() == Some(span_id))
            .collect()
    }

    pub fn named(&self, name: &str) -> Vec<&Span> {
        self.spans.iter().filter(|s| s.name == name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_token_survives_encoding() {
        let token = ExportToken {
            project: "deposition-assistant".into(),
            root_span_id: "root".into(),
            span_id: "child".into(),
        };
        let encoded = token.encode();
        assert!(!encoded.contains('='));
        assert_eq!(ExportToken::decode(&encoded).unwrap(), token);
    }

    #[test]
    fn garbage_token_is_rejected() {
        assert!(matches!(
            ExportToken::decode("not a token!"),
            Err(TraceError::InvalidExport(_))
        ));
        let not_json = URL_SAFE_NO_PAD.encode(b"plain text");
        assert!(ExportToken::decode(&not_json).is_err());
    }

    #[test]
    fn child_inherits_root() {
        let root = Span::root("deposition_assistant");
        let token = ExportToken {
            project: "p".into(),
            root_span_id: root.id.clone(),
            span_id: root.id.clone(),
        };
        let child = Span::child_of("chat_turn", &token);
        assert_eq!(child.root_id, root.id);
        assert_eq!(child.parent_id.as_deref(), Some(root.id.as_str()));
        assert!(root.is_root());
        assert!(!child.is_root());
    }

    #[test]
    fn end_is_idempotent() {
        let mut span = Span::root("turn");
        span.end();
        let first = span.ended_at;
        span.end();
        assert_eq!(span.ended_at, first);
        assert!(span.duration_ms.is_some());
    }

    #[test]
    fn metadata_merges_keys() {
        let mut span = Span::root("turn");
        span.merge_metadata(serde_json::json!({"slug": "a"}));
        span.merge_metadata(serde_json::json!({"source": "fallback"}));
        span.merge_metadata(serde_json::json!("loose"));
        assert_eq!(span.metadata.len(), 3);
        assert_eq!(span.metadata["value"], "loose");
    }
}
