//! Session store trait: persisted per-conversation state.
//!
//! A session record is keyed by conversation id and carries the thread id,
//! the bound document reference, the root trace span, and the transcript.
//! Every update is a short independent write; nothing holds a transaction
//! open across a model call.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One role/content pair of the persisted transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: String,
    pub content: String,
}

impl TranscriptEntry {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }
}

/// The persisted state of one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub conversation_id: String,
    pub root_span_id: Option<String>,
    pub root_span_export: Option<String>,
    pub thread_id: Option<String>,
    pub document_ref: Option<String>,
    #[serde(default)]
    pub transcript: Vec<TranscriptEntry>,
    pub created_at: DateTime<Utc>,
}

impl SessionRecord {
    /// A fresh record with nothing bound yet.
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            root_span_id: None,
            root_span_export: None,
            thread_id: None,
            document_ref: None,
            transcript: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

/// Storage contract consumed by turn orchestration and the upload endpoint.
///
/// All operations are keyed by conversation id and idempotent on repeated
/// identical writes.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// A human-readable backend name (e.g., "sqlite", "memory").
    fn name(&self) -> &str;

    /// Load the record, creating it on first use. Repeated calls return the
    /// same `created_at`.
    async fn get_or_create(&self, conversation_id: &str) -> Result<SessionRecord>;

    /// Load the record if it exists.
    async fn get(&self, conversation_id: &str) -> Result<Option<SessionRecord>>;

    /// Overwrite the root span fields (last writer wins).
    async fn update_root_span(&self, conversation_id: &str, span_id: &str, export: &str) -> Result<()>;

    /// Set the root span only if none is recorded yet, then return the settled
    /// record. Concurrent callers all observe the same winning span.
    async fn claim_root_span(&self, conversation_id: &str, span_id: &str, export: &str) -> Result<SessionRecord>;

    /// Assign the thread id. Once set, the thread id never changes; later
    /// calls are no-ops.
    async fn update_thread_id(&self, conversation_id: &str, thread_id: &str) -> Result<()>;

    /// Bind (or replace) the conversation's document reference.
    async fn update_document_ref(&self, conversation_id: &str, document_ref: &str) -> Result<()>;

    /// Append `entries` to the transcript as one atomic write and return the
    /// full transcript afterwards. Concurrent appends on the same
    /// conversation never drop each other's entries, and each call's
    /// entries stay contiguous.
    async fn append_transcript(&self, conversation_id: &str, entries: &[TranscriptEntry])
        -> Result<Vec<TranscriptEntry>>;
}
