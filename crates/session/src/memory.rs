//! In-process session store for tests and ephemeral runs.

use async_trait::async_trait;
use depo_core::error::{Result, SessionError};
use depo_core::session::{SessionRecord, SessionStore, TranscriptEntry};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemorySessionStore {
    records: RwLock<HashMap<String, SessionRecord>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against the record, creating it first if needed.
    async fn with_record<T>(&self, conversation_id: &str, f: impl FnOnce(&mut SessionRecord) -> T) -> T {
        let mut records = self.records.write().await;
        let record = records
            .entry(conversation_id.to_string())
            .or_insert_with(|| SessionRecord::new(conversation_id));
        f(record)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get_or_create(&self, conversation_id: &str) -> Result<SessionRecord> {
        Ok(self.with_record(conversation_id, |r| r.clone()).await)
    }

    async fn get(&self, conversation_id: &str) -> Result<Option<SessionRecord>> {
        Ok(self.records.read().await.get(conversation_id).cloned())
    }

    async fn update_root_span(&self, conversation_id: &str, span_id: &str, export: &str) -> Result<()> {
        self.with_record(conversation_id, |r| {
            r.root_span_id = Some(span_id.to_string());
            r.root_span_export = Some(export.to_string());
        })
        .await;
        Ok(())
    }

    async fn claim_root_span(&self, conversation_id: &str, span_id: &str, export: &str) -> Result<SessionRecord> {
        Ok(self
            .with_record(conversation_id, |r| {
                if r.root_span_export.is_none() {
                    r.root_span_id = Some(span_id.to_string());
                    r.root_span_export = Some(export.to_string());
                }
                r.clone()
            })
            .await)
    }

    async fn update_thread_id(&self, conversation_id: &str, thread_id: &str) -> Result<()> {
        self.with_record(conversation_id, |r| {
            r.thread_id.get_or_insert_with(|| thread_id.to_string());
        })
        .await;
        Ok(())
    }

    async fn update_document_ref(&self, conversation_id: &str, document_ref: &str) -> Result<()> {
        if document_ref.is_empty() {
            return Err(SessionError::Storage("document reference must not be empty".into()).into());
        }
        self.with_record(conversation_id, |r| r.document_ref = Some(document_ref.to_string()))
            .await;
        Ok(())
    }

    async fn append_transcript(
        &self,
        conversation_id: &str,
        entries: &[TranscriptEntry],
    ) -> Result<Vec<TranscriptEntry>> {
        Ok(self
            .with_record(conversation_id, |r| {
                r.transcript.extend_from_slice(entries);
                r.transcript.clone()
            })
            .await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let store = InMemorySessionStore::new();
        let first = store.get_or_create("conv-1").await.unwrap();
        let second = store.get_or_create("conv-1").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn thread_id_never_changes() {
        let store = InMemorySessionStore::new();
        store.update_thread_id("conv-1", "t1").await.unwrap();
        store.update_thread_id("conv-1", "t2").await.unwrap();
        let record = store.get("conv-1").await.unwrap().unwrap();
        assert_eq!(record.thread_id.as_deref(), Some("t1"));
    }

    #[tokio::test]
    async fn claim_is_set_if_absent() {
        let store = InMemorySessionStore::new();
        store.claim_root_span("conv-1", "a", "ea").await.unwrap();
        let settled = store.claim_root_span("conv-1", "b", "eb").await.unwrap();
        assert_eq!(settled.root_span_id.as_deref(), Some("a"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_keep_every_pair() {
        let store = std::sync::Arc::new(InMemorySessionStore::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .append_transcript(
                        "conv-1",
                        &[TranscriptEntry::user(format!("q{i}")), TranscriptEntry::assistant(format!("a{i}"))],
                    )
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let transcript = store.get("conv-1").await.unwrap().unwrap().transcript;
        assert_eq!(transcript.len(), 16);
        for pair in transcript.chunks(2) {
            assert_eq!(pair[0].content.replace('q', "a"), pair[1].content);
        }
    }

    #[tokio::test]
    async fn empty_document_ref_is_rejected() {
        let store = InMemorySessionStore::new();
        assert!(store.update_document_ref("conv-1", "").await.is_err());
    }
}
