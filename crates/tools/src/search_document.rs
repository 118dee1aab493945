//! `search_document`: retrieval over the conversation's bound deposition.
//!
//! The model only supplies `query`. The document reference arrives in the
//! `document_ref` argument, which the agent loop always overwrites from turn
//! state before the call reaches this tool.

use crate::retrieval::DocumentSearcher;
use crate::{DOCUMENT_REF_ARG, SEARCH_DOCUMENT};
use async_trait::async_trait;
use depo_core::error::ToolError;
use depo_core::tool::{Tool, ToolCall, ToolResult};
use std::sync::Arc;
use tracing::warn;

pub struct SearchDocumentTool {
    searcher: Arc<dyn DocumentSearcher>,
}

impl SearchDocumentTool {
    pub fn new(searcher: Arc<dyn DocumentSearcher>) -> Self {
        Self { searcher }
    }
}

#[async_trait]
impl Tool for SearchDocumentTool {
    fn name(&self) -> &str {
        SEARCH_DOCUMENT
    }

    fn description(&self) -> &str {
        "Search the deposition document attached to this conversation. Returns the passages most relevant to the query."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "What to look for in the document"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, call: ToolCall) -> Result<ToolResult, ToolError> {
        let query = call.arguments["query"].as_str().unwrap_or("").trim();
        if query.is_empty() {
            return Ok(ToolResult::degraded(call.id, "search_document needs a non-empty 'query'."));
        }
        let document_ref = call.arguments[DOCUMENT_REF_ARG].as_str();

        match self.searcher.search(query, document_ref).await {
            Ok(text) if text.trim().is_empty() => {
                Ok(ToolResult::ok(call.id, "No relevant passages found in the document."))
            }
            Ok(text) => Ok(ToolResult::ok(call.id, text)),
            Err(e) => {
                warn!(document_ref = ?document_ref, error = %e, "Document search failed");
                Ok(ToolResult::degraded(call.id, format!("Document search failed: {e}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSearcher {
        seen: Mutex<Vec<(String, Option<String>)>>,
        fail: bool,
    }

    #[async_trait]
    impl DocumentSearcher for RecordingSearcher {
        async fn search(&self, query: &str, document_ref: Option<&str>) -> Result<String, ToolError> {
            self.seen
                .lock()
                .unwrap()
                .push((query.to_string(), document_ref.map(String::from)));
            if self.fail {
                return Err(ToolError::ExecutionFailed {
                    tool_name: SEARCH_DOCUMENT.into(),
                    reason: "index unavailable".into(),
                });
            }
            Ok(if query == "nothing" { String::new() } else { "Jane Doe, eyewitness.".into() })
        }
    }

    fn call(args: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "call_1".into(),
            name: SEARCH_DOCUMENT.into(),
            arguments: args,
        }
    }

    #[tokio::test]
    async fn passes_query_and_document_ref() {
        let searcher = Arc::new(RecordingSearcher::default());
        let tool = SearchDocumentTool::new(searcher.clone());
        let result = tool
            .execute(call(serde_json::json!({"query": "witness", "document_ref": "/data/depo.txt"})))
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.call_id, "call_1");
        assert_eq!(result.output, "Jane Doe, eyewitness.");
        let seen = searcher.seen.lock().unwrap();
        assert_eq!(seen[0], ("witness".to_string(), Some("/data/depo.txt".to_string())));
    }

    #[tokio::test]
    async fn backend_failure_becomes_text() {
        let tool = SearchDocumentTool::new(Arc::new(RecordingSearcher {
            fail: true,
            ..Default::default()
        }));
        let result = tool.execute(call(serde_json::json!({"query": "witness"}))).await.unwrap();
        assert!(!result.success);
        assert!(result.output.starts_with("Document search failed"));
        assert!(result.output.contains("index unavailable"));
    }

    #[tokio::test]
    async fn empty_hits_and_missing_query_are_best_effort() {
        let tool = SearchDocumentTool::new(Arc::new(RecordingSearcher::default()));
        let result = tool.execute(call(serde_json::json!({"query": "nothing"}))).await.unwrap();
        assert!(result.output.contains("No relevant passages"));

        let result = tool.execute(call(serde_json::json!({}))).await.unwrap();
        assert!(!result.success);
        assert!(result.output.contains("query"));
    }

    #[test]
    fn schema_does_not_expose_document_ref() {
        let tool = SearchDocumentTool::new(Arc::new(RecordingSearcher::default()));
        let def = tool.to_definition();
        assert_eq!(def.name, "search_document");
        assert!(def.parameters["properties"].get("document_ref").is_none());
    }
}
