//! `search_web`: live web search through Tavily.

use crate::SEARCH_WEB;
use async_trait::async_trait;
use depo_core::error::ToolError;
use depo_core::tool::{Tool, ToolCall, ToolResult};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// One search hit.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WebResult {
    #[serde(default = "untitled")]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub content: String,
}

fn untitled() -> String {
    "Untitled".into()
}

/// The black-box "search web" capability.
#[async_trait]
pub trait WebSearchBackend: Send + Sync {
    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<WebResult>, ToolError>;
}

/// Tavily search API client.
pub struct TavilyClient {
    api_key: Option<String>,
    api_url: String,
    client: reqwest::Client,
}

impl TavilyClient {
    pub fn new(api_key: Option<String>, api_url: impl Into<String>) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: SEARCH_WEB.into(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            api_key,
            api_url: api_url.into(),
            client,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<WebResult>,
}

#[async_trait]
impl WebSearchBackend for TavilyClient {
    async fn search(&self, query: &str, max_results: u32) -> Result<Vec<WebResult>, ToolError> {
        let failed = |reason: String| ToolError::ExecutionFailed {
            tool_name: SEARCH_WEB.into(),
            reason,
        };
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| failed("TAVILY_API_KEY is not set".into()))?;

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(&serde_json::json!({
                "query": query,
                "max_results": max_results,
            }))
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(failed(format!("HTTP {}: {body}", status.as_u16())));
        }

        let parsed: TavilyResponse = response.json().await.map_err(|e| failed(e.to_string()))?;
        Ok(parsed.results)
    }
}

/// Render hits as `- <title> (<url>): <content>` lines.
pub fn format_results(results: &[WebResult]) -> String {
    results
        .iter()
        .map(|r| format!("- {} ({}): {}", r.title, r.url, r.content))
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct SearchWebTool {
    backend: Arc<dyn WebSearchBackend>,
    max_results: u32,
}

impl SearchWebTool {
    pub fn new(backend: Arc<dyn WebSearchBackend>, max_results: u32) -> Self {
        Self {
            backend,
            max_results: max_results.max(1),
        }
    }
}

#[async_trait]
impl Tool for SearchWebTool {
    fn name(&self) -> &str {
        SEARCH_WEB
    }

    fn description(&self) -> &str {
        "Search the web for external facts (laws, places, people, events). Returns titles, URLs and snippets."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, call: ToolCall) -> Result<ToolResult, ToolError> {
        let query = call.arguments["query"].as_str().unwrap_or("").trim();
        if query.is_empty() {
            return Ok(ToolResult::degraded(call.id, "search_web needs a non-empty 'query'."));
        }

        match self.backend.search(query, self.max_results).await {
            Ok(results) if results.is_empty() => Ok(ToolResult::ok(call.id, "No web results found.")),
            Ok(results) => {
                debug!(query, hits = results.len(), "Web search");
                Ok(ToolResult::ok(call.id, format_results(&results)))
            }
            Err(e) => {
                warn!(query, error = %e, "Web search failed");
                Ok(ToolResult::degraded(call.id, format!("Web search failed: {e}")))
            }
        }
    }
}
