//! Tool adapters exposed to the deposition assistant's agent loop.
//!
//! Two tools, both best-effort: failures come back as tool-result text so
//! the model can react instead of the turn dying mid-call.
//!
//! - `search_document`: retrieval over the conversation's bound document
//! - `search_web`: live web search (Tavily)

pub mod chunker;
pub mod retrieval;
pub mod search_document;
pub mod search_web;

pub use retrieval::{DocumentSearcher, Embedder, Retriever};
pub use search_document::SearchDocumentTool;
pub use search_web::{SearchWebTool, TavilyClient, WebResult, WebSearchBackend};

use depo_config::AppConfig;
use depo_core::error::ToolError;
use depo_core::provider::Provider;
use depo_core::tool::ToolRegistry;
use std::sync::Arc;

/// Tool name for document retrieval.
pub const SEARCH_DOCUMENT: &str = "search_document";

/// Tool name for web search.
pub const SEARCH_WEB: &str = "search_web";

/// Argument carrying the bound document reference into `search_document`.
pub const DOCUMENT_REF_ARG: &str = "document_ref";

/// Build the registry with both tools wired from config.
///
/// `embedder` is the provider used for chunk embeddings; pass `None` (or
/// leave `retrieval.embedding_model` unset) to rank by keywords only.
pub fn default_registry(config: &AppConfig, embedder: Option<Arc<dyn Provider>>) -> Result<ToolRegistry, ToolError> {
    let retrieval = &config.retrieval;
    let mut retriever = Retriever::new(
        retrieval.chunk_size,
        retrieval.chunk_overlap,
        retrieval.top_k,
        retrieval.cache_capacity,
        retrieval.default_document.clone(),
    );
    if let (Some(provider), Some(model)) = (embedder, retrieval.embedding_model.clone()) {
        retriever = retriever.with_embedder(Embedder { provider, model });
    }

    let tavily = TavilyClient::new(config.web_search.api_key.clone(), config.web_search.api_url.clone())?;

    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(SearchDocumentTool::new(Arc::new(retriever))));
    registry.register(Arc::new(SearchWebTool::new(Arc::new(tavily), config.web_search.max_results)));
    Ok(registry)
}
