//! Document retrieval backing the `search_document` tool.
//!
//! A document is loaded once, split into overlapping chunks, optionally
//! embedded, and kept in a small LRU cache keyed by path. Queries rank chunks
//! by cosine similarity when embeddings are available, else by keyword overlap.

use crate::chunker::TextChunker;
use async_trait::async_trait;
use depo_core::error::ToolError;
use depo_core::provider::{EmbeddingRequest, Provider};
use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const EMBED_BATCH: usize = 64;

/// Extract the text of every page, pages separated by blank lines. Parsing
/// runs on the blocking pool.
async fn pdf_text(path: &str, bytes: Vec<u8>) -> Result<String, ToolError> {
    let failed = |reason: String| ToolError::ExecutionFailed {
        tool_name: "search_document".into(),
        reason,
    };
    let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| failed(format!("PDF extraction aborted for {path}: {e}")))?
        .map_err(|e| failed(format!("cannot extract text from PDF {path}: {e}")))?;
    if text.trim().is_empty() {
        warn!(path, "PDF has no extractable text");
    }
    Ok(text)
}

/// The black-box "search documents" capability.
#[async_trait]
pub trait DocumentSearcher: Send + Sync {
    /// Return the passages most relevant to `query`, joined by blank lines.
    /// `None` searches the configured default document.
    async fn search(&self, query: &str, document_ref: Option<&str>) -> Result<String, ToolError>;
}

/// Cosine similarity between two vectors. Mismatched or empty inputs score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (dot, na, nb) = a.iter().zip(b).fold((0.0f64, 0.0f64, 0.0f64), |(d, x2, y2), (x, y)| {
        let (x, y) = (*x as f64, *y as f64);
        (d + x * y, x2 + x * x, y2 + y * y)
    });
    let denom = na.sqrt() * nb.sqrt();
    if denom < 1e-10 { 0.0 } else { (dot / denom) as f32 }
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(str::to_lowercase)
        .collect()
}

/// Fraction of distinct query terms that appear in `chunk`.
pub fn keyword_score(query: &str, chunk: &str) -> f32 {
    let wanted = terms(query);
    if wanted.is_empty() {
        return 0.0;
    }
    let present = terms(chunk);
    wanted.iter().filter(|t| present.contains(*t)).count() as f32 / wanted.len() as f32
}

/// One loaded, chunked, and (optionally) embedded document.
#[derive(Debug)]
pub struct DocumentIndex {
    pub path: String,
    pub chunks: Vec<String>,
    pub embeddings: Option<Vec<Vec<f32>>>,
}

impl DocumentIndex {
    /// Top `k` chunks for the query, best first. Ties keep document order.
    pub fn rank(&self, query: &str, query_embedding: Option<&[f32]>, k: usize) -> Vec<&str> {
        let mut scored: Vec<(f32, usize)> = match (query_embedding, &self.embeddings) {
            (Some(q), Some(embeddings)) => embeddings
                .iter()
                .enumerate()
                .map(|(i, e)| (cosine_similarity(q, e), i))
                .collect(),
            _ => self
                .chunks
                .iter()
                .enumerate()
                .map(|(i, c)| (keyword_score(query, c), i))
                .filter(|(score, _)| *score > 0.0)
                .collect(),
        };
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal).then(a.1.cmp(&b.1)));
        scored.into_iter().take(k).map(|(_, i)| self.chunks[i].as_str()).collect()
    }
}

/// Embedding settings: which provider and model to call.
#[derive(Clone)]
pub struct Embedder {
    pub provider: Arc<dyn Provider>,
    pub model: String,
}

impl Embedder {
    async fn embed(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>, ToolError> {
        let mut out = Vec::with_capacity(inputs.len());
        for batch in inputs.chunks(EMBED_BATCH) {
            let response = self
                .provider
                .embed(EmbeddingRequest {
                    model: self.model.clone(),
                    inputs: batch.to_vec(),
                })
                .await
                .map_err(|e| ToolError::ExecutionFailed {
                    tool_name: "search_document".into(),
                    reason: e.to_string(),
                })?;
            out.extend(response.embeddings);
        }
        Ok(out)
    }
}

/// Chunking retriever with a per-path index cache.
pub struct Retriever {
    chunker: TextChunker,
    top_k: usize,
    default_document: String,
    embedder: Option<Embedder>,
    capacity: usize,
    cache: Mutex<VecDeque<Arc<DocumentIndex>>>,
}

impl Retriever {
    pub fn new(
        chunk_size: usize,
        chunk_overlap: usize,
        top_k: usize,
        cache_capacity: usize,
        default_document: impl Into<String>,
    ) -> Self {
        Self {
            chunker: TextChunker::new(chunk_size, chunk_overlap),
            top_k: top_k.max(1),
            default_document: default_document.into(),
            embedder: None,
            capacity: cache_capacity.max(1),
            cache: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_embedder(mut self, embedder: Embedder) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Number of indexes currently cached.
    pub async fn cached(&self) -> usize {
        self.cache.lock().await.len()
    }

    async fn index_for(&self, path: &str) -> Result<Arc<DocumentIndex>, ToolError> {
        {
            let mut cache = self.cache.lock().await;
            if let Some(pos) = cache.iter().position(|idx| idx.path == path) {
                let hit = cache.remove(pos).ok_or_else(|| ToolError::NotFound(path.to_string()))?;
                cache.push_back(hit.clone());
                return Ok(hit);
            }
        }

        let index = Arc::new(self.build_index(path).await?);

        let mut cache = self.cache.lock().await;
        cache.retain(|idx| idx.path != path);
        cache.push_back(index.clone());
        while cache.len() > self.capacity {
            if let Some(evicted) = cache.pop_front() {
                debug!(path = %evicted.path, "Evicted document index");
            }
        }
        Ok(index)
    }

    async fn build_index(&self, path: &str) -> Result<DocumentIndex, ToolError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| ToolError::ExecutionFailed {
            tool_name: "search_document".into(),
            reason: format!("cannot read document {path}: {e}"),
        })?;
        let is_pdf = Path::new(path)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        let text = if is_pdf {
            pdf_text(path, bytes).await?
        } else {
            String::from_utf8_lossy(&bytes).into_owned()
        };
        let chunks = self.chunker.split(&text);

        let embeddings = match &self.embedder {
            Some(embedder) if !chunks.is_empty() => match embedder.embed(chunks.clone()).await {
                Ok(vectors) if vectors.len() == chunks.len() => Some(vectors),
                Ok(vectors) => {
                    warn!(path, expected = chunks.len(), got = vectors.len(), "Embedding count mismatch, using keyword ranking");
                    None
                }
                Err(e) => {
                    warn!(path, error = %e, "Embedding failed, using keyword ranking");
                    None
                }
            },
            _ => None,
        };

        info!(path, chunks = chunks.len(), embedded = embeddings.is_some(), "Indexed document");
        Ok(DocumentIndex {
            path: path.to_string(),
            chunks,
            embeddings,
        })
    }
}

#[async_trait]
impl DocumentSearcher for Retriever {
    async fn search(&self, query: &str, document_ref: Option<&str>) -> Result<String, ToolError> {
        let path = document_ref.filter(|r| !r.trim().is_empty()).unwrap_or(self.default_document.as_str());
        let index = self.index_for(path).await?;

        let query_embedding = match (&self.embedder, &index.embeddings) {
            (Some(embedder), Some(_)) => match embedder.embed(vec![query.to_string()]).await {
                Ok(mut v) if !v.is_empty() => Some(v.swap_remove(0)),
                Ok(_) => None,
                Err(e) => {
                    warn!(error = %e, "Query embedding failed, using keyword ranking");
                    None
                }
            },
            _ => None,
        };

        let passages = index.rank(query, query_embedding.as_deref(), self.top_k);
        debug!(path, query, hits = passages.len(), "Document search");
        Ok(passages.join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depo_core::error::ProviderError;
    use depo_core::provider::{EmbeddingResponse, ProviderRequest, ProviderResponse};
    use std::io::Write;

    fn write_doc(dir: &tempfile::TempDir, name: &str, body: &str) -> String {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path.to_string_lossy().into_owned()
    }

    const DEPOSITION: &str = "Q. Please state your name for the record.\nA. Jane Doe.\n\n\
        Q. What did you see on March 3rd?\nA. I saw a blue sedan run the red light at Fifth and Main.\n\n\
        Q. Were you an eyewitness to the collision?\nA. Yes, I was standing at the bus shelter.";

    /// Embeds text as a two-dimensional "mentions sedan / mentions name" vector.
    struct FeatureEmbedder;

    #[async_trait]
    impl Provider for FeatureEmbedder {
        fn name(&self) -> &str {
            "feature"
        }
        async fn complete(&self, _r: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            Err(ProviderError::NotConfigured("chat".into()))
        }
        async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
            let embeddings = request
                .inputs
                .iter()
                .map(|t| {
                    let t = t.to_lowercase();
                    vec![
                        if t.contains("sedan") || t.contains("car") { 1.0 } else { 0.0 },
                        if t.contains("name") { 1.0 } else { 0.0 },
                    ]
                })
                .collect();
            Ok(EmbeddingResponse {
                embeddings,
                model: request.model,
            })
        }
    }

    #[test]
    fn cosine_identical_and_orthogonal() {
        assert!((cosine_similarity(&[1.0, 2.0], &[1.0, 2.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn keyword_score_counts_distinct_terms() {
        assert_eq!(keyword_score("blue sedan", "A blue sedan ran the light"), 1.0);
        assert_eq!(keyword_score("blue truck", "A blue sedan"), 0.5);
        assert_eq!(keyword_score("?", "anything"), 0.0);
    }

    #[tokio::test]
    async fn keyword_search_finds_relevant_passage() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_doc(&dir, "depo.txt", DEPOSITION);
        let retriever = Retriever::new(120, 10, 1, 8, "unused.txt");

        let text = retriever.search("eyewitness collision", Some(&path)).await.unwrap();
        assert!(text.contains("eyewitness"));
        assert!(!text.contains("blue sedan"));
    }

    #[tokio::test]
    async fn embedding_search_uses_cosine_ranking() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_doc(&dir, "depo.txt", DEPOSITION);
        let retriever = Retriever::new(120, 10, 1, 8, "unused.txt").with_embedder(Embedder {
            provider: Arc::new(FeatureEmbedder),
            model: "feature-v1".into(),
        });

        let text = retriever.search("which car?", Some(&path)).await.unwrap();
        assert!(text.contains("blue sedan"));
    }

    #[tokio::test]
    async fn missing_ref_searches_default_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_doc(&dir, "sample.txt", DEPOSITION);
        let retriever = Retriever::new(400, 40, 3, 8, path);

        let text = retriever.search("Jane Doe", None).await.unwrap();
        assert!(text.contains("Jane Doe"));
    }

    #[tokio::test]
    async fn cache_is_bounded_lru() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_doc(&dir, "a.txt", "alpha testimony");
        let b = write_doc(&dir, "b.txt", "bravo testimony");
        let c = write_doc(&dir, "c.txt", "charlie testimony");
        let retriever = Retriever::new(400, 40, 3, 2, "unused.txt");

        retriever.search("testimony", Some(&a)).await.unwrap();
        retriever.search("testimony", Some(&b)).await.unwrap();
        retriever.search("testimony", Some(&a)).await.unwrap();
        retriever.search("testimony", Some(&c)).await.unwrap();
        assert_eq!(retriever.cached().await, 2);

        let cache = retriever.cache.lock().await;
        let paths: Vec<&str> = cache.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec![a.as_str(), c.as_str()]);
    }

    #[tokio::test]
    async fn pdf_text_is_extracted_and_searched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("depo.PDF");
        std::fs::write(&path, include_bytes!("../fixtures/deposition.pdf")).unwrap();
        let path = path.to_string_lossy().into_owned();
        let retriever = Retriever::new(60, 10, 1, 8, "unused.txt");

        let text = retriever.search("eyewitness collision", Some(&path)).await.unwrap();
        assert!(text.contains("eyewitness"));

        let all = Retriever::new(400, 40, 3, 8, "unused.txt");
        let text = all.search("name witness", Some(&path)).await.unwrap();
        assert!(text.contains("Jane Doe"));
    }

    #[tokio::test]
    async fn corrupt_pdf_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_doc(&dir, "broken.pdf", "this is not a pdf");
        let retriever = Retriever::new(400, 40, 3, 8, "unused.txt");
        let err = retriever.search("witness", Some(&path)).await.unwrap_err();
        assert!(err.to_string().contains("PDF"));
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let retriever = Retriever::new(400, 40, 3, 8, "unused.txt");
        assert!(retriever.search("witness", Some("/nonexistent/depo.txt")).await.is_err());
    }
}
