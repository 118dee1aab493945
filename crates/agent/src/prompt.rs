//! System prompt resolution: remote registry first, built-in text on any
//! failure. Resolution never fails.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use depo_core::trace::{SpanUpdate, TraceSink};
use depo_telemetry::HttpPromptSource;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_PROMPT_SLUG: &str = "legal-deposition-assistant";

pub const FALLBACK_PROMPT: &str = "You are a legal assistant helping summarize deposition testimony.\n\
Use tools when needed: search_document for documents and search_web for external facts.\n\
Answer clearly, cite which source you used (doc or web), and be concise.";

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("no prompt source configured")]
    NotConfigured,

    #[error("prompt fetch failed: {0}")]
    Fetch(String),

    #[error("prompt '{0}' is empty")]
    Empty(String),
}

/// A template as returned by a prompt source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcedPrompt {
    pub template: String,
    pub id: Option<String>,
    pub version: Option<String>,
}

#[async_trait]
pub trait PromptSource: Send + Sync {
    async fn fetch(&self, slug: &str) -> Result<SourcedPrompt, PromptError>;

    fn environment(&self) -> Option<&str> {
        None
    }
}

#[async_trait]
impl PromptSource for HttpPromptSource {
    async fn fetch(&self, slug: &str) -> Result<SourcedPrompt, PromptError> {
        let remote = HttpPromptSource::fetch(self, slug)
            .await
            .map_err(|e| PromptError::Fetch(e.to_string()))?;
        Ok(SourcedPrompt {
            template: remote.prompt,
            id: remote.id,
            version: remote.version,
        })
    }

    fn environment(&self) -> Option<&str> {
        HttpPromptSource::environment(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptOrigin {
    Remote,
    Fallback,
}

/// What is recorded on the turn span about the prompt in use.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptMetadata {
    pub slug: String,
    pub source: PromptOrigin,
    pub id: Option<String>,
    pub version: Option<String>,
    pub environment: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPrompt {
    pub text: String,
    pub metadata: PromptMetadata,
}

impl ResolvedPrompt {
    /// Record `{"prompt": metadata}` on the span behind `export`.
    pub fn log_to(&self, sink: &dyn TraceSink, export: &str) {
        let update = SpanUpdate::metadata(serde_json::json!({ "prompt": self.metadata }));
        if let Err(e) = sink.update_span(export, update) {
            warn!(error = %e, "Could not record prompt metadata");
        }
    }
}

/// Replace `{{name}}` (or `{{input.name}}`) placeholders. Unknown names
/// render empty.
pub fn render(template: &str, variables: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let key = after[..end].trim();
        let key = key.strip_prefix("input.").unwrap_or(key);
        if let Some(value) = variables.get(key) {
            out.push_str(value);
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

pub struct PromptResolver {
    source: Option<Arc<dyn PromptSource>>,
    slug: String,
    variables: HashMap<String, String>,
}

impl Default for PromptResolver {
    fn default() -> Self {
        Self::new(None)
    }
}

impl PromptResolver {
    pub fn new(source: Option<Arc<dyn PromptSource>>) -> Self {
        let variables = ["user_message", "context_docs", "web_results"]
            .into_iter()
            .map(|k| (k.to_string(), String::new()))
            .collect();
        Self {
            source,
            slug: DEFAULT_PROMPT_SLUG.into(),
            variables,
        }
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = slug.into();
        self
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// Resolve for today's UTC date.
    pub async fn resolve(&self) -> ResolvedPrompt {
        self.resolve_on(Utc::now().date_naive()).await
    }

    pub async fn resolve_on(&self, date: NaiveDate) -> ResolvedPrompt {
        let environment = self.source.as_ref().and_then(|s| s.environment().map(String::from));
        let fetched = match &self.source {
            Some(source) => source.fetch(&self.slug).await,
            None => Err(PromptError::NotConfigured),
        };
        let fetched = fetched.and_then(|p| {
            if p.template.trim().is_empty() {
                Err(PromptError::Empty(self.slug.clone()))
            } else {
                Ok(p)
            }
        });

        let (base, metadata) = match fetched {
            Ok(prompt) => {
                info!(slug = %self.slug, environment = ?environment, "Loaded remote prompt");
                (
                    render(&prompt.template, &self.variables),
                    PromptMetadata {
                        slug: self.slug.clone(),
                        source: PromptOrigin::Remote,
                        id: prompt.id,
                        version: prompt.version,
                        environment,
                    },
                )
            }
            Err(e) => {
                if !matches!(e, PromptError::NotConfigured) {
                    warn!(slug = %self.slug, environment = ?environment, error = %e, "Falling back to built-in prompt");
                }
                (
                    FALLBACK_PROMPT.to_string(),
                    PromptMetadata {
                        slug: self.slug.clone(),
                        source: PromptOrigin::Fallback,
                        id: None,
                        version: None,
                        environment,
                    },
                )
            }
        };

        ResolvedPrompt {
            text: format!("{base}\n\nToday is {} (UTC).", date.format("%Y-%m-%d")),
            metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticSource(Result<SourcedPrompt, String>);

    #[async_trait]
    impl PromptSource for StaticSource {
        async fn fetch(&self, _slug: &str) -> Result<SourcedPrompt, PromptError> {
            self.0.clone().map_err(PromptError::Fetch)
        }

        fn environment(&self) -> Option<&str> {
            Some("staging")
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 14).unwrap()
    }

    #[tokio::test]
    async fn no_source_uses_fallback_with_date() {
        let resolved = PromptResolver::default().resolve_on(date()).await;
        assert!(resolved.text.starts_with(FALLBACK_PROMPT));
        assert!(resolved.text.ends_with("\n\nToday is 2026-03-14 (UTC)."));
        assert_eq!(resolved.metadata.source, PromptOrigin::Fallback);
        assert_eq!(resolved.metadata.slug, DEFAULT_PROMPT_SLUG);
    }

    #[tokio::test]
    async fn remote_prompt_is_rendered() {
        let source = StaticSource(Ok(SourcedPrompt {
            template: "Summarize depositions.{{ context_docs }}{{input.web_results}}".into(),
            id: Some("p-1".into()),
            version: Some("7".into()),
        }));
        let resolved = PromptResolver::new(Some(Arc::new(source))).resolve_on(date()).await;
        assert_eq!(resolved.text, "Summarize depositions.\n\nToday is 2026-03-14 (UTC).");
        assert_eq!(resolved.metadata.source, PromptOrigin::Remote);
        assert_eq!(resolved.metadata.version.as_deref(), Some("7"));
        assert_eq!(resolved.metadata.environment.as_deref(), Some("staging"));
    }

    #[tokio::test]
    async fn remote_failure_falls_back() {
        let source = StaticSource(Err("503".into()));
        let resolved = PromptResolver::new(Some(Arc::new(source)))
            .with_slug("custom")
            .resolve_on(date())
            .await;
        assert!(resolved.text.starts_with(FALLBACK_PROMPT));
        assert_eq!(resolved.metadata.source, PromptOrigin::Fallback);
        assert_eq!(resolved.metadata.slug, "custom");
        assert_eq!(resolved.metadata.environment.as_deref(), Some("staging"));
    }

    #[tokio::test]
    async fn blank_remote_prompt_falls_back() {
        let source = StaticSource(Ok(SourcedPrompt {
            template: "   ".into(),
            id: None,
            version: None,
        }));
        let resolved = PromptResolver::new(Some(Arc::new(source))).resolve_on(date()).await;
        assert_eq!(resolved.metadata.source, PromptOrigin::Fallback);
    }

    #[test]
    fn render_leaves_unterminated_placeholders() {
        let vars = HashMap::from([("name".to_string(), "Jane".to_string())]);
        assert_eq!(render("Hi {{name}}, {{unknown}}!", &vars), "Hi Jane, !");
        assert_eq!(render("broken {{name", &vars), "broken {{name");
    }

    #[test]
    fn metadata_logs_onto_span() {
        let sink = depo_telemetry::TelemetryEngine::new("test");
        let span = sink.start_span("chat_turn", None).unwrap();
        let resolved = ResolvedPrompt {
            text: "x".into(),
            metadata: PromptMetadata {
                slug: "s".into(),
                source: PromptOrigin::Fallback,
                id: None,
                version: None,
                environment: None,
            },
        };
        resolved.log_to(&sink, &span.export);
        let logged = sink.span(&span.span_id).unwrap();
        assert_eq!(logged.metadata["prompt"]["source"], "fallback");
    }
}
