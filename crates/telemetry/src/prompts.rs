//! Remote prompt registry client.
//!
//! Fetches a versioned prompt template by slug from the tracing backend:
//! `GET {api_url}/v1/prompts/{slug}?project=..&environment=..`.

use depo_core::error::TraceError;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// A prompt as served by the registry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemotePrompt {
    #[serde(default)]
    pub id: Option<String>,
    pub slug: String,
    #[serde(default)]
    pub version: Option<String>,
    /// The template text; may contain `{{variable}}` placeholders.
    pub prompt: String,
}

pub struct HttpPromptSource {
    api_url: String,
    api_key: Option<String>,
    project: String,
    environment: Option<String>,
    client: reqwest::Client,
}

impl HttpPromptSource {
    pub fn new(
        api_url: impl Into<String>,
        api_key: Option<String>,
        project: impl Into<String>,
        environment: Option<String>,
    ) -> Result<Self, TraceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| TraceError::Delivery(e.to_string()))?;
        Ok(Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key,
            project: project.into(),
            environment,
            client,
        })
    }

    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    pub async fn fetch(&self, slug: &str) -> Result<RemotePrompt, TraceError> {
        let url = format!("{}/v1/prompts/{slug}", self.api_url);
        let mut query = vec![("project", self.project.as_str())];
        if let Some(env) = &self.environment {
            query.push(("environment", env.as_str()));
        }

        let mut request = self.client.get(&url).query(&query);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TraceError::Delivery(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(TraceError::Delivery(format!("prompt '{slug}': HTTP {}", status.as_u16())));
        }
        let prompt: RemotePrompt = response
            .json()
            .await
            .map_err(|e| TraceError::Delivery(format!("prompt '{slug}': {e}")))?;
        debug!(slug, version = ?prompt.version, "Fetched remote prompt");
        Ok(prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_prompt_tolerates_missing_optional_fields() {
        let prompt: RemotePrompt =
            serde_json::from_str(r#"{"slug": "legal-deposition-assistant", "prompt": "Be concise."}"#).unwrap();
        assert_eq!(prompt.slug, "legal-deposition-assistant");
        assert!(prompt.version.is_none());
    }

    #[tokio::test]
    async fn unreachable_registry_is_an_error() {
        let source = HttpPromptSource::new("http://127.0.0.1:9/", None, "p", Some("production".into())).unwrap();
        assert_eq!(source.environment(), Some("production"));
        assert!(source.fetch("legal").await.is_err());
    }
}
