//! LLM provider implementations for the deposition assistant.
//!
//! All providers implement the `depo_core::Provider` trait. The agent crate
//! never names a concrete provider; it receives one built here from config.

pub mod openai;
mod sse;

pub use openai::OpenAiProvider;

use depo_config::{AppConfig, ConfigError};
use depo_core::Provider;
use std::sync::Arc;

/// Build the chat provider described by `config`.
///
/// Fails with a configuration error when the model credential is missing,
/// so callers learn about it before the first turn.
pub fn from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ConfigError> {
    config.check_credentials()?;
    let api_key = config.api_key.clone().unwrap_or_default();
    let provider = OpenAiProvider::new("openai", &config.api_url, api_key)
        .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
    tracing::info!(base_url = %config.api_url, model = %config.default_model, "Chat provider ready");
    Ok(Arc::new(provider))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_config_error() {
        let err = from_config(&AppConfig::default()).err().unwrap();
        assert!(matches!(err, ConfigError::MissingCredential(_)));
    }

    #[test]
    fn builds_with_key() {
        let config = AppConfig {
            api_key: Some("sk-test".into()),
            ..AppConfig::default()
        };
        let provider = from_config(&config).unwrap();
        assert_eq!(provider.name(), "openai");
    }
}
