//! Configuration loading, validation, and management for the deposition assistant.
//!
//! Loads configuration from `~/.depo/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use depo_core::StrategyKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.depo/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Chat model API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// OpenAI-compatible base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Document retrieval settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Web search settings
    #[serde(default)]
    pub web_search: WebSearchConfig,

    /// Trace backend and prompt registry settings
    #[serde(default)]
    pub tracing: TracingConfig,

    /// Session store settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.0
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("agent", &self.agent)
            .field("retrieval", &self.retrieval)
            .field("web_search", &self.web_search)
            .field("tracing", &self.tracing)
            .field("session", &self.session)
            .field("gateway", &self.gateway)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Loop strategy id: graph, managed-sync, or managed-stream
    #[serde(default = "default_strategy")]
    pub strategy: String,

    /// Reasoning steps allowed per turn before the loop is cut short
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Model used by the managed-stream strategy when the turn names none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_model: Option<String>,

    /// Prompt registry slug for the system instruction
    #[serde(default = "default_prompt_slug")]
    pub prompt_slug: String,

    /// Threads whose graph checkpoints and stream sessions stay in memory;
    /// the least recently used are dropped beyond this
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,
}

fn default_strategy() -> String {
    "graph".into()
}
fn default_max_rounds() -> u32 {
    8
}
fn default_prompt_slug() -> String {
    "legal-deposition-assistant".into()
}
fn default_max_threads() -> usize {
    1024
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            max_rounds: default_max_rounds(),
            stream_model: None,
            prompt_slug: default_prompt_slug(),
            max_threads: default_max_threads(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Number of document indexes kept in memory
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Document searched when a conversation has none bound
    #[serde(default = "default_document")]
    pub default_document: String,

    /// Embedding model; `None` disables embeddings and uses keyword scoring
    #[serde(default = "default_embedding_model")]
    pub embedding_model: Option<String>,
}

fn default_chunk_size() -> usize {
    400
}
fn default_chunk_overlap() -> usize {
    40
}
fn default_top_k() -> usize {
    3
}
fn default_cache_capacity() -> usize {
    8
}
fn default_document() -> String {
    "./data/sample_deposition.txt".into()
}
fn default_embedding_model() -> Option<String> {
    Some("text-embedding-3-small".into())
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            top_k: default_top_k(),
            cache_capacity: default_cache_capacity(),
            default_document: default_document(),
            embedding_model: default_embedding_model(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct WebSearchConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_search_url")]
    pub api_url: String,

    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

fn default_search_url() -> String {
    "https://api.tavily.com/search".into()
}
fn default_max_results() -> u32 {
    3
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_search_url(),
            max_results: default_max_results(),
        }
    }
}

impl std::fmt::Debug for WebSearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSearchConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("max_results", &self.max_results)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TracingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_trace_project")]
    pub project: String,

    /// Remote trace/prompt backend; `None` keeps traces in memory only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Prompt registry environment (e.g. "production")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_environment: Option<String>,

    /// Spans (and feedback entries) kept in process memory
    #[serde(default = "default_max_spans")]
    pub max_spans: usize,
}

fn default_trace_project() -> String {
    "deposition-assistant".into()
}
fn default_max_spans() -> usize {
    50_000
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            project: default_trace_project(),
            api_url: None,
            prompt_environment: None,
            max_spans: default_max_spans(),
        }
    }
}

impl std::fmt::Debug for TracingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracingConfig")
            .field("api_key", &redact(&self.api_key))
            .field("project", &self.project)
            .field("api_url", &self.api_url)
            .field("prompt_environment", &self.prompt_environment)
            .field("max_spans", &self.max_spans)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// "sqlite" or "memory"
    #[serde(default = "default_session_backend")]
    pub backend: String,

    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_session_backend() -> String {
    "sqlite".into()
}
fn default_db_path() -> String {
    "./data/sessions.db".into()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: default_session_backend(),
            db_path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: String,

    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_uploads_dir() -> String {
    "./data/uploads".into()
}
fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:5173".into()]
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            uploads_dir: default_uploads_dir(),
            cors_origins: default_cors_origins(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.depo/config.toml),
    /// then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_dir().join("config.toml"))
    }

    /// Load from `path`, apply environment overrides, and validate.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// The `DEPO_*` names win over the legacy names.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let first = |keys: &[&str]| keys.iter().copied().find_map(|k| lookup(k).filter(|v| !v.is_empty()));

        if let Some(key) = first(&["DEPO_API_KEY", "OPENAI_API_KEY"]) {
            self.api_key = Some(key);
        }
        if let Some(model) = first(&["DEPO_MODEL", "DEFAULT_LLM_MODEL"]) {
            self.default_model = model;
        }
        if let Some(strategy) = first(&["DEPO_STRATEGY", "AGENT_FRAMEWORK"]) {
            self.agent.strategy = strategy;
        }
        if let Some(model) = first(&["DEPO_STREAM_MODEL"]) {
            self.agent.stream_model = Some(model);
        }
        if let Some(key) = first(&["TAVILY_API_KEY"]) {
            self.web_search.api_key = Some(key);
        }
        if let Some(key) = first(&["DEPO_TRACE_API_KEY"]) {
            self.tracing.api_key = Some(key);
        }
        if let Some(project) = first(&["DEPO_TRACE_PROJECT"]) {
            self.tracing.project = project;
        }
        if let Some(url) = first(&["DEPO_TRACE_URL"]) {
            self.tracing.api_url = Some(url);
        }
        if let Some(env) = first(&["DEPO_PROMPT_ENV"]) {
            self.tracing.prompt_environment = Some(env);
        }
        if let Some(path) = first(&["SESSION_DB_PATH"]) {
            self.session.db_path = path;
        }
        if let Some(dir) = first(&["UPLOADS_DIR"]) {
            self.gateway.uploads_dir = dir;
        }
        if let Some(path) = first(&["DEPOSITION_SAMPLE_PATH"]) {
            self.retrieval.default_document = path;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs::home_dir()
            .map(|home| home.join(".depo"))
            .unwrap_or_else(|| PathBuf::from(".depo"))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.default_temperature) {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        self.strategy()?;

        if self.agent.max_rounds == 0 {
            return Err(ConfigError::ValidationError("agent.max_rounds must be at least 1".into()));
        }

        if self.agent.max_threads == 0 || self.tracing.max_spans == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_threads and tracing.max_spans must be at least 1".into(),
            ));
        }

        if self.retrieval.chunk_size == 0 || self.retrieval.chunk_overlap >= self.retrieval.chunk_size {
            return Err(ConfigError::ValidationError(
                "retrieval.chunk_overlap must be smaller than a non-zero retrieval.chunk_size".into(),
            ));
        }

        if !matches!(self.session.backend.as_str(), "sqlite" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "session.backend must be 'sqlite' or 'memory', got '{}'",
                self.session.backend
            )));
        }

        Ok(())
    }

    /// The configured strategy, parsed.
    pub fn strategy(&self) -> Result<StrategyKind, ConfigError> {
        self.agent
            .strategy
            .parse::<StrategyKind>()
            .map_err(|e: depo_core::Error| ConfigError::ValidationError(e.to_string()))
    }

    /// Fail if the chat model credential is missing.
    pub fn check_credentials(&self) -> Result<(), ConfigError> {
        match self.api_key.as_deref() {
            Some(key) if !key.trim().is_empty() => Ok(()),
            _ => Err(ConfigError::MissingCredential(
                "model API key (set DEPO_API_KEY or OPENAI_API_KEY)".into(),
            )),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            agent: AgentConfig::default(),
            retrieval: RetrievalConfig::default(),
            web_search: WebSearchConfig::default(),
            tracing: TracingConfig::default(),
            session: SessionConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Missing credential: {0}")]
    MissingCredential(String),
}

impl From<ConfigError> for depo_core::Error {
    fn from(err: ConfigError) -> Self {
        depo_core::Error::config(err.to_string())
    }
}
