use std::path::{Path, PathBuf};

use serde::Deserialize;
use validator::Validate;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

/// Where query embeddings come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    Ollama,
    OpenAi,
    None,
}

/// Process-wide provider credentials and endpoints, used when a connector
/// does not carry its own.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProviderDefaults {
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub azure_openai_api_key: Option<String>,
    pub azure_openai_endpoint: Option<String>,
    pub azure_openai_api_version: Option<String>,
    pub copilot_api_key: Option<String>,
    pub mistral_api_key: Option<String>,
    pub custom_api_key: Option<String>,
    pub custom_base_url: Option<String>,
    /// Overrides for proxies and tests.
    pub anthropic_base_url: Option<String>,
    pub openai_base_url: Option<String>,
}

impl ProviderDefaults {
    /// Fills unset fields from the conventional provider variables
    /// (`ANTHROPIC_API_KEY`, `OPENAI_API_KEY`, ...).
    pub fn with_env_fallback(self) -> Self {
        self.with_fallback(|name| std::env::var(name).ok())
    }

    pub fn with_fallback(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let fields: [(&mut Option<String>, &str); 7] = [
            (&mut self.anthropic_api_key, "ANTHROPIC_API_KEY"),
            (&mut self.openai_api_key, "OPENAI_API_KEY"),
            (&mut self.azure_openai_api_key, "AZURE_OPENAI_API_KEY"),
            (&mut self.azure_openai_endpoint, "AZURE_OPENAI_ENDPOINT"),
            (&mut self.azure_openai_api_version, "AZURE_OPENAI_API_VERSION"),
            (&mut self.copilot_api_key, "COPILOT_API_KEY"),
            (&mut self.mistral_api_key, "MISTRAL_API_KEY"),
        ];
        for (field, name) in fields {
            if field.as_deref().map_or(true, |v| v.trim().is_empty()) {
                *field = lookup(name).filter(|v| !v.trim().is_empty());
            }
        }
        self
    }
}

/// Main configuration for the RagChat controller
#[derive(Debug, Deserialize, Validate, Clone)]
pub struct Config {
    /// HTTP server port
    #[validate(range(min = 1024, max = 65535))]
    pub server_port: u16,

    /// Shared secret presented by the upstream gateway as a Bearer token
    #[validate(length(min = 32))]
    pub api_key: String,

    /// Database URL (SeaORM / SQLite)
    pub database_url: String,

    /// Log level (e.g., info, debug, trace)
    pub log_level: String,

    pub cors_enabled: bool,

    /// Requests per minute allowed per member
    #[validate(range(min = 1))]
    pub rate_limit_per_minute: u32,

    /// Chroma base URL
    pub chroma_url: String,
    pub chroma_collection: String,

    pub embedding_provider: EmbeddingBackend,
    /// Embedding model name (Ollama or OpenAI)
    pub embedding_model: String,
    /// Ollama base URL
    pub ollama_url: String,

    /// Token budget for the windowed history
    #[validate(range(min = 1))]
    pub context_max_tokens: usize,
    #[validate(range(min = 1))]
    pub context_max_messages: usize,
    #[validate(range(min = 1))]
    pub max_output_tokens: u32,
    /// Model calls allowed per turn, tool calls included
    #[validate(range(min = 1, max = 10))]
    pub max_steps: usize,
    #[validate(range(min = 1, max = 50))]
    pub retrieval_limit: usize,
    pub summary_min_messages: usize,
    #[validate(range(min = 8, max = 200))]
    pub title_max_chars: usize,

    #[validate(range(min = 1, max = 64))]
    pub background_workers: usize,
    #[validate(range(min = 1))]
    pub background_queue_capacity: usize,

    #[serde(default)]
    pub providers: ProviderDefaults,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 8080,
            api_key: String::new(),
            database_url: "sqlite://ragchat.db".to_string(),
            log_level: "info".to_string(),
            cors_enabled: true,
            rate_limit_per_minute: 60,
            chroma_url: "http://localhost:8000".to_string(),
            chroma_collection: "document_chunks".to_string(),
            embedding_provider: EmbeddingBackend::Ollama,
            embedding_model: "nomic-embed-text:latest".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            context_max_tokens: 4000,
            context_max_messages: 50,
            max_output_tokens: 4096,
            max_steps: 3,
            retrieval_limit: 5,
            summary_min_messages: 10,
            title_max_chars: 80,
            background_workers: 2,
            background_queue_capacity: 64,
            providers: ProviderDefaults::default(),
        }
    }
}

impl Config {
    /// Defaults, then `~/.ragchat/config.{toml,yaml,json}` (or `path`), then
    /// `RAGCHAT__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);

        let settings = config::Config::builder()
            .set_default("server_port", 8080)?
            .set_default("api_key", "")?
            .set_default("database_url", "sqlite://ragchat.db")?
            .set_default("log_level", "info")?
            .set_default("cors_enabled", true)?
            .set_default("rate_limit_per_minute", 60)?
            .set_default("chroma_url", "http://localhost:8000")?
            .set_default("chroma_collection", "document_chunks")?
            .set_default("embedding_provider", "ollama")?
            .set_default("embedding_model", "nomic-embed-text:latest")?
            .set_default("ollama_url", "http://localhost:11434")?
            .set_default("context_max_tokens", 4000)?
            .set_default("context_max_messages", 50)?
            .set_default("max_output_tokens", 4096)?
            .set_default("max_steps", 3)?
            .set_default("retrieval_limit", 5)?
            .set_default("summary_min_messages", 10)?
            .set_default("title_max_chars", 80)?
            .set_default("background_workers", 2)?
            .set_default("background_queue_capacity", 64)?
            .add_source(config::File::from(file).required(path.is_some()))
            // Environment overrides: RAGCHAT__SERVER_PORT, RAGCHAT__PROVIDERS__OPENAI_API_KEY, etc.
            .add_source(config::Environment::with_prefix("RAGCHAT").separator("__"))
            .build()?;

        let mut cfg: Config = settings.try_deserialize()?;
        cfg.validate()?;
        cfg.providers = cfg.providers.with_env_fallback();
        Ok(cfg)
    }
}

fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ragchat")
        .join("config")
}
