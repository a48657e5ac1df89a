//! TOML configuration.
//!
//! All settings live in one file passed with `--config`. Every section has
//! defaults, so a minimal file only needs the values that differ from a
//! local setup (Qdrant gRPC on 6334, Ollama on 11434).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use allure_rag_core::retention::{EvictionOrder, DEFAULT_RETAINED_REPORTS};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub qdrant: QdrantConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub allure: AllureConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Defaults for every section, used when no config file is present.
    pub fn minimal() -> Self {
        Self::default()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_chunks_dir")]
    pub chunks_dir: PathBuf,
    #[serde(default = "default_retained_reports")]
    pub retained_reports: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            chunks_dir: default_chunks_dir(),
            retained_reports: default_retained_reports(),
        }
    }
}

fn default_chunks_dir() -> PathBuf {
    PathBuf::from("chunks")
}
fn default_retained_reports() -> usize {
    DEFAULT_RETAINED_REPORTS
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_embedding_model(),
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_embedding_model() -> String {
    "multilingual-e5-small".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct QdrantConfig {
    #[serde(default = "default_qdrant_url")]
    pub url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_qdrant_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: default_qdrant_url(),
            collection: default_collection(),
            timeout_secs: default_qdrant_timeout(),
            api_key: None,
        }
    }
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".to_string()
}
fn default_collection() -> String {
    "allure_chunks".to_string()
}
fn default_qdrant_timeout() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_url")]
    pub url: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    /// Longest wait for the next piece of the streamed answer, not for the
    /// whole answer.
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            url: default_generation_url(),
            model: default_generation_model(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

fn default_generation_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_generation_model() -> String {
    "qwen3:0.6b".to_string()
}
fn default_generation_timeout() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_scroll_limit")]
    pub scroll_limit: usize,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub eviction_order: EvictionOrder,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            scroll_limit: default_scroll_limit(),
            top_k: default_top_k(),
            eviction_order: EvictionOrder::default(),
        }
    }
}

fn default_scroll_limit() -> usize {
    1000
}
fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AllureConfig {
    /// Base URL of the Allure report API, e.g. `https://allure.example/api`.
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub accept_invalid_certs: bool,
    #[serde(default = "default_allure_timeout")]
    pub timeout_secs: u64,
    /// Base URL of the service receiving finished analyses.
    #[serde(default)]
    pub analysis_url: Option<String>,
}

fn default_allure_timeout() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.storage.retained_reports == 0 {
        anyhow::bail!("storage.retained_reports must be >= 1");
    }

    if config.retrieval.scroll_limit == 0 {
        anyhow::bail!("retrieval.scroll_limit must be >= 1");
    }
    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be >= 1");
    }
    match config.embedding.provider.as_str() {
        "disabled" | "local" => {}
        "ollama" => {
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                anyhow::bail!("embedding.dims must be > 0 when provider is 'ollama'");
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, local, or ollama.",
            other
        ),
    }

    if config.allure.password.is_some() && config.allure.username.is_none() {
        anyhow::bail!("allure.password requires allure.username");
    }

    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.storage.retained_reports, 3);
        assert_eq!(config.qdrant.collection, "allure_chunks");
        assert_eq!(config.embedding.model, "multilingual-e5-small");
        assert_eq!(config.retrieval.scroll_limit, 1000);
        assert_eq!(config.retrieval.eviction_order, EvictionOrder::IngestedAt);
    }

    #[test]
    fn test_default_qdrant_url_is_grpc_port() {
        assert_eq!(Config::minimal().qdrant.url, "http://localhost:6334");
        let example = parse_config(include_str!("../config/arag.example.toml")).unwrap();
        assert_eq!(example.qdrant.url, "http://localhost:6334");
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = parse_config(
            r#"
            [storage]
            chunks_dir = "/var/lib/arag/chunks"

            [retrieval]
            eviction_order = "report_id"

            [generation]
            model = "llama3"
            "#,
        )
        .unwrap();
        assert_eq!(config.storage.chunks_dir, PathBuf::from("/var/lib/arag/chunks"));
        assert_eq!(config.retrieval.eviction_order, EvictionOrder::ReportId);
        assert_eq!(config.generation.model, "llama3");
        assert_eq!(config.generation.url, "http://localhost:11434");
    }

    #[test]
    fn test_validation_errors() {
        assert!(parse_config("[storage]\nretained_reports = 0").is_err());
        assert!(parse_config("[embedding]\nprovider = \"openai\"").is_err());
        assert!(parse_config("[embedding]\nprovider = \"ollama\"").is_err());
        assert!(parse_config("[allure]\npassword = \"x\"").is_err());
    }

    #[test]
    fn test_example_config_parses() {
        let config = parse_config(include_str!("../config/arag.example.toml")).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8000");
        assert!(config.allure.analysis_url.is_none());
    }
}
