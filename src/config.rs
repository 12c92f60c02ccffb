/// Configuration module for planrag.
///
/// Handles loading, validating, and providing default configuration values.
/// Every command validates the configuration before it touches an index or
/// writes output.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "config.json";

// ── Default value functions ──────────────────────────────────────────

fn default_input_dir() -> String {
    "input".to_string()
}

fn default_index_dir() -> String {
    "vector_db".to_string()
}

fn default_output_dir() -> String {
    "output".to_string()
}

fn default_chunk_size() -> usize {
    500
}

fn default_chunk_overlap() -> usize {
    100
}

fn default_search_top_k() -> usize {
    10
}

fn default_max_context_chars() -> usize {
    12_000
}

fn default_workers() -> usize {
    4
}

fn default_batch_size() -> usize {
    16
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_embedder_provider() -> String {
    "ollama".to_string()
}

fn default_embedding_model() -> String {
    "all-minilm".to_string()
}

fn default_dimensions() -> usize {
    384
}

fn default_embed_timeout() -> u64 {
    30
}

fn default_embed_retries() -> u32 {
    3
}

fn default_generation_model() -> String {
    "mistral".to_string()
}

fn default_generate_timeout() -> u64 {
    300
}

fn default_generate_retries() -> u32 {
    2
}

fn default_language() -> String {
    "English".to_string()
}

fn default_query() -> String {
    "Produce a functional test plan from the API documents and UI flows".to_string()
}

// ── Errors ───────────────────────────────────────────────────────────

/// Invalid configuration. Always fatal, raised before any index or output I/O.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("chunk_size must be positive")]
    ZeroChunkSize,

    #[error("chunk_overlap ({overlap}) must be smaller than chunk_size ({size})")]
    OverlapTooLarge { overlap: usize, size: usize },

    #[error("{0} must be positive")]
    NotPositive(&'static str),

    #[error("unknown embedder provider: {0} (expected 'ollama' or 'hashing')")]
    UnknownProvider(String),

    #[error("invalid project name: {0:?}")]
    InvalidProject(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_input_dir")]
    pub input_dir: String,

    #[serde(default = "default_index_dir")]
    pub index_dir: String,

    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    #[serde(default = "default_search_top_k")]
    pub search_top_k: usize,

    /// Character budget for the concatenated context slot.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub embedder: EmbedderConfig,

    #[serde(default)]
    pub generator: GeneratorConfig,

    #[serde(default)]
    pub prompt: PromptConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BuildConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbedderConfig {
    /// `ollama` or `hashing`.
    #[serde(default = "default_embedder_provider")]
    pub provider: String,

    #[serde(default = "default_ollama_url")]
    pub url: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    #[serde(default = "default_embed_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_embed_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GeneratorConfig {
    #[serde(default = "default_ollama_url")]
    pub url: String,

    #[serde(default = "default_generation_model")]
    pub model: String,

    #[serde(default = "default_generate_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_generate_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PromptConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_path: Option<String>,

    #[serde(default = "default_language")]
    pub language: String,

    #[serde(default = "default_query")]
    pub query: String,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            index_dir: default_index_dir(),
            output_dir: default_output_dir(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            search_top_k: default_search_top_k(),
            max_context_chars: default_max_context_chars(),
            build: BuildConfig::default(),
            embedder: EmbedderConfig::default(),
            generator: GeneratorConfig::default(),
            prompt: PromptConfig::default(),
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            provider: default_embedder_provider(),
            url: default_ollama_url(),
            model: default_embedding_model(),
            dimensions: default_dimensions(),
            timeout_secs: default_embed_timeout(),
            max_retries: default_embed_retries(),
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            url: default_ollama_url(),
            model: default_generation_model(),
            timeout_secs: default_generate_timeout(),
            max_retries: default_generate_retries(),
        }
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            template_path: None,
            sample_path: None,
            language: default_language(),
            query: default_query(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to `"config.json"`.
    /// If the file does not exist, returns a default config and, for the
    /// default path only, generates a template file.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            DEFAULT_CONFIG_PATH
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == DEFAULT_CONFIG_PATH {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_chunking(self.chunk_size, self.chunk_overlap)?;
        let positives = [
            ("search_top_k", self.search_top_k),
            ("max_context_chars", self.max_context_chars),
            ("build.workers", self.build.workers),
            ("build.batch_size", self.build.batch_size),
            ("embedder.dimensions", self.embedder.dimensions),
        ];
        for (name, value) in positives {
            if value == 0 {
                return Err(ConfigError::NotPositive(name));
            }
        }
        if !matches!(self.embedder.provider.as_str(), "ollama" | "hashing") {
            return Err(ConfigError::UnknownProvider(self.embedder.provider.clone()));
        }
        Ok(())
    }

    #[must_use]
    pub fn input_root(&self) -> PathBuf {
        PathBuf::from(&self.input_dir)
    }

    #[must_use]
    pub fn index_root(&self) -> PathBuf {
        PathBuf::from(&self.index_dir)
    }

    #[must_use]
    pub fn output_root(&self) -> PathBuf {
        PathBuf::from(&self.output_dir)
    }
}

/// Check a chunk size / overlap pair.
pub fn validate_chunking(chunk_size: usize, chunk_overlap: usize) -> Result<(), ConfigError> {
    if chunk_size == 0 {
        return Err(ConfigError::ZeroChunkSize);
    }
    if chunk_overlap >= chunk_size {
        return Err(ConfigError::OverlapTooLarge {
            overlap: chunk_overlap,
            size: chunk_size,
        });
    }
    Ok(())
}

/// Project names double as directory names under the index and output roots.
pub fn validate_project_name(name: &str) -> Result<(), ConfigError> {
    let bad = name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control);
    if bad {
        return Err(ConfigError::InvalidProject(name.to_string()));
    }
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.chunk_overlap, 100);
        assert_eq!(config.search_top_k, 10);
        assert_eq!(config.embedder.dimensions, 384);
        assert_eq!(config.embedder.model, "all-minilm");
        assert_eq!(config.generator.model, "mistral");
        assert!(config.prompt.template_path.is_none());
    }

    #[test]
    fn test_load_from_json() {
        let json = r#"{"chunk_size": 1000, "index_dir": "./idx", "embedder": {"provider": "hashing"}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.index_dir, "./idx");
        assert_eq!(config.embedder.provider, "hashing");
        // Other fields should have defaults
        assert_eq!(config.chunk_overlap, 100);
        assert_eq!(config.embedder.dimensions, 384);
    }

    #[test]
    fn test_validate_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_overlap_not_smaller_than_size() {
        let mut config = Config::default();
        config.chunk_overlap = config.chunk_size;
        assert_eq!(
            config.validate(),
            Err(ConfigError::OverlapTooLarge {
                overlap: 500,
                size: 500
            })
        );
    }

    #[test]
    fn test_validate_bad_chunk_size() {
        let mut config = Config::default();
        config.chunk_size = 0;
        config.chunk_overlap = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroChunkSize));
    }

    #[test]
    fn test_validate_zero_workers() {
        let mut config = Config::default();
        config.build.workers = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::NotPositive("build.workers"))
        );
    }

    #[test]
    fn test_validate_unknown_provider() {
        let mut config = Config::default();
        config.embedder.provider = "openai".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownProvider(_))
        ));
    }

    #[test]
    fn test_project_names() {
        assert!(validate_project_name("mobile-app").is_ok());
        assert!(validate_project_name("").is_err());
        assert!(validate_project_name("../etc").is_err());
        assert!(validate_project_name(".hidden").is_err());
    }

    #[test]
    fn test_load_missing_explicit_path_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.chunk_size, 500);
        assert!(!path.exists(), "template only generated for the default path");
    }

    #[test]
    fn test_serialization_roundtrip() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.chunk_size, config.chunk_size);
        assert_eq!(parsed.index_dir, config.index_dir);
        assert_eq!(parsed.generator.model, config.generator.model);
    }
}
