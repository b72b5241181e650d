
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 384;
pub const DEFAULT_MAX_LENGTH: usize = 512;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackendKind {
    /// Remote embedding service speaking the `/embed` JSON contract
    #[default]
    Http,
    /// In-process tokenizer + ONNX model
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackendKind,
    pub url: String,
    pub passage_prefix: String,
    pub query_prefix: String,
    pub normalize: bool,
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackendKind::Http,
            url: "http://localhost:8100".to_string(),
            passage_prefix: "passage:".to_string(),
            query_prefix: "query:".to_string(),
            normalize: true,
            timeout_seconds: 30,
            retry_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EncoderConfig {
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
    pub model_name: String,
    pub max_length: usize,
    pub intra_op_threads: usize,
    pub inter_op_threads: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/model.onnx"),
            tokenizer_path: PathBuf::from("models/tokenizer"),
            model_name: "multilingual-e5-small".to_string(),
            max_length: DEFAULT_MAX_LENGTH,
            intra_op_threads: 1,
            inter_op_threads: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexConfig {
    pub table: String,
    pub dimension: u32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            table: "recipes".to_string(),
            dimension: DEFAULT_EMBEDDING_DIMENSION,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategy {
    #[default]
    Vector,
    Lexical,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchConfig {
    pub strategy: SearchStrategy,
    pub similar_limit: usize,
    pub search_limit: usize,
    pub trigram_threshold: f32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            strategy: SearchStrategy::Vector,
            similar_limit: 5,
            search_limit: 5,
            trigram_threshold: 0.3,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid role prefix: {0:?} (must be a single line)")]
    InvalidPrefix(String),
    #[error("Invalid timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("Invalid max token length: {0} (must be between 1 and 8192)")]
    InvalidMaxLength(usize),
    #[error("Invalid thread count: {0} (must be between 1 and 256)")]
    InvalidThreadCount(usize),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid table name: {0:?} (must be alphanumeric or '_')")]
    InvalidTable(String),
    #[error("Invalid embedding dimension: {0} (must be between 8 and 8192)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid result limit: {0} (must be between 1 and 100)")]
    InvalidLimit(usize),
    #[error("Invalid trigram threshold: {0} (must be in (0, 1])")]
    InvalidThreshold(f32),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.embedding.validate()?;
        self.encoder.validate()?;
        self.index.validate()?;
        self.search.validate()?;
        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Get the path for the SQLite database
    #[inline]
    pub fn database_path(&self) -> PathBuf {
        self.get_base_dir().join("recipes.db")
    }

    /// Get the path for the vector database directory
    #[inline]
    pub fn vector_database_path(&self) -> PathBuf {
        self.get_base_dir().join("vectors")
    }

    /// Model file, relative paths resolved against the data directory
    #[inline]
    pub fn model_path(&self) -> PathBuf {
        self.resolve(&self.encoder.model_path)
    }

    /// `tokenizer.json`, accepting either the file itself or its directory
    #[inline]
    pub fn tokenizer_file(&self) -> PathBuf {
        let path = self.resolve(&self.encoder.tokenizer_path);
        if path.extension().is_some_and(|ext| ext == "json") {
            path
        } else {
            path.join("tokenizer.json")
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.get_base_dir().join(path)
        }
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.service_url()?;

        for prefix in [&self.passage_prefix, &self.query_prefix] {
            if prefix.contains(['\n', '\r']) {
                return Err(ConfigError::InvalidPrefix(prefix.clone()));
            }
        }

        if !(1..=600).contains(&self.timeout_seconds) {
            return Err(ConfigError::InvalidTimeout(self.timeout_seconds));
        }

        if !(1..=10).contains(&self.retry_attempts) {
            return Err(ConfigError::InvalidRetryAttempts(self.retry_attempts));
        }

        Ok(())
    }

    pub fn service_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.url).map_err(|_| ConfigError::InvalidUrl(self.url.clone()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidProtocol(url.scheme().to_string()));
        }
        Ok(url)
    }
}

impl EncoderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=8192).contains(&self.max_length) {
            return Err(ConfigError::InvalidMaxLength(self.max_length));
        }

        for threads in [self.intra_op_threads, self.inter_op_threads] {
            if !(1..=256).contains(&threads) {
                return Err(ConfigError::InvalidThreadCount(threads));
            }
        }

        if self.model_name.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model_name.clone()));
        }

        Ok(())
    }
}

impl IndexConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.table.is_empty()
            || !self
                .table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ConfigError::InvalidTable(self.table.clone()));
        }

        if !(8..=8192).contains(&self.dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(self.dimension));
        }

        Ok(())
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for limit in [self.similar_limit, self.search_limit] {
            if !(1..=100).contains(&limit) {
                return Err(ConfigError::InvalidLimit(limit));
            }
        }

        if !(self.trigram_threshold > 0.0 && self.trigram_threshold <= 1.0) {
            return Err(ConfigError::InvalidThreshold(self.trigram_threshold));
        }

        Ok(())
    }
}
