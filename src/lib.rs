use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecipeError>;

#[derive(Error, Debug)]
pub enum RecipeError {
    #[error("Invalid input: {0}")]
    InputValidation(String),

    #[error("Encoding backend error: {0}")]
    EncodingBackend(String),

    #[error("Vector index error during {operation}: {message}")]
    Index {
        operation: &'static str,
        message: String,
    },

    #[error("Database error during {operation}: {message}")]
    Relational {
        operation: &'static str,
        message: String,
    },

    #[error("Recipe not found: {0}")]
    NotFound(i64),

    #[error("Ingest error: {0}")]
    Ingest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<config::ConfigError> for RecipeError {
    #[inline]
    fn from(error: config::ConfigError) -> Self {
        Self::Config(error.to_string())
    }
}

impl RecipeError {
    #[inline]
    pub fn index(operation: &'static str, error: impl std::fmt::Display) -> Self {
        Self::Index {
            operation,
            message: error.to_string(),
        }
    }

    #[inline]
    pub fn relational(operation: &'static str, error: impl std::fmt::Display) -> Self {
        Self::Relational {
            operation,
            message: error.to_string(),
        }
    }

    /// Whether the same call may be issued again without side effects
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::EncodingBackend(_) | Self::Index { .. })
    }
}

pub mod canonical;
pub mod commands;
pub mod config;
pub mod database;
pub mod embeddings;
pub mod encoder;
pub mod lexical;
pub mod search;
