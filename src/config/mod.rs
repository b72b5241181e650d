// Configuration management module
// TOML settings for the encoding backend, vector index and search strategy

pub mod settings;


pub use settings::{
    Config, ConfigError, EmbeddingBackendKind, EmbeddingConfig, EncoderConfig, IndexConfig,
    SearchConfig, SearchStrategy,
};

/// Environment variable overriding the data directory
pub const HOME_ENV_VAR: &str = "RECIPE_SEARCH_HOME";

/// Resolve the data directory: explicit override, then `RECIPE_SEARCH_HOME`, then `~/.recipe-search`
#[inline]
pub fn resolve_data_dir(
    explicit: Option<&std::path::Path>,
) -> Result<std::path::PathBuf, ConfigError> {
    if let Some(dir) = explicit {
        return Ok(dir.to_path_buf());
    }

    if let Some(dir) = std::env::var_os(HOME_ENV_VAR).filter(|value| !value.is_empty()) {
        return Ok(std::path::PathBuf::from(dir));
    }

    dirs::home_dir()
        .map(|home| home.join(".recipe-search"))
        .or({
            #[cfg(windows)]
            {
                dirs::data_dir().map(|data| data.join("recipe-search"))
            }
            #[cfg(not(windows))]
            {
                None
            }
        })
        .ok_or(ConfigError::DirectoryError)
}
