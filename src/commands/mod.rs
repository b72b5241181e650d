// CLI command implementations
// Each command loads its own stores; output goes to stdout as JSON, status to stderr

#[cfg(test)]
mod tests;

use anyhow::{Context, Result, bail};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

use crate::config::{Config, EmbeddingBackendKind};
use crate::database::{Database, NewRecipe, RecipeStore, VectorIndex, VectorStore};
use crate::embeddings::{self, EmbedRequest, EmbedResponse, HttpEmbeddingClient};
use crate::search::{RecipeSearch, SimilarOutcome};

/// Result of ingesting a batch of recipe payloads
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub ingested: Vec<i64>,
    pub failed: Vec<IngestFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestFailure {
    /// Zero-based position of the payload in the input file
    pub position: usize,
    pub title: String,
    pub error: String,
}

/// Which role prefix a CLI `embed` call applies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedRole {
    Passage,
    Query,
    /// No role prefix at all
    Raw,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", rendered);
    Ok(())
}

/// Load `config.toml` from the resolved data directory
#[inline]
pub fn load_config(data_dir: &Path) -> Result<Config> {
    Config::load(data_dir)
        .with_context(|| format!("Failed to load configuration from {}", data_dir.display()))
}

async fn open_database(config: &Config) -> Result<Database> {
    Database::initialize_from_config_dir(config.get_base_dir())
        .await
        .context("Failed to initialize database")
}

/// Parse an ingest file holding either one recipe object or an array of them
#[inline]
pub fn parse_recipes(content: &str) -> Result<Vec<NewRecipe>> {
    let value: serde_json::Value =
        serde_json::from_str(content).context("Ingest file is not valid JSON")?;

    match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(position, item)| {
                serde_json::from_value(item)
                    .with_context(|| format!("Recipe at position {} is malformed", position))
            })
            .collect(),
        serde_json::Value::Object(_) => {
            let recipe = serde_json::from_value(value).context("Recipe payload is malformed")?;
            Ok(vec![recipe])
        }
        _ => bail!("Ingest file must contain a recipe object or an array of recipes"),
    }
}

/// Ingest every payload, continuing past individual failures
#[inline]
pub async fn ingest_recipes(search: &RecipeSearch, recipes: &[NewRecipe]) -> IngestSummary {
    let bar = if console::user_attended_stderr() {
        let bar = ProgressBar::new(recipes.len() as u64);
        match ProgressStyle::with_template("{bar:40} [{pos}/{len}] Ingesting {msg}") {
            Ok(bar_style) => bar.with_style(bar_style),
            Err(_) => bar,
        }
    } else {
        ProgressBar::hidden()
    };

    let mut summary = IngestSummary::default();

    for (position, payload) in recipes.iter().enumerate() {
        bar.set_message(payload.title.clone());

        match search.ingest(payload).await {
            Ok(recipe) => summary.ingested.push(recipe.id),
            Err(e) => {
                warn!("Failed to ingest {:?}: {}", payload.title, e);
                summary.failed.push(IngestFailure {
                    position,
                    title: payload.title.clone(),
                    error: e.to_string(),
                });
            }
        }

        bar.inc(1);
    }

    bar.finish_and_clear();
    summary
}

/// `ingest <file>`
#[inline]
pub async fn ingest_file(config: &Config, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let recipes = parse_recipes(&content)?;
    info!("Ingesting {} recipes from {}", recipes.len(), path.display());

    let search = RecipeSearch::from_config(config).await?;
    let summary = ingest_recipes(&search, &recipes).await;
    search.close().await;

    if !summary.ingested.is_empty() {
        // Each upsert leaves a small fragment behind; compact once per batch
        VectorStore::new(config).await?.optimize().await?;
    }

    eprintln!(
        "{} {} ingested, {} failed",
        style("Ingest:").bold(),
        style(summary.ingested.len()).green(),
        style(summary.failed.len()).red()
    );
    print_json(&summary)?;

    if !summary.failed.is_empty() {
        bail!("{} of {} recipes failed", summary.failed.len(), recipes.len());
    }
    Ok(())
}

/// `show <id>`
#[inline]
pub async fn show_recipe(config: &Config, id: i64) -> Result<()> {
    let database = open_database(config).await?;
    let recipe = database.get_recipe(id).await;
    database.close().await;

    let Some(recipe) = recipe? else {
        bail!("Recipe {} not found", id);
    };
    print_json(&recipe)
}

/// `list [--limit] [--offset]`
#[inline]
pub async fn list_recipes(config: &Config, limit: usize, offset: usize) -> Result<()> {
    let database = open_database(config).await?;
    let recipes = database.list_recipes(limit, offset).await;
    database.close().await;
    let recipes = recipes?;

    if recipes.is_empty() {
        eprintln!("{}", style("No recipes stored yet.").yellow());
    }
    print_json(&recipes)
}

#[derive(Serialize)]
struct SimilarOutput<'a> {
    recipe_id: i64,
    results: &'a [crate::search::ScoredRecipe],
}

/// `similar <id>`
#[inline]
pub async fn similar_recipes(config: &Config, id: i64, limit: usize) -> Result<()> {
    let search = RecipeSearch::from_config(config).await?;
    let outcome = search.similar_to(id, limit).await;
    search.close().await;
    let outcome = outcome?;

    match &outcome {
        SimilarOutcome::NotFound => bail!("Recipe {} not found", id),
        SimilarOutcome::Empty => {
            eprintln!("{}", style("No similar recipes found.").yellow());
        }
        SimilarOutcome::Matches(_) => {}
    }

    print_json(&SimilarOutput {
        recipe_id: id,
        results: outcome.results(),
    })
}

/// `search <text>`; `titles` switches to plain title containment
#[inline]
pub async fn search_recipes(config: &Config, text: &str, limit: usize, titles: bool) -> Result<()> {
    if titles {
        let database = open_database(config).await?;
        let recipes = database.search_titles(text.trim(), limit).await;
        database.close().await;
        return print_json(&recipes?);
    }

    let search = RecipeSearch::from_config(config).await?;
    let outcome = search.search_by_text(text, limit).await;
    search.close().await;
    let outcome = outcome?;

    if let Some(message) = &outcome.message {
        eprintln!("{}", style(message).yellow());
    }
    print_json(&outcome)
}

/// Build the `/embed` request for positional texts
#[inline]
pub fn embed_request_for(config: &Config, texts: Vec<String>, role: EmbedRole) -> EmbedRequest {
    let prefix = match role {
        EmbedRole::Passage => config.embedding.passage_prefix.clone(),
        EmbedRole::Query => config.embedding.query_prefix.clone(),
        EmbedRole::Raw => String::new(),
    };

    EmbedRequest {
        texts,
        prefix: Some(prefix),
        normalize: Some(config.embedding.normalize),
    }
}

/// `embed`: encode texts with the configured backend and print the `/embed` reply
#[inline]
pub async fn embed_texts(config: &Config, request: EmbedRequest) -> Result<()> {
    let backend = embeddings::build_backend(config)?;
    let prefix = request.prefix.unwrap_or_default();
    let normalize = request.normalize.unwrap_or(config.embedding.normalize);

    match backend.encode(&request.texts, &prefix, normalize).await {
        Ok(vectors) => print_json(&EmbedResponse::success(
            backend.backend_id(),
            normalize,
            vectors,
        )),
        Err(e) => {
            print_json(&EmbedResponse::Failure {
                detail: serde_json::Value::String(e.to_string()),
            })?;
            Err(e.into())
        }
    }
}

/// `health`: encoding backend, relational store and vector index status
#[inline]
pub async fn show_health(config: &Config) -> Result<()> {
    println!("{}", style("Recipe Search Status").bold().cyan());
    println!();

    println!("{}", style("Encoding Backend:").bold().yellow());
    match embeddings::build_backend(config) {
        Ok(backend) => {
            println!("  Backend: {}", style(backend.backend_id()).cyan());
            println!("  Max input length: {}", style(backend.max_input_length()).cyan());
        }
        Err(e) => println!("  {} {}", style("Unavailable:").red(), e),
    }

    if config.embedding.backend == EmbeddingBackendKind::Http {
        let client = HttpEmbeddingClient::new(&config.embedding, config.encoder.max_length)?;
        let health = tokio::task::spawn_blocking(move || client.health_check())
            .await
            .context("Health check task failed")?;
        match health {
            Ok(health) => {
                println!("  Service status: {}", style("up").green());
                if let Some(tokenizer) = &health.tokenizer_name {
                    println!("  Service tokenizer: {}", style(tokenizer).cyan());
                }
                if let Some(model_path) = &health.model_path {
                    println!("  Service model: {}", style(model_path).cyan());
                }
                if let Some(prefix) = &health.prefix {
                    println!("  Service default prefix: {:?}", prefix);
                }
                if let Some(max_length) = health.max_length {
                    println!("  Service max length: {}", style(max_length).cyan());
                }
            }
            Err(e) => println!("  {} {}", style("Service unreachable:").red(), e),
        }
    }

    println!();
    println!("{}", style("Relational Store:").bold().yellow());
    match open_database(config).await {
        Ok(database) => {
            match database.count_recipes().await {
                Ok(count) => println!("  Recipes: {}", style(count).cyan()),
                Err(e) => println!("  {} {}", style("Count failed:").red(), e),
            }
            database.close().await;
        }
        Err(e) => println!("  {} {:#}", style("Unavailable:").red(), e),
    }

    println!();
    println!("{}", style("Vector Index:").bold().yellow());
    match VectorStore::new(config).await {
        Ok(store) => match store.list_collections().await {
            Ok(collections) => {
                for collection in collections {
                    let dimension = collection
                        .dimension
                        .map_or_else(|| "unknown".to_string(), |d| d.to_string());
                    println!(
                        "  {}: {} rows, dimension {}",
                        style(&collection.name).cyan(),
                        collection.rows,
                        dimension
                    );
                }
            }
            Err(e) => println!("  {} {}", style("Listing failed:").red(), e),
        },
        Err(e) => println!("  {} {}", style("Unavailable:").red(), e),
    }

    Ok(())
}

/// `config --show`
#[inline]
pub fn show_config(config: &Config) -> Result<()> {
    eprintln!("{}", style("Current Configuration").bold().cyan());
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    let rendered = toml::to_string_pretty(config).context("Failed to render configuration")?;
    println!("{}", rendered);
    Ok(())
}

/// `config --init`: write defaults unless a config file already exists
#[inline]
pub fn init_config(data_dir: &Path) -> Result<()> {
    let config = Config {
        base_dir: data_dir.to_path_buf(),
        ..Config::default()
    };
    let path = config.config_file_path();

    if path.exists() {
        eprintln!(
            "{} {}",
            style("Configuration already exists:").yellow(),
            style(path.display()).cyan()
        );
        return Ok(());
    }

    config.save().context("Failed to save configuration")?;
    eprintln!(
        "{} {}",
        style("✓ Configuration written to").green(),
        style(path.display()).cyan()
    );
    Ok(())
}
