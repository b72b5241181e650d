// Retrieval orchestrator
// Ingest writes the relational store then the vector index; retrieval reads
// the index for rank order and the store for every recipe field


use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::canonical;
use crate::config::{Config, EmbeddingConfig, SearchStrategy};
use crate::database::{
    Database, IndexHit, IndexPoint, NewRecipe, Recipe, RecipeStore, VectorIndex, VectorStore,
};
use crate::embeddings::{self, EmbeddingBackend};
use crate::lexical;
use crate::{RecipeError, Result};

/// Message attached to a search that matched nothing
pub const NO_MATCHES_MESSAGE: &str = "No similar recipes found. Try changing your keywords.";

/// Role prefixes and normalization shared by every encode call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingProfile {
    pub passage_prefix: String,
    pub query_prefix: String,
    pub normalize: bool,
}

impl From<&EmbeddingConfig> for EncodingProfile {
    #[inline]
    fn from(config: &EmbeddingConfig) -> Self {
        Self {
            passage_prefix: config.passage_prefix.clone(),
            query_prefix: config.query_prefix.clone(),
            normalize: config.normalize,
        }
    }
}

impl Default for EncodingProfile {
    #[inline]
    fn default() -> Self {
        Self::from(&EmbeddingConfig::default())
    }
}

/// A recipe with its similarity score (3 decimals) and 1-based rank
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRecipe {
    #[serde(flatten)]
    pub recipe: Recipe,
    pub score: f64,
    pub rank: usize,
}

/// Result of a similar-to-id lookup
#[derive(Debug, Clone, PartialEq)]
pub enum SimilarOutcome {
    /// The base recipe does not exist
    NotFound,
    /// The base recipe exists but nothing is similar to it
    Empty,
    Matches(Vec<ScoredRecipe>),
}

impl SimilarOutcome {
    #[inline]
    pub fn results(&self) -> &[ScoredRecipe] {
        match self {
            Self::Matches(results) => results,
            Self::NotFound | Self::Empty => &[],
        }
    }

    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchOutcome {
    pub query: String,
    pub results: Vec<ScoredRecipe>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SearchOutcome {
    fn new(query: String, results: Vec<ScoredRecipe>) -> Self {
        let message = results.is_empty().then(|| NO_MATCHES_MESSAGE.to_string());
        Self {
            query,
            results,
            message,
        }
    }
}

/// Round a raw similarity to 3 decimal places
#[inline]
pub fn round_score(score: f32) -> f64 {
    (f64::from(score) * 1000.0).round() / 1000.0
}

fn require_limit(limit: usize) -> Result<()> {
    if limit == 0 {
        return Err(RecipeError::InputValidation(
            "limit must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Composes the relational store, the vector index and the encoding backend
pub struct RecipeSearch {
    store: Arc<dyn RecipeStore>,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingBackend>,
    profile: EncodingProfile,
    strategy: SearchStrategy,
    trigram_threshold: f32,
}

impl RecipeSearch {
    #[inline]
    pub fn new(
        store: Arc<dyn RecipeStore>,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingBackend>,
        profile: EncodingProfile,
    ) -> Self {
        Self {
            store,
            index,
            embedder,
            profile,
            strategy: SearchStrategy::default(),
            trigram_threshold: lexical::DEFAULT_THRESHOLD,
        }
    }

    #[inline]
    pub fn with_strategy(mut self, strategy: SearchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[inline]
    pub fn with_trigram_threshold(mut self, threshold: f32) -> Self {
        self.trigram_threshold = threshold;
        self
    }

    /// Open both stores and the configured encoding backend
    #[inline]
    pub async fn from_config(config: &Config) -> Result<Self> {
        let database = Database::initialize_from_config_dir(config.get_base_dir())
            .await
            .map_err(|e| RecipeError::relational("open", format!("{:#}", e)))?;
        let vectors = VectorStore::new(config).await?;
        let embedder = embeddings::build_backend(config)?;

        info!(
            "Search ready: backend {}, strategy {:?}",
            embedder.backend_id(),
            config.search.strategy
        );

        Ok(Self::new(
            Arc::new(database),
            Arc::new(vectors),
            embedder,
            EncodingProfile::from(&config.embedding),
        )
        .with_strategy(config.search.strategy)
        .with_trigram_threshold(config.search.trigram_threshold))
    }

    /// Release the relational store's connections; the handle is unusable afterwards
    #[inline]
    pub async fn close(&self) {
        self.store.close().await;
    }

    /// Persist a recipe, then embed its canonical text and upsert it into the index.
    ///
    /// The relational write is committed before encoding; an encoder or index
    /// failure afterwards is returned to the caller, leaving the recipe stored
    /// but not yet indexed.
    #[inline]
    pub async fn ingest(&self, payload: &NewRecipe) -> Result<Recipe> {
        payload.validate()?;

        let recipe = self.store.create_recipe(payload).await?;
        info!("Stored recipe {} ({})", recipe.id, recipe.title);

        let text = canonical::build(&recipe);
        let mut vectors = self
            .embedder
            .encode(
                std::slice::from_ref(&text),
                &self.profile.passage_prefix,
                self.profile.normalize,
            )
            .await?;

        if vectors.len() != 1 || vectors.first().is_none_or(Vec::is_empty) {
            return Err(RecipeError::Ingest(format!(
                "Encoder returned {} vectors for recipe {}",
                vectors.len(),
                recipe.id
            )));
        }
        let vector = vectors.swap_remove(0);

        self.index
            .upsert(IndexPoint {
                id: recipe.id,
                vector,
                title: recipe.title.clone(),
            })
            .await?;
        info!("Indexed recipe {}", recipe.id);

        Ok(recipe)
    }

    #[inline]
    pub async fn get(&self, id: i64) -> Result<Recipe> {
        self.store
            .get_recipe(id)
            .await?
            .ok_or(RecipeError::NotFound(id))
    }

    #[inline]
    pub async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Recipe>> {
        self.store.list_recipes(limit, offset).await
    }

    /// Up to `k` recipes nearest to recipe `id`, never including `id` itself
    #[inline]
    pub async fn similar_to(&self, id: i64, k: usize) -> Result<SimilarOutcome> {
        require_limit(k)?;

        let Some(base) = self.store.get_recipe(id).await? else {
            return Ok(SimilarOutcome::NotFound);
        };

        let text = canonical::build(&base);
        if text.trim().is_empty() {
            debug!("Recipe {} has no canonical text, skipping encode", id);
            return Ok(SimilarOutcome::Empty);
        }

        let vector = self.encode_query(text).await?;
        let hits = self.index.query(&vector, k, &[id]).await?;
        let results = self.reconcile(hits, Some(id)).await?;

        if results.is_empty() {
            Ok(SimilarOutcome::Empty)
        } else {
            Ok(SimilarOutcome::Matches(results))
        }
    }

    /// Free-text search through the configured strategy
    #[inline]
    pub async fn search_by_text(&self, query: &str, limit: usize) -> Result<SearchOutcome> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RecipeError::InputValidation(
                "query cannot be empty".to_string(),
            ));
        }
        require_limit(limit)?;

        let results = match self.strategy {
            SearchStrategy::Vector => {
                let vector = self.encode_query(query.to_string()).await?;
                let hits = self.index.query(&vector, limit, &[]).await?;
                self.reconcile(hits, None).await?
            }
            SearchStrategy::Lexical => {
                let matches = self
                    .store
                    .fuzzy_match(&query.to_lowercase(), limit, self.trigram_threshold)
                    .await?;
                matches
                    .into_iter()
                    .zip(1..)
                    .map(|(found, rank)| ScoredRecipe {
                        recipe: found.recipe,
                        score: round_score(found.score),
                        rank,
                    })
                    .collect()
            }
        };

        debug!("Search {:?} returned {} results", query, results.len());
        Ok(SearchOutcome::new(query.to_string(), results))
    }

    async fn encode_query(&self, text: String) -> Result<Vec<f32>> {
        let mut vectors = self
            .embedder
            .encode(
                std::slice::from_ref(&text),
                &self.profile.query_prefix,
                self.profile.normalize,
            )
            .await?;

        if vectors.len() != 1 || vectors.first().is_none_or(Vec::is_empty) {
            return Err(RecipeError::EncodingBackend(format!(
                "Expected one query vector, got {}",
                vectors.len()
            )));
        }

        Ok(vectors.swap_remove(0))
    }

    /// Hydrate index hits from the store, keeping the index order as rank order
    async fn reconcile(
        &self,
        hits: Vec<IndexHit>,
        exclude: Option<i64>,
    ) -> Result<Vec<ScoredRecipe>> {
        let mut order: Vec<i64> = Vec::with_capacity(hits.len());
        let mut scores: HashMap<i64, f32> = HashMap::with_capacity(hits.len());

        for hit in hits {
            let Some(id) = hit.recipe_id() else {
                warn!("Dropping index hit with non-integer id {:?}", hit.id);
                continue;
            };
            if exclude == Some(id) || scores.contains_key(&id) {
                continue;
            }
            scores.insert(id, hit.score);
            order.push(id);
        }

        if order.is_empty() {
            return Ok(Vec::new());
        }

        let mut fetched: HashMap<i64, Recipe> = self
            .store
            .get_recipes(&order)
            .await?
            .into_iter()
            .map(|recipe| (recipe.id, recipe))
            .collect();

        let mut results = Vec::with_capacity(order.len());
        for id in order {
            let Some(recipe) = fetched.remove(&id) else {
                warn!("Recipe {} is indexed but missing from the store", id);
                continue;
            };
            let score = scores.get(&id).copied().unwrap_or_default();
            results.push(ScoredRecipe {
                recipe,
                score: round_score(score),
                rank: results.len() + 1,
            });
        }

        Ok(results)
    }
}
