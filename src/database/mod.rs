// Database module
// Dual store: SQLite holds recipes, LanceDB holds one vector per recipe id

pub mod lancedb;
pub mod sqlite;

use async_trait::async_trait;

use crate::Result;

pub use self::lancedb::{CollectionInfo, IndexHit, IndexPoint, VectorStore};
pub use sqlite::*;

/// A recipe matched by the lexical fallback, score not yet rounded
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalMatch {
    pub recipe: Recipe,
    pub score: f32,
}

/// Relational side of the catalog: source of truth for every recipe field
#[async_trait]
pub trait RecipeStore: Send + Sync {
    /// Persist a recipe with its steps and blocks atomically, returning the stored form
    async fn create_recipe(&self, recipe: &NewRecipe) -> Result<Recipe>;

    /// Recipe with ordered steps and blocks
    async fn get_recipe(&self, id: i64) -> Result<Option<Recipe>>;

    /// Single round trip; no ordering guarantee, missing ids are simply absent
    async fn get_recipes(&self, ids: &[i64]) -> Result<Vec<Recipe>>;

    async fn list_recipes(&self, limit: usize, offset: usize) -> Result<Vec<Recipe>>;

    async fn search_titles(&self, query: &str, limit: usize) -> Result<Vec<Recipe>>;

    /// Trigram similarity or substring containment against titles
    async fn fuzzy_match(
        &self,
        query: &str,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<LexicalMatch>>;

    /// Release held connections at shutdown
    async fn close(&self) {}
}

/// Nearest-neighbour side of the catalog, keyed by recipe id
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace the entry for `point.id`
    async fn upsert(&self, point: IndexPoint) -> Result<()>;

    /// Up to `k` hits by descending similarity, never containing an `exclude` id
    async fn query(&self, vector: &[f32], k: usize, exclude: &[i64]) -> Result<Vec<IndexHit>>;

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>>;
}
