use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::RecipeError;
use crate::database::{LexicalMatch, RecipeStore};
use crate::lexical;


pub mod models;
pub mod queries;

pub use models::*;
pub use queries::RecipeQueries;

pub type DbPool = Pool<Sqlite>;

#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    #[inline]
    pub async fn initialize_from_config_dir(config_dir: &Path) -> Result<Self> {
        let db_path = config_dir.join("recipes.db");

        std::fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        Self::new(db_path).await
    }

    #[inline]
    pub async fn count_recipes(&self) -> Result<i64> {
        RecipeQueries::count(&self.pool).await
    }
}

fn as_limit(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[async_trait]
impl RecipeStore for Database {
    async fn create_recipe(&self, recipe: &NewRecipe) -> crate::Result<Recipe> {
        RecipeQueries::create(&self.pool, recipe)
            .await
            .map_err(|e| RecipeError::relational("create_recipe", format!("{:#}", e)))
    }

    async fn get_recipe(&self, id: i64) -> crate::Result<Option<Recipe>> {
        RecipeQueries::get_by_id(&self.pool, id)
            .await
            .map_err(|e| RecipeError::relational("get_recipe", format!("recipe {}: {:#}", id, e)))
    }

    async fn get_recipes(&self, ids: &[i64]) -> crate::Result<Vec<Recipe>> {
        RecipeQueries::get_by_ids(&self.pool, ids)
            .await
            .map_err(|e| {
                RecipeError::relational("get_recipes", format!("ids {:?}: {:#}", ids, e))
            })
    }

    async fn list_recipes(&self, limit: usize, offset: usize) -> crate::Result<Vec<Recipe>> {
        RecipeQueries::list(&self.pool, as_limit(limit), as_limit(offset))
            .await
            .map_err(|e| RecipeError::relational("list_recipes", format!("{:#}", e)))
    }

    async fn search_titles(&self, query: &str, limit: usize) -> crate::Result<Vec<Recipe>> {
        RecipeQueries::search_titles(&self.pool, query, as_limit(limit))
            .await
            .map_err(|e| RecipeError::relational("search_titles", format!("{:#}", e)))
    }

    async fn fuzzy_match(
        &self,
        query: &str,
        limit: usize,
        threshold: f32,
    ) -> crate::Result<Vec<LexicalMatch>> {
        // Full scan: SQLite has no trigram index, so every title is scored in memory.
        // Only the lexical fallback takes this path.
        let candidates = RecipeQueries::list_all(&self.pool)
            .await
            .map_err(|e| RecipeError::relational("fuzzy_match", format!("{:#}", e)))?;

        debug!(
            "Scoring {} title candidates against {:?}",
            candidates.len(),
            query
        );

        Ok(lexical::rank_titles(query, candidates, threshold, limit))
    }

    async fn close(&self) {
        debug!("Closing database pool");
        self.pool.close().await;
    }
}
