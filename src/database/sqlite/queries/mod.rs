#[cfg(test)]
mod tests;

use super::models::*;
use anyhow::{Context, Result};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

const RECIPE_COLUMNS: &str = "id, title, cover_url, difficulty, cooking_time, popularity";

#[derive(Debug, FromRow)]
struct StepBlockRow {
    step_id: i64,
    step_number: i64,
    block_id: Option<i64>,
    block_order: Option<i64>,
    block_type: Option<BlockType>,
    value: Option<String>,
    metadata: Option<String>,
}

pub struct RecipeQueries;

impl RecipeQueries {
    /// Write a recipe with its steps and blocks in one transaction.
    ///
    /// With an explicit id the row is updated in place and its previous steps
    /// (and, by cascade, their blocks) are replaced. Any failure rolls back
    /// every statement, including the recipe row itself.
    #[inline]
    pub async fn create(pool: &SqlitePool, new_recipe: &NewRecipe) -> Result<Recipe> {
        let mut transaction = pool
            .begin()
            .await
            .context("Failed to begin transaction for recipe insert")?;

        let popularity = new_recipe.popularity.unwrap_or(0);

        let recipe_id = match new_recipe.id {
            Some(id) => {
                let id = sqlx::query_scalar::<_, i64>(
                    r#"
                    INSERT INTO recipes (id, title, cover_url, difficulty, cooking_time, popularity)
                    VALUES (?, ?, ?, ?, ?, ?)
                    ON CONFLICT(id) DO UPDATE SET
                        title = excluded.title,
                        cover_url = excluded.cover_url,
                        difficulty = excluded.difficulty,
                        cooking_time = excluded.cooking_time,
                        popularity = excluded.popularity
                    RETURNING id
                    "#,
                )
                .bind(id)
                .bind(&new_recipe.title)
                .bind(&new_recipe.cover_url)
                .bind(new_recipe.difficulty)
                .bind(new_recipe.cooking_time)
                .bind(popularity)
                .fetch_one(&mut *transaction)
                .await
                .context("Failed to upsert recipe")?;

                sqlx::query("DELETE FROM recipe_steps WHERE recipe_id = ?")
                    .bind(id)
                    .execute(&mut *transaction)
                    .await
                    .context("Failed to clear previous recipe steps")?;

                id
            }
            None => sqlx::query_scalar::<_, i64>(
                r#"
                INSERT INTO recipes (title, cover_url, difficulty, cooking_time, popularity)
                VALUES (?, ?, ?, ?, ?)
                RETURNING id
                "#,
            )
            .bind(&new_recipe.title)
            .bind(&new_recipe.cover_url)
            .bind(new_recipe.difficulty)
            .bind(new_recipe.cooking_time)
            .bind(popularity)
            .fetch_one(&mut *transaction)
            .await
            .context("Failed to insert recipe")?,
        };

        for step in &new_recipe.steps {
            let step_id = sqlx::query_scalar::<_, i64>(
                "INSERT INTO recipe_steps (recipe_id, step_number) VALUES (?, ?) RETURNING id",
            )
            .bind(recipe_id)
            .bind(step.step_number)
            .fetch_one(&mut *transaction)
            .await
            .with_context(|| {
                format!(
                    "Failed to insert step {} for recipe {}",
                    step.step_number, recipe_id
                )
            })?;

            for (order, block) in (1_i64..).zip(&step.blocks) {
                let metadata = block
                    .metadata
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()
                    .context("Failed to serialize block metadata")?;

                sqlx::query(
                    r#"
                    INSERT INTO recipe_step_blocks (step_id, block_order, block_type, value, metadata)
                    VALUES (?, ?, ?, ?, ?)
                    "#,
                )
                .bind(step_id)
                .bind(order)
                .bind(block.block_type)
                .bind(&block.value)
                .bind(metadata)
                .execute(&mut *transaction)
                .await
                .with_context(|| {
                    format!(
                        "Failed to insert block {} of step {} for recipe {}",
                        order, step.step_number, recipe_id
                    )
                })?;
            }
        }

        transaction
            .commit()
            .await
            .context("Failed to commit recipe insert transaction")?;

        debug!(
            "Stored recipe {} with {} steps",
            recipe_id,
            new_recipe.steps.len()
        );

        Self::get_by_id(pool, recipe_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created recipe {}", recipe_id))
    }

    /// Recipe row plus its steps and blocks in step/block order
    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Recipe>> {
        let Some(mut recipe) = Self::get_summary(pool, id).await? else {
            return Ok(None);
        };

        recipe.steps = Self::get_steps(pool, id).await?;
        Ok(Some(recipe))
    }

    #[inline]
    pub async fn get_summary(pool: &SqlitePool, id: i64) -> Result<Option<Recipe>> {
        let recipe = sqlx::query_as::<_, Recipe>(&format!(
            "SELECT {} FROM recipes WHERE id = ?",
            RECIPE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get recipe by id")?;

        Ok(recipe)
    }

    /// Steps ordered by step number, ties by insertion order; blocks by their order
    #[inline]
    pub async fn get_steps(pool: &SqlitePool, recipe_id: i64) -> Result<Vec<RecipeStep>> {
        let rows = sqlx::query_as::<_, StepBlockRow>(
            r#"
            SELECT rs.id AS step_id,
                   rs.step_number,
                   rsb.id AS block_id,
                   rsb.block_order,
                   rsb.block_type,
                   rsb.value,
                   rsb.metadata
            FROM recipe_steps rs
            LEFT JOIN recipe_step_blocks rsb ON rsb.step_id = rs.id
            WHERE rs.recipe_id = ?
            ORDER BY rs.step_number, rs.id, rsb.block_order, rsb.id
            "#,
        )
        .bind(recipe_id)
        .fetch_all(pool)
        .await
        .context("Failed to get recipe steps")?;

        let mut steps: Vec<RecipeStep> = Vec::new();
        for row in rows {
            if steps.last().is_none_or(|step| step.id != row.step_id) {
                steps.push(RecipeStep {
                    id: row.step_id,
                    step_number: row.step_number,
                    blocks: Vec::new(),
                });
            }

            let (Some(block_id), Some(order), Some(block_type), Some(value)) =
                (row.block_id, row.block_order, row.block_type, row.value)
            else {
                continue;
            };

            let metadata = row
                .metadata
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .with_context(|| format!("Invalid metadata JSON on block {}", block_id))?;

            if let Some(step) = steps.last_mut() {
                step.blocks.push(StepBlock {
                    id: block_id,
                    order,
                    block_type,
                    value,
                    metadata,
                });
            }
        }

        Ok(steps)
    }

    /// Bulk fetch in a single round trip. Result order is unspecified.
    #[inline]
    pub async fn get_by_ids(pool: &SqlitePool, ids: &[i64]) -> Result<Vec<Recipe>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM recipes WHERE id IN (", RECIPE_COLUMNS));
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let recipes = builder
            .build_query_as::<Recipe>()
            .fetch_all(pool)
            .await
            .context("Failed to get recipes by ids")?;

        Ok(recipes)
    }

    #[inline]
    pub async fn list(pool: &SqlitePool, limit: i64, offset: i64) -> Result<Vec<Recipe>> {
        let recipes = sqlx::query_as::<_, Recipe>(&format!(
            "SELECT {} FROM recipes ORDER BY popularity DESC, id LIMIT ? OFFSET ?",
            RECIPE_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .context("Failed to list recipes")?;

        Ok(recipes)
    }

    /// Case-insensitive title containment, most popular first
    #[inline]
    pub async fn search_titles(pool: &SqlitePool, query: &str, limit: i64) -> Result<Vec<Recipe>> {
        let recipes = sqlx::query_as::<_, Recipe>(&format!(
            r#"
            SELECT {} FROM recipes
            WHERE instr(lower(title), lower(?)) > 0
            ORDER BY popularity DESC, id
            LIMIT ?
            "#,
            RECIPE_COLUMNS
        ))
        .bind(query)
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to search recipe titles")?;

        Ok(recipes)
    }

    /// Every recipe row, as candidates for in-process lexical scoring
    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Recipe>> {
        let recipes = sqlx::query_as::<_, Recipe>(&format!(
            "SELECT {} FROM recipes ORDER BY id",
            RECIPE_COLUMNS
        ))
        .fetch_all(pool)
        .await
        .context("Failed to list all recipes")?;

        Ok(recipes)
    }

    #[inline]
    pub async fn count(pool: &SqlitePool) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM recipes")
            .fetch_one(pool)
            .await
            .context("Failed to count recipes")?;

        Ok(count)
    }
}
