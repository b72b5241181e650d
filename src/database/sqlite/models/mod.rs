#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};

use crate::{RecipeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl std::fmt::Display for Difficulty {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BlockType {
    Text,
    Image,
}

impl std::fmt::Display for BlockType {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            BlockType::Text => write!(f, "text"),
            BlockType::Image => write!(f, "image"),
        }
    }
}

/// A stored recipe. `steps` is only populated by single-recipe fetches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Recipe {
    pub id: i64,
    pub title: String,
    pub cover_url: Option<String>,
    /// Nullable in storage; rows written through ingest always carry one
    pub difficulty: Option<Difficulty>,
    pub cooking_time: Option<i64>,
    pub popularity: i64,
    #[sqlx(skip)]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<RecipeStep>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeStep {
    pub id: i64,
    pub step_number: i64,
    pub blocks: Vec<StepBlock>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepBlock {
    pub id: i64,
    pub order: i64,
    #[serde(rename = "type")]
    pub block_type: BlockType,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Ingest payload. An explicit `id` re-ingests (upserts) that recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecipe {
    #[serde(default)]
    pub id: Option<i64>,
    pub title: String,
    #[serde(default)]
    pub cover_url: Option<String>,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub cooking_time: Option<i64>,
    #[serde(default)]
    pub popularity: Option<i64>,
    #[serde(default)]
    pub steps: Vec<NewRecipeStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecipeStep {
    pub step_number: i64,
    #[serde(default)]
    pub blocks: Vec<NewStepBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStepBlock {
    #[serde(rename = "type")]
    pub block_type: BlockType,
    pub value: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl NewRecipe {
    /// Reject payloads the store would accept but the catalog must not contain
    #[inline]
    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(RecipeError::InputValidation(
                "title cannot be empty".to_string(),
            ));
        }

        if let Some(id) = self.id.filter(|id| *id <= 0) {
            return Err(RecipeError::InputValidation(format!(
                "id must be positive, got {}",
                id
            )));
        }

        if let Some(minutes) = self.cooking_time.filter(|minutes| *minutes < 0) {
            return Err(RecipeError::InputValidation(format!(
                "cooking_time must be >= 0, got {}",
                minutes
            )));
        }

        if let Some(popularity) = self.popularity.filter(|popularity| *popularity < 0) {
            return Err(RecipeError::InputValidation(format!(
                "popularity must be >= 0, got {}",
                popularity
            )));
        }

        if let Some(step) = self.steps.iter().find(|step| step.step_number < 1) {
            return Err(RecipeError::InputValidation(format!(
                "step_number must be >= 1, got {}",
                step.step_number
            )));
        }

        Ok(())
    }
}
