// Canonical text for a stored recipe
// The same string is derived at ingest time and when searching for similar recipes


use itertools::Itertools;

use crate::database::{BlockType, Recipe, RecipeStep};

/// Separator placed between canonical segments
pub const SEGMENT_SEPARATOR: &str = " | ";

/// Build the descriptive text embedded for `recipe`.
///
/// Segments, in order: title, cover, difficulty, cooking time, then one
/// `step <n>: ...` segment per step that has text blocks. Steps follow their
/// step number (stable for duplicates) and blocks follow their order. Image
/// blocks and absent fields contribute nothing. Title, cover and block values
/// are trimmed at both ends; inner whitespace is kept as stored.
#[inline]
pub fn build(recipe: &Recipe) -> String {
    let mut parts: Vec<String> = Vec::new();

    let title = recipe.title.trim();
    if !title.is_empty() {
        parts.push(title.to_string());
    }

    if let Some(cover) = recipe
        .cover_url
        .as_deref()
        .map(str::trim)
        .filter(|cover| !cover.is_empty())
    {
        parts.push(format!("image: {}", cover));
    }

    if let Some(difficulty) = recipe.difficulty {
        parts.push(format!("difficulty: {}", difficulty));
    }

    if let Some(minutes) = recipe.cooking_time {
        parts.push(format!("cooking_time: {} minutes", minutes));
    }

    parts.extend(
        recipe
            .steps
            .iter()
            .sorted_by_key(|step| step.step_number)
            .filter_map(step_segment),
    );

    parts.join(SEGMENT_SEPARATOR)
}

fn step_segment(step: &RecipeStep) -> Option<String> {
    let joined = step
        .blocks
        .iter()
        .filter(|block| block.block_type == BlockType::Text)
        .sorted_by_key(|block| block.order)
        .map(|block| block.value.trim())
        .filter(|value| !value.is_empty())
        .join(" ");

    if joined.is_empty() {
        None
    } else {
        Some(format!("step {}: {}", step.step_number, joined))
    }
}
