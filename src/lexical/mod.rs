// Trigram title matching used by the lexical search strategy
// Scores follow pg_trgm: padded word trigrams, shared / union


use std::cmp::Ordering;
use std::collections::HashSet;

use crate::database::{LexicalMatch, Recipe};

/// Default minimum similarity for a title to count as a match
pub const DEFAULT_THRESHOLD: f32 = 0.3;

/// Distinct trigrams of `text`.
///
/// Text is lowercased and split into runs of alphanumeric characters; each
/// word is padded with two leading spaces and one trailing space.
#[inline]
pub fn trigrams(text: &str) -> HashSet<String> {
    let lowered = text.to_lowercase();
    let mut grams = HashSet::new();

    for word in lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
    {
        let padded: Vec<char> = format!("  {} ", word).chars().collect();
        for window in padded.windows(3) {
            grams.insert(window.iter().collect());
        }
    }

    grams
}

/// Similarity in `[0, 1]`; zero when either side has no trigrams
#[inline]
pub fn similarity(a: &str, b: &str) -> f32 {
    title_score(&trigrams(a), b)
}

/// Score every candidate title against `query` and keep the matches.
///
/// A title matches when its similarity reaches `threshold` or it contains the
/// query as a case-insensitive substring. Matches are ordered by score, then
/// popularity, then id.
#[inline]
pub fn rank_titles(
    query: &str,
    candidates: Vec<Recipe>,
    threshold: f32,
    limit: usize,
) -> Vec<LexicalMatch> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() || limit == 0 {
        return Vec::new();
    }

    let query_grams = trigrams(&needle);

    let mut matches: Vec<LexicalMatch> = candidates
        .into_iter()
        .filter_map(|recipe| {
            let score = title_score(&query_grams, &recipe.title);
            let contains = recipe.title.to_lowercase().contains(&needle);
            (score >= threshold || contains).then_some(LexicalMatch { recipe, score })
        })
        .collect();

    matches.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.recipe.popularity.cmp(&a.recipe.popularity))
            .then_with(|| a.recipe.id.cmp(&b.recipe.id))
    });
    matches.truncate(limit);

    matches
}

fn title_score(query_grams: &HashSet<String>, title: &str) -> f32 {
    let title_grams = trigrams(title);
    if query_grams.is_empty() || title_grams.is_empty() {
        return 0.0;
    }

    let shared = query_grams.intersection(&title_grams).count();
    shared as f32 / (query_grams.len() + title_grams.len() - shared) as f32
}
