// LanceDB vector database module
// One vector per recipe, keyed by the decimal recipe id

#[cfg(test)]
mod tests;

pub mod vector_store;

use serde::{Deserialize, Serialize};

pub use vector_store::VectorStore;

/// Entry written to the index for one recipe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexPoint {
    pub id: i64,
    pub vector: Vec<f32>,
    /// Kept alongside the vector for diagnostics only
    pub title: String,
}

/// Nearest-neighbour hit as stored in the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexHit {
    /// Recipe id in its stored (string) form
    pub id: String,
    /// Cosine similarity, `1 - distance`
    pub score: f32,
    pub distance: f32,
}

impl IndexHit {
    /// The recipe id, if the stored key is a valid integer
    #[inline]
    pub fn recipe_id(&self) -> Option<i64> {
        self.id.trim().parse().ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub rows: usize,
    /// `None` when the table has no fixed-size vector column
    pub dimension: Option<usize>,
}
