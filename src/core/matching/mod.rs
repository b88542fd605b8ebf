//! # Matching Module
//!
//! Ranks registered animals against the embeddings of a query.
//!
//! ## How It Works
//! 1. For every record, score each (query photo, stored photo) pair by cosine similarity
//! 2. Keep the best pair per record, so one strong match dominates
//! 3. Drop records at or below the similarity threshold
//! 4. Sort by similarity (highest first, ties by registration order) and keep the top K
//!
//! The scan is exact and linear in the size of the registry.

mod engine;

pub use engine::{MatchConfig, MatchingEngine};

use crate::core::embedding::NORM_EPSILON;
use crate::core::registry::AnimalId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default minimum similarity a match must exceed
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.7;

/// Default maximum number of matches returned
pub const DEFAULT_TOP_K: usize = 5;

/// A registered animal that matched a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub animal_id: AnimalId,
    /// Best cosine similarity over all photo pairs
    pub similarity: f32,
    pub images: Vec<String>,
    pub registered_at: DateTime<Utc>,
}

/// Cosine similarity of two vectors
///
/// Computed as `dot(a, b) / (|a| * |b| + 1e-7)`. Returns 0.0 for
/// mismatched lengths, empty input or non-finite components.
pub fn similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let score = dot / (norm_a.sqrt() * norm_b.sqrt() + NORM_EPSILON);
    if score.is_finite() {
        score
    } else {
        0.0
    }
}
