//! Ranking of registry records against query embeddings.

use super::{similarity, Match, DEFAULT_SIMILARITY_THRESHOLD, DEFAULT_TOP_K};
use crate::core::embedding::Embedding;
use crate::core::registry::AnimalRecord;
use crate::error::AnimalMatcherError;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Matching parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Similarity a record must strictly exceed to be returned
    pub similarity_threshold: f32,
    /// Maximum number of matches returned
    pub top_k: usize,
}

impl MatchConfig {
    /// Create a validated configuration
    pub fn new(similarity_threshold: f32, top_k: usize) -> Result<Self, AnimalMatcherError> {
        let config = Self {
            similarity_threshold,
            top_k,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that the threshold is within [-1, 1] and top_k is at least 1
    pub fn validate(&self) -> Result<(), AnimalMatcherError> {
        let threshold = self.similarity_threshold;
        if !threshold.is_finite() || !(-1.0..=1.0).contains(&threshold) {
            return Err(AnimalMatcherError::Config(format!(
                "Invalid similarity threshold: {} (must be between -1 and 1)",
                self.similarity_threshold
            )));
        }
        if self.top_k == 0 {
            return Err(AnimalMatcherError::Config(
                "Invalid top_k: 0 (must be at least 1)".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            top_k: DEFAULT_TOP_K,
        }
    }
}

/// Exact linear-scan matcher
#[derive(Debug, Clone, Default)]
pub struct MatchingEngine {
    config: MatchConfig,
}

impl MatchingEngine {
    pub fn new(config: MatchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Best similarity between any query embedding and any stored embedding
    ///
    /// Returns `None` when either side has no embeddings.
    pub fn best_similarity(&self, queries: &[Embedding], record: &AnimalRecord) -> Option<f32> {
        queries
            .iter()
            .flat_map(|q| {
                record
                    .embeddings()
                    .iter()
                    .map(move |stored| similarity(q.as_slice(), stored.as_slice()))
            })
            .reduce(f32::max)
    }

    /// Rank records against the query, best first
    ///
    /// Only records whose best similarity is strictly above the threshold
    /// are kept. Equal scores are ordered by animal id. At most `top_k`
    /// matches are returned.
    pub fn rank(&self, queries: &[Embedding], records: &[AnimalRecord]) -> Vec<Match> {
        let threshold = self.config.similarity_threshold;

        let mut matches: Vec<Match> = records
            .par_iter()
            .filter_map(|record| {
                let best = self.best_similarity(queries, record)?;
                (best > threshold).then(|| Match {
                    animal_id: record.id(),
                    similarity: best,
                    images: record.images().to_vec(),
                    registered_at: record.registered_at(),
                })
            })
            .collect();

        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.animal_id.cmp(&b.animal_id))
        });
        matches.truncate(self.config.top_k);
        matches
    }
}
