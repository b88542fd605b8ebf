//! # Embedding Module
//!
//! Maps enhanced photos to fixed-length feature vectors.
//!
//! ## Providers
//! - `ColorLayoutEmbedder` - Bundled deterministic descriptor (colour layout + edge orientation)
//! - `SharedExtractor` - Loads a provider once per process and fails fast if loading failed
//!
//! Any other model can be plugged in by implementing [`EmbeddingProvider`].
//! The only contract is that returned vectors have unit L2 norm and a
//! fixed dimension.

mod layout;
mod resize;
mod shared;

pub use layout::ColorLayoutEmbedder;
pub use resize::FastResizer;
pub use shared::{default_extractor, SharedExtractor};

use crate::error::EmbeddingError;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

/// Added to norms before dividing so degenerate vectors never divide by zero
pub const NORM_EPSILON: f32 = 1e-7;

/// Tolerance used when checking that a vector is unit length
pub const UNIT_NORM_TOLERANCE: f32 = 1e-3;

/// Trait for feature extractors
pub trait EmbeddingProvider: Send + Sync {
    /// Compute a unit-norm embedding for an image
    fn embed(&self, image: &DynamicImage) -> Result<Embedding, EmbeddingError>;

    /// Number of components in every embedding this provider returns
    fn dimension(&self) -> usize;

    /// Human-readable provider name for logs
    fn name(&self) -> &str;
}

impl<T: EmbeddingProvider + ?Sized> EmbeddingProvider for &T {
    fn embed(&self, image: &DynamicImage) -> Result<Embedding, EmbeddingError> {
        (**self).embed(image)
    }

    fn dimension(&self) -> usize {
        (**self).dimension()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// A feature vector produced by an [`EmbeddingProvider`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// Wrap raw components as-is
    pub fn from_raw(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// Scale raw components to unit length (`v / (|v| + eps)`)
    pub fn normalized(values: Vec<f32>) -> Self {
        let norm = l2_norm(&values);
        Self(values.into_iter().map(|v| v / (norm + NORM_EPSILON)).collect())
    }

    /// Components of this embedding
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// L2 norm of this embedding
    pub fn norm(&self) -> f32 {
        l2_norm(&self.0)
    }

    /// Check that this embedding can be stored or matched
    ///
    /// Rejects wrong dimensions, non-finite components and vectors
    /// that are not unit length.
    pub fn validate(&self, dimension: usize) -> Result<(), String> {
        if self.0.len() != dimension {
            return Err(format!(
                "expected {} components, got {}",
                dimension,
                self.0.len()
            ));
        }
        if self.0.iter().any(|v| !v.is_finite()) {
            return Err("embedding contains non-finite values".to_string());
        }
        let norm = self.norm();
        if (norm - 1.0).abs() > UNIT_NORM_TOLERANCE {
            return Err(format!("embedding norm is {:.4}, expected 1.0", norm));
        }
        Ok(())
    }

    /// Encode as little-endian f32 bytes
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.0.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    /// Decode from little-endian f32 bytes
    pub fn from_le_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() % 4 != 0 {
            return None;
        }
        let values = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Some(Self(values))
    }
}

impl From<Embedding> for Vec<f32> {
    fn from(embedding: Embedding) -> Self {
        embedding.0
    }
}

fn l2_norm(values: &[f32]) -> f32 {
    values.iter().map(|v| v * v).sum::<f32>().sqrt()
}
