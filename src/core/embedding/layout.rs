//! Colour layout descriptor.
//!
//! The bundled extractor works by:
//! 1. Resizing the image to a 16x16 RGB grid and centring each cell around mid-grey
//! 2. Resizing to 64x64 grayscale and histogramming gradient orientations
//!    (16 bins, weighted by gradient magnitude)
//! 3. Concatenating both parts and scaling to unit length
//!
//! This is a lightweight stand-in for a neural feature extractor: it is
//! deterministic and cheap, and good enough for re-identifying the same
//! animal photographed in similar conditions.

use super::{Embedding, EmbeddingProvider, FastResizer};
use crate::error::EmbeddingError;
use image::DynamicImage;
use std::f32::consts::PI;

const LAYOUT_GRID: u32 = 16;
const GRADIENT_SIZE: u32 = 64;
const ORIENTATION_BINS: usize = 16;

/// Brings the short orientation histogram to the same scale as the layout part
const ORIENTATION_WEIGHT: f32 = 8.0;

/// Smallest side length an input image may have
const MIN_SIDE: u32 = 2;

/// Deterministic colour-layout + edge-orientation embedder
#[derive(Debug, Clone, Default)]
pub struct ColorLayoutEmbedder;

impl ColorLayoutEmbedder {
    pub fn new() -> Self {
        Self
    }

    /// Dimension of embeddings produced by this extractor
    pub const DIMENSION: usize = (LAYOUT_GRID * LAYOUT_GRID * 3) as usize + ORIENTATION_BINS;

    fn layout_features(
        &self,
        resizer: &mut FastResizer,
        image: &DynamicImage,
    ) -> Result<Vec<f32>, EmbeddingError> {
        let grid = resizer.resize_rgb(image, LAYOUT_GRID, LAYOUT_GRID)?;
        Ok(grid
            .into_raw()
            .into_iter()
            .map(|v| v as f32 / 255.0 - 0.5)
            .collect())
    }

    fn orientation_features(
        &self,
        resizer: &mut FastResizer,
        image: &DynamicImage,
    ) -> Result<Vec<f32>, EmbeddingError> {
        let gray = resizer.resize_to_grayscale(image, GRADIENT_SIZE, GRADIENT_SIZE)?;
        let mut histogram = [0f32; ORIENTATION_BINS];

        for y in 1..GRADIENT_SIZE - 1 {
            for x in 1..GRADIENT_SIZE - 1 {
                let dx = gray.get_pixel(x + 1, y)[0] as f32 - gray.get_pixel(x - 1, y)[0] as f32;
                let dy = gray.get_pixel(x, y + 1)[0] as f32 - gray.get_pixel(x, y - 1)[0] as f32;
                let magnitude = (dx * dx + dy * dy).sqrt();
                if magnitude == 0.0 {
                    continue;
                }
                // Unsigned orientation in [0, PI)
                let angle = dy.atan2(dx).rem_euclid(PI);
                let bin = ((angle / PI) * ORIENTATION_BINS as f32) as usize;
                histogram[bin.min(ORIENTATION_BINS - 1)] += magnitude;
            }
        }

        let total: f32 = histogram.iter().sum();
        let uniform = 1.0 / ORIENTATION_BINS as f32;
        Ok(histogram
            .iter()
            .map(|h| {
                let share = if total > 0.0 { h / total } else { uniform };
                (share - uniform) * ORIENTATION_WEIGHT
            })
            .collect())
    }
}

impl EmbeddingProvider for ColorLayoutEmbedder {
    fn embed(&self, image: &DynamicImage) -> Result<Embedding, EmbeddingError> {
        let (width, height) = (image.width(), image.height());
        if width < MIN_SIDE || height < MIN_SIDE {
            return Err(EmbeddingError::UnsupportedShape { width, height });
        }

        let mut resizer = FastResizer::new();
        let mut features = self.layout_features(&mut resizer, image)?;
        features.extend(self.orientation_features(&mut resizer, image)?);

        let embedding = Embedding::normalized(features);
        if embedding.norm() < 0.5 {
            return Err(EmbeddingError::ExtractionFailed(
                "image produced a degenerate feature vector".to_string(),
            ));
        }
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        Self::DIMENSION
    }

    fn name(&self) -> &str {
        "color-layout"
    }
}
