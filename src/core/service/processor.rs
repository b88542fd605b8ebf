//! Per-photo processing shared by registration and search.

use crate::core::decode::ImagePayload;
use crate::core::embedding::{Embedding, EmbeddingProvider};
use crate::core::enhance::{is_blank, ImageEnhancer};
use crate::error::{ImageError, SkippedImage};
use crate::events::{Event, EventSender, ImageEvent, ImageProgress};
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// A photo that made it through the pipeline
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    /// Position of the photo in the submitted batch
    pub index: usize,
    pub embedding: Embedding,
}

/// Outcome of processing a batch of photos
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    /// Successful photos, in submission order
    pub processed: Vec<ProcessedImage>,
    /// Photos that were dropped, in submission order
    pub skipped: Vec<SkippedImage>,
}

/// Decode -> blank check -> enhance -> embed for every photo of a request
#[derive(Clone)]
pub struct ImageProcessor {
    enhancer: Arc<dyn ImageEnhancer>,
    provider: Arc<dyn EmbeddingProvider>,
}

impl ImageProcessor {
    pub fn new(enhancer: Arc<dyn ImageEnhancer>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { enhancer, provider }
    }

    /// The provider used for feature extraction
    pub fn provider(&self) -> &dyn EmbeddingProvider {
        self.provider.as_ref()
    }

    /// Process one photo, returning its validated embedding
    pub fn process(&self, payload: &ImagePayload) -> Result<Embedding, ImageError> {
        let image = payload.decode()?;
        if is_blank(&image) {
            return Err(ImageError::Blank {
                file_name: payload.file_name.clone(),
            });
        }

        let enhanced = self.enhancer.enhance(&image);

        let embedding = self
            .provider
            .embed(&enhanced)
            .map_err(|e| ImageError::Embedding {
                file_name: payload.file_name.clone(),
                source: e,
            })?;

        embedding
            .validate(self.provider.dimension())
            .map_err(|reason| ImageError::InvalidEmbedding {
                file_name: payload.file_name.clone(),
                reason,
            })?;

        Ok(embedding)
    }

    /// Process a batch in parallel, skipping photos that fail
    ///
    /// Successful embeddings keep the order of `payloads` regardless of
    /// which worker finishes first.
    pub fn process_batch(
        &self,
        request_id: Uuid,
        payloads: &[ImagePayload],
        events: &EventSender,
    ) -> BatchResult {
        let total = payloads.len();
        let completed = AtomicUsize::new(0);

        let results: Vec<(usize, Result<Embedding, ImageError>)> = payloads
            .par_iter()
            .enumerate()
            .map(|(index, payload)| {
                let result = self.process(payload);
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;

                match &result {
                    Ok(_) => {
                        debug!(%request_id, file = %payload.file_name, "Photo processed");
                        events.send(Event::Image(ImageEvent::Processed(ImageProgress {
                            request_id,
                            completed: done,
                            total,
                            file_name: payload.file_name.clone(),
                        })));
                    }
                    Err(e) => {
                        warn!(%request_id, file = %payload.file_name, error = %e, "Skipping photo");
                        events.send(Event::Image(ImageEvent::Skipped {
                            request_id,
                            file_name: payload.file_name.clone(),
                            reason: e.to_string(),
                        }));
                    }
                }

                (index, result)
            })
            .collect();

        let mut batch = BatchResult::default();
        for (index, result) in results {
            match result {
                Ok(embedding) => batch.processed.push(ProcessedImage { index, embedding }),
                Err(e) => batch.skipped.push(e.to_skipped()),
            }
        }
        batch
    }
}
