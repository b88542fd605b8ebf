//! Process-wide feature extractor.
//!
//! Loading a model can be slow or fail outright. `SharedExtractor` runs the
//! loader at most once; if it failed, every later request gets
//! `ExtractorUnavailable` straight away instead of retrying the load.

use super::{ColorLayoutEmbedder, Embedding, EmbeddingProvider};
use crate::error::EmbeddingError;
use image::DynamicImage;
use std::sync::OnceLock;
use tracing::{error, info};

type Loader = Box<dyn Fn() -> Result<Box<dyn EmbeddingProvider>, EmbeddingError> + Send + Sync>;

/// Lazily loaded, shared embedding provider
pub struct SharedExtractor {
    loader: Loader,
    state: OnceLock<Result<Box<dyn EmbeddingProvider>, String>>,
}

impl SharedExtractor {
    /// Wrap a loader that builds the real provider on first use
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn() -> Result<Box<dyn EmbeddingProvider>, EmbeddingError> + Send + Sync + 'static,
    {
        Self {
            loader: Box::new(loader),
            state: OnceLock::new(),
        }
    }

    /// Run the loader now instead of on the first embedding request
    pub fn initialize(&self) -> Result<&dyn EmbeddingProvider, EmbeddingError> {
        let state = self.state.get_or_init(|| match (self.loader)() {
            Ok(provider) => {
                info!(
                    provider = provider.name(),
                    dimension = provider.dimension(),
                    "Feature extractor loaded"
                );
                Ok(provider)
            }
            Err(e) => {
                error!(error = %e, "Failed to load feature extractor");
                Err(e.to_string())
            }
        });

        match state {
            Ok(provider) => Ok(provider.as_ref()),
            Err(reason) => Err(EmbeddingError::ExtractorUnavailable(reason.clone())),
        }
    }

    /// Whether the loader has run and succeeded
    pub fn is_available(&self) -> bool {
        matches!(self.state.get(), Some(Ok(_)))
    }
}

impl EmbeddingProvider for SharedExtractor {
    fn embed(&self, image: &DynamicImage) -> Result<Embedding, EmbeddingError> {
        self.initialize()?.embed(image)
    }

    fn dimension(&self) -> usize {
        self.initialize().map(|p| p.dimension()).unwrap_or(0)
    }

    fn name(&self) -> &str {
        match self.state.get() {
            Some(Ok(provider)) => provider.name(),
            _ => "unavailable",
        }
    }
}

/// The extractor shared by every service in this process
pub fn default_extractor() -> &'static SharedExtractor {
    static EXTRACTOR: OnceLock<SharedExtractor> = OnceLock::new();
    EXTRACTOR.get_or_init(|| SharedExtractor::new(load_color_layout))
}

fn load_color_layout() -> Result<Box<dyn EmbeddingProvider>, EmbeddingError> {
    Ok(Box::new(ColorLayoutEmbedder::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn loader_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let extractor = SharedExtractor::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ColorLayoutEmbedder::new()) as Box<dyn EmbeddingProvider>)
        });

        let image = DynamicImage::new_rgb8(8, 8);
        let _ = extractor.embed(&image);
        let _ = extractor.embed(&image);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(extractor.is_available());
        assert_eq!(extractor.dimension(), ColorLayoutEmbedder::DIMENSION);
    }

    #[test]
    fn failed_load_makes_every_request_fail_fast() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let extractor = SharedExtractor::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(EmbeddingError::ExtractionFailed("weights missing".to_string()))
        });

        let image = DynamicImage::new_rgb8(8, 8);
        for _ in 0..3 {
            match extractor.embed(&image) {
                Err(EmbeddingError::ExtractorUnavailable(reason)) => {
                    assert!(reason.contains("weights missing"));
                }
                other => panic!("expected ExtractorUnavailable, got {:?}", other),
            }
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!extractor.is_available());
        assert_eq!(extractor.name(), "unavailable");
    }

    #[test]
    fn default_extractor_is_shared() {
        let a = default_extractor() as *const SharedExtractor;
        let b = default_extractor() as *const SharedExtractor;
        assert_eq!(a, b);
    }
}
