//! # Service Module
//!
//! Orchestrates the register and search workflows.
//!
//! ## Workflows
//! 1. **Register** - Process photos, store the survivors and append a new record
//! 2. **Search** - Process photos and rank every registered animal against them
//!
//! Both workflows share [`ImageProcessor`]: decode, blank check, enhance,
//! embed and validate, in parallel across the photos of one request.

mod processor;
mod register;
mod response;
mod search;

pub use processor::{BatchResult, ImageProcessor, ProcessedImage};
pub use register::{RegistrationOutcome, RegistrationService};
pub use response::{RegisterResponse, SearchResponse};
pub use search::{SearchOutcome, SearchService};

use crate::core::decode::ImagePayload;
use crate::core::embedding::{default_extractor, EmbeddingProvider};
use crate::core::enhance::{ClaheEnhancer, ImageEnhancer};
use crate::core::matching::{MatchConfig, MatchingEngine};
use crate::core::registry::{AnimalRegistry, InMemoryRegistry};
use crate::core::storage::{InMemoryMediaStore, MediaStore};
use crate::error::{AnimalMatcherError, ServiceError};
use crate::events::{null_sender, EventSender};
use std::sync::Arc;

/// Photos of an animal to register
#[derive(Debug, Clone, Default)]
pub struct RegisterRequest {
    pub images: Vec<ImagePayload>,
}

impl RegisterRequest {
    pub fn new(images: Vec<ImagePayload>) -> Self {
        Self { images }
    }
}

/// Photos of an animal to identify
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub images: Vec<ImagePayload>,
}

impl SearchRequest {
    pub fn new(images: Vec<ImagePayload>) -> Self {
        Self { images }
    }
}

/// Builder for [`AnimalMatcher`]
pub struct AnimalMatcherBuilder {
    registry: Option<Arc<dyn AnimalRegistry>>,
    media: Option<Arc<dyn MediaStore>>,
    enhancer: Option<Arc<dyn ImageEnhancer>>,
    provider: Option<Arc<dyn EmbeddingProvider>>,
    config: MatchConfig,
}

impl AnimalMatcherBuilder {
    pub fn new() -> Self {
        Self {
            registry: None,
            media: None,
            enhancer: None,
            provider: None,
            config: MatchConfig::default(),
        }
    }

    /// Set the registry backend
    pub fn registry(mut self, registry: Arc<dyn AnimalRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set where registered photos are stored
    pub fn media_store(mut self, media: Arc<dyn MediaStore>) -> Self {
        self.media = Some(media);
        self
    }

    /// Set the enhancement step
    pub fn enhancer(mut self, enhancer: Arc<dyn ImageEnhancer>) -> Self {
        self.enhancer = Some(enhancer);
        self
    }

    /// Set the feature extractor
    pub fn provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Set matching parameters
    pub fn match_config(mut self, config: MatchConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the matcher
    ///
    /// Unset parts default to in-memory storage, CLAHE enhancement and the
    /// process-wide extractor.
    pub fn build(self) -> Result<AnimalMatcher, AnimalMatcherError> {
        self.config.validate()?;

        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(InMemoryRegistry::new()));
        let media = self
            .media
            .unwrap_or_else(|| Arc::new(InMemoryMediaStore::new()));
        let enhancer = self
            .enhancer
            .unwrap_or_else(|| Arc::new(ClaheEnhancer::default()));
        let provider = self
            .provider
            .unwrap_or_else(|| Arc::new(default_extractor()));

        let processor = ImageProcessor::new(enhancer, provider);

        Ok(AnimalMatcher {
            registration: RegistrationService::new(registry.clone(), media, processor.clone()),
            search: SearchService::new(
                registry.clone(),
                processor,
                MatchingEngine::new(self.config),
            ),
            registry,
        })
    }
}

impl Default for AnimalMatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Registration and search over one shared registry
pub struct AnimalMatcher {
    registry: Arc<dyn AnimalRegistry>,
    registration: RegistrationService,
    search: SearchService,
}

impl AnimalMatcher {
    pub fn builder() -> AnimalMatcherBuilder {
        AnimalMatcherBuilder::new()
    }

    /// The registry both workflows operate on
    pub fn registry(&self) -> &dyn AnimalRegistry {
        self.registry.as_ref()
    }

    pub fn match_config(&self) -> &MatchConfig {
        self.search.engine().config()
    }

    /// Register a new animal
    pub fn register(&self, request: &RegisterRequest) -> Result<RegistrationOutcome, ServiceError> {
        self.register_with_events(request, &null_sender())
    }

    /// Register a new animal with event reporting
    pub fn register_with_events(
        &self,
        request: &RegisterRequest,
        events: &EventSender,
    ) -> Result<RegistrationOutcome, ServiceError> {
        self.registration.register_with_events(request, events)
    }

    /// Find registered animals resembling the query photos
    pub fn search(&self, request: &SearchRequest) -> Result<SearchOutcome, ServiceError> {
        self.search_with_events(request, &null_sender())
    }

    /// Search with event reporting
    pub fn search_with_events(
        &self,
        request: &SearchRequest,
        events: &EventSender,
    ) -> Result<SearchOutcome, ServiceError> {
        self.search.search_with_events(request, events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_rejects_invalid_config() {
        let config = MatchConfig {
            similarity_threshold: 0.7,
            top_k: 0,
        };

        let result = AnimalMatcher::builder().match_config(config).build();

        assert!(matches!(result, Err(AnimalMatcherError::Config(_))));
    }

    #[test]
    fn builder_defaults_to_empty_registry() {
        let matcher = AnimalMatcher::builder().build().unwrap();

        assert_eq!(matcher.registry().count().unwrap(), 0);
        assert_eq!(*matcher.match_config(), MatchConfig::default());
    }
}
