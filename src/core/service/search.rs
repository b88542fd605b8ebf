//! Identification of an animal from query photos.

use super::processor::ImageProcessor;
use super::SearchRequest;
use crate::core::embedding::Embedding;
use crate::core::matching::{Match, MatchingEngine};
use crate::core::registry::AnimalRegistry;
use crate::error::{ServiceError, SkippedImage};
use crate::events::{null_sender, Event, EventSender, SearchEvent};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Result of a successful search
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    /// Best matches first, possibly empty
    pub matches: Vec<Match>,
    /// Query photos that were dropped
    pub skipped: Vec<SkippedImage>,
}

/// Ranks registered animals against query photos
pub struct SearchService {
    registry: Arc<dyn AnimalRegistry>,
    processor: ImageProcessor,
    engine: MatchingEngine,
}

impl SearchService {
    pub fn new(
        registry: Arc<dyn AnimalRegistry>,
        processor: ImageProcessor,
        engine: MatchingEngine,
    ) -> Self {
        Self {
            registry,
            processor,
            engine,
        }
    }

    pub fn engine(&self) -> &MatchingEngine {
        &self.engine
    }

    /// Search without events
    pub fn search(&self, request: &SearchRequest) -> Result<SearchOutcome, ServiceError> {
        self.search_with_events(request, &null_sender())
    }

    /// Search with event reporting
    pub fn search_with_events(
        &self,
        request: &SearchRequest,
        events: &EventSender,
    ) -> Result<SearchOutcome, ServiceError> {
        let request_id = Uuid::new_v4();
        let result = self.run(request_id, request, events);

        if let Err(e) = &result {
            warn!(%request_id, error = %e, "Search failed");
            events.send(Event::Search(SearchEvent::Failed {
                request_id,
                message: e.to_string(),
            }));
        }
        result
    }

    fn run(
        &self,
        request_id: Uuid,
        request: &SearchRequest,
        events: &EventSender,
    ) -> Result<SearchOutcome, ServiceError> {
        if request.images.is_empty() {
            return Err(ServiceError::NoImagesProvided);
        }

        events.send(Event::Search(SearchEvent::Started {
            request_id,
            total_images: request.images.len(),
        }));

        let batch = self
            .processor
            .process_batch(request_id, &request.images, events);
        if batch.processed.is_empty() {
            return Err(ServiceError::NoValidFeatures {
                skipped: batch.skipped,
            });
        }

        let queries: Vec<Embedding> = batch
            .processed
            .into_iter()
            .map(|item| item.embedding)
            .collect();
        let records = self.registry.all_records()?;

        events.send(Event::Search(SearchEvent::Matching {
            request_id,
            query_embeddings: queries.len(),
            records: records.len(),
        }));

        let matches = self.engine.rank(&queries, &records);

        info!(
            %request_id,
            records = records.len(),
            matches = matches.len(),
            best = matches.first().map(|m| m.similarity),
            "Search completed"
        );
        events.send(Event::Search(SearchEvent::Completed {
            request_id,
            matches: matches.len(),
        }));

        Ok(SearchOutcome {
            matches,
            skipped: batch.skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::decode::ImagePayload;
    use crate::core::embedding::EmbeddingProvider;
    use crate::core::enhance::PassthroughEnhancer;
    use crate::core::registry::{AnimalId, AnimalRecord, InMemoryRegistry};
    use crate::error::EmbeddingError;
    use chrono::Utc;
    use image::{DynamicImage, ImageBuffer, Rgb};
    use std::io::Cursor;

    /// Green channel selects the axis of the embedding
    struct GreenAxisProvider;

    impl EmbeddingProvider for GreenAxisProvider {
        fn embed(&self, image: &DynamicImage) -> Result<Embedding, EmbeddingError> {
            Ok(axis(image.to_rgb8().get_pixel(0, 0)[1] as usize % 4))
        }
        fn dimension(&self) -> usize {
            4
        }
        fn name(&self) -> &str {
            "green-axis"
        }
    }

    fn axis(index: usize) -> Embedding {
        let mut v = vec![0.0; 4];
        v[index] = 1.0;
        Embedding::normalized(v)
    }

    fn png(green: u8) -> ImagePayload {
        let image =
            DynamicImage::ImageRgb8(ImageBuffer::from_fn(4, 4, |_, _| Rgb([10, green, 10])));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        ImagePayload::new(format!("query{}.png", green), bytes)
    }

    fn service(records: Vec<AnimalRecord>) -> SearchService {
        let registry = InMemoryRegistry::new();
        for record in records {
            registry.append(record).unwrap();
        }
        let processor =
            ImageProcessor::new(Arc::new(PassthroughEnhancer), Arc::new(GreenAxisProvider));
        SearchService::new(Arc::new(registry), processor, MatchingEngine::default())
    }

    fn record(sequence: u64, embedding: Embedding) -> AnimalRecord {
        AnimalRecord::new(
            AnimalId::from_sequence(sequence),
            Utc::now(),
            vec![format!("ANI{:04}_0.png", sequence)],
            vec![embedding],
        )
        .unwrap()
    }

    #[test]
    fn finds_matching_animal_only() {
        let service = service(vec![record(1, axis(0)), record(2, axis(1))]);

        let outcome = service.search(&SearchRequest::new(vec![png(0)])).unwrap();

        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].animal_id.to_string(), "ANI0001");
        assert!((outcome.matches[0].similarity - 1.0).abs() < 1e-4);
    }

    #[test]
    fn empty_registry_is_success_without_matches() {
        let service = service(vec![]);

        let outcome = service.search(&SearchRequest::new(vec![png(2)])).unwrap();

        assert!(outcome.matches.is_empty());
    }

    #[test]
    fn empty_query_is_rejected() {
        let service = service(vec![]);

        let result = service.search(&SearchRequest::new(vec![]));

        assert!(matches!(result, Err(ServiceError::NoImagesProvided)));
    }

    #[test]
    fn undecodable_query_reports_no_features() {
        let service = service(vec![record(1, axis(0))]);

        let result = service.search(&SearchRequest::new(vec![ImagePayload::new("x.jpg", vec![9])]));

        assert!(matches!(result, Err(ServiceError::NoValidFeatures { .. })));
    }
}
