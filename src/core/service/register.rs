//! Registration of new animals.

use super::processor::{ImageProcessor, ProcessedImage};
use super::RegisterRequest;
use crate::core::registry::{AnimalId, AnimalRecord, AnimalRegistry};
use crate::core::storage::{media_file_name, MediaStore};
use crate::error::{ServiceError, SkippedImage};
use crate::events::{null_sender, Event, EventSender, RegisterEvent};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Result of a successful registration
#[derive(Debug, Clone)]
pub struct RegistrationOutcome {
    pub animal_id: AnimalId,
    pub registered_at: DateTime<Utc>,
    /// Number of photos stored in the record
    pub images_stored: usize,
    /// Photos that were dropped from the batch
    pub skipped: Vec<SkippedImage>,
}

/// Turns a batch of photos into a new registry record
pub struct RegistrationService {
    registry: Arc<dyn AnimalRegistry>,
    media: Arc<dyn MediaStore>,
    processor: ImageProcessor,
}

impl RegistrationService {
    pub fn new(
        registry: Arc<dyn AnimalRegistry>,
        media: Arc<dyn MediaStore>,
        processor: ImageProcessor,
    ) -> Self {
        Self {
            registry,
            media,
            processor,
        }
    }

    /// Register without events
    pub fn register(&self, request: &RegisterRequest) -> Result<RegistrationOutcome, ServiceError> {
        self.register_with_events(request, &null_sender())
    }

    /// Register with event reporting
    pub fn register_with_events(
        &self,
        request: &RegisterRequest,
        events: &EventSender,
    ) -> Result<RegistrationOutcome, ServiceError> {
        let request_id = Uuid::new_v4();
        let result = self.run(request_id, request, events);

        if let Err(e) = &result {
            warn!(%request_id, error = %e, "Registration failed");
            events.send(Event::Register(RegisterEvent::Failed {
                request_id,
                message: e.to_string(),
            }));
        }
        result
    }

    fn run(
        &self,
        request_id: Uuid,
        request: &RegisterRequest,
        events: &EventSender,
    ) -> Result<RegistrationOutcome, ServiceError> {
        if request.images.is_empty() {
            return Err(ServiceError::NoImagesProvided);
        }

        // Ids that are reserved here but never appended leave a gap
        let animal_id = self.registry.next_id()?;
        events.send(Event::Register(RegisterEvent::Started {
            request_id,
            animal_id: animal_id.to_string(),
            total_images: request.images.len(),
        }));

        let batch = self
            .processor
            .process_batch(request_id, &request.images, events);
        if batch.processed.is_empty() {
            return Err(ServiceError::NoValidImages {
                skipped: batch.skipped,
            });
        }

        let registered_at = Utc::now();
        let mut saved = Vec::with_capacity(batch.processed.len());
        let stored = self.persist(
            animal_id,
            registered_at,
            request,
            batch.processed,
            &mut saved,
        );
        if stored.is_err() {
            self.discard(request_id, &saved);
        }
        let images_stored = stored?;

        info!(
            %request_id,
            animal_id = %animal_id,
            images_stored,
            images_skipped = batch.skipped.len(),
            "Animal registered"
        );
        events.send(Event::Register(RegisterEvent::Completed {
            request_id,
            animal_id: animal_id.to_string(),
            images_stored,
            images_skipped: batch.skipped.len(),
        }));

        Ok(RegistrationOutcome {
            animal_id,
            registered_at,
            images_stored,
            skipped: batch.skipped,
        })
    }

    /// Store the photos and append the record
    ///
    /// Every reference written to the media store is pushed to `saved`,
    /// including the name of a save that failed partway.
    fn persist(
        &self,
        animal_id: AnimalId,
        registered_at: DateTime<Utc>,
        request: &RegisterRequest,
        processed: Vec<ProcessedImage>,
        saved: &mut Vec<String>,
    ) -> Result<usize, ServiceError> {
        let mut embeddings = Vec::with_capacity(processed.len());

        for (stored_index, item) in processed.into_iter().enumerate() {
            let payload = &request.images[item.index];
            let name = media_file_name(
                animal_id,
                registered_at,
                stored_index,
                &payload.stored_extension(),
            );
            match self.media.save(&name, &payload.data) {
                Ok(reference) => saved.push(reference),
                Err(e) => {
                    saved.push(name);
                    return Err(e.into());
                }
            }
            embeddings.push(item.embedding);
        }

        let record = AnimalRecord::new(animal_id, registered_at, saved.clone(), embeddings)?;
        self.registry.append(record)?;
        Ok(saved.len())
    }

    /// Remove photos stored by a registration that did not complete
    fn discard(&self, request_id: Uuid, saved: &[String]) {
        for reference in saved {
            if let Err(e) = self.media.remove(reference) {
                warn!(%request_id, %reference, error = %e, "Failed to remove stored photo");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::decode::ImagePayload;
    use crate::core::embedding::{Embedding, EmbeddingProvider};
    use crate::core::enhance::PassthroughEnhancer;
    use crate::core::registry::InMemoryRegistry;
    use crate::core::storage::InMemoryMediaStore;
    use crate::error::{EmbeddingError, RegistryError, StorageError};
    use crate::events::EventChannel;
    use image::{DynamicImage, ImageBuffer, Rgb};
    use std::io::Cursor;

    struct ConstantProvider;

    impl EmbeddingProvider for ConstantProvider {
        fn embed(&self, _: &DynamicImage) -> Result<Embedding, EmbeddingError> {
            Ok(Embedding::normalized(vec![1.0, 1.0, 0.0]))
        }
        fn dimension(&self) -> usize {
            3
        }
        fn name(&self) -> &str {
            "constant"
        }
    }

    fn png(name: &str) -> ImagePayload {
        let image = DynamicImage::ImageRgb8(ImageBuffer::from_fn(4, 4, |x, _| {
            Rgb([x as u8 * 40, 50, 60])
        }));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        ImagePayload::new(name, bytes)
    }

    fn fixture() -> (RegistrationService, Arc<InMemoryRegistry>, Arc<InMemoryMediaStore>) {
        let registry = Arc::new(InMemoryRegistry::new());
        let media = Arc::new(InMemoryMediaStore::new());
        let service = RegistrationService::new(registry.clone(), media.clone(), processor());
        (service, registry, media)
    }

    /// Hands out ids but refuses every append
    struct FullDiskRegistry(InMemoryRegistry);

    impl AnimalRegistry for FullDiskRegistry {
        fn append(&self, _: AnimalRecord) -> Result<(), RegistryError> {
            Err(RegistryError::QueryFailed("disk full".to_string()))
        }
        fn count(&self) -> Result<usize, RegistryError> {
            self.0.count()
        }
        fn all_records(&self) -> Result<Vec<AnimalRecord>, RegistryError> {
            self.0.all_records()
        }
        fn get(&self, id: AnimalId) -> Result<Option<AnimalRecord>, RegistryError> {
            self.0.get(id)
        }
        fn reserve_sequence(&self) -> Result<u64, RegistryError> {
            self.0.reserve_sequence()
        }
    }

    /// Accepts a fixed number of photos, then fails every save
    struct FillingMediaStore {
        inner: InMemoryMediaStore,
        capacity: usize,
    }

    impl MediaStore for FillingMediaStore {
        fn save(&self, name: &str, data: &[u8]) -> Result<String, StorageError> {
            if self.inner.names().len() >= self.capacity {
                return Err(StorageError::Write {
                    path: name.into(),
                    source: std::io::Error::other("no space left"),
                });
            }
            self.inner.save(name, data)
        }
        fn remove(&self, reference: &str) -> Result<(), StorageError> {
            self.inner.remove(reference)
        }
    }

    fn processor() -> ImageProcessor {
        ImageProcessor::new(Arc::new(PassthroughEnhancer), Arc::new(ConstantProvider))
    }

    #[test]
    fn failed_append_removes_stored_photos() {
        let media = Arc::new(InMemoryMediaStore::new());
        let registry = Arc::new(FullDiskRegistry(InMemoryRegistry::new()));
        let service = RegistrationService::new(registry.clone(), media.clone(), processor());

        let request = RegisterRequest::new(vec![png("a.png"), png("b.png")]);

        let result = service.register(&request);

        assert!(matches!(
            result,
            Err(ServiceError::Registry(RegistryError::QueryFailed(_)))
        ));
        assert!(media.names().is_empty());
        assert_eq!(registry.count().unwrap(), 0);
    }

    #[test]
    fn failed_save_removes_earlier_photos() {
        let media = Arc::new(FillingMediaStore {
            inner: InMemoryMediaStore::new(),
            capacity: 2,
        });
        let registry = Arc::new(InMemoryRegistry::new());
        let service = RegistrationService::new(registry.clone(), media.clone(), processor());
        let request = RegisterRequest::new(vec![png("a.png"), png("b.png"), png("c.png")]);

        let result = service.register(&request);

        assert!(matches!(result, Err(ServiceError::Storage(_))));
        assert!(media.inner.names().is_empty());
        assert_eq!(registry.count().unwrap(), 0);
    }

    #[test]
    fn stores_every_valid_photo() {
        let (service, registry, media) = fixture();
        let request = RegisterRequest::new(vec![png("a.png"), png("b.png"), png("c.png")]);

        let outcome = service.register(&request).unwrap();

        assert_eq!(outcome.animal_id.to_string(), "ANI0001");
        assert_eq!(outcome.images_stored, 3);
        let record = registry.get(outcome.animal_id).unwrap().unwrap();
        assert_eq!(record.images().len(), 3);
        assert_eq!(record.embeddings().len(), 3);
        assert_eq!(media.names().len(), 3);
        assert!(record.images().iter().all(|name| name.starts_with("ANI0001_")));
        assert!(record.images()[2].ends_with("_2.png"));
    }

    #[test]
    fn empty_request_leaves_registry_untouched() {
        let (service, registry, media) = fixture();

        let result = service.register(&RegisterRequest::new(vec![]));

        assert!(matches!(result, Err(ServiceError::NoImagesProvided)));
        assert_eq!(registry.count().unwrap(), 0);
        assert!(media.names().is_empty());
    }

    #[test]
    fn all_failed_batch_persists_nothing() {
        let (service, registry, media) = fixture();
        let request = RegisterRequest::new(vec![ImagePayload::new("bad.jpg", vec![0, 1])]);

        let result = service.register(&request);

        match result {
            Err(ServiceError::NoValidImages { skipped }) => {
                assert_eq!(skipped.len(), 1);
                assert_eq!(skipped[0].file_name, "bad.jpg");
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(registry.count().unwrap(), 0);
        assert!(media.names().is_empty());
    }

    #[test]
    fn partial_failure_renumbers_stored_photos() {
        let (service, registry, _) = fixture();
        let request = RegisterRequest::new(vec![
            ImagePayload::new("bad.jpg", vec![0, 1]),
            png("good.png"),
        ]);

        let outcome = service.register(&request).unwrap();

        assert_eq!(outcome.images_stored, 1);
        assert_eq!(outcome.skipped.len(), 1);
        let record = registry.get(outcome.animal_id).unwrap().unwrap();
        assert!(record.images()[0].ends_with("_0.png"));
    }

    #[test]
    fn completion_event_is_sent() {
        let (service, _, _) = fixture();
        let (sender, receiver) = EventChannel::new();

        service
            .register_with_events(&RegisterRequest::new(vec![png("a.png")]), &sender)
            .unwrap();
        drop(sender);

        let completed = receiver.iter().any(|e| {
            matches!(
                e,
                Event::Register(RegisterEvent::Completed { images_stored: 1, .. })
            )
        });
        assert!(completed);
    }
}
