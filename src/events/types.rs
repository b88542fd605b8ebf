//! Event type definitions for progress reporting.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// All events emitted by the registration and search services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    /// Registration events
    Register(RegisterEvent),
    /// Search events
    Search(SearchEvent),
    /// Per-photo events, shared by both operations
    Image(ImageEvent),
}

/// Events during a registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RegisterEvent {
    /// An id was reserved and photo processing started
    Started {
        request_id: Uuid,
        animal_id: String,
        total_images: usize,
    },
    /// The record was stored
    Completed {
        request_id: Uuid,
        animal_id: String,
        images_stored: usize,
        images_skipped: usize,
    },
    /// Nothing was stored
    Failed { request_id: Uuid, message: String },
}

/// Events during a search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SearchEvent {
    /// Query photo processing started
    Started { request_id: Uuid, total_images: usize },
    /// Query embeddings are ready and the registry scan is starting
    Matching {
        request_id: Uuid,
        query_embeddings: usize,
        records: usize,
    },
    /// Ranking finished
    Completed { request_id: Uuid, matches: usize },
    /// The search could not produce a result
    Failed { request_id: Uuid, message: String },
}

/// Events for individual photos
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ImageEvent {
    /// A photo produced a valid embedding
    Processed(ImageProgress),
    /// A photo was dropped but the batch continues
    Skipped {
        request_id: Uuid,
        file_name: String,
        reason: String,
    },
}

/// Progress information while processing photos
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageProgress {
    pub request_id: Uuid,
    /// Number of photos finished so far (processed or skipped)
    pub completed: usize,
    /// Total number of photos in the batch
    pub total: usize,
    /// Photo that just finished
    pub file_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_serializable() {
        let event = Event::Image(ImageEvent::Processed(ImageProgress {
            request_id: Uuid::new_v4(),
            completed: 2,
            total: 5,
            file_name: "rex.jpg".to_string(),
        }));

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: Event = serde_json::from_str(&json).unwrap();

        match deserialized {
            Event::Image(ImageEvent::Processed(p)) => {
                assert_eq!(p.completed, 2);
                assert_eq!(p.file_name, "rex.jpg");
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn register_completed_is_serializable() {
        let event = RegisterEvent::Completed {
            request_id: Uuid::new_v4(),
            animal_id: "ANI0007".to_string(),
            images_stored: 3,
            images_skipped: 1,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("ANI0007"));
    }
}
