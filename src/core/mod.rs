//! # Core Module
//!
//! The transport-agnostic matching engine.
//!
//! ## Modules
//! - `decode` - Turns raw photo bytes into images
//! - `enhance` - Contrast-limited local equalization before feature extraction
//! - `embedding` - Maps photos to unit-norm feature vectors
//! - `registry` - Persists registered animals
//! - `storage` - Persists the photos referenced by records
//! - `matching` - Cosine similarity ranking
//! - `service` - Registration and search workflows

pub mod decode;
pub mod embedding;
pub mod enhance;
pub mod matching;
pub mod registry;
pub mod service;
pub mod storage;

// Re-export commonly used types
pub use decode::ImagePayload;
pub use embedding::{Embedding, EmbeddingProvider};
pub use enhance::{ClaheEnhancer, ImageEnhancer};
pub use matching::{Match, MatchConfig, MatchingEngine};
pub use registry::{AnimalId, AnimalRecord, AnimalRegistry, InMemoryRegistry, SqliteRegistry};
pub use service::{
    AnimalMatcher, RegisterRequest, RegisterResponse, RegistrationOutcome, SearchOutcome,
    SearchRequest, SearchResponse,
};
pub use storage::{DirectoryMediaStore, InMemoryMediaStore, MediaStore};
