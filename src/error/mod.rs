//! # Error Module
//!
//! Error types for the animal matcher.
//!
//! ## Design Principles
//! - **Never panic** on user data - return errors instead
//! - **Include context** - file names, animal ids, what went wrong
//! - **Per-image errors are recoverable** - a bad photo is skipped, not fatal
//! - **Batch errors are caller-visible** - only an all-failed batch surfaces

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Top-level application error
#[derive(Error, Debug)]
pub enum AnimalMatcherError {
    #[error("{0}")]
    Service(#[from] ServiceError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Media storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors surfaced by the registration and search services
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("No images provided")]
    NoImagesProvided,

    #[error("No valid images processed ({} skipped)", skipped.len())]
    NoValidImages { skipped: Vec<SkippedImage> },

    #[error("No valid features extracted ({} skipped)", skipped.len())]
    NoValidFeatures { skipped: Vec<SkippedImage> },

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Media storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ServiceError {
    /// Machine-readable kind used in responses
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::NoImagesProvided => ErrorKind::NoImagesProvided,
            ServiceError::NoValidImages { .. } => ErrorKind::NoValidImages,
            ServiceError::NoValidFeatures { .. } => ErrorKind::NoValidFeatures,
            ServiceError::Registry(_) | ServiceError::Storage(_) => ErrorKind::Internal,
        }
    }
}

/// Distinguishes the failure cases callers need to tell apart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NoImagesProvided,
    NoValidImages,
    NoValidFeatures,
    Internal,
}

/// A photo that was dropped from a batch, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedImage {
    pub file_name: String,
    pub reason: String,
}

/// Errors that affect a single image within a batch
#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Failed to decode image {file_name}: {reason}")]
    Decode { file_name: String, reason: String },

    #[error("Image {file_name} is blank")]
    Blank { file_name: String },

    #[error("Failed to extract features from {file_name}: {source}")]
    Embedding {
        file_name: String,
        #[source]
        source: EmbeddingError,
    },

    #[error("Extractor returned an invalid embedding for {file_name}: {reason}")]
    InvalidEmbedding { file_name: String, reason: String },
}

impl ImageError {
    /// Name of the image this error belongs to
    pub fn file_name(&self) -> &str {
        match self {
            ImageError::Decode { file_name, .. }
            | ImageError::Blank { file_name }
            | ImageError::Embedding { file_name, .. }
            | ImageError::InvalidEmbedding { file_name, .. } => file_name,
        }
    }

    /// Convert into the diagnostic recorded for the caller
    pub fn to_skipped(&self) -> SkippedImage {
        SkippedImage {
            file_name: self.file_name().to_string(),
            reason: self.to_string(),
        }
    }
}

/// Errors raised by an embedding provider
#[derive(Error, Debug, Clone)]
pub enum EmbeddingError {
    #[error("Feature extractor unavailable: {0}")]
    ExtractorUnavailable(String),

    #[error("Unsupported image shape {width}x{height}")]
    UnsupportedShape { width: u32, height: u32 },

    #[error("Feature extraction failed: {0}")]
    ExtractionFailed(String),
}

/// Errors that occur with the animal registry
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Failed to open registry database at {path}: {reason}")]
    OpenFailed { path: PathBuf, reason: String },

    #[error("Database query failed: {0}")]
    QueryFailed(String),

    #[error("Animal {id} is already registered")]
    DuplicateId { id: String },

    #[error("Invalid animal record: {0}")]
    InvalidRecord(String),

    #[error("Registry lock poisoned at {location}. Restart the process and try again.")]
    Poisoned { location: String },

    #[error("Failed to serialize record data: {0}")]
    SerializationFailed(String),
}

/// Errors that occur while persisting image payloads
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create media directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write image {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove image {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, AnimalMatcherError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_error_includes_file_name() {
        let error = ImageError::Decode {
            file_name: "rex.jpg".to_string(),
            reason: "invalid JPEG".to_string(),
        };
        let message = error.to_string();
        assert!(message.contains("rex.jpg"));
        assert!(message.contains("invalid JPEG"));
    }

    #[test]
    fn skipped_image_keeps_reason() {
        let error = ImageError::Blank {
            file_name: "dark.png".to_string(),
        };
        let skipped = error.to_skipped();
        assert_eq!(skipped.file_name, "dark.png");
        assert!(skipped.reason.contains("blank"));
    }

    #[test]
    fn service_errors_have_distinct_kinds() {
        assert_eq!(ServiceError::NoImagesProvided.kind(), ErrorKind::NoImagesProvided);
        assert_eq!(
            ServiceError::NoValidImages { skipped: vec![] }.kind(),
            ErrorKind::NoValidImages
        );
        assert_eq!(
            ServiceError::NoValidFeatures { skipped: vec![] }.kind(),
            ErrorKind::NoValidFeatures
        );
        let internal = ServiceError::Registry(RegistryError::QueryFailed("disk full".into()));
        assert_eq!(internal.kind(), ErrorKind::Internal);
    }

    #[test]
    fn no_images_message_matches_wire_text() {
        assert_eq!(ServiceError::NoImagesProvided.to_string(), "No images provided");
    }

    #[test]
    fn poisoned_registry_suggests_recovery() {
        let error = RegistryError::Poisoned {
            location: "memory".to_string(),
        };
        assert!(error.to_string().contains("Restart"));
    }
}
