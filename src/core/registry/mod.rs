//! # Registry Module
//!
//! Durable collection of registered animals.
//!
//! ## Records
//! Each animal is stored once, in full, with its photo references and the
//! embedding of every photo (index-aligned). Records are never updated
//! after they are appended.
//!
//! ## Backends
//! - `SqliteRegistry` - Persistent storage using SQLite
//! - `InMemoryRegistry` - For testing and embedding in other processes

mod memory;
mod sqlite;
mod traits;

pub use memory::InMemoryRegistry;
pub use sqlite::SqliteRegistry;
pub use traits::AnimalRegistry;

use crate::core::embedding::Embedding;
use crate::error::RegistryError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix of every animal id
pub const ID_PREFIX: &str = "ANI";

/// Identifier of a registered animal, e.g. `ANI0001`
///
/// Ordering follows the sequence number, so `ANI9999 < ANI10000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnimalId(u64);

impl AnimalId {
    /// Build an id from a sequence number
    pub fn from_sequence(sequence: u64) -> Self {
        Self(sequence)
    }

    /// The sequence number this id was derived from
    pub fn sequence(&self) -> u64 {
        self.0
    }

    /// Parse an id such as `ANI0042`
    pub fn parse(value: &str) -> Option<Self> {
        let digits = value.strip_prefix(ID_PREFIX)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok().map(Self)
    }
}

impl fmt::Display for AnimalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:04}", ID_PREFIX, self.0)
    }
}

impl Serialize for AnimalId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AnimalId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        AnimalId::parse(&value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid animal id: {}", value)))
    }
}

/// A registered animal
///
/// Only built through [`AnimalRecord::new`], never deserialized directly.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnimalRecord {
    id: AnimalId,
    registered_at: DateTime<Utc>,
    images: Vec<String>,
    embeddings: Vec<Embedding>,
}

impl AnimalRecord {
    /// Create a record, enforcing the registry invariants
    ///
    /// A record must have at least one image and exactly one embedding
    /// per image.
    pub fn new(
        id: AnimalId,
        registered_at: DateTime<Utc>,
        images: Vec<String>,
        embeddings: Vec<Embedding>,
    ) -> Result<Self, RegistryError> {
        if images.is_empty() {
            return Err(RegistryError::InvalidRecord(format!(
                "{} has no images",
                id
            )));
        }
        if images.len() != embeddings.len() {
            return Err(RegistryError::InvalidRecord(format!(
                "{} has {} images but {} embeddings",
                id,
                images.len(),
                embeddings.len()
            )));
        }

        Ok(Self {
            id,
            registered_at,
            images,
            embeddings,
        })
    }

    pub fn id(&self) -> AnimalId {
        self.id
    }

    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    /// Stored photo references, in registration order
    pub fn images(&self) -> &[String] {
        &self.images
    }

    /// Embeddings aligned with [`AnimalRecord::images`]
    pub fn embeddings(&self) -> &[Embedding] {
        &self.embeddings
    }
}
