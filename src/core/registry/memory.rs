//! In-memory registry backend.

use super::{AnimalId, AnimalRecord, AnimalRegistry};
use crate::error::RegistryError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// In-memory registry backend
///
/// Useful for testing and scenarios where persistence isn't needed.
pub struct InMemoryRegistry {
    records: RwLock<Vec<AnimalRecord>>,
    sequence: AtomicU64,
}

impl InMemoryRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            sequence: AtomicU64::new(0),
        }
    }

    fn poisoned() -> RegistryError {
        RegistryError::Poisoned {
            location: "memory".to_string(),
        }
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AnimalRegistry for InMemoryRegistry {
    fn append(&self, record: AnimalRecord) -> Result<(), RegistryError> {
        let mut records = self.records.write().map_err(|_| Self::poisoned())?;

        if records.iter().any(|r| r.id() == record.id()) {
            return Err(RegistryError::DuplicateId {
                id: record.id().to_string(),
            });
        }

        // Keep the counter ahead of externally built ids
        self.sequence
            .fetch_max(record.id().sequence(), Ordering::SeqCst);
        records.push(record);
        Ok(())
    }

    fn count(&self) -> Result<usize, RegistryError> {
        let records = self.records.read().map_err(|_| Self::poisoned())?;
        Ok(records.len())
    }

    fn all_records(&self) -> Result<Vec<AnimalRecord>, RegistryError> {
        let records = self.records.read().map_err(|_| Self::poisoned())?;
        Ok(records.clone())
    }

    fn get(&self, id: AnimalId) -> Result<Option<AnimalRecord>, RegistryError> {
        let records = self.records.read().map_err(|_| Self::poisoned())?;
        Ok(records.iter().find(|r| r.id() == id).cloned())
    }

    fn reserve_sequence(&self) -> Result<u64, RegistryError> {
        Ok(self.sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }
}
