//! Registry backend trait definition.

use super::{AnimalId, AnimalRecord};
use crate::error::RegistryError;

/// Trait for registry backends
pub trait AnimalRegistry: Send + Sync {
    /// Persist a fully-formed record
    ///
    /// Fails if a record with the same id already exists.
    fn append(&self, record: AnimalRecord) -> Result<(), RegistryError>;

    /// Number of stored records
    fn count(&self) -> Result<usize, RegistryError>;

    /// Snapshot of every stored record
    ///
    /// Each call reads the backing storage again, so callers can scan
    /// the registry as many times as they like.
    fn all_records(&self) -> Result<Vec<AnimalRecord>, RegistryError>;

    /// Look up a single record
    fn get(&self, id: AnimalId) -> Result<Option<AnimalRecord>, RegistryError>;

    /// Atomically hand out the next sequence number (1, 2, 3, ...)
    ///
    /// Concurrent callers always receive distinct numbers. A number is
    /// never handed out twice, even if the registration that reserved it
    /// fails before appending.
    fn reserve_sequence(&self) -> Result<u64, RegistryError>;

    /// Reserve the next animal id
    fn next_id(&self) -> Result<AnimalId, RegistryError> {
        self.reserve_sequence().map(AnimalId::from_sequence)
    }
}
