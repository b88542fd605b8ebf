//! SQLite registry backend for persistent storage.

use super::{AnimalId, AnimalRecord, AnimalRegistry};
use crate::core::embedding::Embedding;
use crate::error::RegistryError;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

const SEQUENCE_NAME: &str = "animal";

/// Columns of one `animals` row before conversion
type RawRow = (i64, String, String, Vec<u8>, i64);

/// SQLite-backed persistent registry
///
/// Uses WAL (Write-Ahead Logging) mode so searches can read while a
/// registration is being written. Embeddings are stored as one blob of
/// little-endian f32 values per animal.
pub struct SqliteRegistry {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteRegistry {
    /// Open or create a registry database at the given path
    pub fn open(path: &Path) -> Result<Self, RegistryError> {
        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RegistryError::OpenFailed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        }

        let conn = Connection::open(path).map_err(|e| RegistryError::OpenFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Self::initialize(conn, path.to_path_buf())
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self, RegistryError> {
        let conn = Connection::open_in_memory().map_err(|e| RegistryError::OpenFailed {
            path: PathBuf::from(":memory:"),
            reason: e.to_string(),
        })?;

        Self::initialize(conn, PathBuf::from(":memory:"))
    }

    fn initialize(conn: Connection, db_path: PathBuf) -> Result<Self, RegistryError> {
        // WAL allows readers to proceed even while writes are happening
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| RegistryError::QueryFailed(e.to_string()))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS animals (
                sequence INTEGER PRIMARY KEY,
                registered_at TEXT NOT NULL,
                images TEXT NOT NULL,
                embeddings BLOB NOT NULL,
                dimension INTEGER NOT NULL
            )",
            [],
        )
        .map_err(|e| RegistryError::QueryFailed(e.to_string()))?;

        // Survives failed registrations, so reserved ids are never reused
        conn.execute(
            "CREATE TABLE IF NOT EXISTS id_sequence (
                name TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            )",
            [],
        )
        .map_err(|e| RegistryError::QueryFailed(e.to_string()))?;

        conn.execute(
            "INSERT OR IGNORE INTO id_sequence (name, value)
             VALUES (?, (SELECT COALESCE(MAX(sequence), 0) FROM animals))",
            [SEQUENCE_NAME],
        )
        .map_err(|e| RegistryError::QueryFailed(e.to_string()))?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    /// Path of the backing database file
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, RegistryError> {
        self.conn.lock().map_err(|_| RegistryError::Poisoned {
            location: self.db_path.display().to_string(),
        })
    }

    fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
    }

    /// Convert stored columns back into a record
    fn to_record(raw: RawRow) -> Result<AnimalRecord, RegistryError> {
        let (sequence, registered_at, images_json, blob, dimension) = raw;
        let id = AnimalId::from_sequence(sequence as u64);

        let registered_at = DateTime::parse_from_rfc3339(&registered_at)
            .map_err(|e| RegistryError::SerializationFailed(format!("{}: {}", id, e)))?
            .with_timezone(&Utc);

        let images: Vec<String> = serde_json::from_str(&images_json)
            .map_err(|e| RegistryError::SerializationFailed(format!("{}: {}", id, e)))?;

        let chunk_bytes = usize::try_from(dimension)
            .ok()
            .and_then(|d| d.checked_mul(4))
            .ok_or_else(|| {
                RegistryError::SerializationFailed(format!(
                    "{}: invalid embedding dimension {}",
                    id, dimension
                ))
            })?;
        if chunk_bytes == 0 || blob.len() % chunk_bytes != 0 {
            return Err(RegistryError::SerializationFailed(format!(
                "{}: embedding blob of {} bytes does not fit dimension {}",
                id,
                blob.len(),
                dimension
            )));
        }

        let embeddings = blob
            .chunks_exact(chunk_bytes)
            .map(|chunk| {
                Embedding::from_le_bytes(chunk).ok_or_else(|| {
                    RegistryError::SerializationFailed(format!("{}: truncated embedding", id))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        AnimalRecord::new(id, registered_at, images, embeddings)
    }
}

impl AnimalRegistry for SqliteRegistry {
    fn append(&self, record: AnimalRecord) -> Result<(), RegistryError> {
        let mut conn = self.lock()?;

        let images_json = serde_json::to_string(record.images())
            .map_err(|e| RegistryError::SerializationFailed(e.to_string()))?;
        let dimension = record.embeddings().first().map(|e| e.len()).unwrap_or(0);
        if record.embeddings().iter().any(|e| e.len() != dimension) {
            return Err(RegistryError::InvalidRecord(format!(
                "{} has embeddings of differing dimensions",
                record.id()
            )));
        }
        let blob: Vec<u8> = record
            .embeddings()
            .iter()
            .flat_map(|e| e.to_le_bytes())
            .collect();

        let tx = conn
            .transaction()
            .map_err(|e| RegistryError::QueryFailed(e.to_string()))?;

        tx.execute(
            "INSERT INTO animals (sequence, registered_at, images, embeddings, dimension)
             VALUES (?, ?, ?, ?, ?)",
            params![
                record.id().sequence() as i64,
                record.registered_at().to_rfc3339(),
                images_json,
                blob,
                dimension as i64,
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == ErrorCode::ConstraintViolation =>
            {
                RegistryError::DuplicateId {
                    id: record.id().to_string(),
                }
            }
            other => RegistryError::QueryFailed(other.to_string()),
        })?;

        // Keep the counter ahead of externally built ids
        tx.execute(
            "UPDATE id_sequence SET value = MAX(value, ?) WHERE name = ?",
            params![record.id().sequence() as i64, SEQUENCE_NAME],
        )
        .map_err(|e| RegistryError::QueryFailed(e.to_string()))?;

        tx.commit()
            .map_err(|e| RegistryError::QueryFailed(e.to_string()))?;

        debug!(animal_id = %record.id(), images = record.images().len(), "Record stored");
        Ok(())
    }

    fn count(&self) -> Result<usize, RegistryError> {
        let conn = self.lock()?;

        conn.query_row("SELECT COUNT(*) FROM animals", [], |row| {
            row.get::<_, i64>(0).map(|v| v as usize)
        })
        .map_err(|e| RegistryError::QueryFailed(e.to_string()))
    }

    fn all_records(&self) -> Result<Vec<AnimalRecord>, RegistryError> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(
                "SELECT sequence, registered_at, images, embeddings, dimension
                 FROM animals ORDER BY sequence",
            )
            .map_err(|e| RegistryError::QueryFailed(e.to_string()))?;

        let rows: Vec<RawRow> = stmt
            .query_map([], Self::read_row)
            .map_err(|e| RegistryError::QueryFailed(e.to_string()))?
            .collect::<Result<_, _>>()
            .map_err(|e| RegistryError::QueryFailed(e.to_string()))?;

        drop(stmt);
        drop(conn);

        rows.into_iter().map(Self::to_record).collect()
    }

    fn get(&self, id: AnimalId) -> Result<Option<AnimalRecord>, RegistryError> {
        let conn = self.lock()?;

        let raw = conn
            .query_row(
                "SELECT sequence, registered_at, images, embeddings, dimension
                 FROM animals WHERE sequence = ?",
                [id.sequence() as i64],
                Self::read_row,
            )
            .optional()
            .map_err(|e| RegistryError::QueryFailed(e.to_string()))?;

        raw.map(Self::to_record).transpose()
    }

    fn reserve_sequence(&self) -> Result<u64, RegistryError> {
        let mut conn = self.lock()?;

        // IMMEDIATE takes the write lock up front, so two processes sharing
        // the file cannot read the same value either.
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| RegistryError::QueryFailed(e.to_string()))?;

        tx.execute(
            "UPDATE id_sequence SET value = value + 1 WHERE name = ?",
            [SEQUENCE_NAME],
        )
        .map_err(|e| RegistryError::QueryFailed(e.to_string()))?;

        let value: i64 = tx
            .query_row(
                "SELECT value FROM id_sequence WHERE name = ?",
                [SEQUENCE_NAME],
                |row| row.get(0),
            )
            .map_err(|e| RegistryError::QueryFailed(e.to_string()))?;

        tx.commit()
            .map_err(|e| RegistryError::QueryFailed(e.to_string()))?;

        Ok(value as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_record(sequence: u64, images: usize) -> AnimalRecord {
        AnimalRecord::new(
            AnimalId::from_sequence(sequence),
            Utc::now(),
            (0..images).map(|i| format!("ANI{:04}_{}.jpg", sequence, i)).collect(),
            (0..images)
                .map(|i| Embedding::normalized(vec![1.0, i as f32, 0.5]))
                .collect(),
        )
        .unwrap()
    }

    fn raw_row(blob: Vec<u8>, dimension: i64) -> RawRow {
        (1, Utc::now().to_rfc3339(), "[\"a.jpg\"]".to_string(), blob, dimension)
    }

    #[test]
    fn corrupt_dimension_is_a_serialization_error() {
        for dimension in [-1, i64::MIN, 0] {
            let result = SqliteRegistry::to_record(raw_row(vec![0; 8], dimension));

            assert!(
                matches!(result, Err(RegistryError::SerializationFailed(_))),
                "dimension {} accepted",
                dimension
            );
        }
    }

    #[test]
    fn stored_columns_convert_to_record() {
        let blob = Embedding::normalized(vec![1.0, 0.0]).to_le_bytes();

        let record = SqliteRegistry::to_record(raw_row(blob, 2)).unwrap();

        assert_eq!(record.id().to_string(), "ANI0001");
        assert_eq!(record.images().to_vec(), vec!["a.jpg"]);
        assert_eq!(record.embeddings()[0].len(), 2);
    }

    #[test]
    fn sqlite_registry_creates_database() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("registry.db");

        let registry = SqliteRegistry::open(&db_path).unwrap();

        assert!(db_path.exists());
        assert_eq!(registry.count().unwrap(), 0);
    }

    #[test]
    fn sqlite_registry_stores_and_retrieves() {
        let registry = SqliteRegistry::open_in_memory().unwrap();
        let record = create_record(1, 3);

        registry.append(record.clone()).unwrap();

        let stored = registry.get(AnimalId::from_sequence(1)).unwrap().unwrap();
        assert_eq!(stored.images(), record.images());
        assert_eq!(stored.embeddings(), record.embeddings());
        // RFC 3339 keeps sub-second precision
        assert_eq!(stored.registered_at(), record.registered_at());
    }

    #[test]
    fn all_records_are_in_sequence_order() {
        let registry = SqliteRegistry::open_in_memory().unwrap();
        registry.append(create_record(2, 1)).unwrap();
        registry.append(create_record(1, 1)).unwrap();

        let ids: Vec<String> = registry
            .all_records()
            .unwrap()
            .iter()
            .map(|r| r.id().to_string())
            .collect();

        assert_eq!(ids, vec!["ANI0001", "ANI0002"]);
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let registry = SqliteRegistry::open_in_memory().unwrap();
        registry.append(create_record(1, 1)).unwrap();

        let result = registry.append(create_record(1, 1));

        assert!(matches!(result, Err(RegistryError::DuplicateId { .. })));
    }

    #[test]
    fn reservations_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("registry.db");

        {
            let registry = SqliteRegistry::open(&db_path).unwrap();
            assert_eq!(registry.reserve_sequence().unwrap(), 1);
            assert_eq!(registry.reserve_sequence().unwrap(), 2);
        }

        let registry = SqliteRegistry::open(&db_path).unwrap();
        assert_eq!(registry.reserve_sequence().unwrap(), 3);
    }

    #[test]
    fn missing_record_is_none() {
        let registry = SqliteRegistry::open_in_memory().unwrap();
        assert!(registry.get(AnimalId::from_sequence(9)).unwrap().is_none());
    }
}
