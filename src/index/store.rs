//! SQLite-backed persistence for the trial collection
//!
//! One row per trial: retrieval document, display metadata (JSON), and the
//! embedding vector as a little-endian f32 blob. The store is the durable
//! source of truth; the in-memory HNSW graph is rebuilt from it on open.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;

use super::IndexError;
use crate::model::TrialMetadata;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// A persisted trial entry with its embedding
#[derive(Debug, Clone)]
pub struct StoredEntry {
    pub nct_id: String,
    pub document: String,
    pub metadata: TrialMetadata,
    pub vector: Vec<f32>,
}

/// Trial store with migration support
pub struct TrialStore {
    pool: DbPool,
}

impl TrialStore {
    /// Open (or create) the store at the given path
    pub fn open(db_path: &Path) -> Result<Self, IndexError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                IndexError::Initialization(format!(
                    "Failed to create store directory {:?}: {}",
                    parent, e
                ))
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path);

        let pool = Pool::builder()
            .max_size(8)
            .build(manager)
            .map_err(|e| IndexError::Pool(e.to_string()))?;

        {
            let conn = pool.get().map_err(|e| IndexError::Pool(e.to_string()))?;

            // WAL mode so concurrent match requests can read while one
            // connection writes
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA busy_timeout = 5000;
                ",
            )?;
        }

        let store = Self { pool };
        store.migrate()?;

        Ok(store)
    }

    fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>, IndexError> {
        self.pool.get().map_err(|e| IndexError::Pool(e.to_string()))
    }

    /// Run database migrations
    fn migrate(&self) -> Result<(), IndexError> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM _migrations",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying trial store migration {}", version);

                conn.execute_batch(migration)?;

                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    /// Atomically-per-batch replace the whole collection.
    ///
    /// Existing rows are deleted first, then the new set is inserted in
    /// `batch_size` chunks, one transaction per chunk. There is no
    /// cross-batch rollback: a failing batch reports its index and leaves
    /// the earlier batches committed. Reindexing is an offline maintenance
    /// operation, so the partial state is accepted rather than hidden.
    pub fn replace_all(&self, entries: &[StoredEntry], batch_size: usize) -> Result<(), IndexError> {
        let mut conn = self.get_conn()?;

        let existing = self.count()?;
        if existing > 0 {
            tracing::info!("Clearing {} existing trial entries", existing);
            conn.execute("DELETE FROM trials", [])?;
        }

        let batch_size = batch_size.max(1);
        for (batch, chunk) in entries.chunks(batch_size).enumerate() {
            let tx = conn
                .transaction()
                .map_err(|source| IndexError::BatchInsert { batch, source })?;

            for entry in chunk {
                let metadata_json = serde_json::to_string(&entry.metadata).map_err(|source| {
                    IndexError::Metadata {
                        nct_id: entry.nct_id.clone(),
                        source,
                    }
                })?;

                tx.execute(
                    "INSERT OR REPLACE INTO trials (nct_id, document, metadata, vector)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        entry.nct_id,
                        entry.document,
                        metadata_json,
                        vector_to_blob(&entry.vector)
                    ],
                )
                .map_err(|source| IndexError::BatchInsert { batch, source })?;
            }

            tx.commit()
                .map_err(|source| IndexError::BatchInsert { batch, source })?;

            tracing::debug!(
                "Stored batch {}/{}",
                batch + 1,
                entries.len().div_ceil(batch_size)
            );
        }

        Ok(())
    }

    /// Load every stored entry (used to rebuild the in-memory index)
    pub fn load_all(&self) -> Result<Vec<StoredEntry>, IndexError> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT nct_id, document, metadata, vector FROM trials ORDER BY nct_id")?;

        let mut rows = stmt.query([])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(Self::entry_from_row(
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
            )?);
        }

        Ok(entries)
    }

    /// Fetch a single entry by registry identifier
    pub fn get(&self, nct_id: &str) -> Result<Option<StoredEntry>, IndexError> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT nct_id, document, metadata, vector FROM trials WHERE nct_id = ?1")?;

        let mut rows = stmt.query([nct_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::entry_from_row(
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
            )?)),
            None => Ok(None),
        }
    }

    /// Current entry count (diagnostics, not correctness)
    pub fn count(&self) -> Result<usize, IndexError> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM trials", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn entry_from_row(
        nct_id: String,
        document: String,
        metadata_json: String,
        blob: Vec<u8>,
    ) -> Result<StoredEntry, IndexError> {
        let metadata: TrialMetadata =
            serde_json::from_str(&metadata_json).map_err(|source| IndexError::Metadata {
                nct_id: nct_id.clone(),
                source,
            })?;

        let vector = blob_to_vector(&blob).ok_or_else(|| IndexError::CorruptVector {
            nct_id: nct_id.clone(),
        })?;

        Ok(StoredEntry {
            nct_id,
            document,
            metadata,
            vector,
        })
    }
}

fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn blob_to_vector(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    )
}

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: trial collection
    r#"
    CREATE TABLE trials (
        nct_id TEXT PRIMARY KEY,
        document TEXT NOT NULL,
        metadata TEXT NOT NULL,
        vector BLOB NOT NULL
    );
    "#,
];

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_entry(nct_id: &str) -> StoredEntry {
        StoredEntry {
            nct_id: nct_id.to_string(),
            document: format!("Title: Trial {}", nct_id),
            metadata: TrialMetadata {
                nct_id: nct_id.to_string(),
                title: format!("Trial {}", nct_id),
                conditions: "Lung Cancer".to_string(),
                status: "RECRUITING".to_string(),
                phase: "PHASE2".to_string(),
                min_age: "18 Years".to_string(),
                max_age: "99 Years".to_string(),
                gender: "ALL".to_string(),
                locations: "Boston, MA".to_string(),
            },
            vector: vec![0.1, 0.2, 0.3],
        }
    }

    #[test]
    fn test_store_creation_and_migrations() {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("trials.db");

        let store = TrialStore::open(&db_path).unwrap();
        assert!(db_path.exists());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_replace_all_and_load() {
        let temp = TempDir::new().unwrap();
        let store = TrialStore::open(&temp.path().join("trials.db")).unwrap();

        let entries = vec![sample_entry("NCT001"), sample_entry("NCT002")];
        store.replace_all(&entries, 32).unwrap();
        assert_eq!(store.count().unwrap(), 2);

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].vector, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_replace_all_is_wholesale() {
        let temp = TempDir::new().unwrap();
        let store = TrialStore::open(&temp.path().join("trials.db")).unwrap();

        store
            .replace_all(&[sample_entry("NCT001"), sample_entry("NCT002")], 32)
            .unwrap();
        store.replace_all(&[sample_entry("NCT003")], 32).unwrap();

        assert_eq!(store.count().unwrap(), 1);
        assert!(store.get("NCT001").unwrap().is_none());
        assert!(store.get("NCT003").unwrap().is_some());
    }

    #[test]
    fn test_replace_all_small_batches() {
        let temp = TempDir::new().unwrap();
        let store = TrialStore::open(&temp.path().join("trials.db")).unwrap();

        let entries: Vec<StoredEntry> = (0..7)
            .map(|i| sample_entry(&format!("NCT{:03}", i)))
            .collect();
        store.replace_all(&entries, 2).unwrap();

        assert_eq!(store.count().unwrap(), 7);
    }

    #[test]
    fn test_persistence_across_reopen() {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("trials.db");

        {
            let store = TrialStore::open(&db_path).unwrap();
            store.replace_all(&[sample_entry("NCT042")], 32).unwrap();
        }

        let store = TrialStore::open(&db_path).unwrap();
        assert_eq!(store.count().unwrap(), 1);
        let entry = store.get("NCT042").unwrap().unwrap();
        assert_eq!(entry.metadata.conditions, "Lung Cancer");
        assert_eq!(entry.vector.len(), 3);
    }

    #[test]
    fn test_blob_roundtrip() {
        let vector = vec![1.0_f32, -0.5, 0.0, 3.25];
        let blob = vector_to_blob(&vector);
        assert_eq!(blob_to_vector(&blob).unwrap(), vector);
        assert!(blob_to_vector(&blob[..5]).is_none());
    }
}
