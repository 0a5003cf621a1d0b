//! Capacity-bounded record store.
//!
//! `RecordStore` owns a lazily opened [`Database`] handle. Every write runs in
//! a transaction, so a failed `put_batch` or `evict_to_capacity` leaves the
//! previously committed records untouched. The handle is dropped on `close`
//! and reopened on the next operation.

use rusqlite::{params, Connection, Row};
use tracing::{debug, info, warn};

use semindex_core::config::{StorageConfig, StorageMedium};
use semindex_core::error::{IndexError, Result};
use semindex_core::types::{from_millis, to_millis, VectorRecord};

use crate::db::Database;

const SELECT_COLUMNS: &str =
    "id, text, embedding, dimension, published_at, ingested_at, source, url, tags";

/// Lifecycle of the store's cached handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    /// No operation has touched the medium yet.
    Unopened,
    /// A handle is cached.
    Open,
    /// The handle was closed or invalidated; the next operation reopens it.
    Closed,
}

/// Durable keyed storage of vector records with oldest-first eviction.
#[derive(Debug)]
pub struct RecordStore {
    config: StorageConfig,
    dimension: usize,
    db: Option<Database>,
    state: StoreState,
}

impl RecordStore {
    /// Create a store. Nothing is opened until the first operation.
    pub fn new(config: StorageConfig, dimension: usize) -> Self {
        Self {
            config,
            dimension,
            db: None,
            state: StoreState::Unopened,
        }
    }

    /// False when the configured medium offers no storage at all.
    pub fn is_available(&self) -> bool {
        self.config.medium != StorageMedium::Disabled
    }

    /// True when records live in a file that survives a closed handle.
    pub fn is_file_backed(&self) -> bool {
        self.config.medium == StorageMedium::Sqlite
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn state(&self) -> StoreState {
        self.state
    }

    /// Return the cached handle, opening one if none is cached.
    ///
    /// A cached handle whose medium vanished is discarded and the call fails
    /// with `HandleInvalidated`; the following call opens a fresh handle.
    pub fn open(&mut self) -> Result<&mut Database> {
        let db = match self.db.take() {
            Some(db) if db.is_live() => db,
            Some(db) => {
                warn!(path = ?db.path(), "Vector database vanished; dropping stale handle");
                db.discard();
                self.state = StoreState::Closed;
                return Err(IndexError::HandleInvalidated);
            }
            None => {
                let db = Database::open(&self.config)?;
                let purged = purge_foreign_dimensions(db.conn(), self.dimension)?;
                if purged > 0 {
                    warn!(
                        purged,
                        dimension = self.dimension,
                        "Removed records with a different embedding dimension"
                    );
                }
                self.state = StoreState::Open;
                db
            }
        };
        Ok(self.db.insert(db))
    }

    /// Drop the cached handle. The next operation reopens it.
    pub fn close(&mut self) {
        if let Some(db) = self.db.take() {
            db.discard();
            self.state = StoreState::Closed;
            debug!("Vector database handle closed");
        }
    }

    /// Upsert a single record by id.
    pub fn put(&mut self, record: &VectorRecord) -> Result<()> {
        self.put_batch(std::slice::from_ref(record)).map(|_| ())
    }

    /// Upsert records by id in one transaction.
    ///
    /// Returns the number of rows written.
    pub fn put_batch(&mut self, records: &[VectorRecord]) -> Result<usize> {
        let dimension = self.dimension;
        let db = self.open()?;
        let tx = db
            .conn_mut()
            .transaction()
            .map_err(|e| IndexError::Storage(format!("Failed to begin transaction: {}", e)))?;
        let written = insert_records(&tx, records, dimension)?;
        tx.commit()
            .map_err(|e| IndexError::Storage(format!("Failed to commit records: {}", e)))?;
        Ok(written)
    }

    /// Upsert records and evict down to capacity in one transaction.
    ///
    /// Returns `(written, evicted)`.
    pub fn commit_batch(&mut self, records: &[VectorRecord]) -> Result<(usize, usize)> {
        let dimension = self.dimension;
        let capacity = self.config.capacity;
        let db = self.open()?;
        let tx = db
            .conn_mut()
            .transaction()
            .map_err(|e| IndexError::Storage(format!("Failed to begin transaction: {}", e)))?;
        let written = insert_records(&tx, records, dimension)?;
        let evicted = evict_oldest(&tx, capacity)?;
        tx.commit()
            .map_err(|e| IndexError::Storage(format!("Failed to commit batch: {}", e)))?;

        if evicted > 0 {
            info!(evicted, capacity, "Evicted oldest records");
        }
        Ok((written, evicted))
    }

    /// Delete the oldest records (by `ingested_at`, then insertion order)
    /// until the count equals capacity. Returns the number deleted.
    pub fn evict_to_capacity(&mut self) -> Result<usize> {
        let capacity = self.config.capacity;
        let db = self.open()?;
        let tx = db
            .conn_mut()
            .transaction()
            .map_err(|e| IndexError::Storage(format!("Failed to begin transaction: {}", e)))?;
        let evicted = evict_oldest(&tx, capacity)?;
        tx.commit()
            .map_err(|e| IndexError::Storage(format!("Failed to commit eviction: {}", e)))?;

        if evicted > 0 {
            info!(evicted, capacity, "Evicted oldest records");
        }
        Ok(evicted)
    }

    /// All records in insertion order.
    pub fn get_all(&mut self) -> Result<Vec<VectorRecord>> {
        let db = self.open()?;
        let conn = db.conn();
        let mut stmt = conn
            .prepare_cached(&format!(
                "SELECT {} FROM vector_records ORDER BY seq ASC",
                SELECT_COLUMNS
            ))
            .map_err(|e| IndexError::Storage(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| Ok(row_to_record(row)))
            .map_err(|e| IndexError::Storage(e.to_string()))?;

        let mut records = Vec::new();
        for row in rows {
            let record = row.map_err(|e| IndexError::Storage(e.to_string()))??;
            records.push(record);
        }
        Ok(records)
    }

    /// Number of stored records.
    pub fn count(&mut self) -> Result<usize> {
        let db = self.open()?;
        count_records(db.conn())
    }

    /// Delete every record. Returns the number deleted.
    pub fn clear(&mut self) -> Result<usize> {
        let db = self.open()?;
        let deleted = db
            .conn()
            .execute("DELETE FROM vector_records", [])
            .map_err(|e| IndexError::Storage(format!("Failed to clear records: {}", e)))?;
        info!(deleted, "Vector store cleared");
        Ok(deleted)
    }
}

fn insert_records(conn: &Connection, records: &[VectorRecord], dimension: usize) -> Result<usize> {
    let mut stmt = conn
        .prepare_cached(
            "INSERT OR REPLACE INTO vector_records
                 (id, text, embedding, dimension, published_at, ingested_at, source, url, tags)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .map_err(|e| IndexError::Storage(e.to_string()))?;

    for record in records {
        if record.embedding.len() != dimension {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                got: record.embedding.len(),
            });
        }
        let tags = record
            .tags
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        stmt.execute(params![
            record.id,
            record.text,
            encode_embedding(&record.embedding),
            dimension as i64,
            to_millis(record.published_at),
            to_millis(record.ingested_at),
            record.source,
            record.url,
            tags,
        ])
        .map_err(|e| IndexError::Storage(format!("Failed to write record: {}", e)))?;
    }

    Ok(records.len())
}

fn evict_oldest(conn: &Connection, capacity: usize) -> Result<usize> {
    let count = count_records(conn)?;
    if count <= capacity {
        return Ok(0);
    }

    let excess = (count - capacity) as i64;
    conn.execute(
        "DELETE FROM vector_records WHERE seq IN (
             SELECT seq FROM vector_records ORDER BY ingested_at ASC, seq ASC LIMIT ?1
         )",
        params![excess],
    )
    .map_err(|e| IndexError::Storage(format!("Failed to evict records: {}", e)))
}

fn count_records(conn: &Connection) -> Result<usize> {
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM vector_records", [], |row| row.get(0))
        .map_err(|e| IndexError::Storage(format!("Failed to count records: {}", e)))?;
    Ok(count as usize)
}

/// Rows written under a different dimension can never be scored.
fn purge_foreign_dimensions(conn: &Connection, dimension: usize) -> Result<usize> {
    conn.execute(
        "DELETE FROM vector_records WHERE dimension != ?1",
        params![dimension as i64],
    )
    .map_err(|e| IndexError::Storage(format!("Failed to purge foreign dimensions: {}", e)))
}

fn row_to_record(row: &Row<'_>) -> Result<VectorRecord> {
    let get_err = |e: rusqlite::Error| IndexError::Storage(e.to_string());

    let dimension: i64 = row.get(3).map_err(get_err)?;
    let blob: Vec<u8> = row.get(2).map_err(get_err)?;
    let published_ms: i64 = row.get(4).map_err(get_err)?;
    let ingested_ms: i64 = row.get(5).map_err(get_err)?;
    let tags: Option<String> = row.get(8).map_err(get_err)?;

    Ok(VectorRecord {
        id: row.get(0).map_err(get_err)?,
        text: row.get(1).map_err(get_err)?,
        embedding: decode_embedding(&blob, dimension as usize)?,
        published_at: from_millis(published_ms).ok_or_else(|| {
            IndexError::Storage(format!("Invalid published_at: {}", published_ms))
        })?,
        ingested_at: from_millis(ingested_ms).ok_or_else(|| {
            IndexError::Storage(format!("Invalid ingested_at: {}", ingested_ms))
        })?,
        source: row.get(6).map_err(get_err)?,
        url: row.get(7).map_err(get_err)?,
        tags: tags.as_deref().map(serde_json::from_str).transpose()?,
    })
}

/// Little-endian f32 encoding.
pub fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(std::mem::size_of_val(vector));
    for &value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Inverse of [`encode_embedding`]; the blob must hold exactly `dimension` values.
pub fn decode_embedding(blob: &[u8], dimension: usize) -> Result<Vec<f32>> {
    let expected = dimension * std::mem::size_of::<f32>();
    if blob.len() != expected {
        return Err(IndexError::Storage(format!(
            "Invalid embedding byte length: expected {}, got {}",
            expected,
            blob.len()
        )));
    }

    Ok(blob
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
