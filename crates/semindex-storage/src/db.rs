//! Database connection management.
//!
//! A `Database` is one open SQLite handle on the configured medium. It is
//! owned by exactly one `RecordStore`, so no interior locking is needed.
//! File-backed handles remember their path so that an out-of-band deletion
//! of the database file can be detected before the next operation.

use std::path::{Path, PathBuf};

use rusqlite::Connection;
use tracing::{debug, info};

use semindex_core::config::{StorageConfig, StorageMedium};
use semindex_core::error::{IndexError, Result};

use crate::migrations;

/// SQLite sidecar suffixes written in WAL mode.
const SIDECAR_SUFFIXES: [&str; 2] = ["-wal", "-shm"];

/// An open SQLite handle.
pub struct Database {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Database {
    /// Open the medium described by `config` and run pending migrations.
    ///
    /// Returns `IndexError::Unavailable` for the disabled medium.
    pub fn open(config: &StorageConfig) -> Result<Self> {
        match config.medium {
            StorageMedium::Sqlite => Self::open_file(&config.resolved_path()),
            StorageMedium::Memory => Self::in_memory(),
            StorageMedium::Disabled => Err(IndexError::Unavailable),
        }
    }

    /// Open (or create) a database file at the given path.
    ///
    /// Configures WAL mode and synchronous=NORMAL.
    pub fn open_file(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| IndexError::Storage(format!("Failed to open database: {}", e)))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -16384;",
        )
        .map_err(|e| IndexError::Storage(format!("Failed to set pragmas: {}", e)))?;

        migrations::run_migrations(&conn)?;
        info!("Vector database opened at {}", path.display());

        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Open a private in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| IndexError::Storage(format!("Failed to open in-memory db: {}", e)))?;

        migrations::run_migrations(&conn)?;
        debug!("In-memory vector database opened");

        Ok(Self { conn, path: None })
    }

    /// Whether the medium behind this handle still exists.
    ///
    /// Always true for in-memory databases.
    pub fn is_live(&self) -> bool {
        self.path.as_deref().map_or(true, Path::exists)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Close the handle, discarding WAL sidecars if the main file is gone.
    ///
    /// A database recreated at the same path must not pick up the old
    /// file's sidecars.
    pub fn discard(self) {
        let path = self.path.clone();
        drop(self);
        if let Some(path) = path.filter(|p| !p.exists()) {
            for suffix in SIDECAR_SUFFIXES {
                let mut sidecar = path.clone().into_os_string();
                sidecar.push(suffix);
                let _ = std::fs::remove_file(PathBuf::from(sidecar));
            }
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("path", &self.path).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_records(db: &Database) -> i64 {
        db.conn()
            .query_row("SELECT COUNT(*) FROM vector_records", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_in_memory_database() {
        let db = Database::in_memory().unwrap();
        assert_eq!(count_records(&db), 0);
        assert!(db.is_live());
        assert!(db.path().is_none());
    }

    #[test]
    fn test_file_database_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("vectors.db");
        let db = Database::open_file(&path).unwrap();

        assert_eq!(count_records(&db), 0);
        assert!(path.exists());
        assert!(db.is_live());
    }

    #[test]
    fn test_wal_mode_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_file(&dir.path().join("wal.db")).unwrap();
        let mode: String = db
            .conn()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "wal");
    }

    #[test]
    fn test_deleted_file_is_not_live() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.db");
        let db = Database::open_file(&path).unwrap();

        std::fs::remove_file(&path).unwrap();
        assert!(!db.is_live());
    }

    #[test]
    fn test_discard_removes_orphaned_sidecars() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orphan.db");
        let db = Database::open_file(&path).unwrap();
        db.conn()
            .execute("CREATE TABLE scratch (x INTEGER)", [])
            .unwrap();

        std::fs::remove_file(&path).unwrap();
        db.discard();

        assert!(!dir.path().join("orphan.db-wal").exists());
        assert!(!dir.path().join("orphan.db-shm").exists());
    }

    #[test]
    fn test_disabled_medium_is_unavailable() {
        let err = Database::open(&StorageConfig::disabled()).unwrap_err();
        assert!(matches!(err, IndexError::Unavailable));
    }

    #[test]
    fn test_open_memory_medium() {
        let db = Database::open(&StorageConfig::memory(10)).unwrap();
        assert!(db.path().is_none());
    }
}
