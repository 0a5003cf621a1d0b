//! Database schema migrations.
//!
//! Applies the vector_records schema and tracks applied versions in
//! schema_migrations.

use rusqlite::Connection;
use tracing::info;

use semindex_core::error::{IndexError, Result};

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| IndexError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| IndexError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: vector_records");
    }

    Ok(())
}

/// Version 1: vector records keyed by identity, ordered by insertion sequence.
///
/// `seq` is AUTOINCREMENT so a replaced row always sorts after every row
/// that existed before it.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS vector_records (
            seq             INTEGER PRIMARY KEY AUTOINCREMENT,
            id              TEXT NOT NULL UNIQUE,
            text            TEXT NOT NULL,
            embedding       BLOB NOT NULL,
            dimension       INTEGER NOT NULL CHECK (dimension > 0),
            published_at    INTEGER NOT NULL,
            ingested_at     INTEGER NOT NULL,
            source          TEXT NOT NULL,
            url             TEXT NOT NULL,
            tags            TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_vector_records_eviction
            ON vector_records (ingested_at ASC, seq ASC);

        INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (1, 'vector_records');
        ",
    )
    .map_err(|e| IndexError::Storage(format!("Failed to apply migration v1: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert(conn: &Connection, id: &str) -> rusqlite::Result<usize> {
        conn.execute(
            "INSERT OR REPLACE INTO vector_records
                 (id, text, embedding, dimension, published_at, ingested_at, source, url)
             VALUES (?1, 'hello', x'0000803f', 1, 0, 0, 'src', 'https://x')",
            rusqlite::params![id],
        )
    }

    #[test]
    fn test_migrations_run_once() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_replace_assigns_new_seq() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        insert(&conn, "a").unwrap();
        insert(&conn, "b").unwrap();
        insert(&conn, "a").unwrap();

        let ids: Vec<String> = conn
            .prepare("SELECT id FROM vector_records ORDER BY seq ASC")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(ids, vec!["b".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_dimension_check() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO vector_records
                 (id, text, embedding, dimension, published_at, ingested_at, source, url)
             VALUES ('bad', 't', x'', 0, 0, 0, 's', 'u')",
            [],
        );
        assert!(result.is_err());
    }
}
