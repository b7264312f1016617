// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread. Do NOT create additional Connection instances for writes.

use std::path::{Path, PathBuf};
use std::sync::Once;

use recall_core::RecallError;
use tokio_rusqlite::Connection;
use tracing::{debug, warn};

use crate::migrations::run_migrations;

static REGISTER_VEC: Once = Once::new();

/// Convert tokio_rusqlite errors into RecallError::Storage.
pub fn map_tr_err(e: tokio_rusqlite::Error) -> RecallError {
    RecallError::Storage {
        source: Box::new(e),
    }
}

/// Register the sqlite-vec extension for all subsequently opened connections.
///
/// Failure to register is tolerated: the vector index falls back to the
/// portable brute-force backend when `vec0` is unavailable.
fn register_vec_extension() {
    REGISTER_VEC.call_once(|| {
        // Safety: sqlite3_vec_init is an extension entry point with the
        // signature sqlite3_auto_extension expects; registration happens
        // once before any connection opens.
        unsafe {
            let rc = rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
                sqlite_vec::sqlite3_vec_init as *const (),
            )));
            if rc != rusqlite::ffi::SQLITE_OK {
                warn!(rc, "failed to register sqlite-vec extension");
            }
        }
    });
}

/// Handle on the per-agent SQLite store.
///
/// One store file holds chunks, vectors, the keyword index, and the
/// embedding cache, so backup and inspection are a single-file affair.
pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    /// Open (or create) the store at `path`, apply PRAGMAs, and run migrations.
    pub async fn open(path: &Path) -> Result<Self, RecallError> {
        register_vec_extension();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RecallError::Storage {
                    source: Box::new(e),
                })?;
        }

        let conn = Connection::open(path).await.map_err(|e| RecallError::Storage {
            source: Box::new(e),
        })?;
        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;",
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        conn.call(|conn| Ok(run_migrations(conn)))
            .await
            .map_err(map_tr_err)??;

        debug!(path = %path.display(), "memory store opened");
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Open the store, rebuilding from scratch if the file is unreadable.
    ///
    /// A corrupt store is moved aside to `<name>.corrupt` and a fresh one
    /// is created; the caller must then re-index every source file.
    /// Returns the database and whether a rebuild happened.
    pub async fn open_or_rebuild(path: &Path) -> Result<(Self, bool), RecallError> {
        match Self::open(path).await {
            Ok(db) => Ok((db, false)),
            Err(first_err) => {
                warn!(
                    path = %path.display(),
                    error = %first_err,
                    "store unreadable, rebuilding from source files"
                );
                let corrupt = path.with_extension("db.corrupt");
                // Also drop WAL artifacts so the fresh store starts clean.
                let _ = tokio::fs::rename(path, &corrupt).await;
                for suffix in ["-wal", "-shm"] {
                    let mut sidecar = path.as_os_str().to_owned();
                    sidecar.push(suffix);
                    let _ = tokio::fs::remove_file(PathBuf::from(sidecar)).await;
                }
                let db = Self::open(path).await.map_err(|e| {
                    RecallError::IndexCorruption {
                        detail: format!("rebuild after corruption failed: {e}"),
                    }
                })?;
                Ok((db, true))
            }
        }
    }

    /// Open an in-memory store (tests only).
    pub async fn open_in_memory() -> Result<Self, RecallError> {
        register_vec_extension();
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| RecallError::Storage {
                source: Box::new(e),
            })?;
        conn.call(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;
        conn.call(|conn| Ok(run_migrations(conn)))
            .await
            .map_err(map_tr_err)??;
        Ok(Self {
            conn,
            path: PathBuf::from(":memory:"),
        })
    }

    /// The underlying tokio-rusqlite connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Path of the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the sqlite-vec extension is loaded on this connection.
    pub async fn has_vec_extension(&self) -> bool {
        self.conn
            .call(|conn| -> Result<bool, rusqlite::Error> {
                match conn.query_row("SELECT vec_version()", [], |row| row.get::<_, String>(0)) {
                    Ok(version) => {
                        debug!(version, "sqlite-vec available");
                        Ok(true)
                    }
                    Err(_) => Ok(false),
                }
            })
            .await
            .unwrap_or(false)
    }

    /// Checkpoint the WAL and release resources.
    pub async fn close(&self) -> Result<(), RecallError> {
        self.conn
            .call(|conn| {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_creates_store_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("agents/test/memory.db");
        let db = Database::open(&path).await.unwrap();
        assert!(path.exists());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn migrations_create_schema() {
        let db = Database::open_in_memory().await.unwrap();
        let tables: Vec<String> = db
            .connection()
            .call(|conn| -> Result<Vec<String>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT name FROM sqlite_master WHERE type IN ('table', 'view') ORDER BY name",
                )?;
                let names = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(names)
            })
            .await
            .unwrap();
        for expected in [
            "files",
            "chunks",
            "embedding_cache",
            "session_cursors",
            "vector_meta",
        ] {
            assert!(
                tables.iter().any(|t| t == expected),
                "missing table {expected}, got {tables:?}"
            );
        }
    }

    #[tokio::test]
    async fn vec_extension_is_registered_for_new_connections() {
        let db = Database::open_in_memory().await.unwrap();
        assert!(db.has_vec_extension().await);
    }

    #[tokio::test]
    async fn open_or_rebuild_replaces_garbage_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("memory.db");
        tokio::fs::write(&path, b"this is not a sqlite database at all")
            .await
            .unwrap();

        let (db, rebuilt) = Database::open_or_rebuild(&path).await.unwrap();
        assert!(rebuilt, "garbage file should have triggered a rebuild");
        assert!(dir.path().join("memory.db.corrupt").exists());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn open_or_rebuild_keeps_healthy_store() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("memory.db");
        let db = Database::open(&path).await.unwrap();
        db.close().await.unwrap();
        drop(db);

        let (db, rebuilt) = Database::open_or_rebuild(&path).await.unwrap();
        assert!(!rebuilt);
        db.close().await.unwrap();
    }
}
