// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queries over the `files` table (source files tracked by the scheduler).

use recall_core::{RecallError, SourceFile, SourceKind};

use crate::database::{Database, map_tr_err};

/// Insert or update a source file record.
pub async fn upsert_file(db: &Database, file: &SourceFile) -> Result<(), RecallError> {
    let file = file.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO files (id, path, kind, content_hash, size_bytes, mtime, indexed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                     content_hash = excluded.content_hash,
                     size_bytes = excluded.size_bytes,
                     mtime = excluded.mtime,
                     indexed_at = excluded.indexed_at",
                rusqlite::params![
                    file.id,
                    file.path,
                    file.kind.as_str(),
                    file.content_hash,
                    file.size_bytes as i64,
                    file.mtime,
                    file.indexed_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch a source file by id.
pub async fn get_file(db: &Database, id: &str) -> Result<Option<SourceFile>, RecallError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, path, kind, content_hash, size_bytes, mtime, indexed_at
                 FROM files WHERE id = ?1",
            )?;
            let mut rows = stmt.query_map(rusqlite::params![id], row_to_file)?;
            match rows.next() {
                Some(row) => Ok(Some(row?)),
                None => Ok(None),
            }
        })
        .await
        .map_err(map_tr_err)
}

/// List every tracked source file.
pub async fn list_files(db: &Database) -> Result<Vec<SourceFile>, RecallError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, path, kind, content_hash, size_bytes, mtime, indexed_at
                 FROM files ORDER BY path",
            )?;
            let files = stmt
                .query_map([], row_to_file)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(files)
        })
        .await
        .map_err(map_tr_err)
}

/// Remove a file and, via cascade, its chunk set and session cursor.
pub async fn delete_file(db: &Database, id: &str) -> Result<(), RecallError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute("DELETE FROM files WHERE id = ?1", rusqlite::params![id])?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

fn row_to_file(row: &rusqlite::Row<'_>) -> Result<SourceFile, rusqlite::Error> {
    let kind: String = row.get(2)?;
    Ok(SourceFile {
        id: row.get(0)?,
        path: row.get(1)?,
        kind: SourceKind::from_str_value(&kind),
        content_hash: row.get(3)?,
        size_bytes: row.get::<_, i64>(4)? as u64,
        mtime: row.get(5)?,
        indexed_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_core::file_id_for_path;

    fn make_file(path: &str, hash: &str) -> SourceFile {
        SourceFile {
            id: file_id_for_path(path),
            path: path.to_string(),
            kind: SourceKind::Note,
            content_hash: hash.to_string(),
            size_bytes: 42,
            mtime: 1_700_000_000,
            indexed_at: "2026-03-01T00:00:00.000Z".to_string(),
        }
    }

    #[tokio::test]
    async fn upsert_and_get_roundtrip() {
        let db = Database::open_in_memory().await.unwrap();
        let file = make_file("/notes/MEMORY.md", "abc");
        upsert_file(&db, &file).await.unwrap();

        let got = get_file(&db, &file.id).await.unwrap().unwrap();
        assert_eq!(got.path, "/notes/MEMORY.md");
        assert_eq!(got.content_hash, "abc");
        assert_eq!(got.kind, SourceKind::Note);
    }

    #[tokio::test]
    async fn upsert_updates_hash_in_place() {
        let db = Database::open_in_memory().await.unwrap();
        let mut file = make_file("/notes/MEMORY.md", "v1");
        upsert_file(&db, &file).await.unwrap();
        file.content_hash = "v2".to_string();
        upsert_file(&db, &file).await.unwrap();

        let all = list_files(&db).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].content_hash, "v2");
    }

    #[tokio::test]
    async fn delete_removes_file() {
        let db = Database::open_in_memory().await.unwrap();
        let file = make_file("/notes/2026-03-01.md", "h");
        upsert_file(&db, &file).await.unwrap();
        delete_file(&db, &file.id).await.unwrap();
        assert!(get_file(&db, &file.id).await.unwrap().is_none());
    }
}
