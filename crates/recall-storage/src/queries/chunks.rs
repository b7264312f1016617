// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queries over the `chunks` table and its FTS5 mirror.
//!
//! Chunk sets are replaced inside a single transaction so a concurrent
//! query never observes a half-replaced file.

use recall_core::{Chunk, RecallError, blob_to_vec, vec_to_blob};

use crate::database::{Database, map_tr_err};

/// Replace a file's entire chunk set atomically.
///
/// Existing chunks (and their FTS rows, via triggers) are deleted and the
/// new set inserted in one transaction. Embeddings of the old chunks are
/// dropped with them; re-embedding is driven by the content-hash cache.
pub async fn replace_chunks(
    db: &Database,
    file_id: &str,
    chunks: &[Chunk],
) -> Result<(), RecallError> {
    let file_id = file_id.to_string();
    let chunks = chunks.to_vec();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM chunks WHERE file_id = ?1",
                rusqlite::params![file_id],
            )?;
            insert_chunks(&tx, &chunks)?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Append chunks for the unsynced tail of a transcript (delta sync).
pub async fn append_chunks(db: &Database, chunks: &[Chunk]) -> Result<(), RecallError> {
    let chunks = chunks.to_vec();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            insert_chunks(&tx, &chunks)?;
            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

fn insert_chunks(tx: &rusqlite::Transaction<'_>, chunks: &[Chunk]) -> rusqlite::Result<()> {
    let mut stmt = tx.prepare(
        "INSERT INTO chunks (id, file_id, start_line, end_line, text, content_hash)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for chunk in chunks {
        stmt.execute(rusqlite::params![
            chunk.id,
            chunk.file_id,
            chunk.start_line,
            chunk.end_line,
            chunk.text,
            chunk.content_hash,
        ])?;
    }
    Ok(())
}

/// All chunks of a file, in line order.
pub async fn chunks_for_file(db: &Database, file_id: &str) -> Result<Vec<Chunk>, RecallError> {
    let file_id = file_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, file_id, start_line, end_line, text, content_hash
                 FROM chunks WHERE file_id = ?1 ORDER BY start_line, id",
            )?;
            let chunks = stmt
                .query_map(rusqlite::params![file_id], row_to_chunk)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(chunks)
        })
        .await
        .map_err(map_tr_err)
}

/// Ids and content hashes of chunks that still lack a vector for the
/// given provider identity.
pub async fn unembedded_chunks(
    db: &Database,
    provider: &str,
    model: &str,
) -> Result<Vec<(String, String, String)>, RecallError> {
    let provider = provider.to_string();
    let model = model.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, content_hash, text FROM chunks
                 WHERE embedding IS NULL
                    OR embedding_provider IS NOT ?1
                    OR embedding_model IS NOT ?2
                 ORDER BY id",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![provider, model], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Store a chunk's embedding under the given provider identity.
pub async fn set_embedding(
    db: &Database,
    chunk_id: &str,
    provider: &str,
    model: &str,
    vector: &[f32],
) -> Result<(), RecallError> {
    let chunk_id = chunk_id.to_string();
    let provider = provider.to_string();
    let model = model.to_string();
    let dims = vector.len() as i64;
    let blob = vec_to_blob(vector);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE chunks SET embedding = ?1, embedding_provider = ?2,
                        embedding_model = ?3, dims = ?4
                 WHERE id = ?5",
                rusqlite::params![blob, provider, model, dims, chunk_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// All embedded vectors for the given provider identity (vector search
/// candidates for the portable backend).
pub async fn embedded_vectors(
    db: &Database,
    provider: &str,
    model: &str,
) -> Result<Vec<(String, Vec<f32>)>, RecallError> {
    let provider = provider.to_string();
    let model = model.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, embedding FROM chunks
                 WHERE embedding IS NOT NULL
                   AND embedding_provider = ?1 AND embedding_model = ?2",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![provider, model], |row| {
                    let id: String = row.get(0)?;
                    let blob: Vec<u8> = row.get(1)?;
                    Ok((id, blob_to_vec(&blob)))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Drop every stored embedding (used when the vector space identity changes).
///
/// Chunks and the keyword index are untouched; only vectors are cleared.
pub async fn clear_embeddings(db: &Database) -> Result<(), RecallError> {
    db.connection()
        .call(|conn| {
            conn.execute(
                "UPDATE chunks SET embedding = NULL, embedding_provider = NULL,
                        embedding_model = NULL, dims = NULL",
                [],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// BM25 keyword search over the FTS5 mirror.
///
/// Returns (chunk_id, bm25_rank) pairs ordered most relevant first.
/// SQLite's bm25() rank is lower-is-better (typically negative).
pub async fn search_bm25(
    db: &Database,
    match_query: &str,
    limit: usize,
) -> Result<Vec<(String, f64)>, RecallError> {
    let match_query = match_query.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, bm25(chunks_fts) AS rank
                 FROM chunks_fts
                 JOIN chunks c ON c.rowid = chunks_fts.rowid
                 WHERE chunks_fts MATCH ?1
                 ORDER BY bm25(chunks_fts)
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![match_query, limit as i64], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Batch chunk retrieval (after fusion), joined with the owning file's path.
pub async fn get_chunks_with_paths(
    db: &Database,
    ids: &[String],
) -> Result<Vec<(Chunk, String)>, RecallError> {
    if ids.is_empty() {
        return Ok(vec![]);
    }
    let ids = ids.to_vec();
    db.connection()
        .call(move |conn| {
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{i}")).collect();
            let sql = format!(
                "SELECT c.id, c.file_id, c.start_line, c.end_line, c.text, c.content_hash, f.path
                 FROM chunks c JOIN files f ON f.id = c.file_id
                 WHERE c.id IN ({})",
                placeholders.join(", ")
            );
            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> =
                ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();
            let rows = stmt
                .query_map(params.as_slice(), |row| {
                    Ok((row_to_chunk(row)?, row.get::<_, String>(6)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Total chunk count (gauge for instrumentation).
pub async fn count_chunks(db: &Database) -> Result<u64, RecallError> {
    db.connection()
        .call(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
        .map_err(map_tr_err)
}

fn row_to_chunk(row: &rusqlite::Row<'_>) -> Result<Chunk, rusqlite::Error> {
    Ok(Chunk {
        id: row.get(0)?,
        file_id: row.get(1)?,
        start_line: row.get(2)?,
        end_line: row.get(3)?,
        text: row.get(4)?,
        content_hash: row.get(5)?,
    })
}
