// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vector similarity index over embedded chunks.
//!
//! Two interchangeable backends answer `top_k`: an accelerated scan through
//! a sqlite-vec `vec0` virtual table, and a portable brute-force cosine scan
//! over the chunk embedding BLOBs. The portable backend produces scores
//! numerically equivalent to the accelerated one, so tests and stores
//! without the extension behave identically.

use std::sync::Arc;

use rusqlite::params;
use tracing::info;

use recall_core::error::RecallError;
use recall_core::types::{cosine_similarity, vec_to_blob};
use recall_storage::Database;
use recall_storage::database::map_tr_err;
use recall_storage::queries::chunks;

/// Which scan strategy the index uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorBackend {
    Accelerated,
    Portable,
}

impl VectorBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            VectorBackend::Accelerated => "accelerated",
            VectorBackend::Portable => "portable",
        }
    }
}

/// Vector index bound to one store and one embedding identity.
pub struct VectorIndex {
    db: Arc<Database>,
    backend: VectorBackend,
    provider: String,
    model: String,
    dims: usize,
}

impl VectorIndex {
    /// Open the index, preferring the accelerated backend when the vec
    /// extension is loadable. The accelerated table is rebuilt from the
    /// chunk embeddings so it always mirrors the store at startup.
    pub async fn open(
        db: Arc<Database>,
        provider: &str,
        model: &str,
        dims: usize,
    ) -> Result<Self, RecallError> {
        let backend = if db.has_vec_extension().await {
            VectorBackend::Accelerated
        } else {
            VectorBackend::Portable
        };
        info!(backend = backend.as_str(), dims, "vector index backend");
        Self::open_with_backend(db, provider, model, dims, backend).await
    }

    /// Open with the portable backend regardless of extension availability.
    pub async fn open_portable(
        db: Arc<Database>,
        provider: &str,
        model: &str,
        dims: usize,
    ) -> Result<Self, RecallError> {
        Self::open_with_backend(db, provider, model, dims, VectorBackend::Portable).await
    }

    async fn open_with_backend(
        db: Arc<Database>,
        provider: &str,
        model: &str,
        dims: usize,
        backend: VectorBackend,
    ) -> Result<Self, RecallError> {
        let index = Self {
            db,
            backend,
            provider: provider.to_string(),
            model: model.to_string(),
            dims,
        };
        index.rebuild().await?;
        Ok(index)
    }

    pub fn backend(&self) -> VectorBackend {
        self.backend
    }

    /// Drop and repopulate the accelerated table from the chunk embeddings
    /// carrying this index's provider identity. No-op for the portable
    /// backend, which reads the BLOBs directly.
    pub async fn rebuild(&self) -> Result<(), RecallError> {
        if self.backend != VectorBackend::Accelerated {
            return Ok(());
        }

        let dims = self.dims;
        self.db
            .connection()
            .call(move |conn| {
                conn.execute_batch(&format!(
                    "DROP TABLE IF EXISTS chunk_vectors;
                     CREATE VIRTUAL TABLE chunk_vectors USING vec0(
                         chunk_id TEXT PRIMARY KEY,
                         embedding FLOAT[{dims}] distance_metric=cosine
                     );"
                ))?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;

        let vectors = chunks::embedded_vectors(&self.db, &self.provider, &self.model).await?;
        for (chunk_id, vector) in vectors {
            self.upsert(&chunk_id, &vector).await?;
        }
        Ok(())
    }

    /// Insert or replace one chunk's vector.
    pub async fn upsert(&self, chunk_id: &str, vector: &[f32]) -> Result<(), RecallError> {
        if self.backend != VectorBackend::Accelerated {
            return Ok(());
        }
        if vector.len() != self.dims {
            return Err(RecallError::Internal(format!(
                "vector has {} dims, index expects {}",
                vector.len(),
                self.dims
            )));
        }
        let chunk_id = chunk_id.to_string();
        let blob = vec_to_blob(vector);
        self.db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM chunk_vectors WHERE chunk_id = ?1",
                    params![chunk_id],
                )?;
                conn.execute(
                    "INSERT INTO chunk_vectors (chunk_id, embedding) VALUES (?1, ?2)",
                    params![chunk_id, blob],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Remove vectors for chunks that no longer exist, typically after a
    /// file's chunk set was replaced.
    pub async fn remove(&self, chunk_ids: &[String]) -> Result<(), RecallError> {
        if self.backend != VectorBackend::Accelerated || chunk_ids.is_empty() {
            return Ok(());
        }
        let ids = chunk_ids.to_vec();
        self.db
            .connection()
            .call(move |conn| {
                let tx = conn.transaction()?;
                for id in &ids {
                    tx.execute("DELETE FROM chunk_vectors WHERE chunk_id = ?1", params![id])?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Return up to `k` chunk ids most similar to the query vector, with
    /// cosine scores clamped to [0, 1], ordered by score descending and
    /// chunk id ascending on ties.
    pub async fn top_k(&self, query: &[f32], k: usize) -> Result<Vec<(String, f32)>, RecallError> {
        if k == 0 || query.is_empty() {
            return Ok(Vec::new());
        }
        match self.backend {
            VectorBackend::Accelerated => self.top_k_accelerated(query, k).await,
            VectorBackend::Portable => self.top_k_portable(query, k).await,
        }
    }

    async fn top_k_accelerated(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<(String, f32)>, RecallError> {
        let blob = vec_to_blob(query);
        let k = k as i64;
        let mut hits: Vec<(String, f32)> = self
            .db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT chunk_id, distance FROM chunk_vectors
                     WHERE embedding MATCH ?1 AND k = ?2
                     ORDER BY distance",
                )?;
                let rows = stmt.query_map(params![blob, k], |row| {
                    let id: String = row.get(0)?;
                    let distance: f64 = row.get(1)?;
                    Ok((id, distance as f32))
                })?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await
            .map_err(map_tr_err)?;

        for (_, score) in &mut hits {
            // Cosine distance is 1 - similarity.
            *score = (1.0 - *score).clamp(0.0, 1.0);
        }
        sort_hits(&mut hits);
        Ok(hits)
    }

    async fn top_k_portable(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<(String, f32)>, RecallError> {
        let vectors = chunks::embedded_vectors(&self.db, &self.provider, &self.model).await?;
        let mut hits: Vec<(String, f32)> = vectors
            .into_iter()
            .map(|(id, v)| {
                let score = cosine_similarity(query, &v).clamp(0.0, 1.0);
                (id, score)
            })
            .collect();
        sort_hits(&mut hits);
        hits.truncate(k);
        Ok(hits)
    }
}

fn sort_hits(hits: &mut [(String, f32)]) {
    hits.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
}
