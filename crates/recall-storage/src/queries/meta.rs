// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vector space identity: which provider/model/dims the stored vectors
//! belong to. A mismatch at startup clears all embeddings.

use recall_core::RecallError;

use crate::database::{Database, map_tr_err};

/// Identity of the vector space currently indexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorMeta {
    pub provider: String,
    pub model: String,
    pub dims: usize,
}

/// Read the stored vector space identity, if any.
pub async fn get_vector_meta(db: &Database) -> Result<Option<VectorMeta>, RecallError> {
    db.connection()
        .call(|conn| {
            let mut stmt =
                conn.prepare("SELECT provider, model, dims FROM vector_meta WHERE id = 1")?;
            let meta = stmt
                .query_map([], |row| {
                    Ok(VectorMeta {
                        provider: row.get(0)?,
                        model: row.get(1)?,
                        dims: row.get::<_, i64>(2)? as usize,
                    })
                })?
                .next()
                .transpose()?;
            Ok(meta)
        })
        .await
        .map_err(map_tr_err)
}

/// Record the vector space identity (single row, replaced on change).
pub async fn set_vector_meta(db: &Database, meta: &VectorMeta) -> Result<(), RecallError> {
    let meta = meta.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO vector_meta (id, provider, model, dims) VALUES (1, ?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET
                     provider = excluded.provider,
                     model = excluded.model,
                     dims = excluded.dims",
                rusqlite::params![meta.provider, meta.model, meta.dims as i64],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
