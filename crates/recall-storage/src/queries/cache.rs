// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding cache queries: 4-tuple keyed lookup, insert, LRU eviction.
//!
//! Recency is tracked with a monotonic sequence column rather than a
//! timestamp, so two touches in the same millisecond still order
//! deterministically.
//! Entries are a pure function of their key (same key means same content
//! and same vector), so rows are never rewritten, only inserted and
//! evicted.

use recall_core::{RecallError, blob_to_vec, vec_to_blob};

use crate::database::{Database, map_tr_err};

/// Full cache key: provider identity plus chunk content hash.
#[derive(Debug, Clone)]
pub struct CacheKey {
    pub provider: String,
    pub model: String,
    pub provider_key: String,
    pub content_hash: String,
}

/// Look up a cached vector, touching its LRU timestamp on hit.
pub async fn lookup(db: &Database, key: &CacheKey) -> Result<Option<Vec<f32>>, RecallError> {
    let key = key.clone();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT vector FROM embedding_cache
                 WHERE provider = ?1 AND model = ?2 AND provider_key = ?3 AND content_hash = ?4",
            )?;
            let blob: Option<Vec<u8>> = stmt
                .query_map(
                    rusqlite::params![key.provider, key.model, key.provider_key, key.content_hash],
                    |row| row.get(0),
                )?
                .next()
                .transpose()?;

            if blob.is_some() {
                conn.execute(
                    "UPDATE embedding_cache
                     SET last_used_seq = (SELECT COALESCE(MAX(last_used_seq), 0) + 1
                                          FROM embedding_cache)
                     WHERE provider = ?1 AND model = ?2 AND provider_key = ?3 AND content_hash = ?4",
                    rusqlite::params![key.provider, key.model, key.provider_key, key.content_hash],
                )?;
            }
            Ok(blob.map(|b| blob_to_vec(&b)))
        })
        .await
        .map_err(map_tr_err)
}

/// Insert a vector under its key, then evict least-recently-used entries
/// beyond `max_entries`.
///
/// The insert ignores conflicts: a concurrent writer that raced us computed
/// the same vector for the same key by definition.
pub async fn put(
    db: &Database,
    key: &CacheKey,
    vector: &[f32],
    max_entries: usize,
) -> Result<(), RecallError> {
    let key = key.clone();
    let dims = vector.len() as i64;
    let blob = vec_to_blob(vector);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO embedding_cache
                     (provider, model, provider_key, content_hash, vector, dims, last_used_seq)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6,
                         (SELECT COALESCE(MAX(last_used_seq), 0) + 1 FROM embedding_cache))",
                rusqlite::params![
                    key.provider,
                    key.model,
                    key.provider_key,
                    key.content_hash,
                    blob,
                    dims
                ],
            )?;
            conn.execute(
                "DELETE FROM embedding_cache WHERE rowid IN (
                     SELECT rowid FROM embedding_cache
                     ORDER BY last_used_seq ASC, rowid ASC
                     LIMIT max(0, (SELECT COUNT(*) FROM embedding_cache) - ?1)
                 )",
                rusqlite::params![max_entries as i64],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Number of cached vectors.
pub async fn count(db: &Database) -> Result<u64, RecallError> {
    db.connection()
        .call(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM embedding_cache", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(hash: &str) -> CacheKey {
        CacheKey {
            provider: "openai".to_string(),
            model: "text-embedding-3-small".to_string(),
            provider_key: "ab12cd34".to_string(),
            content_hash: hash.to_string(),
        }
    }

    #[tokio::test]
    async fn lookup_miss_then_hit() {
        let db = Database::open_in_memory().await.unwrap();
        assert!(lookup(&db, &key("h1")).await.unwrap().is_none());

        put(&db, &key("h1"), &[0.5, -0.5], 100).await.unwrap();
        let hit = lookup(&db, &key("h1")).await.unwrap().unwrap();
        assert_eq!(hit.len(), 2);
        assert!((hit[0] - 0.5).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn different_provider_key_is_a_miss() {
        let db = Database::open_in_memory().await.unwrap();
        put(&db, &key("h1"), &[1.0], 100).await.unwrap();

        let mut other_tenant = key("h1");
        other_tenant.provider_key = "ff00ff00".to_string();
        assert!(
            lookup(&db, &other_tenant).await.unwrap().is_none(),
            "switching credentials must not reuse another tenant's vectors"
        );
    }

    #[tokio::test]
    async fn eviction_keeps_most_recently_used() {
        let db = Database::open_in_memory().await.unwrap();
        for i in 0..4 {
            put(&db, &key(&format!("h{i}")), &[i as f32], 4).await.unwrap();
        }
        // Touch h0 so h1 becomes the LRU entry.
        lookup(&db, &key("h0")).await.unwrap();

        put(&db, &key("h4"), &[4.0], 4).await.unwrap();
        assert_eq!(count(&db).await.unwrap(), 4);
        assert!(lookup(&db, &key("h0")).await.unwrap().is_some());
        assert!(lookup(&db, &key("h1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_put_does_not_grow_cache() {
        let db = Database::open_in_memory().await.unwrap();
        put(&db, &key("h1"), &[1.0], 100).await.unwrap();
        put(&db, &key("h1"), &[1.0], 100).await.unwrap();
        assert_eq!(count(&db).await.unwrap(), 1);
    }
}
