// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Top-level assembly of one agent's memory index.
//!
//! `MemoryIndex::open` wires the store, the embedding backend, both search
//! indexes, and the sync scheduler together, then starts the background
//! trigger loop and the filesystem watcher. Everything downstream hangs off
//! the handles it returns.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use recall_config::RecallConfig;
use recall_core::{EmbeddingBackend, RecallError};
use recall_embed::{CachedEmbedder, select_backend};
use recall_index::{ChunkBudget, KeywordIndex, VectorIndex};
use recall_storage::queries::{chunks, meta};
use recall_storage::{Database, VectorMeta};
use recall_sync::{SourceLayout, SourceWatcher, SyncScheduler, watch_sources};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::service::QueryService;

/// One agent's live memory index: store, embedder, indexes, scheduler.
///
/// Dropping the index stops the watcher; the scheduler's trigger loop stops
/// when the cancellation token fires.
pub struct MemoryIndex {
    db: Arc<Database>,
    embedder: Option<Arc<CachedEmbedder>>,
    vectors: Arc<VectorIndex>,
    scheduler: Arc<SyncScheduler>,
    query: recall_config::QueryConfig,
    _watcher: Option<SourceWatcher>,
}

impl MemoryIndex {
    /// Open the index for an agent, selecting an embedding backend from the
    /// configured waterfall and process environment.
    ///
    /// When no backend is usable the index still opens in keyword-only
    /// mode; sync maintains the FTS index and searches carry a vector
    /// score of zero.
    pub async fn open(
        agent_id: &str,
        workspace: &Path,
        config: &RecallConfig,
        cancel: CancellationToken,
    ) -> Result<Self, RecallError> {
        let data_dir = resolve_data_dir(&config.memory)?;
        let backend = match select_backend(&config.memory, &data_dir, cancel.clone()).await {
            Ok(selected) => {
                for skipped in &selected.skipped {
                    info!(
                        provider = %skipped.provider,
                        reason = %skipped.reason,
                        "embedding provider skipped"
                    );
                }
                Some(selected.backend)
            }
            Err(RecallError::ProviderUnavailable { missing }) => {
                warn!(%missing, "no embedding backend usable, running keyword-only");
                None
            }
            Err(e) => return Err(e),
        };
        Self::open_with_backend(agent_id, workspace, config, backend, cancel).await
    }

    /// Open with an explicit backend choice, bypassing provider selection.
    /// `None` opens in keyword-only mode.
    pub async fn open_with_backend(
        agent_id: &str,
        workspace: &Path,
        config: &RecallConfig,
        backend: Option<Arc<dyn EmbeddingBackend>>,
        cancel: CancellationToken,
    ) -> Result<Self, RecallError> {
        let memory = &config.memory;
        if !memory.enabled {
            return Err(RecallError::Config(
                "memory is disabled (memory.enabled = false)".to_string(),
            ));
        }

        let data_dir = resolve_data_dir(memory)?;
        let store_path = data_dir.join("agents").join(agent_id).join("memory.db");
        if let Some(parent) = store_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                RecallError::Internal(format!("failed to create {}: {e}", parent.display()))
            })?;
        }

        let (db, rebuilt) = Database::open_or_rebuild(&store_path).await?;
        if rebuilt {
            warn!(path = %store_path.display(), "store was unreadable, rebuilt empty");
        }
        let db = Arc::new(db);

        let embedder = backend
            .map(|b| Arc::new(CachedEmbedder::new(b, db.clone(), memory.cache.max_entries)));

        let vectors = match &embedder {
            Some(embedder) => {
                let identity = VectorMeta {
                    provider: embedder.provider_id().to_string(),
                    model: embedder.model().to_string(),
                    dims: embedder.dimensions(),
                };
                reconcile_vector_space(&db, &identity).await?;
                Arc::new(
                    VectorIndex::open(db.clone(), &identity.provider, &identity.model, identity.dims)
                        .await?,
                )
            }
            // Placeholder identity matches no stored embeddings, so every
            // vector operation is a no-op.
            None => Arc::new(VectorIndex::open_portable(db.clone(), "none", "none", 0).await?),
        };

        let layout = SourceLayout::from_config(workspace, memory);
        let budget = ChunkBudget::from_config(&memory.chunking);
        let scheduler = SyncScheduler::new(
            db.clone(),
            embedder.clone(),
            vectors.clone(),
            layout,
            budget,
            memory.sync.clone(),
            cancel.clone(),
        );

        let (trigger, passes) = mpsc::channel(1);
        tokio::spawn(Arc::clone(&scheduler).run(passes));

        let watcher = if memory.sync.watch {
            let roots = scheduler.layout().watch_roots();
            let debounce = Duration::from_millis(memory.sync.watch_debounce_ms);
            match watch_sources(&roots, debounce, trigger) {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    warn!(error = %e, "filesystem watcher unavailable, interval sync only");
                    None
                }
            }
        } else {
            None
        };

        info!(
            agent_id,
            store = %store_path.display(),
            provider = embedder.as_ref().map(|e| e.provider_id()).unwrap_or("none"),
            backend = vectors.backend().as_str(),
            "memory index open"
        );

        Ok(Self {
            db,
            embedder,
            vectors,
            scheduler,
            query: memory.query.clone(),
            _watcher: watcher,
        })
    }

    /// Build a query handle sharing this index's state.
    pub fn service(&self) -> QueryService {
        QueryService::new(
            self.db.clone(),
            self.embedder.clone(),
            self.vectors.clone(),
            KeywordIndex::new(self.db.clone()),
            self.scheduler.clone(),
            self.query.clone(),
        )
    }

    /// Run a sync pass (or join the in-flight one) and wait for it.
    pub async fn sync_now(&self) -> Result<(), RecallError> {
        self.scheduler.sync_and_wait().await
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }
}

/// Rewrite the stored vector space identity, clearing stale embeddings
/// when the provider, model, or dimensions changed since the last run.
async fn reconcile_vector_space(db: &Database, identity: &VectorMeta) -> Result<(), RecallError> {
    match meta::get_vector_meta(db).await? {
        Some(stored) if stored == *identity => Ok(()),
        stored => {
            if let Some(stored) = stored {
                info!(
                    old_provider = %stored.provider,
                    old_model = %stored.model,
                    new_provider = %identity.provider,
                    new_model = %identity.model,
                    "vector space changed, clearing embeddings"
                );
                chunks::clear_embeddings(db).await?;
            }
            meta::set_vector_meta(db, identity).await
        }
    }
}

fn resolve_data_dir(memory: &recall_config::MemoryConfig) -> Result<PathBuf, RecallError> {
    match &memory.data_dir {
        Some(dir) if !dir.is_empty() => Ok(PathBuf::from(dir)),
        _ => dirs::data_dir().map(|d| d.join("recall")).ok_or_else(|| {
            RecallError::Config(
                "no platform data directory, set memory.data_dir".to_string(),
            )
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recall_storage::Database;

    #[tokio::test]
    async fn reconcile_keeps_matching_identity() {
        let db = Database::open_in_memory().await.unwrap();
        let identity = VectorMeta {
            provider: "mock".to_string(),
            model: "m".to_string(),
            dims: 8,
        };
        reconcile_vector_space(&db, &identity).await.unwrap();
        reconcile_vector_space(&db, &identity).await.unwrap();
        assert_eq!(meta::get_vector_meta(&db).await.unwrap(), Some(identity));
    }

    #[tokio::test]
    async fn reconcile_replaces_changed_identity() {
        let db = Database::open_in_memory().await.unwrap();
        let first = VectorMeta {
            provider: "mock".to_string(),
            model: "m".to_string(),
            dims: 8,
        };
        reconcile_vector_space(&db, &first).await.unwrap();

        let second = VectorMeta {
            provider: "openai".to_string(),
            model: "text-embedding-3-small".to_string(),
            dims: 1536,
        };
        reconcile_vector_space(&db, &second).await.unwrap();
        assert_eq!(meta::get_vector_meta(&db).await.unwrap(), Some(second));
    }

    #[test]
    fn resolve_data_dir_prefers_configured_path() {
        let memory = recall_config::MemoryConfig {
            data_dir: Some("/tmp/recall-test".to_string()),
            ..test_memory_config()
        };
        assert_eq!(
            resolve_data_dir(&memory).unwrap(),
            PathBuf::from("/tmp/recall-test")
        );
    }

    fn test_memory_config() -> recall_config::MemoryConfig {
        recall_config::load_and_validate_str("").unwrap().memory
    }
}
