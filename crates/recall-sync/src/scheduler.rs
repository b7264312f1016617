// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Single-flight sync scheduling.
//!
//! All triggers (debounced watch events, the interval sweep, pre-query
//! catch-up) funnel into one pass per index. A trigger arriving while a
//! pass is running awaits that pass instead of starting another. A pass
//! walks the discovered sources, replaces chunk sets whose content hash
//! changed, drops files that disappeared, runs session delta sync, and
//! finishes with one embedding backfill over every chunk still missing a
//! vector under the current provider identity. Embedding failures degrade
//! to keyword-only until a later pass succeeds; they never fail the pass.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use recall_config::SyncConfig;
use recall_core::error::RecallError;
use recall_core::types::{Chunk, SourceFile, SourceKind, content_hash, file_id_for_path};
use recall_embed::CachedEmbedder;
use recall_index::chunker::{self, ChunkBudget};
use recall_index::vector::VectorIndex;
use recall_storage::Database;
use recall_storage::queries::{chunks, cursors, files};

use crate::session::{SessionPlan, plan_session_sync};
use crate::sources::{DiscoveredFile, SourceLayout};

/// How many chunk texts go into one embedding request.
const EMBED_BATCH: usize = 64;

struct Flight {
    running: bool,
    started: u64,
}

/// Per-index sync scheduler. Shared behind `Arc`.
pub struct SyncScheduler {
    db: Arc<Database>,
    /// None when no embedding backend is usable; sync then maintains the
    /// keyword index only.
    embedder: Option<Arc<CachedEmbedder>>,
    vectors: Arc<VectorIndex>,
    layout: SourceLayout,
    budget: ChunkBudget,
    config: SyncConfig,
    cancel: CancellationToken,
    flight: Mutex<Flight>,
    done: watch::Sender<u64>,
}

impl SyncScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<Database>,
        embedder: Option<Arc<CachedEmbedder>>,
        vectors: Arc<VectorIndex>,
        layout: SourceLayout,
        budget: ChunkBudget,
        config: SyncConfig,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        let (done, _) = watch::channel(0u64);
        Arc::new(Self {
            db,
            embedder,
            vectors,
            layout,
            budget,
            config,
            cancel,
            flight: Mutex::new(Flight {
                running: false,
                started: 0,
            }),
            done,
        })
    }

    pub fn layout(&self) -> &SourceLayout {
        &self.layout
    }

    /// Ensure a pass is running and return the generation that will cover
    /// this request. Coalesces into an in-flight pass when one exists.
    pub fn request_pass(self: &Arc<Self>) -> u64 {
        let mut flight = self.flight.lock().unwrap_or_else(|e| e.into_inner());
        if flight.running {
            return flight.started;
        }
        flight.running = true;
        flight.started += 1;
        let generation = flight.started;
        drop(flight);

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let started = Instant::now();
            if let Err(e) = this.run_pass().await {
                warn!(error = %e, "sync pass failed");
            }
            debug!(generation, elapsed_ms = started.elapsed().as_millis() as u64, "sync pass done");

            let mut flight = this.flight.lock().unwrap_or_else(|e| e.into_inner());
            flight.running = false;
            drop(flight);
            let _ = this.done.send(generation);
        });
        generation
    }

    /// Trigger a pass (or join the running one) and wait for it to finish.
    pub async fn sync_and_wait(self: &Arc<Self>) -> Result<(), RecallError> {
        let generation = self.request_pass();
        let mut done = self.done.subscribe();
        while *done.borrow() < generation {
            done.changed()
                .await
                .map_err(|_| RecallError::Internal("sync scheduler dropped".to_string()))?;
        }
        Ok(())
    }

    /// Pre-query catch-up, bounded by `on_search_timeout_ms`.
    ///
    /// Returns true when the query should be flagged possibly stale: the
    /// pass kept running past the budget and the query proceeds against
    /// the last-good index.
    pub async fn catch_up(self: &Arc<Self>) -> bool {
        let budget = Duration::from_millis(self.config.on_search_timeout_ms);
        match tokio::time::timeout(budget, self.sync_and_wait()).await {
            Ok(Ok(())) => false,
            Ok(Err(e)) => {
                warn!(error = %e, "catch-up sync failed, serving last-good index");
                true
            }
            Err(_) => {
                debug!(budget_ms = self.config.on_search_timeout_ms, "catch-up sync timed out");
                true
            }
        }
    }

    /// Long-running trigger loop: interval sweeps plus watcher triggers.
    ///
    /// The interval's immediate first tick doubles as the session-start
    /// sweep. Runs until cancellation.
    pub async fn run(self: Arc<Self>, mut triggers: mpsc::Receiver<()>) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.interval_minutes.max(1) * 60));
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("sync scheduler stopping");
                    return;
                }
                _ = interval.tick() => {
                    self.request_pass();
                }
                received = triggers.recv() => {
                    if received.is_none() {
                        return;
                    }
                    self.request_pass();
                }
            }
        }
    }

    async fn run_pass(&self) -> Result<(), RecallError> {
        metrics::counter!("recall_sync_passes_total").increment(1);

        let discovered = self.layout.discover();
        let known: HashMap<String, SourceFile> = files::list_files(&self.db)
            .await?
            .into_iter()
            .map(|f| (f.id.clone(), f))
            .collect();

        self.drop_deleted(&discovered, &known).await?;

        for file in &discovered {
            if self.cancel.is_cancelled() {
                info!("sync pass cancelled between files");
                return Ok(());
            }
            let file_id = file_id_for_path(&file.path.to_string_lossy());
            let result = match file.kind {
                SourceKind::Note => self.sync_note(file, &file_id, known.get(&file_id)).await,
                SourceKind::Session => self.sync_session(file, &file_id, known.get(&file_id)).await,
            };
            if let Err(e) = result {
                // One bad file never aborts the pass for the others.
                warn!(path = %file.path.display(), error = %e, "file sync failed, skipping");
            }
        }

        self.embed_missing().await;
        Ok(())
    }

    /// Remove index state for files that no longer exist on disk.
    async fn drop_deleted(
        &self,
        discovered: &[DiscoveredFile],
        known: &HashMap<String, SourceFile>,
    ) -> Result<(), RecallError> {
        let on_disk: Vec<String> = discovered
            .iter()
            .map(|f| file_id_for_path(&f.path.to_string_lossy()))
            .collect();
        for (id, file) in known {
            if on_disk.contains(id) {
                continue;
            }
            let old: Vec<String> = chunks::chunks_for_file(&self.db, id)
                .await?
                .into_iter()
                .map(|c| c.id)
                .collect();
            files::delete_file(&self.db, id).await?;
            self.vectors.remove(&old).await?;
            info!(path = %file.path, "dropped deleted source file");
        }
        Ok(())
    }

    /// Full re-chunk of a note file whose content hash changed.
    ///
    /// The file is re-read after chunking to catch a concurrent writer;
    /// one retry is allowed, a second change raises `SyncConflict` and
    /// leaves the file dirty for the next pass.
    async fn sync_note(
        &self,
        file: &DiscoveredFile,
        file_id: &str,
        existing: Option<&SourceFile>,
    ) -> Result<(), RecallError> {
        let path = &file.path;
        let mut text = read_file(path).await?;
        let mut hash = content_hash(&text);
        if existing.map(|f| f.content_hash.as_str()) == Some(hash.as_str()) {
            return Ok(());
        }

        let mut chunk_set = chunker::chunk_text(file_id, &text, self.budget);
        let reread = read_file(path).await?;
        if content_hash(&reread) != hash {
            text = reread;
            hash = content_hash(&text);
            chunk_set = chunker::chunk_text(file_id, &text, self.budget);
            let third = read_file(path).await?;
            if content_hash(&third) != hash {
                return Err(RecallError::SyncConflict {
                    path: path.display().to_string(),
                });
            }
        }

        self.replace_file(file, file_id, &hash, &chunk_set).await?;
        metrics::counter!("recall_files_synced_total").increment(1);
        Ok(())
    }

    /// Session transcript sync: full on first sight or truncation, tail
    /// append past the delta thresholds, nothing otherwise.
    async fn sync_session(
        &self,
        file: &DiscoveredFile,
        file_id: &str,
        existing: Option<&SourceFile>,
    ) -> Result<(), RecallError> {
        let plan =
            plan_session_sync(&self.db, file_id, &file.path, existing.is_some(), &self.config)
                .await?;
        match plan {
            SessionPlan::BelowThreshold => Ok(()),
            SessionPlan::Full { text, cursor } => {
                let chunk_set = chunker::chunk_text(file_id, &text, self.budget);
                // Sessions track progress with the cursor, not the hash.
                self.replace_file(file, file_id, &cursor.last_byte_offset.to_string(), &chunk_set)
                    .await?;
                cursors::set_cursor(&self.db, file_id, cursor).await?;
                metrics::counter!("recall_files_synced_total").increment(1);
                Ok(())
            }
            SessionPlan::Tail {
                text,
                first_line,
                cursor,
            } => {
                let tail_chunks =
                    chunker::chunk_text_from(file_id, &text, self.budget, first_line);
                self.upsert_file_record(file, file_id, &cursor.last_byte_offset.to_string())
                    .await?;
                chunks::append_chunks(&self.db, &tail_chunks).await?;
                cursors::set_cursor(&self.db, file_id, cursor).await?;
                metrics::counter!("recall_files_synced_total").increment(1);
                debug!(path = %file.path.display(), chunks = tail_chunks.len(), "appended transcript tail");
                Ok(())
            }
        }
    }

    /// Atomically swap a file's chunk set and record the new hash.
    async fn replace_file(
        &self,
        file: &DiscoveredFile,
        file_id: &str,
        hash: &str,
        chunk_set: &[Chunk],
    ) -> Result<(), RecallError> {
        let old: Vec<String> = chunks::chunks_for_file(&self.db, file_id)
            .await?
            .into_iter()
            .map(|c| c.id)
            .collect();
        self.upsert_file_record(file, file_id, hash).await?;
        chunks::replace_chunks(&self.db, file_id, chunk_set).await?;
        self.vectors.remove(&old).await?;
        metrics::counter!("recall_chunks_indexed_total").increment(chunk_set.len() as u64);
        Ok(())
    }

    async fn upsert_file_record(
        &self,
        file: &DiscoveredFile,
        file_id: &str,
        hash: &str,
    ) -> Result<(), RecallError> {
        let meta = tokio::fs::metadata(&file.path)
            .await
            .map_err(|e| RecallError::Internal(format!("stat {} failed: {e}", file.path.display())))?;
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        files::upsert_file(
            &self.db,
            &SourceFile {
                id: file_id.to_string(),
                path: file.path.to_string_lossy().into_owned(),
                kind: file.kind,
                content_hash: hash.to_string(),
                size_bytes: meta.len(),
                mtime,
                indexed_at: chrono::Utc::now().to_rfc3339(),
            },
        )
        .await
    }

    /// Embed every chunk missing a vector under the current identity.
    ///
    /// Failures are logged and left for the next pass; the keyword index
    /// already covers the affected chunks.
    async fn embed_missing(&self) {
        let Some(embedder) = &self.embedder else {
            return;
        };
        let pending = match chunks::unembedded_chunks(
            &self.db,
            embedder.provider_id(),
            embedder.model(),
        )
        .await
        {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, "listing unembedded chunks failed");
                return;
            }
        };
        if pending.is_empty() {
            return;
        }
        debug!(chunks = pending.len(), "embedding backfill");

        for batch in pending.chunks(EMBED_BATCH) {
            if self.cancel.is_cancelled() {
                return;
            }
            let items: Vec<(String, String)> = batch
                .iter()
                .map(|(_, hash, text)| (hash.clone(), text.clone()))
                .collect();
            let vectors = match embedder.embed_hashed(&items).await {
                Ok(vectors) => vectors,
                Err(e) => {
                    warn!(error = %e, "embedding failed, serving keyword-only until next pass");
                    metrics::counter!("recall_embedding_failures_total").increment(1);
                    return;
                }
            };
            for ((chunk_id, _, _), vector) in batch.iter().zip(vectors) {
                if let Err(e) = self.store_vector(embedder, chunk_id, &vector).await {
                    warn!(chunk_id, error = %e, "storing embedding failed");
                }
            }
        }
    }

    async fn store_vector(
        &self,
        embedder: &CachedEmbedder,
        chunk_id: &str,
        vector: &[f32],
    ) -> Result<(), RecallError> {
        chunks::set_embedding(
            &self.db,
            chunk_id,
            embedder.provider_id(),
            embedder.model(),
            vector,
        )
        .await?;
        self.vectors.upsert(chunk_id, vector).await
    }
}

async fn read_file(path: &Path) -> Result<String, RecallError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| RecallError::Internal(format!("read {} failed: {e}", path.display())))
}
