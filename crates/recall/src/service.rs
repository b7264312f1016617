// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query surface: hybrid search and allow-listed raw reads.
//!
//! `search` runs a bounded catch-up sync first, so results reflect the
//! freshest index the time budget allows; when the budget is exceeded the
//! outcome is flagged possibly stale and served from the last-good index.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use recall_config::QueryConfig;
use recall_core::{RecallError, SearchResult};
use recall_embed::CachedEmbedder;
use recall_index::{KeywordIndex, VectorIndex, candidate_limit, fuse};
use recall_storage::Database;
use recall_storage::queries::chunks;
use recall_sync::SyncScheduler;
use serde::Serialize;
use tracing::warn;

/// Snippets are cut from the chunk head, bounded to this many characters.
const SNIPPET_MAX_CHARS: usize = 240;

/// Upper bound on a per-call `max_results` override.
const MAX_RESULTS_CAP: usize = 50;

/// A completed search with its freshness flag.
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub results: Vec<SearchResult>,
    /// True when the pre-query sync did not finish within its budget and
    /// the results come from the last-good index.
    pub possibly_stale: bool,
}

/// A raw line range read from an allow-listed source file.
#[derive(Debug, Clone, Serialize)]
pub struct FileSlice {
    pub path: String,
    /// 1-based first line returned.
    pub start_line: u32,
    /// 1-based last line returned; `start_line - 1` when the range is empty.
    pub end_line: u32,
    pub content: String,
}

/// Shared-state query handle built by `MemoryIndex::service`.
pub struct QueryService {
    db: Arc<Database>,
    embedder: Option<Arc<CachedEmbedder>>,
    vectors: Arc<VectorIndex>,
    keyword: KeywordIndex,
    scheduler: Arc<SyncScheduler>,
    query: QueryConfig,
}

impl QueryService {
    pub(crate) fn new(
        db: Arc<Database>,
        embedder: Option<Arc<CachedEmbedder>>,
        vectors: Arc<VectorIndex>,
        keyword: KeywordIndex,
        scheduler: Arc<SyncScheduler>,
        query: QueryConfig,
    ) -> Self {
        Self {
            db,
            embedder,
            vectors,
            keyword,
            scheduler,
            query,
        }
    }

    /// Active embedding provider id, or "none" in keyword-only mode.
    pub fn provider(&self) -> &str {
        self.embedder.as_ref().map(|e| e.provider_id()).unwrap_or("none")
    }

    /// Active embedding model, or "none" in keyword-only mode.
    pub fn model(&self) -> &str {
        self.embedder.as_ref().map(|e| e.model()).unwrap_or("none")
    }

    /// Hybrid search over the indexed sources.
    ///
    /// `max_results` overrides the configured result count for this call,
    /// clamped to `1..=50`. Vector candidates come through the embedding
    /// cache; when the query embed or the vector lookup fails the search
    /// degrades to keyword-only scoring instead of failing.
    pub async fn search(
        &self,
        query: &str,
        max_results: Option<usize>,
    ) -> Result<SearchOutcome, RecallError> {
        let possibly_stale = self.scheduler.catch_up().await;

        let max_results = effective_max_results(max_results, self.query.max_results);
        let limit = candidate_limit(max_results, self.query.hybrid.candidate_multiplier);
        let keyword_hits = self.keyword.search(query, limit).await?;
        let vector_hits = self.vector_candidates(query, limit).await;

        let ranked = fuse(
            &vector_hits,
            &keyword_hits,
            &self.query.hybrid,
            max_results,
            self.query.min_score,
        );

        let ids: Vec<String> = ranked.iter().map(|c| c.chunk_id.clone()).collect();
        let rows = chunks::get_chunks_with_paths(&self.db, &ids).await?;
        let by_id: HashMap<&str, &(recall_core::Chunk, String)> =
            rows.iter().map(|row| (row.0.id.as_str(), row)).collect();

        let mut results = Vec::with_capacity(ranked.len());
        for candidate in &ranked {
            // A chunk deleted between ranking and hydration just drops out.
            let Some((chunk, path)) = by_id.get(candidate.chunk_id.as_str()) else {
                continue;
            };
            results.push(SearchResult {
                chunk_id: candidate.chunk_id.clone(),
                path: path.clone(),
                start_line: chunk.start_line,
                end_line: chunk.end_line,
                snippet: snippet(&chunk.text),
                vector_score: candidate.vector_score,
                text_score: candidate.text_score,
                final_score: candidate.final_score,
            });
        }

        metrics::counter!("recall_searches_total").increment(1);
        Ok(SearchOutcome {
            results,
            possibly_stale,
        })
    }

    async fn vector_candidates(&self, query: &str, limit: usize) -> Vec<(String, f32)> {
        let Some(embedder) = &self.embedder else {
            return Vec::new();
        };
        let vector = match embedder.embed_query(query).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!(error = %e, "query embedding failed, serving keyword-only results");
                metrics::counter!("recall_searches_degraded_total").increment(1);
                return Vec::new();
            }
        };
        match self.vectors.top_k(&vector, limit).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "vector lookup failed, serving keyword-only results");
                metrics::counter!("recall_searches_degraded_total").increment(1);
                Vec::new()
            }
        }
    }

    /// Read raw lines from an allow-listed source file.
    ///
    /// `start`/`end` are 1-based and inclusive; `None` means start or end
    /// of file. Out-of-range bounds clamp. Paths outside the allow-list
    /// are rejected with `PathNotAllowed`.
    pub async fn get(
        &self,
        path: &Path,
        start: Option<u32>,
        end: Option<u32>,
    ) -> Result<FileSlice, RecallError> {
        if !self.scheduler.layout().is_allowed(path) {
            return Err(RecallError::PathNotAllowed {
                path: path.display().to_string(),
            });
        }
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            RecallError::Internal(format!("failed to read {}: {e}", path.display()))
        })?;
        let (content, start_line, end_line) = slice_lines(&text, start, end);
        Ok(FileSlice {
            path: path.display().to_string(),
            start_line,
            end_line,
            content,
        })
    }
}

/// Result count for one search: the per-call override when given, the
/// configured default otherwise, clamped to a sane range either way.
fn effective_max_results(requested: Option<usize>, configured: usize) -> usize {
    requested.unwrap_or(configured).clamp(1, MAX_RESULTS_CAP)
}

/// Cut a 1-based inclusive line range out of `text`, clamping both bounds.
/// An empty or inverted range yields empty content with `end == start - 1`.
fn slice_lines(text: &str, start: Option<u32>, end: Option<u32>) -> (String, u32, u32) {
    let lines: Vec<&str> = text.lines().collect();
    let total = lines.len() as u32;
    let start = start.unwrap_or(1).max(1);
    let end = end.unwrap_or(total).min(total);
    if total == 0 || start > end {
        return (String::new(), start, start.saturating_sub(1));
    }
    let content = lines[start as usize - 1..=end as usize - 1].join("\n");
    (content, start, end)
}

/// Head of the chunk text, bounded on a character boundary.
fn snippet(text: &str) -> String {
    let mut chars = text.chars();
    let mut out: String = chars.by_ref().take(SNIPPET_MAX_CHARS).collect();
    if chars.next().is_some() {
        out.push('…');
    }
    out
}
