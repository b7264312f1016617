// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Recall memory engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Recall configuration.
///
/// Loaded from a TOML file with environment variable overrides. All
/// sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RecallConfig {
    /// Memory index settings.
    #[serde(default)]
    pub memory: MemoryConfig,
}

/// Memory index configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryConfig {
    /// Enable the memory system. When false, no indexing or retrieval occurs.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Embedding provider: auto, local, openai, gemini, or openai-batch.
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Override the selected backend's default embedding model.
    #[serde(default)]
    pub model: Option<String>,

    /// When an explicitly configured provider is unusable, continue down
    /// the waterfall instead of failing.
    #[serde(default = "default_fallback")]
    pub fallback: bool,

    /// Which file classes to index: "notes", "sessions", or both.
    #[serde(default = "default_sources")]
    pub sources: Vec<String>,

    /// Root directory for the per-agent store and model files.
    /// Defaults to the XDG data directory.
    #[serde(default)]
    pub data_dir: Option<String>,

    /// Extra paths (files or directories) to index and allow for raw reads.
    #[serde(default)]
    pub extra_paths: Vec<String>,

    /// Chunking settings.
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Synchronization settings.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Query and ranking settings.
    #[serde(default)]
    pub query: QueryConfig,

    /// Embedding cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Chunk size budgets, in tokens (converted to characters internally).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChunkingConfig {
    /// Target chunk size in tokens.
    #[serde(default = "default_chunk_tokens")]
    pub tokens: usize,

    /// Overlap between consecutive chunks, in tokens.
    #[serde(default = "default_chunk_overlap")]
    pub overlap: usize,
}

/// Sync scheduler behavior.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Watch source directories for filesystem changes.
    #[serde(default = "default_watch")]
    pub watch: bool,

    /// Debounce window for filesystem events, in milliseconds.
    #[serde(default = "default_watch_debounce_ms")]
    pub watch_debounce_ms: u64,

    /// Periodic full-sweep interval, in minutes. 0 disables the sweep.
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,

    /// Budget for the catch-up sync that runs before a query, in
    /// milliseconds. On timeout the query is served against the
    /// last-good index and flagged as possibly stale.
    #[serde(default = "default_on_search_timeout_ms")]
    pub on_search_timeout_ms: u64,

    /// Bytes of unsynced transcript growth that trigger a delta sync.
    #[serde(default = "default_session_delta_bytes")]
    pub session_delta_bytes: u64,

    /// Unsynced transcript messages that trigger a delta sync.
    #[serde(default = "default_session_delta_messages")]
    pub session_delta_messages: u64,
}

/// Query and hybrid ranking behavior.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueryConfig {
    /// Maximum results returned per search.
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Results below this final score are dropped.
    #[serde(default = "default_min_score")]
    pub min_score: f32,

    /// Hybrid fusion weights and candidate fan-out.
    #[serde(default)]
    pub hybrid: HybridConfig,
}

/// Weights for merging vector and keyword signals.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HybridConfig {
    /// Weight of the cosine-similarity signal.
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f32,

    /// Weight of the BM25 keyword signal.
    #[serde(default = "default_text_weight")]
    pub text_weight: f32,

    /// Each side fetches `max_results * candidate_multiplier` candidates.
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,
}

/// Embedding cache capacity.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Maximum cached vectors; least-recently-used entries are evicted
    /// beyond this.
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            provider: default_provider(),
            model: None,
            fallback: default_fallback(),
            sources: default_sources(),
            data_dir: None,
            extra_paths: Vec::new(),
            chunking: ChunkingConfig::default(),
            sync: SyncConfig::default(),
            query: QueryConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            tokens: default_chunk_tokens(),
            overlap: default_chunk_overlap(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            watch: default_watch(),
            watch_debounce_ms: default_watch_debounce_ms(),
            interval_minutes: default_interval_minutes(),
            on_search_timeout_ms: default_on_search_timeout_ms(),
            session_delta_bytes: default_session_delta_bytes(),
            session_delta_messages: default_session_delta_messages(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            min_score: default_min_score(),
            hybrid: HybridConfig::default(),
        }
    }
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            vector_weight: default_vector_weight(),
            text_weight: default_text_weight(),
            candidate_multiplier: default_candidate_multiplier(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_cache_max_entries(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_provider() -> String {
    "auto".to_string()
}

fn default_fallback() -> bool {
    true
}

fn default_sources() -> Vec<String> {
    vec!["notes".to_string(), "sessions".to_string()]
}

fn default_chunk_tokens() -> usize {
    400
}

fn default_chunk_overlap() -> usize {
    80
}

fn default_watch() -> bool {
    true
}

fn default_watch_debounce_ms() -> u64 {
    1500
}

fn default_interval_minutes() -> u64 {
    10
}

fn default_on_search_timeout_ms() -> u64 {
    2000
}

fn default_session_delta_bytes() -> u64 {
    65536
}

fn default_session_delta_messages() -> u64 {
    20
}

fn default_max_results() -> usize {
    8
}

fn default_min_score() -> f32 {
    0.0
}

fn default_vector_weight() -> f32 {
    0.7
}

fn default_text_weight() -> f32 {
    0.3
}

fn default_candidate_multiplier() -> usize {
    4
}

fn default_cache_max_entries() -> usize {
    10_000
}
