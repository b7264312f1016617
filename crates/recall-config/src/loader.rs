// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports `./recall.toml` > `~/.config/recall/recall.toml` with
//! environment variable overrides via the `RECALL_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::RecallConfig;

/// Load configuration from the standard hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `~/.config/recall/recall.toml` (user XDG config)
/// 3. `./recall.toml` (local directory)
/// 4. `RECALL_*` environment variables
pub fn load_config() -> Result<RecallConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RecallConfig::default()))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("recall/recall.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("recall.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no file lookup).
///
/// Used for testing and explicit inline configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<RecallConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RecallConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<RecallConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RecallConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider.
///
/// Uses explicit `map()` rather than `Env::split("_")` so underscore-bearing
/// key names stay intact: `RECALL_MEMORY_SESSION_DELTA_BYTES` must map to
/// `memory.sync.session_delta_bytes`, not `memory.session.delta.bytes`.
fn env_provider() -> Env {
    Env::prefixed("RECALL_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("memory_chunking_", "memory.chunking.", 1)
            .replacen("memory_sync_", "memory.sync.", 1)
            .replacen("memory_query_hybrid_", "memory.query.hybrid.", 1)
            .replacen("memory_query_", "memory.query.", 1)
            .replacen("memory_cache_", "memory.cache.", 1)
            .replacen("memory_", "memory.", 1);
        mapped.into()
    })
}
