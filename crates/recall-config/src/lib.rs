// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Recall memory engine.
//!
//! Provides TOML configuration parsing with strict validation
//! (`deny_unknown_fields`), file hierarchy lookup, and environment
//! variable overrides.

pub mod loader;
pub mod model;
pub mod validation;

pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{
    CacheConfig, ChunkingConfig, HybridConfig, MemoryConfig, QueryConfig, RecallConfig, SyncConfig,
};

use recall_core::RecallError;

/// Load configuration from the file hierarchy and validate it.
pub fn load_and_validate() -> Result<RecallConfig, RecallError> {
    let config = loader::load_config().map_err(|e| RecallError::Config(e.to_string()))?;
    validation::validate_config(&config)?;
    Ok(config)
}

/// Load configuration from a TOML string and validate it.
///
/// Useful for testing and explicit configuration.
pub fn load_and_validate_str(toml_content: &str) -> Result<RecallConfig, RecallError> {
    let config =
        loader::load_config_from_str(toml_content).map_err(|e| RecallError::Config(e.to_string()))?;
    validation::validate_config(&config)?;
    Ok(config)
}
