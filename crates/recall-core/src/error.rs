// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Recall memory engine.

use thiserror::Error;

/// The primary error type used across all Recall crates.
#[derive(Debug, Error)]
pub enum RecallError {
    /// Configuration errors (invalid TOML, missing required fields, bad option values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// No embedding backend is usable: no local model and no credentials.
    ///
    /// `missing` names what each skipped candidate needed, so the operator
    /// can see exactly which credential or file to provide.
    #[error("no embedding backend available: {missing}")]
    ProviderUnavailable { missing: String },

    /// A specific embedding call failed after the fallback chain was exhausted.
    #[error("embedding failed: {message}")]
    EmbeddingFailed {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A batch embedding job did not complete before its deadline.
    #[error("batch embedding job timed out after {duration:?}")]
    BatchTimeout { duration: std::time::Duration },

    /// A raw-text read was requested for a path outside the allow-list.
    #[error("path not allowed: {path}")]
    PathNotAllowed { path: String },

    /// A source file changed while it was being chunked, twice in a row.
    #[error("sync conflict: {path} changed while being indexed")]
    SyncConflict { path: String },

    /// The on-disk store is unreadable and must be rebuilt from sources.
    #[error("index corruption: {detail}")]
    IndexCorruption { detail: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_not_allowed_display_names_path() {
        let err = RecallError::PathNotAllowed {
            path: "/etc/passwd".to_string(),
        };
        assert!(err.to_string().contains("/etc/passwd"));
    }

    #[test]
    fn provider_unavailable_display_names_missing() {
        let err = RecallError::ProviderUnavailable {
            missing: "local: model files not found; openai: OPENAI_API_KEY not set".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("OPENAI_API_KEY"));
        assert!(msg.contains("model files"));
    }
}
