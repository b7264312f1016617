// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The embedding backend trait implemented by local and remote providers.

use async_trait::async_trait;

use crate::error::RecallError;
use crate::types::{EmbeddingInput, EmbeddingOutput};

/// A backend that turns a batch of texts into vectors.
///
/// Implementations: local ONNX inference, remote synchronous APIs, and the
/// remote batch API. The identity triple (`provider_id`, `model`,
/// `key_fingerprint`) is part of the embedding cache key, so switching
/// providers or credentials never serves stale vectors under a new identity.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Short stable id of this backend ("local", "openai", "gemini", ...).
    fn provider_id(&self) -> &str;

    /// The model the backend embeds with.
    fn model(&self) -> &str;

    /// Fingerprint of the credential in use ("local" for on-disk models).
    fn key_fingerprint(&self) -> &str;

    /// Dimensionality of the vectors this backend produces.
    fn dimensions(&self) -> usize;

    /// Embed a batch of texts, returning one vector per input in order.
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, RecallError>;
}
