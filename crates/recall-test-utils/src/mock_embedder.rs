// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic mock embedding backend.
//!
//! Derives each vector from the SHA-256 digest of the input text, so equal
//! texts always embed identically and similar tests are reproducible across
//! runs. Call counts are tracked for cache-behavior assertions.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use recall_core::error::RecallError;
use recall_core::traits::EmbeddingBackend;
use recall_core::types::{EmbeddingInput, EmbeddingOutput};

/// Dimensions of mock vectors. Small on purpose to keep test stores tiny.
pub const MOCK_DIMENSIONS: usize = 8;

/// A deterministic, offline embedding backend for tests.
pub struct MockEmbedder {
    provider_id: String,
    model: String,
    fingerprint: String,
    calls: AtomicUsize,
    texts_embedded: AtomicUsize,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self::with_identity("mock", "mock-model", "mock-key")
    }

    /// Build a mock with a custom identity triple, for tests that exercise
    /// provider or credential switches.
    pub fn with_identity(provider_id: &str, model: &str, fingerprint: &str) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            model: model.to_string(),
            fingerprint: fingerprint.to_string(),
            calls: AtomicUsize::new(0),
            texts_embedded: AtomicUsize::new(0),
        }
    }

    /// Number of `embed` calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Total number of texts embedded across all calls.
    pub fn texts_embedded(&self) -> usize {
        self.texts_embedded.load(Ordering::SeqCst)
    }

    /// The vector this mock produces for a given text.
    pub fn vector_for(text: &str) -> Vec<f32> {
        let digest = Sha256::digest(text.as_bytes());
        let mut v: Vec<f32> = digest[..MOCK_DIMENSIONS]
            .iter()
            .map(|&b| b as f32 / 255.0)
            .collect();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingBackend for MockEmbedder {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn key_fingerprint(&self) -> &str {
        &self.fingerprint
    }

    fn dimensions(&self) -> usize {
        MOCK_DIMENSIONS
    }

    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, RecallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts_embedded
            .fetch_add(input.texts.len(), Ordering::SeqCst);
        Ok(EmbeddingOutput {
            embeddings: input.texts.iter().map(|t| Self::vector_for(t)).collect(),
            dimensions: MOCK_DIMENSIONS,
        })
    }
}

/// A backend that always fails, for degraded-mode tests.
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingBackend for FailingEmbedder {
    fn provider_id(&self) -> &str {
        "failing"
    }

    fn model(&self) -> &str {
        "failing-model"
    }

    fn key_fingerprint(&self) -> &str {
        "none"
    }

    fn dimensions(&self) -> usize {
        MOCK_DIMENSIONS
    }

    async fn embed(&self, _input: EmbeddingInput) -> Result<EmbeddingOutput, RecallError> {
        Err(RecallError::EmbeddingFailed {
            message: "mock backend configured to fail".to_string(),
            source: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identical_texts_embed_identically() {
        let mock = MockEmbedder::new();
        let a = mock
            .embed(EmbeddingInput {
                texts: vec!["hello".into()],
            })
            .await
            .unwrap();
        let b = mock
            .embed(EmbeddingInput {
                texts: vec!["hello".into()],
            })
            .await
            .unwrap();
        assert_eq!(a.embeddings, b.embeddings);
        assert_eq!(mock.call_count(), 2);
    }

    #[test]
    fn vectors_are_unit_length() {
        let v = MockEmbedder::vector_for("anything");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.001);
    }
}
