// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local ONNX embedding backend using all-MiniLM-L6-v2.
//!
//! Runs INT8-quantized inference on CPU with no network access, which makes
//! it the first candidate in the provider waterfall.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use ndarray::Array2;
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::TensorRef;

use recall_core::error::RecallError;
use recall_core::traits::EmbeddingBackend;
use recall_core::types::{EmbeddingInput, EmbeddingOutput};

/// Embedding dimensions produced by all-MiniLM-L6-v2.
pub const LOCAL_DIMENSIONS: usize = 384;

/// Model name reported in the embedding identity triple.
pub const LOCAL_MODEL: &str = "all-MiniLM-L6-v2";

/// ONNX-based local embedder.
///
/// Loads `model.onnx` and `tokenizer.json` from a model directory. Inference
/// runs single-threaded on CPU; the session lives behind a `Mutex` because
/// `ort::Session::run` takes `&mut self`.
pub struct LocalEmbedder {
    session: Mutex<Session>,
    tokenizer: tokenizers::Tokenizer,
}

// Safety: the session is only touched under the Mutex, and the tokenizer is
// thread-safe for encoding.
unsafe impl Send for LocalEmbedder {}
unsafe impl Sync for LocalEmbedder {}

impl LocalEmbedder {
    /// Loads the embedder from a directory containing `model.onnx` and
    /// `tokenizer.json`.
    pub fn load(model_dir: &Path) -> Result<Self, RecallError> {
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            RecallError::Internal(format!(
                "failed to load tokenizer from {}: {e}",
                tokenizer_path.display()
            ))
        })?;

        let model_path = model_dir.join("model.onnx");
        let session = Session::builder()
            .map_err(|e| RecallError::Internal(format!("onnx session builder failed: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| RecallError::Internal(format!("onnx optimization level failed: {e}")))?
            .with_intra_threads(1)
            .map_err(|e| RecallError::Internal(format!("onnx thread config failed: {e}")))?
            .commit_from_file(&model_path)
            .map_err(|e| {
                RecallError::Internal(format!(
                    "failed to load onnx model from {}: {e}",
                    model_path.display()
                ))
            })?;

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
        })
    }

    /// Embed one text into a normalized 384-dim vector.
    fn embed_one(&self, text: &str) -> Result<Vec<f32>, RecallError> {
        let encoding = self.tokenizer.encode(text, true).map_err(|e| {
            RecallError::EmbeddingFailed {
                message: format!("tokenization failed: {e}"),
                source: None,
            }
        })?;

        let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
        let attention_mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&m| m as i64)
            .collect();
        let token_type_ids: Vec<i64> = encoding.get_type_ids().iter().map(|&t| t as i64).collect();
        let seq_len = input_ids.len();

        let ids = Array2::from_shape_vec((1, seq_len), input_ids)
            .map_err(|e| embed_err(format!("input_ids tensor: {e}")))?;
        let mask = Array2::from_shape_vec((1, seq_len), attention_mask.clone())
            .map_err(|e| embed_err(format!("attention_mask tensor: {e}")))?;
        let types = Array2::from_shape_vec((1, seq_len), token_type_ids)
            .map_err(|e| embed_err(format!("token_type_ids tensor: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| RecallError::Internal(format!("onnx session lock poisoned: {e}")))?;

        let outputs = session
            .run(ort::inputs![
                "input_ids" => TensorRef::from_array_view(&ids)
                    .map_err(|e| embed_err(format!("input_ids view: {e}")))?,
                "attention_mask" => TensorRef::from_array_view(&mask)
                    .map_err(|e| embed_err(format!("attention_mask view: {e}")))?,
                "token_type_ids" => TensorRef::from_array_view(&types)
                    .map_err(|e| embed_err(format!("token_type_ids view: {e}")))?,
            ])
            .map_err(|e| embed_err(format!("onnx inference failed: {e}")))?;

        // Output shape is [1, seq_len, hidden].
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| embed_err(format!("output tensor extraction failed: {e}")))?;
        let hidden = shape[shape.len() - 1] as usize;

        Ok(l2_normalize(&mean_pool(data, &attention_mask, hidden)))
    }
}

fn embed_err(message: String) -> RecallError {
    RecallError::EmbeddingFailed {
        message,
        source: None,
    }
}

/// Attention-masked mean pooling over token embeddings.
fn mean_pool(token_embeddings: &[f32], attention_mask: &[i64], hidden: usize) -> Vec<f32> {
    let mut sum = vec![0.0f32; hidden];
    let mut count = 0.0f32;

    for (i, &m) in attention_mask.iter().enumerate() {
        if m > 0 {
            for (j, s) in sum.iter_mut().enumerate() {
                *s += token_embeddings[i * hidden + j];
            }
            count += 1.0;
        }
    }

    if count > 0.0 {
        for s in &mut sum {
            *s /= count;
        }
    }
    sum
}

/// L2-normalize a vector; the zero vector passes through unchanged.
fn l2_normalize(vec: &[f32]) -> Vec<f32> {
    let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        vec.iter().map(|v| v / norm).collect()
    } else {
        vec.to_vec()
    }
}

#[async_trait]
impl EmbeddingBackend for LocalEmbedder {
    fn provider_id(&self) -> &str {
        "local"
    }

    fn model(&self) -> &str {
        LOCAL_MODEL
    }

    fn key_fingerprint(&self) -> &str {
        "local"
    }

    fn dimensions(&self) -> usize {
        LOCAL_DIMENSIONS
    }

    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, RecallError> {
        let mut embeddings = Vec::with_capacity(input.texts.len());
        for text in &input.texts {
            embeddings.push(self.embed_one(text)?);
        }
        Ok(EmbeddingOutput {
            embeddings,
            dimensions: LOCAL_DIMENSIONS,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_normalize_scales_to_unit_length() {
        let n = l2_normalize(&[3.0, 4.0]);
        assert!((n[0] - 0.6).abs() < 0.001);
        assert!((n[1] - 0.8).abs() < 0.001);
        let norm: f32 = n.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.001);
    }

    #[test]
    fn l2_normalize_passes_zero_vector_through() {
        assert_eq!(l2_normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn mean_pool_skips_padding_tokens() {
        // token 0 is padding, token 1 is real
        let embeddings = vec![9.0, 9.0, 9.0, 1.0, 2.0, 3.0];
        let mask = vec![0, 1];
        assert_eq!(mean_pool(&embeddings, &mask, 3), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn mean_pool_averages_real_tokens() {
        let embeddings = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mask = vec![1, 1, 1];
        let pooled = mean_pool(&embeddings, &mask, 2);
        assert!((pooled[0] - 3.0).abs() < f32::EPSILON);
        assert!((pooled[1] - 4.0).abs() < f32::EPSILON);
    }

    // LocalEmbedder::load needs real model files on disk; the waterfall
    // integration tests cover the unavailable-model path instead.
}
