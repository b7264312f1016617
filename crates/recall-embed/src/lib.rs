// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding providers for the Recall memory engine.
//!
//! Four backends implement [`recall_core::traits::EmbeddingBackend`]:
//!
//! - [`local::LocalEmbedder`] runs all-MiniLM-L6-v2 on CPU via ONNX Runtime.
//! - [`openai::OpenAiEmbedder`] calls the OpenAI embeddings API.
//! - [`gemini::GeminiEmbedder`] calls the Gemini `batchEmbedContents` API.
//! - [`batch::OpenAiBatchEmbedder`] submits OpenAI Batch jobs for bulk work.
//!
//! [`waterfall::select_backend`] picks one backend per index lifetime, and
//! [`cache::CachedEmbedder`] fronts the selection with the persistent
//! embedding cache.

pub mod batch;
pub mod cache;
pub mod gemini;
pub mod local;
pub mod model_manager;
pub mod openai;
pub mod waterfall;

pub use cache::CachedEmbedder;
pub use model_manager::ModelManager;
pub use waterfall::{SelectedBackend, SkippedProvider, select_backend};
