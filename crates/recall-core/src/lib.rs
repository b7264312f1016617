// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core types for the Recall memory engine.
//!
//! This crate holds what every other Recall crate shares: the
//! [`RecallError`] enum, the domain types (source files, chunks, search
//! results), the [`EmbeddingBackend`] trait, and the hashing and vector
//! helpers used by storage and retrieval.

pub mod error;
pub mod traits;
pub mod types;

pub use error::RecallError;
pub use traits::EmbeddingBackend;
pub use types::{
    Chunk, EmbeddingInput, EmbeddingOutput, SearchResult, SourceFile, SourceKind, blob_to_vec,
    content_hash, cosine_similarity, file_id_for_path, key_fingerprint, vec_to_blob,
};
