// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Indexing primitives for the Recall memory engine: the line-addressable
//! chunker, the vector and keyword indexes, and the hybrid ranker that
//! fuses their candidate sets.

pub mod chunker;
pub mod keyword;
pub mod ranker;
pub mod vector;

pub use chunker::{ChunkBudget, chunk_text, chunk_text_from};
pub use keyword::KeywordIndex;
pub use ranker::{RankedChunk, candidate_limit, fuse};
pub use vector::{VectorBackend, VectorIndex};
