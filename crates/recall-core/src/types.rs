// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types for the memory index: source files, chunks, search results,
//! and the vector/blob helpers shared by storage and retrieval.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// What class of source a file belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    /// A plain note file (the long-term note file or a dated daily note).
    Note,
    /// An append-only conversation transcript.
    Session,
}

impl SourceKind {
    /// Convert to string for SQLite storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Note => "note",
            SourceKind::Session => "session",
        }
    }

    /// Parse from SQLite string.
    pub fn from_str_value(s: &str) -> Self {
        match s {
            "session" => SourceKind::Session,
            _ => SourceKind::Note,
        }
    }
}

/// A source file tracked by the sync scheduler.
///
/// Created on first discovery, updated on every observed change, and
/// removed from the index (with its chunk set) when the file disappears.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    /// Stable identifier derived from the path.
    pub id: String,
    /// Absolute path on disk.
    pub path: String,
    /// Note or session transcript.
    pub kind: SourceKind,
    /// SHA-256 of the file content at last indexing.
    pub content_hash: String,
    /// File size at last indexing.
    pub size_bytes: u64,
    /// Modification time (unix seconds) at last indexing.
    pub mtime: i64,
    /// ISO 8601 timestamp of the last completed indexing pass.
    pub indexed_at: String,
}

/// A bounded, line-addressable slice of a source file.
///
/// The chunk set of a file is replaced wholesale whenever the file's
/// top-level hash changes; chunk boundaries are never diffed incrementally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Deterministic id: `{file_id}:{start}-{end}:{hash8}`.
    pub id: String,
    /// Owning source file.
    pub file_id: String,
    /// 1-based first line covered by this chunk.
    pub start_line: u32,
    /// 1-based last line covered by this chunk.
    pub end_line: u32,
    /// Chunk text.
    pub text: String,
    /// SHA-256 hex of `text`; the sole re-embedding signal.
    pub content_hash: String,
}

/// One ranked hit produced by a search. Ephemeral, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub chunk_id: String,
    pub path: String,
    pub start_line: u32,
    pub end_line: u32,
    /// Bounded-length excerpt of the chunk text.
    pub snippet: String,
    /// Cosine similarity clamped to [0, 1]; 0.0 when the chunk only matched keywords.
    pub vector_score: f32,
    /// BM25-derived score in (0, 1]; 0.0 when the chunk only matched vectors.
    pub text_score: f32,
    /// `vector_weight * vector_score + text_weight * text_score`.
    pub final_score: f32,
}

/// Input for an embedding backend.
#[derive(Debug, Clone)]
pub struct EmbeddingInput {
    pub texts: Vec<String>,
}

/// Output from an embedding backend.
#[derive(Debug, Clone)]
pub struct EmbeddingOutput {
    /// One vector per input text, in order.
    pub embeddings: Vec<Vec<f32>>,
    pub dimensions: usize,
}

/// SHA-256 hex digest of a text, used for both chunk and file hashes.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Stable file id: first 16 hex chars of the path's SHA-256.
pub fn file_id_for_path(path: &str) -> String {
    content_hash(path)[..16].to_string()
}

/// Short fingerprint of a credential for cache keying.
///
/// Disambiguates API accounts without storing the secret itself, so
/// switching credentials never silently reuses another tenant's vectors.
pub fn key_fingerprint(secret: &str) -> String {
    content_hash(secret)[..8].to_string()
}

/// Convert f32 vector to bytes for SQLite BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert SQLite BLOB back to f32 vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes(chunk.try_into().unwrap()))
        .collect()
}

/// Compute cosine similarity between two vectors of equal length.
///
/// For L2-normalized vectors this is the dot product. Vectors of unequal
/// length score 0.0 rather than panicking (dimensions can differ briefly
/// after a provider switch).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a <= f32::EPSILON || norm_b <= f32::EPSILON {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_kind_roundtrip() {
        assert_eq!(SourceKind::Note.as_str(), "note");
        assert_eq!(SourceKind::Session.as_str(), "session");
        assert_eq!(SourceKind::from_str_value("note"), SourceKind::Note);
        assert_eq!(SourceKind::from_str_value("session"), SourceKind::Session);
        assert_eq!(SourceKind::from_str_value("garbage"), SourceKind::Note);
    }

    #[test]
    fn content_hash_is_deterministic() {
        let a = content_hash("line1\nline2");
        let b = content_hash("line1\nline2");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, content_hash("line1\nline2\n"));
    }

    #[test]
    fn file_id_is_short_and_stable() {
        let id = file_id_for_path("/home/agent/MEMORY.md");
        assert_eq!(id.len(), 16);
        assert_eq!(id, file_id_for_path("/home/agent/MEMORY.md"));
    }

    #[test]
    fn key_fingerprint_hides_secret() {
        let fp = key_fingerprint("sk-proj-supersecret");
        assert_eq!(fp.len(), 8);
        assert!(!fp.contains("secret"));
        assert_ne!(fp, key_fingerprint("sk-proj-othersecret"));
    }

    #[test]
    fn vec_to_blob_roundtrip() {
        let original = vec![0.1_f32, 0.2, -0.5, 1.0];
        let blob = vec_to_blob(&original);
        assert_eq!(blob.len(), 16);
        let recovered = blob_to_vec(&blob);
        for (a, b) in original.iter().zip(recovered.iter()) {
            assert!((a - b).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn cosine_similarity_identical() {
        let v = vec![0.6, 0.8];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < f32::EPSILON);
    }

    #[test]
    fn cosine_similarity_mismatched_lengths() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn cosine_similarity_unnormalized_inputs() {
        // Same direction, different magnitudes: still similarity 1.
        let a = vec![3.0, 4.0];
        let b = vec![6.0, 8.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }
}
