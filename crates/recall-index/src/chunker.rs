// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Line-addressable text chunking.
//!
//! Splits a file into token-bounded chunks that never break line boundaries,
//! except for single lines longer than the whole budget, which are hard-split
//! into fixed-size segments. Consecutive chunks share a character-budgeted
//! overlap carried as whole trailing lines, so every chunk still maps to an
//! exact `startLine..endLine` range for provenance.
//!
//! Chunking is deterministic: the same (text, budget) always yields the same
//! boundaries, ids, and content hashes.

use recall_config::ChunkingConfig;
use recall_core::types::{Chunk, content_hash};

/// Fixed tokens-to-characters conversion ratio.
pub const CHARS_PER_TOKEN: usize = 4;

/// Character budgets derived from the token-denominated config.
#[derive(Debug, Clone, Copy)]
pub struct ChunkBudget {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl ChunkBudget {
    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self {
            max_chars: config.tokens * CHARS_PER_TOKEN,
            overlap_chars: config.overlap * CHARS_PER_TOKEN,
        }
    }
}

/// Chunk a whole file, numbering lines from 1.
pub fn chunk_text(file_id: &str, text: &str, budget: ChunkBudget) -> Vec<Chunk> {
    chunk_text_from(file_id, text, budget, 1)
}

/// Chunk a text whose first line carries the given line number.
///
/// Session delta sync uses this to chunk only an appended tail while keeping
/// line numbers relative to the whole transcript.
pub fn chunk_text_from(
    file_id: &str,
    text: &str,
    budget: ChunkBudget,
    first_line: u32,
) -> Vec<Chunk> {
    let max_chars = budget.max_chars.max(1);
    let mut chunks = Vec::new();

    // Lines accumulated for the chunk under construction, with their numbers.
    let mut current: Vec<(u32, String)> = Vec::new();
    let mut current_chars = 0usize;

    for (offset, line) in text.lines().enumerate() {
        let line_no = first_line + offset as u32;
        let line_chars = line.chars().count();

        if line_chars > max_chars {
            // Oversized line: flush what we have, then hard-split the line
            // into fixed-size segments with no overlap between them.
            flush(&mut chunks, file_id, &mut current, &mut current_chars);
            let cs: Vec<char> = line.chars().collect();
            for segment in cs.chunks(max_chars) {
                push_chunk(&mut chunks, file_id, line_no, line_no, segment.iter().collect());
            }
            continue;
        }

        // Joining newline counts toward the budget for non-first lines.
        let added = if current.is_empty() {
            line_chars
        } else {
            line_chars + 1
        };

        if !current.is_empty() && current_chars + added > max_chars {
            let mut overlap = trailing_overlap(&current, budget.overlap_chars);
            flush(&mut chunks, file_id, &mut current, &mut current_chars);
            // Trim the carry from the front so the overlap never pushes the
            // next chunk past the budget once this line lands.
            while !overlap.is_empty() && joined_chars(&overlap) + 1 + line_chars > max_chars {
                overlap.remove(0);
            }
            for (no, text) in overlap {
                current_chars += if current.is_empty() {
                    text.chars().count()
                } else {
                    text.chars().count() + 1
                };
                current.push((no, text));
            }
        }

        current_chars += if current.is_empty() {
            line_chars
        } else {
            line_chars + 1
        };
        current.push((line_no, line.to_string()));
    }

    flush(&mut chunks, file_id, &mut current, &mut current_chars);
    chunks
}

/// Trailing whole lines of the finished chunk totaling at most
/// `overlap_chars`, in original order. Never carries the whole chunk.
fn trailing_overlap(lines: &[(u32, String)], overlap_chars: usize) -> Vec<(u32, String)> {
    if overlap_chars == 0 || lines.len() < 2 {
        return Vec::new();
    }
    let mut total = 0usize;
    let mut carried = Vec::new();
    for (no, text) in lines.iter().rev().take(lines.len() - 1) {
        let len = text.chars().count() + 1;
        if total + len > overlap_chars {
            break;
        }
        total += len;
        carried.push((*no, text.clone()));
    }
    carried.reverse();
    carried
}

/// Combined length of lines once joined with newlines.
fn joined_chars(lines: &[(u32, String)]) -> usize {
    let chars: usize = lines.iter().map(|(_, l)| l.chars().count()).sum();
    chars + lines.len().saturating_sub(1)
}

fn flush(
    chunks: &mut Vec<Chunk>,
    file_id: &str,
    current: &mut Vec<(u32, String)>,
    current_chars: &mut usize,
) {
    if current.is_empty() {
        return;
    }
    let start = current[0].0;
    let end = current[current.len() - 1].0;
    let text = current
        .iter()
        .map(|(_, l)| l.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    push_chunk(chunks, file_id, start, end, text);
    current.clear();
    *current_chars = 0;
}

fn push_chunk(chunks: &mut Vec<Chunk>, file_id: &str, start: u32, end: u32, text: String) {
    let hash = content_hash(&text);
    chunks.push(Chunk {
        id: format!("{file_id}:{start}-{end}:{}", &hash[..8]),
        file_id: file_id.to_string(),
        start_line: start,
        end_line: end,
        text,
        content_hash: hash,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn budget(max_chars: usize, overlap_chars: usize) -> ChunkBudget {
        ChunkBudget {
            max_chars,
            overlap_chars,
        }
    }

    #[test]
    fn small_file_is_one_chunk() {
        let chunks = chunk_text("f1", "line1\nline2\nline3", budget(1000, 80));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, 3);
        assert_eq!(chunks[0].text, "line1\nline2\nline3");
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "alpha\nbeta\ngamma\ndelta\nepsilon\nzeta";
        let a = chunk_text("f1", text, budget(12, 6));
        let b = chunk_text("f1", text, budget(12, 6));
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.id, y.id);
            assert_eq!(x.content_hash, y.content_hash);
            assert_eq!(x.text, y.text);
        }
    }

    #[test]
    fn consecutive_chunks_share_trailing_lines() {
        // Each line is 5 chars; max 12 fits two lines, overlap 6 fits one.
        let chunks = chunk_text("f1", "aaaaa\nbbbbb\nccccc\nddddd", budget(12, 6));
        assert!(chunks.len() >= 2);
        assert_eq!(chunks[0].text, "aaaaa\nbbbbb");
        // The second chunk starts on the last line of the first.
        assert_eq!(chunks[1].start_line, chunks[0].end_line);
        assert!(chunks[1].text.starts_with("bbbbb"));
    }

    #[test]
    fn overlap_carry_never_exceeds_budget() {
        // A near-budget line landing on a carried overlap must not push
        // the chunk past max_chars; the carry gets trimmed instead.
        let chunks = chunk_text("f1", "aaaa\nbbbb\nccccccccccc", budget(12, 6));
        for c in &chunks {
            assert!(
                c.text.chars().count() <= 12,
                "chunk over budget: {:?}",
                c.text
            );
        }
        assert_eq!(chunks[0].text, "aaaa\nbbbb");
        assert_eq!(chunks[1].text, "ccccccccccc");
    }

    #[test]
    fn zero_overlap_produces_disjoint_chunks() {
        let chunks = chunk_text("f1", "aaaaa\nbbbbb\nccccc\nddddd", budget(12, 0));
        assert_eq!(chunks[0].text, "aaaaa\nbbbbb");
        assert_eq!(chunks[1].text, "ccccc\nddddd");
        assert_eq!(chunks[1].start_line, 3);
    }

    #[test]
    fn oversized_line_hard_splits_without_overlap() {
        let long = "x".repeat(25);
        let chunks = chunk_text("f1", &long, budget(10, 4));
        assert_eq!(chunks.len(), 3);
        for c in &chunks {
            assert_eq!(c.start_line, 1);
            assert_eq!(c.end_line, 1);
        }
        assert_eq!(chunks[0].text.len(), 10);
        assert_eq!(chunks[2].text.len(), 5);
    }

    #[test]
    fn oversized_line_flushes_preceding_lines_first() {
        let text = format!("short\n{}", "y".repeat(30));
        let chunks = chunk_text("f1", &text, budget(10, 4));
        assert_eq!(chunks[0].text, "short");
        assert_eq!(chunks[0].end_line, 1);
        assert_eq!(chunks[1].start_line, 2);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_text("f1", "", budget(100, 10)).is_empty());
    }

    #[test]
    fn first_line_offset_shifts_numbering() {
        let chunks = chunk_text_from("f1", "tail1\ntail2", budget(1000, 0), 42);
        assert_eq!(chunks[0].start_line, 42);
        assert_eq!(chunks[0].end_line, 43);
    }

    #[test]
    fn ids_embed_line_range_and_hash_prefix() {
        let chunks = chunk_text("abcdef0123456789", "hello", budget(100, 0));
        let c = &chunks[0];
        assert!(c.id.starts_with("abcdef0123456789:1-1:"));
        assert!(c.content_hash.starts_with(c.id.rsplit(':').next().unwrap()));
    }

    #[test]
    fn budget_conversion_uses_four_chars_per_token() {
        let config = ChunkingConfig {
            tokens: 400,
            overlap: 80,
        };
        let b = ChunkBudget::from_config(&config);
        assert_eq!(b.max_chars, 1600);
        assert_eq!(b.overlap_chars, 320);
    }
}
