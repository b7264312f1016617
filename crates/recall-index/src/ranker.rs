// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hybrid result fusion.
//!
//! Merges vector and keyword candidate sets into one ranked list using a
//! weighted sum. BM25 ranks are converted to a (0, 1] score first; negative
//! SQLite ranks clamp to 0 and thus score 1.0. Output order is fully
//! deterministic: descending final score, ascending chunk id on ties.

use std::collections::BTreeMap;

use recall_config::HybridConfig;

/// One fused candidate with both signal scores and the weighted sum.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedChunk {
    pub chunk_id: String,
    pub vector_score: f32,
    pub text_score: f32,
    pub final_score: f32,
}

/// How many candidates to fetch from each side before fusing.
pub fn candidate_limit(max_results: usize, multiplier: usize) -> usize {
    max_results.saturating_mul(multiplier).max(max_results).max(1)
}

/// Convert a raw BM25 rank (lower is better) into a score in (0, 1].
pub fn text_score_from_rank(rank: f64) -> f32 {
    (1.0 / (1.0 + rank.max(0.0))) as f32
}

/// Fuse candidate sets into the final ranked, deduplicated list.
///
/// A chunk present on only one side scores 0 for the missing signal.
/// Results below `min_score` are dropped and the list is truncated to
/// `max_results`.
pub fn fuse(
    vector_hits: &[(String, f32)],
    keyword_hits: &[(String, f64)],
    hybrid: &HybridConfig,
    max_results: usize,
    min_score: f32,
) -> Vec<RankedChunk> {
    // BTreeMap keeps the union deterministic regardless of input order.
    let mut merged: BTreeMap<&str, (f32, f32)> = BTreeMap::new();

    for (id, score) in vector_hits {
        merged.entry(id).or_insert((0.0, 0.0)).0 = *score;
    }
    for (id, rank) in keyword_hits {
        merged.entry(id).or_insert((0.0, 0.0)).1 = text_score_from_rank(*rank);
    }

    let mut ranked: Vec<RankedChunk> = merged
        .into_iter()
        .map(|(id, (vector_score, text_score))| RankedChunk {
            chunk_id: id.to_string(),
            vector_score,
            text_score,
            final_score: hybrid.vector_weight * vector_score + hybrid.text_weight * text_score,
        })
        .filter(|c| c.final_score >= min_score)
        .collect();

    ranked.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    ranked.truncate(max_results);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights(vector_weight: f32, text_weight: f32) -> HybridConfig {
        HybridConfig {
            vector_weight,
            text_weight,
            candidate_multiplier: 4,
        }
    }

    #[test]
    fn weighted_sum_orders_results() {
        // vector 0.9 / text 0 -> 0.63; vector 0.2 / text 1.0 -> 0.44
        let vector = vec![("a".to_string(), 0.9), ("b".to_string(), 0.2)];
        let keyword = vec![("b".to_string(), 0.0)];
        let ranked = fuse(&vector, &keyword, &weights(0.7, 0.3), 10, 0.0);

        assert_eq!(ranked[0].chunk_id, "a");
        assert!((ranked[0].final_score - 0.63).abs() < 0.001);
        assert_eq!(ranked[1].chunk_id, "b");
        assert!((ranked[1].final_score - 0.44).abs() < 0.001);
    }

    #[test]
    fn missing_side_scores_zero() {
        let vector = vec![("only-vec".to_string(), 0.5)];
        let keyword = vec![("only-kw".to_string(), 1.0)];
        let ranked = fuse(&vector, &keyword, &weights(0.7, 0.3), 10, 0.0);

        let vec_only = ranked.iter().find(|c| c.chunk_id == "only-vec").unwrap();
        assert_eq!(vec_only.text_score, 0.0);
        let kw_only = ranked.iter().find(|c| c.chunk_id == "only-kw").unwrap();
        assert_eq!(kw_only.vector_score, 0.0);
        assert!((kw_only.text_score - 0.5).abs() < 0.001);
    }

    #[test]
    fn negative_ranks_clamp_to_full_text_score() {
        assert!((text_score_from_rank(-3.2) - 1.0).abs() < f32::EPSILON);
        assert!((text_score_from_rank(0.0) - 1.0).abs() < f32::EPSILON);
        assert!((text_score_from_rank(1.0) - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn ties_break_by_ascending_chunk_id() {
        let vector = vec![("z".to_string(), 0.5), ("a".to_string(), 0.5)];
        let ranked = fuse(&vector, &[], &weights(1.0, 0.0), 10, 0.0);
        assert_eq!(ranked[0].chunk_id, "a");
        assert_eq!(ranked[1].chunk_id, "z");
    }

    #[test]
    fn min_score_filters_and_max_results_truncates() {
        let vector = vec![
            ("a".to_string(), 0.9),
            ("b".to_string(), 0.8),
            ("c".to_string(), 0.1),
        ];
        let ranked = fuse(&vector, &[], &weights(1.0, 0.0), 1, 0.5);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].chunk_id, "a");
    }

    #[test]
    fn fusion_is_deterministic_under_input_order() {
        let v1 = vec![("a".to_string(), 0.4), ("b".to_string(), 0.6)];
        let v2 = vec![("b".to_string(), 0.6), ("a".to_string(), 0.4)];
        let kw = vec![("c".to_string(), 2.0)];
        assert_eq!(
            fuse(&v1, &kw, &weights(0.7, 0.3), 10, 0.0),
            fuse(&v2, &kw, &weights(0.7, 0.3), 10, 0.0)
        );
    }

    #[test]
    fn candidate_limit_scales_with_multiplier() {
        assert_eq!(candidate_limit(8, 4), 32);
        assert_eq!(candidate_limit(8, 0), 8);
        assert_eq!(candidate_limit(0, 4), 1);
    }
}
