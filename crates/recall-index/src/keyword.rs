// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keyword search over the FTS5 chunk mirror.
//!
//! The FTS5 table is maintained by triggers in the storage layer, so this
//! module only sanitizes free-form query text into a safe MATCH expression
//! and runs the ranked BM25 query. Raw ranks follow the BM25 convention:
//! lower is better, and SQLite reports them as negative values.

use std::sync::Arc;

use recall_core::error::RecallError;
use recall_storage::Database;
use recall_storage::queries::chunks;

/// Keyword index handle for one store.
pub struct KeywordIndex {
    db: Arc<Database>,
}

impl KeywordIndex {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Run a ranked keyword query, returning `(chunk_id, raw_rank)` pairs
    /// ordered best-first. Queries with no searchable terms return nothing.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<(String, f64)>, RecallError> {
        let Some(expr) = match_expression(query) else {
            return Ok(Vec::new());
        };
        chunks::search_bm25(&self.db, &expr, limit).await
    }
}

/// Turn free-form text into an FTS5 MATCH expression.
///
/// Each alphanumeric term is double-quoted to neutralize FTS5 operator
/// syntax, and terms are OR-ed so partial matches still rank.
fn match_expression(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}
