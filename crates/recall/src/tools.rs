// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent tool-call surface for the memory index.
//!
//! `memory_search` and `memory_get` are thin serde shims over
//! `QueryService`; the `_json` variants take raw tool arguments and are the
//! only place malformed parameters become hard errors.

use std::path::Path;

use recall_core::{RecallError, SearchResult};
use serde::{Deserialize, Serialize};

use crate::service::QueryService;

#[derive(Debug, Clone, Deserialize)]
pub struct MemorySearchRequest {
    pub query: String,
    /// Per-call result count override; the configured default when absent.
    #[serde(default)]
    pub max_results: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemorySearchResponse {
    pub results: Vec<SearchResult>,
    /// Embedding provider the vector scores came from; "none" when the
    /// index is running keyword-only.
    pub provider: String,
    pub model: String,
    /// True when the pre-query sync exceeded its budget and results may
    /// lag recent file changes.
    pub possibly_stale: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemoryGetRequest {
    pub path: String,
    /// 1-based first line; defaults to the start of the file.
    #[serde(default)]
    pub from_line: Option<u32>,
    /// 1-based last line, inclusive; defaults to the end of the file.
    #[serde(default)]
    pub to_line: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemoryGetResponse {
    pub path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub content: String,
}

/// Search indexed memory. An empty query returns no results.
pub async fn memory_search(
    service: &QueryService,
    request: MemorySearchRequest,
) -> Result<MemorySearchResponse, RecallError> {
    let outcome = service.search(&request.query, request.max_results).await?;
    Ok(MemorySearchResponse {
        results: outcome.results,
        provider: service.provider().to_string(),
        model: service.model().to_string(),
        possibly_stale: outcome.possibly_stale,
    })
}

/// Read raw lines from an allow-listed source file.
pub async fn memory_get(
    service: &QueryService,
    request: MemoryGetRequest,
) -> Result<MemoryGetResponse, RecallError> {
    let slice = service
        .get(Path::new(&request.path), request.from_line, request.to_line)
        .await?;
    Ok(MemoryGetResponse {
        path: slice.path,
        start_line: slice.start_line,
        end_line: slice.end_line,
        content: slice.content,
    })
}

/// `memory_search` entry point for raw JSON tool arguments.
pub async fn memory_search_json(
    service: &QueryService,
    params: serde_json::Value,
) -> Result<serde_json::Value, RecallError> {
    let request: MemorySearchRequest = serde_json::from_value(params)
        .map_err(|e| RecallError::Internal(format!("invalid memory_search arguments: {e}")))?;
    let response = memory_search(service, request).await?;
    serde_json::to_value(&response).map_err(|e| RecallError::Internal(e.to_string()))
}

/// `memory_get` entry point for raw JSON tool arguments.
pub async fn memory_get_json(
    service: &QueryService,
    params: serde_json::Value,
) -> Result<serde_json::Value, RecallError> {
    let request: MemoryGetRequest = serde_json::from_value(params)
        .map_err(|e| RecallError::Internal(format!("invalid memory_get arguments: {e}")))?;
    let response = memory_get(service, request).await?;
    serde_json::to_value(&response).map_err(|e| RecallError::Internal(e.to_string()))
}
