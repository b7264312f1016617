// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory indexing and hybrid retrieval for conversational agents.
//!
//! Indexes an agent's long-term note file, daily notes, and session
//! transcripts into a per-agent SQLite store, embeds chunks through a
//! provider waterfall (local ONNX, OpenAI, Gemini), and answers queries
//! with a weighted blend of vector similarity and BM25 keyword rank.
//!
//! ## Entry points
//!
//! - [`MemoryIndex::open`]: wire up one agent's index and start syncing
//! - [`QueryService`]: `search` and allow-listed raw `get`
//! - [`tools`]: `memory_search` / `memory_get` tool-call shims

pub mod index;
pub mod service;
pub mod tools;

pub use index::MemoryIndex;
pub use service::{FileSlice, QueryService, SearchOutcome};
pub use tools::{
    MemoryGetRequest, MemoryGetResponse, MemorySearchRequest, MemorySearchResponse, memory_get,
    memory_get_json, memory_search, memory_search_json,
};
