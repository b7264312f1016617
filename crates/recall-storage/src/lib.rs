// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Recall memory engine.
//!
//! One store file per agent holds tracked source files, their chunk sets,
//! an FTS5 keyword mirror, per-chunk embedding BLOBs, the embedding cache,
//! and session sync cursors. All access goes through a single
//! tokio-rusqlite connection; mutation happens only during sync passes.

pub mod database;
pub mod migrations;
pub mod queries;

pub use database::Database;
pub use queries::cache::CacheKey;
pub use queries::cursors::SessionCursor;
pub use queries::meta::VectorMeta;
