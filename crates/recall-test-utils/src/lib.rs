// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Recall integration tests.
//!
//! Provides a deterministic in-process embedding backend so tests never
//! touch the network or load model files.

pub mod mock_embedder;

pub use mock_embedder::{FailingEmbedder, MockEmbedder};
