// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules, one per table family.

pub mod cache;
pub mod chunks;
pub mod cursors;
pub mod files;
pub mod meta;
