// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Synchronization for the Recall memory engine: source discovery, the
//! debounced filesystem watcher, session transcript delta sync, and the
//! single-flight scheduler that ties them together.

pub mod scheduler;
pub mod session;
pub mod sources;
pub mod watcher;

pub use scheduler::SyncScheduler;
pub use sources::{DiscoveredFile, SourceLayout};
pub use watcher::{SourceWatcher, watch_sources};
