// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Debounced filesystem watching for memory sources.
//!
//! Change bursts within the debounce window collapse into a single trigger
//! on the scheduler channel. The channel has capacity 1 and triggers are
//! sent with `try_send`, so a storm of events while a pass is pending
//! coalesces instead of queueing.

use std::path::PathBuf;
use std::time::Duration;

use notify_debouncer_mini::notify::RecursiveMode;
use notify_debouncer_mini::{DebounceEventResult, Debouncer, new_debouncer};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use recall_core::error::RecallError;

/// Keeps the underlying watcher alive for as long as watching is wanted.
pub struct SourceWatcher {
    _debouncer: Debouncer<notify_debouncer_mini::notify::RecommendedWatcher>,
}

/// Watch the given roots and fire a trigger after each debounced burst.
pub fn watch_sources(
    roots: &[PathBuf],
    debounce: Duration,
    trigger: mpsc::Sender<()>,
) -> Result<SourceWatcher, RecallError> {
    let mut debouncer = new_debouncer(debounce, move |result: DebounceEventResult| match result {
        Ok(events) => {
            debug!(events = events.len(), "filesystem change burst");
            // A full channel means a pass is already queued.
            let _ = trigger.try_send(());
        }
        Err(e) => warn!(error = %e, "filesystem watch error"),
    })
    .map_err(|e| RecallError::Internal(format!("failed to start watcher: {e}")))?;

    for root in roots {
        let mode = if root.is_dir() {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        debouncer
            .watcher()
            .watch(root, mode)
            .map_err(|e| RecallError::Internal(format!("failed to watch {}: {e}", root.display())))?;
    }

    Ok(SourceWatcher {
        _debouncer: debouncer,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn burst_of_writes_collapses_into_one_trigger() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = mpsc::channel(1);
        let _watcher = watch_sources(
            &[dir.path().to_path_buf()],
            Duration::from_millis(100),
            tx,
        )
        .unwrap();

        for i in 0..5 {
            std::fs::write(dir.path().join("note.md"), format!("edit {i}")).unwrap();
        }

        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no trigger arrived")
            .expect("channel closed");

        // The burst fit inside one debounce window, so no second trigger
        // should be pending shortly after.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn watching_a_missing_root_fails() {
        let (tx, _rx) = mpsc::channel(1);
        let result = watch_sources(
            &[PathBuf::from("/nonexistent/recall-test-path")],
            Duration::from_millis(50),
            tx,
        );
        assert!(result.is_err());
    }
}
