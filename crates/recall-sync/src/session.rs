// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delta sync planning for append-only session transcripts.
//!
//! A transcript is re-chunked only beyond its stored cursor, and only once
//! accumulated growth crosses a byte or message-count threshold. Below the
//! thresholds a sync pass does zero chunking and zero embedding work for
//! the file. A transcript that shrank was rewritten and gets a full resync.

use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncSeekExt};

use recall_config::SyncConfig;
use recall_core::error::RecallError;
use recall_storage::queries::cursors;
use recall_storage::{Database, SessionCursor};

/// What a sync pass should do with one transcript.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionPlan {
    /// Growth is below both thresholds; nothing to do.
    BelowThreshold,
    /// Chunk and append only the unsynced tail.
    Tail {
        text: String,
        first_line: u32,
        cursor: SessionCursor,
    },
    /// New or rewritten transcript; replace the whole chunk set.
    Full { text: String, cursor: SessionCursor },
}

/// Decide how much of a transcript needs syncing, reading only what the
/// plan requires.
pub async fn plan_session_sync(
    db: &Database,
    file_id: &str,
    path: &Path,
    known: bool,
    config: &SyncConfig,
) -> Result<SessionPlan, RecallError> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| RecallError::Internal(format!("stat {} failed: {e}", path.display())))?;
    let size = meta.len();
    let cursor = cursors::get_cursor(db, file_id).await?;

    // A shrunk file or an untracked one gets a full resync.
    if !known || size < cursor.last_byte_offset {
        let text = read_from(path, 0).await?;
        let lines = text.lines().count() as u64;
        return Ok(SessionPlan::Full {
            text,
            cursor: SessionCursor {
                last_byte_offset: size,
                last_message_count: lines,
            },
        });
    }

    let growth = size - cursor.last_byte_offset;
    if growth == 0 {
        return Ok(SessionPlan::BelowThreshold);
    }

    let tail = read_from(path, cursor.last_byte_offset).await?;
    let new_messages = tail.lines().count() as u64;
    if growth < config.session_delta_bytes && new_messages < config.session_delta_messages {
        return Ok(SessionPlan::BelowThreshold);
    }

    Ok(SessionPlan::Tail {
        text: tail,
        first_line: cursor.last_message_count as u32 + 1,
        cursor: SessionCursor {
            last_byte_offset: size,
            last_message_count: cursor.last_message_count + new_messages,
        },
    })
}

async fn read_from(path: &Path, offset: u64) -> Result<String, RecallError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| RecallError::Internal(format!("open {} failed: {e}", path.display())))?;
    if offset > 0 {
        file.seek(std::io::SeekFrom::Start(offset))
            .await
            .map_err(|e| RecallError::Internal(format!("seek {} failed: {e}", path.display())))?;
    }
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)
        .await
        .map_err(|e| RecallError::Internal(format!("read {} failed: {e}", path.display())))?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(bytes: u64, messages: u64) -> SyncConfig {
        SyncConfig {
            session_delta_bytes: bytes,
            session_delta_messages: messages,
            ..SyncConfig::default()
        }
    }

    async fn db() -> Database {
        let db = Database::open_in_memory().await.unwrap();
        // session_cursors.file_id references files(id); register the
        // transcript the tests cursor against.
        recall_storage::queries::files::upsert_file(
            &db,
            &recall_core::SourceFile {
                id: "f1".to_string(),
                path: "/sessions/s1.jsonl".to_string(),
                kind: recall_core::SourceKind::Session,
                content_hash: "h".to_string(),
                size_bytes: 0,
                mtime: 0,
                indexed_at: "2026-03-01T00:00:00.000Z".to_string(),
            },
        )
        .await
        .unwrap();
        db
    }

    fn write_lines(path: &Path, n: usize) -> u64 {
        let text: String = (1..=n).map(|i| format!("{{\"msg\":{i}}}\n")).collect();
        std::fs::write(path, &text).unwrap();
        text.len() as u64
    }

    #[tokio::test]
    async fn unknown_transcript_gets_full_sync() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s1.jsonl");
        write_lines(&path, 3);
        let db = db().await;

        let plan = plan_session_sync(&db, "f1", &path, false, &config(100, 10))
            .await
            .unwrap();
        match plan {
            SessionPlan::Full { text, cursor } => {
                assert_eq!(text.lines().count(), 3);
                assert_eq!(cursor.last_message_count, 3);
            }
            other => panic!("unexpected plan: {other:?}"),
        }
    }

    #[tokio::test]
    async fn growth_below_both_thresholds_is_zero_work() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s1.jsonl");
        let size = write_lines(&path, 5);
        let db = db().await;
        cursors::set_cursor(
            &db,
            "f1",
            SessionCursor {
                last_byte_offset: size,
                last_message_count: 5,
            },
        )
        .await
        .unwrap();

        // Two more messages, thresholds far above.
        write_lines(&path, 7);
        let plan = plan_session_sync(&db, "f1", &path, true, &config(10_000, 10))
            .await
            .unwrap();
        assert_eq!(plan, SessionPlan::BelowThreshold);
    }

    #[tokio::test]
    async fn crossing_message_threshold_plans_only_the_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s1.jsonl");
        let size = write_lines(&path, 5);
        let db = db().await;
        cursors::set_cursor(
            &db,
            "f1",
            SessionCursor {
                last_byte_offset: size,
                last_message_count: 5,
            },
        )
        .await
        .unwrap();

        write_lines(&path, 9);
        let plan = plan_session_sync(&db, "f1", &path, true, &config(10_000, 4))
            .await
            .unwrap();
        match plan {
            SessionPlan::Tail {
                text,
                first_line,
                cursor,
            } => {
                assert_eq!(text.lines().count(), 4);
                assert!(text.starts_with("{\"msg\":6}"));
                assert_eq!(first_line, 6);
                assert_eq!(cursor.last_message_count, 9);
            }
            other => panic!("unexpected plan: {other:?}"),
        }
    }

    #[tokio::test]
    async fn truncated_transcript_replans_fully() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s1.jsonl");
        let size = write_lines(&path, 10);
        let db = db().await;
        cursors::set_cursor(
            &db,
            "f1",
            SessionCursor {
                last_byte_offset: size,
                last_message_count: 10,
            },
        )
        .await
        .unwrap();

        write_lines(&path, 2);
        let plan = plan_session_sync(&db, "f1", &path, true, &config(10_000, 100))
            .await
            .unwrap();
        assert!(matches!(plan, SessionPlan::Full { .. }));
    }

    #[tokio::test]
    async fn unchanged_transcript_is_zero_work() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s1.jsonl");
        let size = write_lines(&path, 5);
        let db = db().await;
        cursors::set_cursor(
            &db,
            "f1",
            SessionCursor {
                last_byte_offset: size,
                last_message_count: 5,
            },
        )
        .await
        .unwrap();

        let plan = plan_session_sync(&db, "f1", &path, true, &config(1, 1))
            .await
            .unwrap();
        assert_eq!(plan, SessionPlan::BelowThreshold);
    }
}
