// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session sync cursors: how much of each append-only transcript has
//! already been chunked.

use recall_core::RecallError;

use crate::database::{Database, map_tr_err};

/// Position up to which a transcript has been indexed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionCursor {
    pub last_byte_offset: u64,
    pub last_message_count: u64,
}

/// Fetch a transcript's cursor; a missing row means nothing synced yet.
pub async fn get_cursor(db: &Database, file_id: &str) -> Result<SessionCursor, RecallError> {
    let file_id = file_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT last_byte_offset, last_message_count
                 FROM session_cursors WHERE file_id = ?1",
            )?;
            let cursor = stmt
                .query_map(rusqlite::params![file_id], |row| {
                    Ok(SessionCursor {
                        last_byte_offset: row.get::<_, i64>(0)? as u64,
                        last_message_count: row.get::<_, i64>(1)? as u64,
                    })
                })?
                .next()
                .transpose()?;
            Ok(cursor.unwrap_or_default())
        })
        .await
        .map_err(map_tr_err)
}

/// Record the new high-water mark for a transcript.
pub async fn set_cursor(
    db: &Database,
    file_id: &str,
    cursor: SessionCursor,
) -> Result<(), RecallError> {
    let file_id = file_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO session_cursors (file_id, last_byte_offset, last_message_count)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(file_id) DO UPDATE SET
                     last_byte_offset = excluded.last_byte_offset,
                     last_message_count = excluded.last_message_count",
                rusqlite::params![
                    file_id,
                    cursor.last_byte_offset as i64,
                    cursor.last_message_count as i64
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
