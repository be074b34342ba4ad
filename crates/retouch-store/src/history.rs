//! Persistence of the edit history record.
//!
//! The whole `(snapshots, cursor, tool_tags)` triple lives under one session
//! key and is overwritten on every save. Snapshot payloads are stored once
//! per content hash, so undoing back to an earlier image and committing it
//! again does not duplicate bytes on disk.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use retouch_shared::constants::HISTORY_SESSION_KEY;
use retouch_shared::{HistoryRecord, Snapshot, ToolTag};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::timestamp;

impl Database {
    // ------------------------------------------------------------------
    // Write
    // ------------------------------------------------------------------

    /// Upsert the history record under the fixed session key.
    ///
    /// When the snapshot list matches what is already stored (undo, redo,
    /// jump) only the `history` row is rewritten. Otherwise payloads are
    /// written for hashes not yet in `snapshot_blobs`.
    pub fn save_history(&mut self, record: &HistoryRecord) -> Result<()> {
        record
            .validate()
            .map_err(|e| StoreError::CorruptRecord(e.to_string()))?;

        let now = timestamp(Utc::now());
        let tool_tags = serde_json::to_string(&record.tool_tags)?;
        let cursor = record.cursor.map(|c| c as i64);
        let refs: Vec<(String, &str)> = record
            .snapshots
            .iter()
            .map(|s| (s.content_hash(), s.mime_type()))
            .collect();

        let tx = self.conn_mut().transaction()?;

        let stored = stored_snapshot_refs(&tx)?;
        let unchanged = stored.len() == refs.len()
            && stored
                .iter()
                .zip(&refs)
                .all(|((hash, mime), (new_hash, new_mime))| hash == new_hash && mime == new_mime);

        let blobs_written = if unchanged {
            0
        } else {
            insert_missing_blobs(&tx, &record.snapshots, &refs, &now)?
        };

        tx.execute(
            "INSERT INTO history (session_key, cursor, tool_tags, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(session_key) DO UPDATE SET
                 cursor = excluded.cursor,
                 tool_tags = excluded.tool_tags,
                 updated_at = excluded.updated_at",
            params![HISTORY_SESSION_KEY, cursor, tool_tags, now],
        )?;

        let mut collected = 0;
        if !unchanged {
            tx.execute(
                "DELETE FROM history_snapshots WHERE session_key = ?1",
                params![HISTORY_SESSION_KEY],
            )?;

            for (position, (hash, mime_type)) in refs.iter().enumerate() {
                tx.execute(
                    "INSERT INTO history_snapshots (session_key, position, content_hash, mime_type)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![HISTORY_SESSION_KEY, position as i64, hash, mime_type],
                )?;
            }

            collected = collect_orphan_blobs(&tx)?;
        }
        tx.commit()?;

        tracing::debug!(
            snapshots = record.snapshots.len(),
            cursor = ?record.cursor,
            cursor_only = unchanged,
            blobs_written,
            orphans_collected = collected,
            "history saved"
        );
        Ok(())
    }

    /// Delete the persisted history record. Returns `true` if one existed.
    pub fn clear_history(&mut self) -> Result<bool> {
        let tx = self.conn_mut().transaction()?;

        // history_snapshots rows go with it (ON DELETE CASCADE)
        let affected = tx.execute(
            "DELETE FROM history WHERE session_key = ?1",
            params![HISTORY_SESSION_KEY],
        )?;
        let collected = collect_orphan_blobs(&tx)?;
        tx.commit()?;

        tracing::debug!(existed = affected > 0, orphans_collected = collected, "history cleared");
        Ok(affected > 0)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Load the persisted history record, if any.
    ///
    /// A stored record that breaks the history invariants is reported as
    /// [`StoreError::CorruptRecord`].
    pub fn load_history(&self) -> Result<Option<HistoryRecord>> {
        let row: Option<(Option<i64>, String)> = self
            .conn()
            .query_row(
                "SELECT cursor, tool_tags FROM history WHERE session_key = ?1",
                params![HISTORY_SESSION_KEY],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((cursor, tool_tags_json)) = row else {
            return Ok(None);
        };

        let tool_tags: Vec<ToolTag> = serde_json::from_str(&tool_tags_json)?;

        let cursor = match cursor {
            None => None,
            Some(c) => Some(usize::try_from(c).map_err(|_| {
                StoreError::CorruptRecord(format!("negative cursor {c}"))
            })?),
        };

        let mut stmt = self.conn().prepare(
            "SELECT s.position, s.mime_type, b.bytes
             FROM history_snapshots s
             JOIN snapshot_blobs b ON b.content_hash = s.content_hash
             WHERE s.session_key = ?1
             ORDER BY s.position ASC",
        )?;

        let rows = stmt.query_map(params![HISTORY_SESSION_KEY], |row| {
            let position: i64 = row.get(0)?;
            let mime_type: String = row.get(1)?;
            let bytes: Vec<u8> = row.get(2)?;
            Ok((position, Snapshot::new(bytes, mime_type)))
        })?;

        let mut snapshots = Vec::new();
        for row in rows {
            let (position, snapshot) = row?;
            if position != snapshots.len() as i64 {
                return Err(StoreError::CorruptRecord(format!(
                    "snapshot position {position} out of sequence"
                )));
            }
            snapshots.push(snapshot);
        }

        let record = HistoryRecord {
            snapshots,
            cursor,
            tool_tags,
        };
        record
            .validate()
            .map_err(|e| StoreError::CorruptRecord(e.to_string()))?;

        Ok(Some(record))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `(content_hash, mime_type)` of every stored position, in order.
fn stored_snapshot_refs(conn: &rusqlite::Connection) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare_cached(
        "SELECT content_hash, mime_type FROM history_snapshots
         WHERE session_key = ?1
         ORDER BY position ASC",
    )?;
    let rows = stmt.query_map(params![HISTORY_SESSION_KEY], |row| {
        Ok((row.get(0)?, row.get(1)?))
    })?;
    let refs = rows.collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(refs)
}

/// Write payloads whose hash is not stored yet. Returns how many were written.
fn insert_missing_blobs(
    conn: &rusqlite::Connection,
    snapshots: &[Snapshot],
    refs: &[(String, &str)],
    now: &str,
) -> Result<usize> {
    let mut exists = conn.prepare_cached("SELECT 1 FROM snapshot_blobs WHERE content_hash = ?1")?;
    let mut insert = conn.prepare_cached(
        "INSERT OR IGNORE INTO snapshot_blobs (content_hash, bytes, byte_len, created_at)
         VALUES (?1, ?2, ?3, ?4)",
    )?;

    let mut written = 0;
    for (snapshot, (hash, _)) in snapshots.iter().zip(refs) {
        if exists.exists(params![hash])? {
            continue;
        }
        written += insert.execute(params![
            hash,
            snapshot.bytes().as_ref(),
            snapshot.len() as i64,
            now,
        ])?;
    }
    Ok(written)
}

/// Delete snapshot payloads no history position refers to any more.
fn collect_orphan_blobs(conn: &rusqlite::Connection) -> Result<usize> {
    let collected = conn.execute(
        "DELETE FROM snapshot_blobs
         WHERE content_hash NOT IN (SELECT content_hash FROM history_snapshots)",
        [],
    )?;
    Ok(collected)
}
