//! v001 -- Initial schema creation.
//!
//! Creates the persisted edit history: one `history` row per session key,
//! its ordered `history_snapshots`, and the content-addressed
//! `snapshot_blobs` the positions point at.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Snapshot payloads, deduplicated by content
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS snapshot_blobs (
    content_hash TEXT PRIMARY KEY NOT NULL,   -- hex-encoded BLAKE3 of bytes
    bytes        BLOB NOT NULL,
    byte_len     INTEGER NOT NULL,
    created_at   TEXT NOT NULL                -- ISO-8601 / RFC-3339
);

-- ----------------------------------------------------------------
-- History record (cursor + tool tags)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS history (
    session_key TEXT PRIMARY KEY NOT NULL,
    cursor      INTEGER,                      -- NULL when empty
    tool_tags   TEXT NOT NULL,                -- JSON array of strings
    updated_at  TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Ordered snapshot list of a history record
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS history_snapshots (
    session_key  TEXT NOT NULL,               -- FK -> history(session_key)
    position     INTEGER NOT NULL,
    content_hash TEXT NOT NULL,               -- FK -> snapshot_blobs(content_hash)
    mime_type    TEXT NOT NULL,

    PRIMARY KEY (session_key, position),
    FOREIGN KEY (session_key) REFERENCES history(session_key) ON DELETE CASCADE,
    FOREIGN KEY (content_hash) REFERENCES snapshot_blobs(content_hash)
);

CREATE INDEX IF NOT EXISTS idx_history_snapshots_hash
    ON history_snapshots(content_hash);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
