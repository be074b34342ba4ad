use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS result_cache (
    cache_key  TEXT PRIMARY KEY NOT NULL,     -- hex-encoded 32-byte fingerprint
    mime_type  TEXT NOT NULL,
    bytes      BLOB NOT NULL,
    byte_len   INTEGER NOT NULL,
    created_at TEXT NOT NULL                  -- ISO-8601
);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
