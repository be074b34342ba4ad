use rusqlite::Connection;

const UP_SQL: &str = r#"
-- Access bookkeeping for least-recently-hit eviction
ALTER TABLE result_cache ADD COLUMN last_hit_at TEXT;
ALTER TABLE result_cache ADD COLUMN hit_count INTEGER NOT NULL DEFAULT 0;
ALTER TABLE result_cache ADD COLUMN access_seq INTEGER NOT NULL DEFAULT 0;

CREATE INDEX IF NOT EXISTS idx_result_cache_access ON result_cache(access_seq);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
