use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use retouch_shared::{Artifact, CacheKey};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{parse_timestamp, timestamp, CacheEntryMeta, CacheStats, EvictionPolicy};

impl Database {
    // entries are written once per key; an upsert only happens if a second
    // identical request raced past the first lookup
    pub fn put_cache_entry(&self, key: &CacheKey, artifact: &Artifact) -> Result<()> {
        let now = timestamp(Utc::now());
        self.conn().execute(
            "INSERT INTO result_cache
                 (cache_key, mime_type, bytes, byte_len, created_at, last_hit_at, hit_count, access_seq)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL, 0,
                     (SELECT COALESCE(MAX(access_seq), 0) + 1 FROM result_cache))
             ON CONFLICT(cache_key) DO UPDATE SET
                 mime_type = excluded.mime_type,
                 bytes = excluded.bytes,
                 byte_len = excluded.byte_len",
            params![
                key.to_hex(),
                artifact.mime_type,
                artifact.bytes.as_ref(),
                artifact.bytes.len() as i64,
                now,
            ],
        )?;
        Ok(())
    }

    /// Fetch a cached artifact and record the hit.
    pub fn get_cache_entry(&self, key: &CacheKey) -> Result<Option<Artifact>> {
        let key_hex = key.to_hex();
        let found: Option<(String, Vec<u8>)> = self
            .conn()
            .query_row(
                "SELECT mime_type, bytes FROM result_cache WHERE cache_key = ?1",
                params![key_hex],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((mime_type, bytes)) = found else {
            return Ok(None);
        };

        self.conn().execute(
            "UPDATE result_cache
             SET hit_count = hit_count + 1,
                 last_hit_at = ?2,
                 access_seq = (SELECT COALESCE(MAX(access_seq), 0) + 1 FROM result_cache)
             WHERE cache_key = ?1",
            params![key_hex, timestamp(Utc::now())],
        )?;

        Ok(Some(Artifact::new(bytes, mime_type)))
    }

    pub fn get_cache_entry_meta(&self, key: &CacheKey) -> Result<CacheEntryMeta> {
        self.conn()
            .query_row(
                "SELECT cache_key, mime_type, byte_len, created_at, last_hit_at, hit_count
                 FROM result_cache
                 WHERE cache_key = ?1",
                params![key.to_hex()],
                row_to_meta,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// Entries ordered least-recently-hit first.
    pub fn list_cache_entries(&self) -> Result<Vec<CacheEntryMeta>> {
        let mut stmt = self.conn().prepare(
            "SELECT cache_key, mime_type, byte_len, created_at, last_hit_at, hit_count
             FROM result_cache
             ORDER BY access_seq ASC",
        )?;
        let rows = stmt.query_map([], row_to_meta)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn cache_stats(&self) -> Result<CacheStats> {
        let (entries, total_bytes): (i64, i64) = self.conn().query_row(
            "SELECT COUNT(*), COALESCE(SUM(byte_len), 0) FROM result_cache",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(CacheStats {
            entries: entries as usize,
            total_bytes: total_bytes as u64,
        })
    }

    pub fn delete_cache_entry(&self, key: &CacheKey) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM result_cache WHERE cache_key = ?1",
            params![key.to_hex()],
        )?;
        Ok(affected > 0)
    }

    pub fn clear_cache(&self) -> Result<usize> {
        let affected = self.conn().execute("DELETE FROM result_cache", [])?;
        Ok(affected)
    }

    /// Remove least-recently-hit entries until `policy` holds.
    /// Returns the number of entries removed.
    pub fn evict_cache(&self, policy: &EvictionPolicy) -> Result<usize> {
        if policy.is_unbounded() {
            return Ok(0);
        }

        let mut stats = self.cache_stats()?;
        if policy.is_satisfied_by(&stats) {
            return Ok(0);
        }

        let mut evicted = 0;
        for entry in self.list_cache_entries()? {
            if policy.is_satisfied_by(&stats) {
                break;
            }
            self.conn().execute(
                "DELETE FROM result_cache WHERE cache_key = ?1",
                params![entry.cache_key],
            )?;
            stats.entries -= 1;
            stats.total_bytes = stats.total_bytes.saturating_sub(entry.byte_len);
            evicted += 1;
        }

        tracing::debug!(
            evicted,
            remaining_entries = stats.entries,
            remaining_bytes = stats.total_bytes,
            "result cache evicted"
        );
        Ok(evicted)
    }
}

fn row_to_meta(row: &rusqlite::Row<'_>) -> rusqlite::Result<CacheEntryMeta> {
    let cache_key: String = row.get(0)?;
    let mime_type: String = row.get(1)?;
    let byte_len: i64 = row.get(2)?;
    let created_str: String = row.get(3)?;
    let last_hit_str: Option<String> = row.get(4)?;
    let hit_count: i64 = row.get(5)?;

    let created_at = parse_timestamp(&created_str, 3)?;
    let last_hit_at = last_hit_str
        .map(|s| parse_timestamp(&s, 4))
        .transpose()?;

    Ok(CacheEntryMeta {
        cache_key,
        mime_type,
        byte_len: byte_len as u64,
        created_at,
        last_hit_at,
        hit_count: hit_count as u64,
    })
}
