//! Records exposed by the store beyond the shared domain types.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Cache entry metadata
// ---------------------------------------------------------------------------

/// Metadata of one cached generation result (payload excluded).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheEntryMeta {
    /// Hex-encoded request fingerprint.
    pub cache_key: String,
    /// MIME type of the cached artifact.
    pub mime_type: String,
    /// Payload size in bytes.
    pub byte_len: u64,
    /// When the entry was written.
    pub created_at: DateTime<Utc>,
    /// When the entry was last served, if ever.
    pub last_hit_at: Option<DateTime<Utc>>,
    /// How many times the entry has been served.
    pub hit_count: u64,
}

/// Aggregate size of the result cache partition.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
}

/// Limits applied by [`Database::evict_cache`](crate::Database::evict_cache).
///
/// `None` disables a limit. Entries are removed least-recently-hit first
/// until both limits hold.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvictionPolicy {
    pub max_entries: Option<usize>,
    pub max_bytes: Option<u64>,
}

impl EvictionPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn is_unbounded(&self) -> bool {
        self.max_entries.is_none() && self.max_bytes.is_none()
    }

    pub fn is_satisfied_by(&self, stats: &CacheStats) -> bool {
        self.max_entries.map_or(true, |max| stats.entries <= max)
            && self.max_bytes.map_or(true, |max| stats.total_bytes <= max)
    }
}

// Fixed-width so that TEXT columns sort chronologically.
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(
    raw: &str,
    column: usize,
) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
        })
}
