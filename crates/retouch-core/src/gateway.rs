//! Durable storage behind the history and the result cache.
//!
//! Persistence is best-effort: callers log failures and carry on with the
//! in-memory state, which stays authoritative for the session.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use retouch_shared::{Artifact, CacheKey, HistoryRecord};
use retouch_store::{CacheStats, Database, EvictionPolicy, StoreError};

use crate::config::SessionConfig;

type Result<T> = std::result::Result<T, StoreError>;

/// Partitioned key-value persistence used by the editor core.
///
/// Two partitions: the single history record and the result cache keyed
/// by request fingerprint.
pub trait PersistenceGateway: Send + Sync {
    /// Overwrite the persisted history record.
    fn save_history(&self, record: &HistoryRecord) -> Result<()>;

    /// `None` when nothing was ever saved or the record was cleared.
    fn load_history(&self) -> Result<Option<HistoryRecord>>;

    fn clear_history(&self) -> Result<()>;

    fn save_cache_entry(&self, key: &CacheKey, artifact: &Artifact) -> Result<()>;

    fn load_cache_entry(&self, key: &CacheKey) -> Result<Option<Artifact>>;

    fn delete_cache_entry(&self, key: &CacheKey) -> Result<bool>;

    fn clear_cache(&self) -> Result<usize>;

    fn cache_stats(&self) -> Result<CacheStats>;

    /// Drop least-recently-hit entries until `policy` holds.
    fn evict_cache(&self, policy: &EvictionPolicy) -> Result<usize>;
}

// ---------------------------------------------------------------------------
// SQLite
// ---------------------------------------------------------------------------

/// Gateway over a [`Database`]. The connection is not `Sync`, so every
/// call goes through a mutex; that also serializes history and cache
/// writes the way a single-threaded store would.
pub struct SqliteGateway {
    db: Mutex<Database>,
}

impl SqliteGateway {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self::new(Database::open_at(path)?))
    }

    /// Open the database named by `config`, or the platform default.
    pub fn from_config(config: &SessionConfig) -> Result<Self> {
        match &config.db_path {
            Some(path) => {
                tracing::info!(path = %path.display(), "opening configured database");
                Self::open_at(path)
            }
            None => Ok(Self::new(Database::new()?)),
        }
    }

    fn db(&self) -> Result<MutexGuard<'_, Database>> {
        self.db.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl PersistenceGateway for SqliteGateway {
    fn save_history(&self, record: &HistoryRecord) -> Result<()> {
        self.db()?.save_history(record)
    }

    fn load_history(&self) -> Result<Option<HistoryRecord>> {
        self.db()?.load_history()
    }

    fn clear_history(&self) -> Result<()> {
        self.db()?.clear_history().map(|_| ())
    }

    fn save_cache_entry(&self, key: &CacheKey, artifact: &Artifact) -> Result<()> {
        self.db()?.put_cache_entry(key, artifact)
    }

    fn load_cache_entry(&self, key: &CacheKey) -> Result<Option<Artifact>> {
        self.db()?.get_cache_entry(key)
    }

    fn delete_cache_entry(&self, key: &CacheKey) -> Result<bool> {
        self.db()?.delete_cache_entry(key)
    }

    fn clear_cache(&self) -> Result<usize> {
        self.db()?.clear_cache()
    }

    fn cache_stats(&self) -> Result<CacheStats> {
        self.db()?.cache_stats()
    }

    fn evict_cache(&self, policy: &EvictionPolicy) -> Result<usize> {
        self.db()?.evict_cache(policy)
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryState {
    history: Option<HistoryRecord>,
    cache: HashMap<CacheKey, MemoryEntry>,
    access_seq: u64,
}

struct MemoryEntry {
    artifact: Artifact,
    access_seq: u64,
}

/// Non-durable gateway for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryGateway {
    state: Mutex<MemoryState>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl MemoryState {
    fn next_seq(&mut self) -> u64 {
        self.access_seq += 1;
        self.access_seq
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.cache.len(),
            total_bytes: self
                .cache
                .values()
                .map(|e| e.artifact.bytes.len() as u64)
                .sum(),
        }
    }
}

impl PersistenceGateway for MemoryGateway {
    fn save_history(&self, record: &HistoryRecord) -> Result<()> {
        record
            .validate()
            .map_err(|e| StoreError::CorruptRecord(e.to_string()))?;
        self.state()?.history = Some(record.clone());
        Ok(())
    }

    fn load_history(&self) -> Result<Option<HistoryRecord>> {
        Ok(self.state()?.history.clone())
    }

    fn clear_history(&self) -> Result<()> {
        self.state()?.history = None;
        Ok(())
    }

    fn save_cache_entry(&self, key: &CacheKey, artifact: &Artifact) -> Result<()> {
        let mut state = self.state()?;
        let access_seq = state.next_seq();
        state.cache.insert(
            *key,
            MemoryEntry {
                artifact: artifact.clone(),
                access_seq,
            },
        );
        Ok(())
    }

    fn load_cache_entry(&self, key: &CacheKey) -> Result<Option<Artifact>> {
        let mut state = self.state()?;
        let seq = state.next_seq();
        Ok(state.cache.get_mut(key).map(|entry| {
            entry.access_seq = seq;
            entry.artifact.clone()
        }))
    }

    fn delete_cache_entry(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.state()?.cache.remove(key).is_some())
    }

    fn clear_cache(&self) -> Result<usize> {
        let mut state = self.state()?;
        let removed = state.cache.len();
        state.cache.clear();
        Ok(removed)
    }

    fn cache_stats(&self) -> Result<CacheStats> {
        Ok(self.state()?.stats())
    }

    fn evict_cache(&self, policy: &EvictionPolicy) -> Result<usize> {
        let mut state = self.state()?;

        let mut stats = state.stats();
        if policy.is_satisfied_by(&stats) {
            return Ok(0);
        }

        let mut by_age: Vec<(u64, CacheKey)> = state
            .cache
            .iter()
            .map(|(key, entry)| (entry.access_seq, *key))
            .collect();
        by_age.sort_unstable_by_key(|(seq, _)| *seq);

        let mut evicted = 0;
        for (_, key) in by_age {
            if policy.is_satisfied_by(&stats) {
                break;
            }
            if let Some(entry) = state.cache.remove(&key) {
                stats.entries -= 1;
                stats.total_bytes = stats
                    .total_bytes
                    .saturating_sub(entry.artifact.bytes.len() as u64);
                evicted += 1;
            }
        }
        Ok(evicted)
    }
}
