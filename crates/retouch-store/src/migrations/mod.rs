//! Database migration runner.
//!
//! Migrations are executed in order on every [`Database::new`] / [`Database::open_at`]
//! call.  Each migration is guarded by a `user_version` pragma so it runs
//! exactly once.  Migrations are additive: a later version may add tables,
//! columns and indexes but never drops data written by an earlier one.
//!
//! [`Database::new`]: crate::Database::new
//! [`Database::open_at`]: crate::Database::open_at

pub mod v001_history;
pub mod v002_result_cache;
pub mod v003_cache_access;

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.  Bump this and add a new migration module whenever
/// the schema changes.
pub const CURRENT_VERSION: u32 = 3;

type MigrationFn = fn(&Connection) -> std::result::Result<(), rusqlite::Error>;

const MIGRATIONS: [(u32, &str, MigrationFn); 3] = [
    (1, "v001_history", v001_history::up),
    (2, "v002_result_cache", v002_result_cache::up),
    (3, "v003_cache_access", v003_cache_access::up),
];

/// Run all pending migrations against the open connection.
///
/// The function reads `PRAGMA user_version` to determine which migrations have
/// already been applied, then executes any outstanding ones in order.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    tracing::info!(
        current_version = current,
        target_version = CURRENT_VERSION,
        "checking database migrations"
    );

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema v{current} is newer than supported v{CURRENT_VERSION}"
        )));
    }

    apply(conn, current, &MIGRATIONS)
}

// each step commits together with its version bump
fn apply(conn: &Connection, current: u32, migrations: &[(u32, &str, MigrationFn)]) -> Result<()> {
    for &(version, name, up) in migrations {
        if current < version {
            tracing::info!(migration = name, "applying migration");
            let tx = conn.unchecked_transaction()?;
            up(&tx).map_err(|e| StoreError::Migration(format!("{name}: {e}")))?;
            tx.pragma_update(None, "user_version", version)?;
            tx.commit()?;
        }
    }

    Ok(())
}
