//! # retouch-store
//!
//! Local durable storage for the retouch editor, backed by SQLite.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed helpers for the two
//! partitions the editor needs: the single persisted edit history and the
//! content-addressed cache of generation results.

pub mod cache_entries;
pub mod database;
pub mod history;
pub mod migrations;
pub mod models;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use models::*;
