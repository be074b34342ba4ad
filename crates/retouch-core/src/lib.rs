//! # retouch-core
//!
//! Edit history and generation result caching for the retouch editor.
//!
//! - [`HistoryStore`]: linear undo/redo timeline of document snapshots
//! - [`PersistenceGateway`]: best-effort durable storage of the timeline and
//!   of cached results ([`SqliteGateway`], [`MemoryGateway`])
//! - [`ResultCache`]: content-addressed cache in front of a slow
//!   [`GenerationCapability`], with de-duplication of identical in-flight
//!   requests
//! - [`EditorSession`]: wires the three together for one editing session

pub mod cache;
pub mod capability;
pub mod config;
pub mod error;
pub mod gateway;
pub mod history;
pub mod logging;
pub mod session;

#[cfg(test)]
mod testing;

pub use cache::{Resolved, ResolveSource, ResultCache};
pub use capability::GenerationCapability;
pub use config::SessionConfig;
pub use error::{CapabilityError, GenerationError, NavigationError};
pub use gateway::{MemoryGateway, PersistenceGateway, SqliteGateway};
pub use history::{HistoryObserver, HistoryState, HistoryStore};
pub use session::EditorSession;

pub use retouch_shared::{
    Artifact, CacheKey, CapabilityId, GenerationInput, GenerationOptions, GenerationRequest,
    HistoryRecord, ResolvedInput, Snapshot, ToolTag,
};
pub use retouch_store::{CacheStats, EvictionPolicy, StoreError};
