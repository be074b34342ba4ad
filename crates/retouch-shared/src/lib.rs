//! # retouch-shared
//!
//! Types shared by the history, storage and cache layers of the retouch
//! editor: immutable document snapshots, tool tags, generation requests and
//! the BLAKE3 fingerprint that keys cached generation results.

pub mod constants;
pub mod error;
pub mod fingerprint;
pub mod request;
pub mod types;

pub use error::FingerprintError;
pub use fingerprint::{fingerprint, CacheKey};
pub use request::{
    Artifact, CapabilityId, GenerationInput, GenerationOptions, GenerationRequest, ResolvedInput,
};
pub use types::{HistoryRecord, RecordError, Snapshot, ToolTag};
