/// Application name
pub const APP_NAME: &str = "retouch";

/// Key the single persisted history record is stored under
pub const HISTORY_SESSION_KEY: &str = "current";

/// Key derivation context for cache fingerprints (BLAKE3 derive-key mode).
/// Bump the version suffix to invalidate every cached result at once.
pub const KDF_CONTEXT_CACHE_KEY: &str = "retouch-cache-key-v1";

/// Length of a cache key in bytes
pub const CACHE_KEY_SIZE: usize = 32;

/// Default upper bound on the number of cached generation results
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 512;

/// Default upper bound on cached payload bytes (1 GiB)
pub const DEFAULT_CACHE_MAX_BYTES: u64 = 1024 * 1024 * 1024;

/// MIME type assumed when an input file does not declare one
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";
