//! Content-addressed cache in front of the generation capability.
//!
//! Every request is reduced to a [`CacheKey`]; a stored result for that key
//! is returned without touching the capability. Identical requests that
//! arrive while a generation is still running attach to it instead of
//! starting a second, billed call.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use retouch_shared::constants::DEFAULT_MIME_TYPE;
use retouch_shared::{
    fingerprint, Artifact, CacheKey, CapabilityId, FingerprintError, GenerationInput,
    GenerationOptions, GenerationRequest, ResolvedInput,
};
use retouch_store::{CacheStats, EvictionPolicy, StoreError};

use crate::capability::GenerationCapability;
use crate::error::GenerationError;
use crate::gateway::PersistenceGateway;

type Generation = Shared<BoxFuture<'static, Result<Artifact, GenerationError>>>;

/// Where a resolved artifact came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveSource {
    /// Served from a stored cache entry; the capability was not called.
    Cache,
    /// This call invoked the capability.
    Generated,
    /// Attached to an identical request that was already generating.
    Joined,
}

#[derive(Debug, Clone)]
pub struct Resolved {
    pub artifact: Artifact,
    pub key: CacheKey,
    pub source: ResolveSource,
}

impl Resolved {
    /// `true` when the UI should show a "loaded from cache" notice.
    pub fn from_cache(&self) -> bool {
        self.source == ResolveSource::Cache
    }
}

struct InFlight {
    id: u64,
    waiters: usize,
    generation: Generation,
}

/// One caller's claim on an in-flight generation, released on drop.
struct Waiter<'a> {
    cache: &'a ResultCache,
    key: CacheKey,
    flight_id: u64,
    completed: bool,
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        self.cache.leave(&self.key, self.flight_id, self.completed);
    }
}

pub struct ResultCache {
    gateway: Arc<dyn PersistenceGateway>,
    capability: Arc<dyn GenerationCapability>,
    policy: EvictionPolicy,
    in_flight: Mutex<HashMap<CacheKey, InFlight>>,
    next_flight_id: AtomicU64,
}

impl ResultCache {
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        capability: Arc<dyn GenerationCapability>,
        policy: EvictionPolicy,
    ) -> Self {
        Self {
            gateway,
            capability,
            policy,
            in_flight: Mutex::new(HashMap::new()),
            next_flight_id: AtomicU64::new(1),
        }
    }

    /// Fingerprint a request without resolving it.
    pub async fn fingerprint(&self, request: &GenerationRequest) -> Result<CacheKey, GenerationError> {
        fingerprint_request(request).await.map(|(key, _)| key)
    }

    pub async fn resolve(&self, request: &GenerationRequest) -> Result<Resolved, GenerationError> {
        self.resolve_inner(request, None).await
    }

    /// Like [`resolve`](Self::resolve), but gives up with
    /// [`GenerationError::Cancelled`] once `token` fires. When the last
    /// caller waiting on a generation cancels, the generation is dropped and
    /// nothing is written to the cache.
    pub async fn resolve_with_cancel(
        &self,
        request: &GenerationRequest,
        token: &CancellationToken,
    ) -> Result<Resolved, GenerationError> {
        self.resolve_inner(request, Some(token)).await
    }

    async fn resolve_inner(
        &self,
        request: &GenerationRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<Resolved, GenerationError> {
        let (key, inputs) = fingerprint_request(request).await?;

        if cancel.is_some_and(|token| token.is_cancelled()) {
            return Err(GenerationError::Cancelled);
        }

        let (flight_id, generation, source) = match self.join(&key) {
            Some((id, generation)) => {
                debug!(key = %key.short(), "joining in-flight generation");
                (id, generation, ResolveSource::Joined)
            }
            None => {
                if let Some(artifact) = self.lookup(key).await {
                    info!(
                        key = %key.short(),
                        capability = %request.capability,
                        bytes = artifact.bytes.len(),
                        "loaded from cache"
                    );
                    return Ok(Resolved {
                        artifact,
                        key,
                        source: ResolveSource::Cache,
                    });
                }
                self.start_or_join(key, request, inputs)
            }
        };

        // leaves the flight even if this future is dropped mid-await
        let mut waiter = Waiter {
            cache: self,
            key,
            flight_id,
            completed: false,
        };

        let outcome = match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => None,
                result = generation => Some(result),
            },
            None => Some(generation.await),
        };

        waiter.completed = outcome.is_some();
        drop(waiter);

        match outcome {
            None => {
                info!(key = %key.short(), "generation request cancelled");
                Err(GenerationError::Cancelled)
            }
            Some(result) => result.map(|artifact| Resolved {
                artifact,
                key,
                source,
            }),
        }
    }

    // ------------------------------------------------------------------
    // Cache management
    // ------------------------------------------------------------------

    /// Remove the stored result of `request`, if any.
    pub async fn invalidate(&self, request: &GenerationRequest) -> Result<bool, GenerationError> {
        let key = self.fingerprint(request).await?;
        let gateway = self.gateway.clone();
        run_blocking(move || gateway.delete_cache_entry(&key))
            .await
            .map_err(|e| GenerationError::Internal(e.to_string()))
    }

    pub async fn clear(&self) -> Result<usize, StoreError> {
        let gateway = self.gateway.clone();
        run_blocking(move || gateway.clear_cache()).await
    }

    pub async fn stats(&self) -> Result<CacheStats, StoreError> {
        let gateway = self.gateway.clone();
        run_blocking(move || gateway.cache_stats()).await
    }

    /// Number of distinct generations currently running.
    pub fn in_flight_count(&self) -> usize {
        self.flights().len()
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn flights(&self) -> MutexGuard<'_, HashMap<CacheKey, InFlight>> {
        // the map holds no invariant a panicking holder could break
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn join(&self, key: &CacheKey) -> Option<(u64, Generation)> {
        let mut flights = self.flights();
        flights.get_mut(key).map(|flight| {
            flight.waiters += 1;
            (flight.id, flight.generation.clone())
        })
    }

    fn start_or_join(
        &self,
        key: CacheKey,
        request: &GenerationRequest,
        inputs: Vec<ResolvedInput>,
    ) -> (u64, Generation, ResolveSource) {
        let mut flights = self.flights();

        // someone may have started the same generation during our lookup
        if let Some(flight) = flights.get_mut(&key) {
            flight.waiters += 1;
            debug!(key = %key.short(), "joining in-flight generation");
            return (flight.id, flight.generation.clone(), ResolveSource::Joined);
        }

        let id = self.next_flight_id.fetch_add(1, Ordering::Relaxed);
        let generation = generate_and_store(
            self.gateway.clone(),
            self.capability.clone(),
            self.policy,
            key,
            request.capability.clone(),
            inputs,
            request.options.clone(),
        )
        .boxed()
        .shared();

        flights.insert(
            key,
            InFlight {
                id,
                waiters: 1,
                generation: generation.clone(),
            },
        );
        (id, generation, ResolveSource::Generated)
    }

    fn leave(&self, key: &CacheKey, flight_id: u64, completed: bool) {
        let mut flights = self.flights();
        let Some(flight) = flights.get_mut(key) else {
            return;
        };
        if flight.id != flight_id {
            return;
        }

        flight.waiters = flight.waiters.saturating_sub(1);
        if completed || flight.waiters == 0 {
            // dropping the last handle drops the generation future
            flights.remove(key);
            if !completed {
                debug!(key = %key.short(), "no waiters left, abandoning generation");
            }
        }
    }

    async fn lookup(&self, key: CacheKey) -> Option<Artifact> {
        let gateway = self.gateway.clone();
        match run_blocking(move || gateway.load_cache_entry(&key)).await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, key = %key.short(), "cache lookup failed, treating as miss");
                None
            }
        }
    }
}

async fn generate_and_store(
    gateway: Arc<dyn PersistenceGateway>,
    capability: Arc<dyn GenerationCapability>,
    policy: EvictionPolicy,
    key: CacheKey,
    capability_id: CapabilityId,
    inputs: Vec<ResolvedInput>,
    options: GenerationOptions,
) -> Result<Artifact, GenerationError> {
    info!(
        capability = %capability_id,
        key = %key.short(),
        inputs = inputs.len(),
        "invoking generation capability"
    );
    let started = Instant::now();

    let artifact = capability
        .generate(&capability_id, &inputs, &options)
        .await
        .map_err(|e| {
            warn!(capability = %capability_id, error = %e, "generation failed");
            GenerationError::from(e)
        })?;

    if artifact.bytes.is_empty() {
        warn!(capability = %capability_id, "generation returned an empty artifact");
        return Err(GenerationError::EmptyResult);
    }

    info!(
        capability = %capability_id,
        key = %key.short(),
        bytes = artifact.bytes.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "generation finished"
    );

    // Inline, not on a blocking thread: a dropped (cancelled) flight must
    // never reach the cache.
    store_result(gateway.as_ref(), &key, &artifact, &policy);

    Ok(artifact)
}

fn store_result(
    gateway: &dyn PersistenceGateway,
    key: &CacheKey,
    artifact: &Artifact,
    policy: &EvictionPolicy,
) {
    if let Err(e) = gateway.save_cache_entry(key, artifact) {
        warn!(error = %e, key = %key.short(), "failed to write cache entry");
        return;
    }

    if policy.is_unbounded() {
        return;
    }
    match gateway.evict_cache(policy) {
        Ok(0) => {}
        Ok(evicted) => debug!(evicted, "evicted cache entries over limit"),
        Err(e) => warn!(error = %e, "cache eviction failed"),
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
}

/// Read file references into memory and fingerprint the request.
///
/// Fails before anything is sent to the capability if any input cannot be
/// read.
pub async fn fingerprint_request(
    request: &GenerationRequest,
) -> Result<(CacheKey, Vec<ResolvedInput>), GenerationError> {
    let inputs = resolve_inputs(&request.inputs).await?;
    let key = fingerprint(&request.capability, &inputs, &request.options)?;
    Ok((key, inputs))
}

pub async fn resolve_inputs(
    inputs: &[GenerationInput],
) -> Result<Vec<ResolvedInput>, FingerprintError> {
    let mut resolved = Vec::with_capacity(inputs.len());
    for input in inputs {
        let input = match input {
            GenerationInput::Text(text) => ResolvedInput::Text(text.clone()),
            GenerationInput::File { bytes, mime_type } => ResolvedInput::File {
                bytes: bytes.clone(),
                mime_type: mime_type.clone(),
            },
            GenerationInput::FileRef { path, mime_type } => {
                let bytes = tokio::fs::read(path).await.map_err(|source| {
                    FingerprintError::UnreadableInput {
                        path: path.clone(),
                        source,
                    }
                })?;
                ResolvedInput::File {
                    bytes: bytes.into(),
                    mime_type: mime_type
                        .clone()
                        .unwrap_or_else(|| mime_from_extension(path).to_string()),
                }
            }
        };
        resolved.push(input);
    }
    Ok(resolved)
}

fn mime_from_extension(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        _ => DEFAULT_MIME_TYPE,
    }
}
