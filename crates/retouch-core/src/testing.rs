//! Test doubles shared by the unit tests of this crate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use retouch_shared::{
    Artifact, CacheKey, CapabilityId, GenerationOptions, HistoryRecord, ResolvedInput,
};
use retouch_store::{CacheStats, EvictionPolicy, StoreError};

use crate::capability::GenerationCapability;
use crate::error::CapabilityError;
use crate::gateway::PersistenceGateway;

enum Behaviour {
    Echo,
    Fail(String),
    Empty,
}

/// Counts calls and answers with a payload derived from the request.
pub struct MockCapability {
    pub calls: AtomicUsize,
    delay: Duration,
    behaviour: Behaviour,
}

impl MockCapability {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            behaviour: Behaviour::Echo,
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            behaviour: Behaviour::Fail(reason.to_string()),
            ..Self::new()
        }
    }

    pub fn empty() -> Self {
        Self {
            behaviour: Behaviour::Empty,
            ..Self::new()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationCapability for MockCapability {
    async fn generate(
        &self,
        capability: &CapabilityId,
        inputs: &[ResolvedInput],
        _options: &GenerationOptions,
    ) -> Result<Artifact, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match &self.behaviour {
            Behaviour::Fail(reason) => Err(CapabilityError::new(reason.clone())),
            Behaviour::Empty => Ok(Artifact::new(Vec::<u8>::new(), "image/png")),
            Behaviour::Echo => {
                let mut payload = capability.as_str().as_bytes().to_vec();
                for input in inputs {
                    match input {
                        ResolvedInput::Text(text) => payload.extend_from_slice(text.as_bytes()),
                        ResolvedInput::File { bytes, .. } => payload.extend_from_slice(bytes),
                    }
                }
                Ok(Artifact::new(payload, "image/png"))
            }
        }
    }
}

/// Every operation fails, as with disabled storage or an exhausted quota.
pub struct FailingGateway;

fn unavailable() -> StoreError {
    StoreError::Io(std::io::Error::other("storage unavailable"))
}

impl PersistenceGateway for FailingGateway {
    fn save_history(&self, _record: &HistoryRecord) -> Result<(), StoreError> {
        Err(unavailable())
    }

    fn load_history(&self) -> Result<Option<HistoryRecord>, StoreError> {
        Err(unavailable())
    }

    fn clear_history(&self) -> Result<(), StoreError> {
        Err(unavailable())
    }

    fn save_cache_entry(&self, _key: &CacheKey, _artifact: &Artifact) -> Result<(), StoreError> {
        Err(unavailable())
    }

    fn load_cache_entry(&self, _key: &CacheKey) -> Result<Option<Artifact>, StoreError> {
        Err(unavailable())
    }

    fn delete_cache_entry(&self, _key: &CacheKey) -> Result<bool, StoreError> {
        Err(unavailable())
    }

    fn clear_cache(&self) -> Result<usize, StoreError> {
        Err(unavailable())
    }

    fn cache_stats(&self) -> Result<CacheStats, StoreError> {
        Err(unavailable())
    }

    fn evict_cache(&self, _policy: &EvictionPolicy) -> Result<usize, StoreError> {
        Err(unavailable())
    }
}
