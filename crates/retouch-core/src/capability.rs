use async_trait::async_trait;

use retouch_shared::{Artifact, CapabilityId, GenerationOptions, ResolvedInput};

use crate::error::CapabilityError;

/// The external image/video generation service.
///
/// Calls are slow (seconds to minutes) and may be billed, which is why
/// [`ResultCache`](crate::ResultCache) sits in front of every invocation.
#[async_trait]
pub trait GenerationCapability: Send + Sync {
    async fn generate(
        &self,
        capability: &CapabilityId,
        inputs: &[ResolvedInput],
        options: &GenerationOptions,
    ) -> Result<Artifact, CapabilityError>;
}
