use std::sync::Arc;

use retouch_shared::FingerprintError;
use thiserror::Error;

/// A history navigation whose precondition does not hold.
///
/// The record is left untouched and no observer fires. UI owners normally
/// ignore these and disable the matching controls via `can_undo`/`can_redo`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NavigationError {
    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Nothing to redo")]
    NothingToRedo,

    #[error("History index {index} out of range ({len} snapshots)")]
    OutOfRange { index: usize, len: usize },

    #[error("Already at the original image")]
    AlreadyOriginal,

    #[error("No document loaded")]
    NoDocument,
}

/// Opaque failure reported by a generation capability.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct CapabilityError(pub String);

impl CapabilityError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Why a generation request produced no artifact. Never cached.
#[derive(Error, Debug, Clone)]
pub enum GenerationError {
    #[error("Generation failed: {0}")]
    Capability(#[from] CapabilityError),

    #[error("Generation returned an empty result")]
    EmptyResult,

    #[error("Could not fingerprint request: {0}")]
    Fingerprint(Arc<FingerprintError>),

    #[error("Generation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<FingerprintError> for GenerationError {
    fn from(e: FingerprintError) -> Self {
        Self::Fingerprint(Arc::new(e))
    }
}

impl GenerationError {
    /// Short text for a transient notification.
    pub fn user_message(&self) -> String {
        match self {
            GenerationError::Capability(reason) => {
                format!("The image service could not complete the request: {reason}")
            }
            GenerationError::EmptyResult => {
                "The image service returned no image. Please try again.".to_string()
            }
            GenerationError::Fingerprint(e) => format!("An input could not be read: {e}"),
            GenerationError::Cancelled => "The request was cancelled.".to_string(),
            GenerationError::Internal(_) => "Something went wrong. Please try again.".to_string(),
        }
    }
}
