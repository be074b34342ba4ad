//! Requests sent to the generation capability and the artifacts it returns.

use std::path::PathBuf;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::FingerprintError;
use crate::types::Snapshot;

/// Identifier of a generation capability (model or endpoint name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityId(pub String);

impl CapabilityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One input as a tool panel hands it over.
///
/// `FileRef` points at a file on disk that is read when the request is
/// resolved; everything else is already in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationInput {
    Text(String),
    File { bytes: Bytes, mime_type: String },
    FileRef { path: PathBuf, mime_type: Option<String> },
}

impl GenerationInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn file(bytes: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        Self::File {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
        }
    }
}

impl From<&Snapshot> for GenerationInput {
    fn from(snapshot: &Snapshot) -> Self {
        Self::File {
            bytes: snapshot.bytes().clone(),
            mime_type: snapshot.mime_type().to_string(),
        }
    }
}

/// An input whose content is fully in memory, ready to be hashed and sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedInput {
    Text(String),
    File { bytes: Bytes, mime_type: String },
}

/// Option sets understood by the known capabilities.
///
/// Only used for two things: passing settings to the capability and
/// producing the canonical form that goes into the cache fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenerationOptions {
    #[default]
    None,
    Image {
        aspect_ratio: Option<String>,
        seed: Option<u64>,
        style_strength: Option<f32>,
    },
    Video {
        duration_secs: u32,
        resolution: String,
        fps: Option<u32>,
    },
    Upscale {
        factor: u32,
    },
    Edit {
        mask_feather: Option<u32>,
        preserve_identity: bool,
    },
}

impl GenerationOptions {
    /// Canonical serialization used for fingerprinting.
    ///
    /// Field order is fixed by the struct definitions, so two equal option
    /// values always serialize to the same bytes. JSON has no NaN or
    /// infinity (they would collapse into `null`), so non-finite floats
    /// are rejected.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, FingerprintError> {
        if let GenerationOptions::Image {
            style_strength: Some(strength),
            ..
        } = self
        {
            if !strength.is_finite() {
                return Err(FingerprintError::NonFiniteOption {
                    field: "style_strength",
                });
            }
        }
        Ok(serde_json::to_vec(self)?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub capability: CapabilityId,
    /// Semantically ordered: the first image is the source, later ones are
    /// references. Swapping inputs changes the request.
    pub inputs: Vec<GenerationInput>,
    pub options: GenerationOptions,
}

impl GenerationRequest {
    pub fn new(capability: impl Into<String>) -> Self {
        Self {
            capability: CapabilityId::new(capability),
            inputs: Vec::new(),
            options: GenerationOptions::None,
        }
    }

    pub fn with_input(mut self, input: GenerationInput) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }
}

/// Output of a generation call: an image or video payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub bytes: Bytes,
    pub mime_type: String,
}

impl Artifact {
    pub fn new(bytes: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
        }
    }
}

impl From<Artifact> for Snapshot {
    fn from(artifact: Artifact) -> Self {
        Snapshot::new(artifact.bytes, artifact.mime_type)
    }
}

impl From<&Snapshot> for Artifact {
    fn from(snapshot: &Snapshot) -> Self {
        Artifact::new(snapshot.bytes().clone(), snapshot.mime_type())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_canonical_form_is_tagged() {
        let opts = GenerationOptions::Upscale { factor: 2 };
        let bytes = opts.canonical_bytes().unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"kind":"upscale","factor":2}"#
        );
    }

    #[test]
    fn test_non_finite_style_strength_rejected() {
        for strength in [f32::NAN, f32::INFINITY, f32::NEG_INFINITY] {
            let opts = GenerationOptions::Image {
                aspect_ratio: None,
                seed: None,
                style_strength: Some(strength),
            };
            assert!(matches!(
                opts.canonical_bytes(),
                Err(FingerprintError::NonFiniteOption {
                    field: "style_strength"
                })
            ));
        }
    }

    #[test]
    fn test_artifact_snapshot_conversion_is_lossless() {
        let artifact = Artifact::new(vec![1, 2, 3], "image/webp");
        let snapshot: Snapshot = artifact.clone().into();
        assert_eq!(Artifact::from(&snapshot), artifact);
    }

    #[test]
    fn test_request_builder_keeps_input_order() {
        let req = GenerationRequest::new("restyle")
            .with_input(GenerationInput::text("make it blue"))
            .with_input(GenerationInput::file(vec![9u8], "image/png"));
        assert_eq!(req.inputs.len(), 2);
        assert!(matches!(req.inputs[0], GenerationInput::Text(_)));
    }
}
