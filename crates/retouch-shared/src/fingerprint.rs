use crate::constants::{CACHE_KEY_SIZE, KDF_CONTEXT_CACHE_KEY};
use crate::error::FingerprintError;
use crate::request::{CapabilityId, GenerationOptions, ResolvedInput};

const TAG_TEXT: u8 = 0x01;
const TAG_FILE: u8 = 0x02;

// Content fingerprint of a generation request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey(pub [u8; CACHE_KEY_SIZE]);

impl CacheKey {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut arr = [0u8; CACHE_KEY_SIZE];
        hex::decode_to_slice(s, &mut arr)?;
        Ok(Self(arr))
    }

    pub fn short(&self) -> String {
        self.to_hex()[..12].to_string()
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

// Length-prefix every variable field so adjacent fields can't bleed into
// each other ("ab" + "c" vs "a" + "bc").
fn update_field(hasher: &mut blake3::Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

/// Derive the cache key for a request (BLAKE3 KDF with domain separation).
///
/// Inputs are hashed in order, each with its position and kind, so a
/// source image and a style image do not collide when swapped.
pub fn fingerprint(
    capability: &CapabilityId,
    inputs: &[ResolvedInput],
    options: &GenerationOptions,
) -> Result<CacheKey, FingerprintError> {
    let mut hasher = blake3::Hasher::new_derive_key(KDF_CONTEXT_CACHE_KEY);
    update_field(&mut hasher, capability.as_str().as_bytes());

    hasher.update(&(inputs.len() as u64).to_le_bytes());
    for (index, input) in inputs.iter().enumerate() {
        hasher.update(&(index as u64).to_le_bytes());
        match input {
            ResolvedInput::Text(text) => {
                hasher.update(&[TAG_TEXT]);
                hasher.update(blake3::hash(text.as_bytes()).as_bytes());
            }
            ResolvedInput::File { bytes, mime_type } => {
                hasher.update(&[TAG_FILE]);
                update_field(&mut hasher, mime_type.as_bytes());
                hasher.update(blake3::hash(bytes).as_bytes());
            }
        }
    }

    update_field(&mut hasher, &options.canonical_bytes()?);

    Ok(CacheKey(*hasher.finalize().as_bytes()))
}
