use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// One committed state of the edited document. Payload is never mutated,
// so its hash is computed once here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    bytes: Bytes,
    mime_type: String,
    hash: blake3::Hash,
}

impl Snapshot {
    pub fn new(bytes: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        let bytes = bytes.into();
        Self {
            hash: blake3::hash(&bytes),
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// BLAKE3 hash of the payload, hex-encoded.
    pub fn content_hash(&self) -> String {
        self.hash.to_hex().to_string()
    }
}

/// Identifier of the tool that produced an edit (e.g. `"cropTool"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolTag(pub String);

impl ToolTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ToolTag {
    fn from(tag: &str) -> Self {
        Self(tag.to_string())
    }
}

impl std::fmt::Display for ToolTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RecordError {
    #[error("cursor {cursor:?} does not fit {len} snapshots")]
    CursorOutOfRange { cursor: Option<usize>, len: usize },

    #[error("expected {expected} tool tags, found {found}")]
    TagCountMismatch { expected: usize, found: usize },
}

/// The `(snapshots, cursor, tool_tags)` triple owned by a history store.
///
/// `cursor` is `None` exactly when there are no snapshots. The first
/// snapshot is the initial upload and carries no tool tag, so
/// `tool_tags.len() == snapshots.len() - 1` for a populated record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryRecord {
    pub snapshots: Vec<Snapshot>,
    pub cursor: Option<usize>,
    pub tool_tags: Vec<ToolTag>,
}

impl HistoryRecord {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Check the record invariants. Records loaded from storage must pass
    /// this before they are handed to a history store.
    pub fn validate(&self) -> Result<(), RecordError> {
        let len = self.snapshots.len();
        let cursor_ok = match self.cursor {
            None => len == 0,
            Some(c) => c < len,
        };
        if !cursor_ok {
            return Err(RecordError::CursorOutOfRange {
                cursor: self.cursor,
                len,
            });
        }

        let expected = len.saturating_sub(1);
        if self.tool_tags.len() != expected {
            return Err(RecordError::TagCountMismatch {
                expected,
                found: self.tool_tags.len(),
            });
        }
        Ok(())
    }
}
