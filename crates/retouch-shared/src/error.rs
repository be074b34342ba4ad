use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FingerprintError {
    #[error("Failed to read input file '{path}': {source}")]
    UnreadableInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize generation options: {0}")]
    Options(#[from] serde_json::Error),

    #[error("Generation option '{field}' must be a finite number")]
    NonFiniteOption { field: &'static str },
}
