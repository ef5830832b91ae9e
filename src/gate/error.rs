use std::path::PathBuf;
use thiserror::Error;

/// Control marker storage failures. Always fatal for the run.
#[derive(Error, Debug)]
pub enum GateError {
    #[error("Control marker I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Control marker {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode control marker: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("No claimed marker to finish for {0}")]
    NotClaimed(String),
}

impl GateError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
