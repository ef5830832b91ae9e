use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating a threshold rule table.
///
/// Every variant is fatal: a rule set that fails to load never reaches evaluation.
#[derive(Error, Debug)]
pub enum ThresholdConfigError {
    #[error("Failed to read threshold table {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed threshold row {row}: {message}")]
    MalformedRow { row: u64, message: String },

    #[error("Invalid threshold rule: {0}")]
    InvalidRule(String),

    #[error("Duplicate threshold rule: {0}")]
    Duplicate(String),

    #[error("Inconsistent severity ordering: {0}")]
    InconsistentOrdering(String),

    #[error("Threshold table contains no rules")]
    Empty,
}

impl ThresholdConfigError {
    pub(crate) fn malformed<S: Into<String>>(row: u64, message: S) -> Self {
        Self::MalformedRow {
            row,
            message: message.into(),
        }
    }
}
