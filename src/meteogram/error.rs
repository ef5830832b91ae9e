use crate::models::Variable;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Fatal meteogram errors: the export cannot yield any usable series
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("No locations found in meteogram")]
    NoLocations,

    #[error("No parseable data points in meteogram")]
    NoDataPoints,

    #[error("Failed to read meteogram {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Category of a recoverable problem found while parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarningKind {
    /// Row without exactly five columns
    WrongColumnCount,
    /// Row whose timestamp could not be read
    InvalidTimestamp,
    /// Single variable left absent on an otherwise valid row
    InvalidField(Variable),
    /// Later row repeating a timestamp already seen for the location
    DuplicateTimestamp,
    /// Data row before any block header
    RowOutsideBlock,
    /// Block header naming an undeclared location
    UnknownBlock,
    /// Second declaration of a location id or polygon
    DuplicateLocation,
    /// Declared location without any data point
    EmptyLocation,
    /// Directive with missing or invalid arguments
    InvalidDirective,
    /// Line that is neither a directive nor a data row
    UnknownDirective,
    /// Line with bytes that are not valid UTF-8; parsed after lossy decoding
    InvalidEncoding,
}

/// A recoverable problem; the offending line (or field) was skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    /// 1-based line number in the source text
    pub line: usize,
    pub kind: WarningKind,
    pub message: String,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}
