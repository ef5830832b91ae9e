//! Meteogram export parsing

pub mod error;
pub mod parser;
pub mod units;

pub use error::{ParseError, ParseWarning, WarningKind};
pub use parser::{MeteogramParser, ParseOutcome};
