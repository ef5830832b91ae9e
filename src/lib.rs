//! `meteoalert` - Meteogram threshold alerting
//!
//! Parses multi-location meteogram exports, evaluates the forecast series
//! against configurable threshold rules and makes sure each export is
//! processed at most once per day.

pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod gate;
pub mod meteogram;
pub mod models;
pub mod pipeline;
pub mod telemetry;
pub mod thresholds;

// Re-export core types for public API
pub use config::AppConfig;
pub use engine::AlertEngine;
pub use error::AlertError;
pub use export::{AlertRecord, AlertSink, JsonFileSink, MemorySink};
pub use gate::{Claim, ControlGate, MarkerPolicy};
pub use meteogram::{MeteogramParser, ParseError, ParseOutcome, ParseWarning};
pub use models::{Alert, ForecastPoint, ForecastSeries, Location, Meteogram, Variable};
pub use pipeline::{Pipeline, RunOutcome, RunReport};
pub use thresholds::{Comparison, RuleSet, Severity, ThresholdRule};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core result type used throughout the library
pub type Result<T> = std::result::Result<T, AlertError>;
