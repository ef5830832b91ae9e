//! Threshold configuration
//!
//! Loads the tabular rule definition once per run and exposes it as an
//! immutable, validated [`RuleSet`].

pub mod error;
pub mod loader;
pub mod rules;

pub use error::ThresholdConfigError;
pub use rules::{Comparison, RuleSet, Severity, ThresholdRule};
