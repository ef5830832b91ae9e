//! Data models for the meteogram alerting pipeline
//!
//! This module contains the core domain models organized by concern:
//! - Location: Forecast zones declared in the meteogram header
//! - Forecast: Per-location forecast series and the parsed meteogram
//! - Alert: Threshold breaches produced by the alert engine

pub mod alert;
pub mod forecast;
pub mod location;

// Re-export all public types for convenient access
pub use alert::Alert;
pub use forecast::{Extreme, ForecastPoint, ForecastSeries, Meteogram, Variable};
pub use location::Location;
