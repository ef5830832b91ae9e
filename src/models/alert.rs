//! Alert records produced by threshold evaluation

use super::{Extreme, Location, Variable};
use crate::thresholds::{Comparison, Severity, ThresholdRule};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A threshold breach for one (location, variable, comparison) check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Location whose forecast breached the rule
    pub location: Location,
    /// Variable that breached
    pub variable: Variable,
    /// Direction of the breach
    pub comparison: Comparison,
    /// Most extreme value observed over the forecast horizon
    pub observed: f64,
    /// Bound of the reported rule
    pub threshold: f64,
    /// Severity of the reported rule
    pub severity: Severity,
    /// Valid time of the extreme point
    pub timestamp: DateTime<Utc>,
    /// Human-readable description
    pub message: String,
}

impl Alert {
    /// Build the alert for an extreme that breached `rule`
    #[must_use]
    pub fn from_breach(location: &Location, extreme: Extreme, rule: &ThresholdRule) -> Self {
        let unit = rule.variable.unit();
        let message = format!(
            "{} at {}: {:.1} {unit} {} {:.1} {unit} limit ({} severity) at {}",
            headline(rule.variable, rule.comparison),
            location.name,
            extreme.value,
            match rule.comparison {
                Comparison::Max => "reached",
                Comparison::Min => "fell to",
            },
            rule.bound,
            rule.severity,
            extreme.timestamp.format("%Y-%m-%d %H:%M UTC"),
        );

        Self {
            location: location.clone(),
            variable: rule.variable,
            comparison: rule.comparison,
            observed: extreme.value,
            threshold: rule.bound,
            severity: rule.severity,
            timestamp: extreme.timestamp,
            message,
        }
    }

    /// Event type key, e.g. `temperature_high` or `humidity_low`
    #[must_use]
    pub fn event_type(&self) -> String {
        format!("{}_{}", self.variable.key(), self.comparison.direction())
    }

    /// Signed distance between observed value and threshold
    #[must_use]
    pub fn difference(&self) -> f64 {
        self.observed - self.threshold
    }
}

fn headline(variable: Variable, comparison: Comparison) -> &'static str {
    match (variable, comparison) {
        (Variable::Temperature, Comparison::Max) => "High temperature",
        (Variable::Temperature, Comparison::Min) => "Low temperature",
        (Variable::Humidity, Comparison::Max) => "High humidity",
        (Variable::Humidity, Comparison::Min) => "Low humidity",
        (Variable::WindSpeed, Comparison::Max) => "Strong wind",
        (Variable::WindSpeed, Comparison::Min) => "Weak wind",
        (Variable::Rainfall, Comparison::Max) => "Heavy rain",
        (Variable::Rainfall, Comparison::Min) => "Low rainfall",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_alert_from_breach() {
        let location = Location::new("campinas", "P042", "Campinas");
        let timestamp = Utc.with_ymd_and_hms(2024, 1, 1, 15, 0, 0).unwrap();
        let rule = ThresholdRule {
            variable: Variable::Temperature,
            comparison: Comparison::Max,
            bound: 38.0,
            severity: Severity::High,
            location: None,
        };

        let alert = Alert::from_breach(
            &location,
            Extreme {
                value: 39.0,
                timestamp,
            },
            &rule,
        );

        assert_eq!(alert.event_type(), "temperature_high");
        assert_eq!(alert.difference(), 1.0);
        assert_eq!(
            alert.message,
            "High temperature at Campinas: 39.0 °C reached 38.0 °C limit (high severity) at 2024-01-01 15:00 UTC"
        );
    }
}
