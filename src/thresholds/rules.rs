//! Threshold rule model and the validated rule set

use super::ThresholdConfigError;
use crate::models::{Extreme, ForecastSeries, Variable};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

/// Alert severity, in ascending order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Direction of a threshold comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// Ceiling: breached when `observed >= bound`
    Max,
    /// Floor: breached when `observed <= bound`
    Min,
}

impl Comparison {
    /// Order in which the checks of one variable run
    pub const ALL: [Comparison; 2] = [Comparison::Max, Comparison::Min];

    #[must_use]
    pub fn parse(kind: &str) -> Option<Self> {
        match kind.trim().to_ascii_lowercase().as_str() {
            "max" | "max_exceeded" | "ceiling" => Some(Comparison::Max),
            "min" | "min_undershot" | "floor" => Some(Comparison::Min),
            _ => None,
        }
    }

    /// Inclusive breach test
    #[must_use]
    pub fn breaches(self, observed: f64, bound: f64) -> bool {
        match self {
            Comparison::Max => observed >= bound,
            Comparison::Min => observed <= bound,
        }
    }

    /// Most extreme value of `variable` in the direction of this comparison
    #[must_use]
    pub fn extreme(self, series: &ForecastSeries, variable: Variable) -> Option<Extreme> {
        match self {
            Comparison::Max => series.maximum(variable),
            Comparison::Min => series.minimum(variable),
        }
    }

    /// `high` for ceilings, `low` for floors
    #[must_use]
    pub fn direction(self) -> &'static str {
        match self {
            Comparison::Max => "high",
            Comparison::Min => "low",
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Comparison::Max => f.write_str("max"),
            Comparison::Min => f.write_str("min"),
        }
    }
}

/// A configured bound on one forecast variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    pub variable: Variable,
    pub comparison: Comparison,
    pub bound: f64,
    pub severity: Severity,
    /// Location id the rule is limited to; `None` applies everywhere
    pub location: Option<String>,
}

impl ThresholdRule {
    /// Check the bound against the physical range of the variable
    pub fn validate(&self) -> Result<(), String> {
        if !self.bound.is_finite() {
            return Err(format!("bound {} is not a finite number", self.bound));
        }
        match self.variable {
            Variable::Humidity if !(0.0..=100.0).contains(&self.bound) => Err(format!(
                "humidity bound {} is outside 0-100 %",
                self.bound
            )),
            Variable::WindSpeed | Variable::Rainfall if self.bound < 0.0 => Err(format!(
                "{} bound {} cannot be negative",
                self.variable, self.bound
            )),
            _ => Ok(()),
        }
    }

    fn describe(&self) -> String {
        format!(
            "{} {} {} ({}, scope {})",
            self.variable,
            self.comparison,
            self.bound,
            self.severity,
            self.location.as_deref().unwrap_or("all locations")
        )
    }
}

/// Validated, immutable set of threshold rules
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSet {
    rules: Vec<ThresholdRule>,
}

impl RuleSet {
    /// Validate and freeze a set of rules.
    ///
    /// Rejects empty sets, out-of-range bounds, duplicated (scope, variable,
    /// comparison, severity) entries and severity ladders whose bounds do not
    /// tighten with severity.
    pub fn new(rules: Vec<ThresholdRule>) -> Result<Self, ThresholdConfigError> {
        if rules.is_empty() {
            return Err(ThresholdConfigError::Empty);
        }

        for rule in &rules {
            rule.validate().map_err(ThresholdConfigError::InvalidRule)?;
        }

        let mut seen = HashSet::new();
        for rule in &rules {
            let key = (
                rule.location.as_deref(),
                rule.variable,
                rule.comparison,
                rule.severity,
            );
            if !seen.insert(key) {
                return Err(ThresholdConfigError::Duplicate(rule.describe()));
            }
        }

        Self::check_severity_ladders(&rules)?;

        Ok(Self { rules })
    }

    fn check_severity_ladders(rules: &[ThresholdRule]) -> Result<(), ThresholdConfigError> {
        let mut ladders: BTreeMap<(Option<&str>, Variable, Comparison), Vec<&ThresholdRule>> =
            BTreeMap::new();
        for rule in rules {
            ladders
                .entry((rule.location.as_deref(), rule.variable, rule.comparison))
                .or_default()
                .push(rule);
        }

        for ladder in ladders.values_mut() {
            ladder.sort_by_key(|r| r.severity);
            for pair in ladder.windows(2) {
                let (lower, higher) = (pair[0], pair[1]);
                let tightens = match higher.comparison {
                    Comparison::Max => higher.bound > lower.bound,
                    Comparison::Min => higher.bound < lower.bound,
                };
                if !tightens {
                    return Err(ThresholdConfigError::InconsistentOrdering(format!(
                        "{} does not tighten {}",
                        higher.describe(),
                        lower.describe()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Rules applicable to one check, most severe first.
    ///
    /// A rule scoped to `location_id` replaces the global rule of the same severity.
    #[must_use]
    pub fn rules_for(
        &self,
        location_id: &str,
        variable: Variable,
        comparison: Comparison,
    ) -> Vec<&ThresholdRule> {
        let candidates = self
            .rules
            .iter()
            .filter(|r| r.variable == variable && r.comparison == comparison);

        let mut selected: Vec<&ThresholdRule> = candidates
            .clone()
            .filter(|r| r.location.as_deref() == Some(location_id))
            .collect();

        for global in candidates.filter(|r| r.location.is_none()) {
            if !selected.iter().any(|r| r.severity == global.severity) {
                selected.push(global);
            }
        }

        selected.sort_by(|a, b| b.severity.cmp(&a.severity));
        selected
    }

    pub fn iter(&self) -> impl Iterator<Item = &ThresholdRule> {
        self.rules.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
