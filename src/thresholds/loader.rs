//! Threshold table loading
//!
//! Reads the tabular rule definition (`location,variable,bound,comparison,severity`)
//! and turns it into a validated [`RuleSet`]. Any malformed row aborts the load.

use super::{Comparison, RuleSet, Severity, ThresholdConfigError, ThresholdRule};
use crate::models::Variable;
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

/// Raw CSV row before validation
#[derive(Debug, Deserialize)]
struct RuleRow {
    location: Option<String>,
    variable: String,
    bound: String,
    comparison: String,
    severity: String,
}

impl RuleRow {
    fn into_rule(self, row: u64) -> Result<ThresholdRule, ThresholdConfigError> {
        let variable = Variable::parse(&self.variable).ok_or_else(|| {
            ThresholdConfigError::malformed(row, format!("unknown variable '{}'", self.variable))
        })?;
        let comparison = Comparison::parse(&self.comparison).ok_or_else(|| {
            ThresholdConfigError::malformed(
                row,
                format!("unknown comparison kind '{}'", self.comparison),
            )
        })?;
        let severity = Severity::parse(&self.severity).ok_or_else(|| {
            ThresholdConfigError::malformed(row, format!("unknown severity '{}'", self.severity))
        })?;
        let bound = self.bound.trim().parse::<f64>().map_err(|_| {
            ThresholdConfigError::malformed(row, format!("invalid bound '{}'", self.bound))
        })?;
        let location = self
            .location
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());

        let rule = ThresholdRule {
            variable,
            comparison,
            bound,
            severity,
            location,
        };
        rule.validate()
            .map_err(|message| ThresholdConfigError::malformed(row, message))?;
        Ok(rule)
    }
}

impl RuleSet {
    /// Load a rule set from a CSV file
    pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Self, ThresholdConfigError> {
        let path = path.as_ref();
        info!("Loading threshold rules from: {:?}", path);

        let file = File::open(path).map_err(|source| ThresholdConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let rules = Self::from_csv_reader(file)?;

        info!("Loaded {} threshold rules", rules.len());
        Ok(rules)
    }

    /// Parse a rule set from CSV text
    pub fn from_csv_str(content: &str) -> Result<Self, ThresholdConfigError> {
        Self::from_csv_reader(content.as_bytes())
    }

    /// Parse a rule set from any CSV source with a header row
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, ThresholdConfigError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .comment(Some(b'#'))
            .from_reader(reader);

        let headers = reader
            .headers()
            .map_err(|e| ThresholdConfigError::malformed(1, e.to_string()))?
            .clone();

        let mut rules = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| {
                let row = e.position().map_or(0, csv::Position::line);
                ThresholdConfigError::malformed(row, e.to_string())
            })?;
            let row = record.position().map_or(0, csv::Position::line);

            let raw: RuleRow = record
                .deserialize(Some(&headers))
                .map_err(|e| ThresholdConfigError::malformed(row, e.to_string()))?;
            let rule = raw.into_rule(row)?;
            debug!("Parsed threshold rule on row {}: {:?}", row, rule);
            rules.push(rule);
        }

        RuleSet::new(rules)
    }
}
