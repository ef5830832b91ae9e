//! Threshold evaluation over parsed forecast series

use crate::models::{Alert, ForecastSeries, Meteogram, Variable};
use crate::thresholds::{Comparison, RuleSet};
use tracing::{debug, info};

/// Evaluates forecast series against a [`RuleSet`]
pub struct AlertEngine;

impl AlertEngine {
    /// Evaluate every location of the meteogram.
    ///
    /// Each (location, variable, comparison) check yields at most one alert,
    /// carrying the most extreme value over the whole horizon and the most
    /// severe rule that value breaches. Output follows the meteogram's
    /// location order, then the fixed variable and comparison order.
    #[must_use]
    pub fn evaluate(meteogram: &Meteogram, rules: &RuleSet) -> Vec<Alert> {
        let alerts: Vec<Alert> = meteogram
            .iter()
            .flat_map(|series| Self::evaluate_series(series, rules))
            .collect();

        info!(
            "Evaluated {} locations against {} rules: {} alerts",
            meteogram.len(),
            rules.len(),
            alerts.len()
        );
        alerts
    }

    /// Evaluate a single location's series
    #[must_use]
    pub fn evaluate_series(series: &ForecastSeries, rules: &RuleSet) -> Vec<Alert> {
        let mut alerts = Vec::new();

        for variable in Variable::ALL {
            for comparison in Comparison::ALL {
                let candidates = rules.rules_for(&series.location.id, variable, comparison);
                if candidates.is_empty() {
                    continue;
                }

                let Some(extreme) = comparison.extreme(series, variable) else {
                    debug!(
                        "No {} values for {}, skipping {} check",
                        variable, series.location.id, comparison
                    );
                    continue;
                };

                if let Some(rule) = candidates
                    .into_iter()
                    .find(|rule| comparison.breaches(extreme.value, rule.bound))
                {
                    let alert = Alert::from_breach(&series.location, extreme, rule);
                    debug!("{}", alert.message);
                    alerts.push(alert);
                }
            }
        }

        alerts
    }
}
