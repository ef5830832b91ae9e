//! End-to-end processing run
//!
//! claim marker → parse → evaluate → export → finish marker

use crate::config::{AppConfig, SourceConfig};
use crate::engine::AlertEngine;
use crate::export::{AlertRecord, AlertSink, JsonFileSink};
use crate::gate::{Claim, Completion, ControlGate};
use crate::meteogram::{MeteogramParser, ParseWarning};
use crate::models::Alert;
use crate::thresholds::RuleSet;
use crate::{AlertError, Result};
use chrono::NaiveDate;
use chrono_tz::Tz;
use std::path::Path;
use std::sync::Arc;
use tokio::task;
use tracing::{error, info, warn};

/// Summary of a completed run
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub source: String,
    pub date: NaiveDate,
    pub locations: usize,
    pub points: usize,
    pub warnings: Vec<ParseWarning>,
    pub alerts: Vec<Alert>,
    /// Whether a batch was handed to the sink
    pub delivered: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The file was already processed on this date; nothing was done
    Skipped { source: String, date: NaiveDate },
    Completed(RunReport),
}

impl RunOutcome {
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self, RunOutcome::Skipped { .. })
    }

    #[must_use]
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            RunOutcome::Completed(report) => Some(report),
            RunOutcome::Skipped { .. } => None,
        }
    }
}

enum Input<'a> {
    Text(&'a str),
    File(&'a Path),
}

pub struct Pipeline {
    rules: RuleSet,
    gate: ControlGate,
    sink: Arc<dyn AlertSink>,
    timezone: Tz,
}

impl Pipeline {
    /// Pipeline reporting local times in `America/Sao_Paulo`
    pub fn new(rules: RuleSet, gate: ControlGate, sink: Arc<dyn AlertSink>) -> Self {
        Self {
            rules,
            gate,
            sink,
            timezone: chrono_tz::America::Sao_Paulo,
        }
    }

    #[must_use]
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    /// Build the pipeline described by the application configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let rules = RuleSet::load_csv(&config.thresholds.path)?;
        let gate = ControlGate::with_directory(&config.control.directory, config.control.policy)?;
        let sink = Arc::new(JsonFileSink::new(&config.export.path));
        let timezone = config
            .export
            .timezone()
            .map_err(|e| AlertError::config(e.to_string()))?;

        Ok(Self::new(rules, gate, sink).with_timezone(timezone))
    }

    #[must_use]
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    #[must_use]
    pub fn gate(&self) -> &ControlGate {
        &self.gate
    }

    /// Process meteogram text identified by `source` for the processing `date`
    #[tracing::instrument(name = "run", skip(self, content))]
    pub async fn run(&self, source: &str, date: NaiveDate, content: &str) -> Result<RunOutcome> {
        self.guarded(source, date, Input::Text(content)).await
    }

    /// Process a meteogram file; its file name identifies the source
    #[tracing::instrument(name = "run_file", skip(self, path), fields(path = %path.as_ref().display()))]
    pub async fn run_file<P: AsRef<Path>>(&self, path: P, date: NaiveDate) -> Result<RunOutcome> {
        let path = path.as_ref();
        let source = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                AlertError::config(format!("Invalid meteogram path {}", path.display()))
            })?;
        self.guarded(source, date, Input::File(path)).await
    }

    /// Process the newest export found in the source directory
    pub async fn run_latest(&self, source: &SourceConfig, date: NaiveDate) -> Result<RunOutcome> {
        let latest = source
            .locate_latest()
            .map_err(|e| AlertError::config(format!("{e:#}")))?
            .ok_or_else(|| {
                AlertError::config(format!(
                    "No meteogram export found in {}",
                    source.directory
                ))
            })?;
        info!("Latest meteogram export: {}", latest.display());
        self.run_file(latest, date).await
    }

    async fn guarded(&self, source: &str, date: NaiveDate, input: Input<'_>) -> Result<RunOutcome> {
        if let Claim::AlreadyProcessed(_) = self.gate.claim(source, date)? {
            return Ok(RunOutcome::Skipped {
                source: source.to_string(),
                date,
            });
        }

        let result = self.process(source, date, input).await;

        let completion = match &result {
            Ok(report) => Completion::Succeeded {
                alert_count: report.alerts.len(),
            },
            Err(e) => Completion::Failed {
                error: e.to_string(),
            },
        };
        let finished = self.gate.finish(source, date, &completion);

        match (result, finished) {
            (Ok(report), Ok(())) => Ok(RunOutcome::Completed(report)),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), finished) => {
                if let Err(gate_error) = finished {
                    warn!("Could not record failed run: {}", gate_error);
                }
                error!("Run failed at {} stage: {}", e.stage(), e);
                Err(e)
            }
        }
    }

    async fn process(&self, source: &str, date: NaiveDate, input: Input<'_>) -> Result<RunReport> {
        let outcome = match input {
            Input::Text(content) => MeteogramParser::parse(content)?,
            Input::File(path) => {
                let path = path.to_path_buf();
                task::spawn_blocking(move || MeteogramParser::parse_file(path))
                    .await
                    .map_err(|e| AlertError::Io {
                        source: std::io::Error::other(e),
                    })??
            }
        };

        let alerts = AlertEngine::evaluate(&outcome.meteogram, &self.rules);
        let delivered = self.deliver(&alerts, date).await?;

        Ok(RunReport {
            source: source.to_string(),
            date,
            locations: outcome.meteogram.len(),
            points: outcome.meteogram.point_count(),
            warnings: outcome.warnings,
            alerts,
            delivered,
        })
    }

    async fn deliver(&self, alerts: &[Alert], date: NaiveDate) -> Result<bool> {
        if alerts.is_empty() {
            info!("No alerts generated, nothing to deliver");
            return Ok(false);
        }

        let records: Vec<AlertRecord> = alerts
            .iter()
            .map(|alert| AlertRecord::from_alert(alert, self.timezone, date))
            .collect();

        self.sink.deliver(&records).await.map_err(|e| {
            AlertError::export(format!("{} sink failed: {e:#}", self.sink.name()))
        })?;
        info!("Delivered {} alerts via {}", records.len(), self.sink.name());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::MemorySink;
    use crate::gate::MarkerPolicy;
    use crate::meteogram::WarningKind;
    use async_trait::async_trait;

    const RULES: &str = "\
location,variable,bound,comparison,severity
,temperature,38,max,high
";

    const HOT: &str = "\
LOCATION a P1 Alpha
BLOCK P1
2024-01-01T12:00:00Z, 39.5, 40, 10, 0
";

    struct FailingSink;

    #[async_trait]
    impl AlertSink for FailingSink {
        fn name(&self) -> &str {
            "failing"
        }

        async fn deliver(&self, _records: &[AlertRecord]) -> anyhow::Result<()> {
            anyhow::bail!("connection refused")
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn pipeline(sink: Arc<dyn AlertSink>, policy: MarkerPolicy) -> Pipeline {
        Pipeline::new(
            RuleSet::from_csv_str(RULES).unwrap(),
            ControlGate::in_memory(policy),
            sink,
        )
    }

    #[tokio::test]
    async fn test_run_delivers_and_skips_second_time() {
        let sink = Arc::new(MemorySink::new());
        let pipeline = pipeline(sink.clone(), MarkerPolicy::Always);

        let outcome = pipeline.run("HST.out", day(), HOT).await.unwrap();
        let report = outcome.report().unwrap();
        assert_eq!(report.alerts.len(), 1);
        assert!(report.delivered);
        assert_eq!(sink.batches().len(), 1);

        let again = pipeline.run("HST.out", day(), HOT).await.unwrap();
        assert!(again.is_skipped());
        assert_eq!(sink.batches().len(), 1);
    }

    #[tokio::test]
    async fn test_sink_failure_is_export_error() {
        let pipeline = pipeline(Arc::new(FailingSink), MarkerPolicy::Always);

        let err = pipeline.run("HST.out", day(), HOT).await.unwrap_err();
        assert_eq!(err.stage(), "export");
        assert!(err.to_string().contains("connection refused"));
        assert!(pipeline.gate().already_processed("HST.out", day()).unwrap());
    }

    #[tokio::test]
    async fn test_missing_file_fails_and_keeps_marker() {
        let pipeline = pipeline(Arc::new(MemorySink::new()), MarkerPolicy::Always);

        let err = pipeline
            .run_file("/nonexistent/HST2024010100-MeteogramASC.out", day())
            .await
            .unwrap_err();
        assert_eq!(err.stage(), "parse");
        assert!(err.to_string().contains("HST2024010100-MeteogramASC.out"));
        assert!(pipeline
            .gate()
            .already_processed("HST2024010100-MeteogramASC.out", day())
            .unwrap());
    }

    #[tokio::test]
    async fn test_latin1_location_name_still_alerts() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("HST2024010100-MeteogramASC.out");
        std::fs::write(
            &path,
            b"LOCATION sp P1 S\xe3o Paulo\nBLOCK P1\n2024-01-01T12:00:00Z, 39.5, 40, 10, 0\n",
        )
        .unwrap();
        let sink = Arc::new(MemorySink::new());
        let pipeline = pipeline(sink.clone(), MarkerPolicy::Always);

        let outcome = pipeline.run_file(&path, day()).await.unwrap();
        let report = outcome.report().unwrap();
        assert_eq!(report.alerts.len(), 1);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].kind, WarningKind::InvalidEncoding);
        assert_eq!(sink.batches()[0][0].location_id, "sp");
    }
}
