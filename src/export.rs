//! Alert export: transfer records and delivery sinks

use crate::models::Alert;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tempfile::NamedTempFile;
use tokio::task;
use tracing::info;

/// Transfer shape of an [`Alert`] as handed to downstream consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub event_type: String,
    pub location_id: String,
    pub location_name: String,
    pub observed_value: f64,
    pub threshold: f64,
    pub severity: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    /// `observed_value - threshold`
    pub difference: f64,
    pub unit: String,
    /// Local date of the triggering point
    pub reference_date: String,
    /// Local time of the triggering point, `HH:MM:SS`
    pub reference_time: String,
    pub generated_on: NaiveDate,
}

impl AlertRecord {
    /// Map an alert, expressing its reference time in `timezone`
    #[must_use]
    pub fn from_alert(alert: &Alert, timezone: Tz, generated_on: NaiveDate) -> Self {
        let local = alert.timestamp.with_timezone(&timezone);
        Self {
            event_type: alert.event_type(),
            location_id: alert.location.id.clone(),
            location_name: alert.location.name.clone(),
            observed_value: round2(alert.observed),
            threshold: alert.threshold,
            severity: alert.severity.to_string(),
            timestamp: alert.timestamp,
            message: alert.message.clone(),
            difference: round2(alert.difference()),
            unit: alert.variable.unit().to_string(),
            reference_date: local.format("%Y-%m-%d").to_string(),
            reference_time: local.format("%H:%M:%S").to_string(),
            generated_on,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Envelope written by [`JsonFileSink`]
#[derive(Debug, Serialize, Deserialize)]
pub struct AlertBatch {
    pub alerts: Vec<AlertRecord>,
}

/// Destination for exported alert records
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Deliver one non-empty batch
    async fn deliver(&self, records: &[AlertRecord]) -> Result<()>;
}

/// Writes the batch as a JSON document, replacing the target atomically
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn write_batch(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create export directory {}", dir.display()))?;

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path)
        .with_context(|| format!("Failed to write alert file {}", path.display()))?;
    Ok(())
}

#[async_trait]
impl AlertSink for JsonFileSink {
    fn name(&self) -> &str {
        "json-file"
    }

    #[tracing::instrument(name = "write_alert_file", level = "debug", skip(self, records), fields(path = %self.path.display()))]
    async fn deliver(&self, records: &[AlertRecord]) -> Result<()> {
        let batch = AlertBatch {
            alerts: records.to_vec(),
        };
        let bytes = serde_json::to_vec_pretty(&batch)?;
        let path = self.path.clone();

        task::spawn_blocking(move || write_batch(&path, &bytes)).await??;
        info!("Wrote {} alerts to {}", records.len(), self.path.display());
        Ok(())
    }
}

/// Keeps delivered batches in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<Vec<AlertRecord>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Batches delivered so far, oldest first
    #[must_use]
    pub fn batches(&self) -> Vec<Vec<AlertRecord>> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl AlertSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn deliver(&self, records: &[AlertRecord]) -> Result<()> {
        self.batches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(records.to_vec());
        Ok(())
    }
}
