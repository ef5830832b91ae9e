//! Once-per-day processing control
//!
//! A run claims the `(source file, processing date)` marker before doing any
//! work and finishes it afterwards. The claim is a single atomic
//! create-if-absent, so overlapping invocations never both proceed.

pub mod error;
pub mod store;

pub use error::GateError;
pub use store::{FileMarkerStore, MarkerKey, MarkerRecord, MarkerStatus, MarkerStore, MemoryMarkerStore};

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// What happens to the marker of a failed run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerPolicy {
    /// The marker is kept whatever the outcome; a failed file is not retried the same day
    #[default]
    Always,
    /// A failed run removes its marker so a later run the same day may retry
    SuccessOnly,
}

/// Result of a claim attempt
#[derive(Debug, Clone, PartialEq)]
pub enum Claim {
    Acquired,
    /// The file was already claimed for this date; carries the existing marker if readable
    AlreadyProcessed(Option<MarkerRecord>),
}

/// Final state of a claimed run
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Succeeded { alert_count: usize },
    Failed { error: String },
}

pub struct ControlGate {
    store: Arc<dyn MarkerStore>,
    policy: MarkerPolicy,
}

impl ControlGate {
    pub fn new(store: Arc<dyn MarkerStore>, policy: MarkerPolicy) -> Self {
        Self { store, policy }
    }

    /// Gate backed by marker files in `dir`
    pub fn with_directory(dir: impl Into<PathBuf>, policy: MarkerPolicy) -> Result<Self, GateError> {
        Ok(Self::new(Arc::new(FileMarkerStore::new(dir)?), policy))
    }

    /// Gate backed by an in-process store
    #[must_use]
    pub fn in_memory(policy: MarkerPolicy) -> Self {
        Self::new(Arc::new(MemoryMarkerStore::new()), policy)
    }

    #[must_use]
    pub fn policy(&self) -> MarkerPolicy {
        self.policy
    }

    /// Whether a marker exists for the file on the date
    pub fn already_processed(&self, source: &str, date: NaiveDate) -> Result<bool, GateError> {
        self.store.exists(&MarkerKey::new(source, date))
    }

    /// Record the file as processed on the date.
    ///
    /// Idempotent; returns `true` only when this call created the marker.
    pub fn mark_processed(&self, source: &str, date: NaiveDate) -> Result<bool, GateError> {
        let key = MarkerKey::new(source, date);
        let now = Utc::now();
        let record = MarkerRecord {
            status: MarkerStatus::Succeeded,
            completed_at: Some(now),
            claimed_at: now,
            ..MarkerRecord::in_progress(&key)
        };
        let created = self.store.create_if_absent(&key, &record)?;
        if created {
            info!("Marked {} as processed", key);
        }
        Ok(created)
    }

    /// Atomically check and take the marker for a run
    pub fn claim(&self, source: &str, date: NaiveDate) -> Result<Claim, GateError> {
        let key = MarkerKey::new(source, date);
        if self
            .store
            .create_if_absent(&key, &MarkerRecord::in_progress(&key))?
        {
            info!("Claimed {} for processing", key);
            return Ok(Claim::Acquired);
        }

        let existing = match self.store.load(&key) {
            Ok(record) => record,
            Err(e) => {
                warn!("Existing marker for {} is unreadable: {}", key, e);
                None
            }
        };
        info!("{} already processed, skipping", key);
        Ok(Claim::AlreadyProcessed(existing))
    }

    /// Record the outcome of a claimed run according to the marker policy
    pub fn finish(
        &self,
        source: &str,
        date: NaiveDate,
        completion: &Completion,
    ) -> Result<(), GateError> {
        let key = MarkerKey::new(source, date);

        if let (MarkerPolicy::SuccessOnly, Completion::Failed { error }) = (self.policy, completion)
        {
            warn!("Run for {} failed ({}), releasing marker for retry", key, error);
            return self.store.remove(&key);
        }

        let mut record = self
            .store
            .load(&key)?
            .ok_or_else(|| GateError::NotClaimed(key.to_string()))?;
        record.completed_at = Some(Utc::now());
        match completion {
            Completion::Succeeded { alert_count } => {
                record.status = MarkerStatus::Succeeded;
                record.alert_count = Some(*alert_count);
                record.error = None;
            }
            Completion::Failed { error } => {
                record.status = MarkerStatus::Failed;
                record.error = Some(error.clone());
            }
        }
        self.store.overwrite(&key, &record)?;
        info!("Finished {} with status {:?}", key, record.status);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SOURCE: &str = "HST20240101-MeteogramASC.out";

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_mark_processed_is_exclusive() {
        let dir = TempDir::new().unwrap();
        let gate = ControlGate::with_directory(dir.path(), MarkerPolicy::Always).unwrap();

        assert!(!gate.already_processed(SOURCE, day(1)).unwrap());
        assert!(gate.mark_processed(SOURCE, day(1)).unwrap());
        assert!(gate.already_processed(SOURCE, day(1)).unwrap());
        assert!(!gate.mark_processed(SOURCE, day(1)).unwrap());

        // next day is a fresh key
        assert!(!gate.already_processed(SOURCE, day(2)).unwrap());
    }

    #[test]
    fn test_claim_then_finish_success() {
        let gate = ControlGate::in_memory(MarkerPolicy::Always);

        assert_eq!(gate.claim(SOURCE, day(1)).unwrap(), Claim::Acquired);
        gate.finish(SOURCE, day(1), &Completion::Succeeded { alert_count: 2 })
            .unwrap();

        match gate.claim(SOURCE, day(1)).unwrap() {
            Claim::AlreadyProcessed(Some(record)) => {
                assert_eq!(record.status, MarkerStatus::Succeeded);
                assert_eq!(record.alert_count, Some(2));
                assert!(record.is_complete());
            }
            other => panic!("unexpected claim: {other:?}"),
        }
    }

    #[test]
    fn test_failed_run_keeps_marker_by_default() {
        let gate = ControlGate::in_memory(MarkerPolicy::default());
        assert_eq!(gate.claim(SOURCE, day(1)).unwrap(), Claim::Acquired);
        gate.finish(
            SOURCE,
            day(1),
            &Completion::Failed {
                error: "no locations".to_string(),
            },
        )
        .unwrap();

        match gate.claim(SOURCE, day(1)).unwrap() {
            Claim::AlreadyProcessed(Some(record)) => {
                assert_eq!(record.status, MarkerStatus::Failed);
                assert_eq!(record.error.as_deref(), Some("no locations"));
            }
            other => panic!("unexpected claim: {other:?}"),
        }
    }

    #[test]
    fn test_success_only_policy_releases_failed_marker() {
        let gate = ControlGate::in_memory(MarkerPolicy::SuccessOnly);
        assert_eq!(gate.claim(SOURCE, day(1)).unwrap(), Claim::Acquired);
        gate.finish(
            SOURCE,
            day(1),
            &Completion::Failed {
                error: "sink down".to_string(),
            },
        )
        .unwrap();

        assert!(!gate.already_processed(SOURCE, day(1)).unwrap());
        assert_eq!(gate.claim(SOURCE, day(1)).unwrap(), Claim::Acquired);
    }

    #[test]
    fn test_finish_without_claim_fails() {
        let gate = ControlGate::in_memory(MarkerPolicy::Always);
        let result = gate.finish(SOURCE, day(1), &Completion::Succeeded { alert_count: 0 });
        assert!(matches!(result, Err(GateError::NotClaimed(_))));
    }

    #[test]
    fn test_concurrent_claims_have_one_winner() {
        let dir = TempDir::new().unwrap();
        let gate = ControlGate::with_directory(dir.path(), MarkerPolicy::Always).unwrap();

        let acquired = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| gate.claim(SOURCE, day(1)).unwrap()))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|claim| *claim == Claim::Acquired)
                .count()
        });

        assert_eq!(acquired, 1);
    }
}
