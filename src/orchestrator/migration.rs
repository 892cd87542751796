//! The migration driver: recovery pass, then one task per measurement.
//!
//! This is the checkpoint layer around [`TransferWorker`]: every window that
//! comes back failed is appended to the [`CheckpointStore`] as soon as its
//! worker finishes, so a crash mid-run loses no failure records.

use anyhow::anyhow;
use std::sync::Mutex;
use tracing::{error, info, info_span, warn, Span};
use uuid::Uuid;

use super::planner::{plan_windows, WindowSizes};
use super::resume::ResumeCoordinator;
use super::retry::RetryPolicy;
use super::scheduler;
use super::transfer::{TransferWorker, WindowOutcome};
use crate::checkpoints::{CheckpointEntry, CheckpointStore};
use crate::config::Config;
use crate::models::{MigrationError, MigrationTask, TimeWindow};
use crate::store::{DestinationStore, SourceStore};

/// Knobs of a migration run.
#[derive(Debug, Clone)]
pub struct MigrationSettings {
    pub concurrency: usize,
    pub recovery_concurrency: usize,
    pub retry: RetryPolicy,
    pub window_sizes: WindowSizes,
}

impl MigrationSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            concurrency: config.migration.concurrency,
            recovery_concurrency: config.migration.recovery_concurrency,
            retry: config.retry_policy(),
            window_sizes: config.window_sizes(),
        }
    }
}

/// Window counts for one batch of dispatched windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowTally {
    pub transferred: usize,
    pub failed: usize,
    pub points: usize,
}

impl WindowTally {
    fn add(&mut self, other: WindowTally) {
        self.transferred += other.transferred;
        self.failed += other.failed;
        self.points += other.points;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityStatus {
    /// Every planned window was attempted; failures are checkpointed.
    Completed,
    /// The destination already holds everything the source has.
    UpToDate,
    /// The source has no records for the measurement.
    NoData,
    /// Nothing (or not everything) was attempted.
    Aborted(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityReport {
    pub measurement: String,
    pub status: EntityStatus,
    pub windows: WindowTally,
}

impl EntityReport {
    fn new(measurement: &str, status: EntityStatus) -> Self {
        Self {
            measurement: measurement.to_string(),
            status,
            windows: WindowTally::default(),
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.status, EntityStatus::Aborted(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Entries replayed and removed from the store.
    pub replayed: usize,
    /// Entries left untouched because their bucket could not be provisioned
    /// or their text could not be read back.
    pub left_pending: usize,
    pub windows: WindowTally,
    /// Set when the pass stopped early.
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: String,
    pub recovery: Option<RecoveryReport>,
    pub entities: Vec<EntityReport>,
}

impl RunReport {
    /// Whether the process should exit non-zero.
    pub fn has_failures(&self) -> bool {
        self.entities.iter().any(EntityReport::is_aborted)
            || self
                .recovery
                .as_ref()
                .is_some_and(|r| r.error.is_some())
    }
}

pub struct Migrator<'a> {
    source: &'a dyn SourceStore,
    destination: &'a dyn DestinationStore,
    checkpoints: &'a CheckpointStore,
    settings: MigrationSettings,
}

impl<'a> Migrator<'a> {
    pub fn new(
        source: &'a dyn SourceStore,
        destination: &'a dyn DestinationStore,
        checkpoints: &'a CheckpointStore,
        settings: MigrationSettings,
    ) -> Self {
        Self {
            source,
            destination,
            checkpoints,
            settings,
        }
    }

    /// Recovery pass (unless skipped), then every measurement in order.
    ///
    /// A failed measurement never stops the ones after it.
    pub fn run(&self, measurements: &[String], skip_recovery: bool) -> RunReport {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!("migration", run_id = %run_id);
        let _enter = span.enter();
        info!(measurements = measurements.len(), "migration run started");

        let recovery = if skip_recovery {
            None
        } else {
            Some(self.recover_report())
        };

        let entities: Vec<EntityReport> = measurements.iter().map(|m| self.migrate(m)).collect();

        let aborted = entities.iter().filter(|e| e.is_aborted()).count();
        info!(
            entities = entities.len(),
            aborted,
            pending_checkpoints = self.checkpoints.len().unwrap_or_default(),
            "migration run finished"
        );
        RunReport {
            run_id,
            recovery,
            entities,
        }
    }

    /// Recovery pass that folds a stop into the report instead of failing.
    pub fn recover_report(&self) -> RecoveryReport {
        let mut report = RecoveryReport::default();
        if let Err(e) = self.recover(&mut report) {
            error!(error = %e, "recovery pass stopped");
            report.error = Some(e.to_string());
        }
        report
    }

    /// Replay every entry pending at the start of the pass, oldest first.
    ///
    /// Each entry's range is cut into this measurement's window size and run
    /// at recovery concurrency. Windows that fail again are appended as new
    /// entries before the replayed entry is removed, so the file always
    /// names every range still missing from the destination.
    pub fn recover(&self, report: &mut RecoveryReport) -> Result<(), MigrationError> {
        let pending = self
            .checkpoints
            .pending()
            .map_err(MigrationError::CheckpointPersistence)?;
        if pending.is_empty() {
            return Ok(());
        }
        info!(entries = pending.len(), "replaying checkpointed windows");

        for entry in pending {
            let window = match entry.to_window() {
                Ok(window) => window,
                Err(e) => {
                    error!(entry = %entry, error = %format!("{e:#}"), "unreadable checkpoint entry left in place");
                    report.left_pending += 1;
                    continue;
                }
            };
            if let Err(e) = self.destination.ensure_bucket(&entry.bucket_name) {
                warn!(entry = %entry, error = %e, "bucket unavailable, entry left in place");
                report.left_pending += 1;
                continue;
            }

            let size = self
                .settings
                .window_sizes
                .for_measurement(&entry.measurement);
            let task = MigrationTask {
                measurement: window.measurement,
                start: window.start,
                end: window.end,
                bucket: window.bucket,
                time_format: window.time_format,
            };
            let windows = plan_windows(&task, size).map_err(|source| MigrationError::Planning {
                measurement: entry.measurement.clone(),
                source,
            })?;

            let tally = self.dispatch(windows, self.settings.recovery_concurrency)?;
            report.windows.add(tally);

            self.checkpoints
                .remove(&entry)
                .map_err(|e| self.persistence_failure(e))?;
            report.replayed += 1;
            info!(
                entry = %entry,
                transferred = tally.transferred,
                failed = tally.failed,
                "checkpoint entry replayed"
            );
        }
        Ok(())
    }

    /// Migrate one measurement, capturing any abort in the report.
    pub fn migrate(&self, measurement: &str) -> EntityReport {
        let span = info_span!("measurement", measurement);
        let _enter = span.enter();
        match self.migrate_entity(measurement) {
            Ok(report) => report,
            Err(e) => {
                if e.is_checkpoint_failure() {
                    error!(error = %e, "measurement aborted: failed windows may be unrecorded");
                } else {
                    error!(error = %e, "measurement aborted");
                }
                EntityReport::new(measurement, EntityStatus::Aborted(e.to_string()))
            }
        }
    }

    fn migrate_entity(&self, measurement: &str) -> Result<EntityReport, MigrationError> {
        let coordinator = ResumeCoordinator::new(self.source, self.destination);
        let Some(task) = coordinator.plan_task(measurement)? else {
            return Ok(EntityReport::new(measurement, EntityStatus::NoData));
        };
        if task.is_empty() {
            info!("destination is up to date");
            return Ok(EntityReport::new(measurement, EntityStatus::UpToDate));
        }

        let size = self.settings.window_sizes.for_measurement(measurement);
        let windows = plan_windows(&task, size).map_err(|source| MigrationError::Planning {
            measurement: measurement.to_string(),
            source,
        })?;
        info!(windows = windows.len(), window_minutes = size.num_minutes(), "planned windows");

        let tally = self.dispatch(windows, self.settings.concurrency)?;
        info!(
            transferred = tally.transferred,
            failed = tally.failed,
            points = tally.points,
            "measurement finished"
        );
        Ok(EntityReport {
            measurement: measurement.to_string(),
            status: EntityStatus::Completed,
            windows: tally,
        })
    }

    /// Run windows through the pool, checkpointing each failure as it lands.
    fn dispatch(
        &self,
        windows: Vec<TimeWindow>,
        concurrency: usize,
    ) -> Result<WindowTally, MigrationError> {
        let worker = TransferWorker::new(self.source, self.destination, self.settings.retry);
        let persistence_error: Mutex<Option<anyhow::Error>> = Mutex::new(None);
        let parent = Span::current();

        let outcomes = scheduler::run(windows, concurrency, |window| {
            let _enter = parent.enter();
            let outcome = worker.transfer(window);
            if let WindowOutcome::Failed {
                window,
                kind,
                reason,
                attempts,
            } = &outcome
            {
                warn!(
                    window = %window,
                    %kind,
                    attempts,
                    %reason,
                    "window failed, checkpointing"
                );
                if let Err(e) = self.checkpoints.append(CheckpointEntry::from_window(window)) {
                    error!(window = %window, error = %format!("{e:#}"), "failed to checkpoint window");
                    if let Ok(mut slot) = persistence_error.lock() {
                        slot.get_or_insert(e);
                    }
                }
            }
            outcome
        })?;

        let persistence_error = persistence_error
            .into_inner()
            .map_err(|_| MigrationError::CheckpointPersistence(anyhow!("error slot poisoned")))?;
        if let Some(e) = persistence_error {
            return Err(self.persistence_failure(e));
        }

        let mut tally = WindowTally::default();
        for outcome in &outcomes {
            match outcome {
                WindowOutcome::Transferred { points, .. } => {
                    tally.transferred += 1;
                    tally.points += points;
                }
                WindowOutcome::Failed { .. } => tally.failed += 1,
            }
        }
        Ok(tally)
    }

    fn persistence_failure(&self, source: anyhow::Error) -> MigrationError {
        error!(
            path = %self.checkpoints.path().display(),
            error = %format!("{source:#}"),
            "CHECKPOINT FILE COULD NOT BE WRITTEN"
        );
        MigrationError::CheckpointPersistence(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SourceRecord, SourceValue, TimeFormat};
    use crate::store::{MemoryDestination, MemorySource, StoreError};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use tempfile::TempDir;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, 0).unwrap()
    }

    fn settings() -> MigrationSettings {
        MigrationSettings {
            concurrency: 4,
            recovery_concurrency: 1,
            retry: RetryPolicy::new(3, std::time::Duration::ZERO),
            window_sizes: WindowSizes::new(Duration::minutes(5)),
        }
    }

    fn source() -> MemorySource {
        let source = MemorySource::new();
        for minute in 0..=15 {
            source.insert(
                "cpu",
                SourceRecord::new(TimeFormat::WholeSeconds.format(&at(minute)))
                    .with("v", SourceValue::Integer(i64::from(minute))),
            );
        }
        source
    }

    #[test]
    fn test_failed_window_is_checkpointed_once() {
        let temp = TempDir::new().unwrap();
        let store = CheckpointStore::open(&temp.path().join("writeobj.json")).unwrap();
        let source = source();
        let destination = MemoryDestination::new();
        destination.fail_writes_at(at(5), 3, StoreError::Timeout("write".to_string()));

        let migrator = Migrator::new(&source, &destination, &store, settings());
        let report = migrator.migrate("cpu");

        assert_eq!(report.status, EntityStatus::Completed);
        assert_eq!(report.windows.transferred, 2);
        assert_eq!(report.windows.failed, 1);
        let pending = store.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].start_dt, "2024-01-01T00:05:00Z");
        assert_eq!(pending[0].end_dt, "2024-01-01T00:10:00Z");
    }

    #[test]
    fn test_recovery_replays_and_removes_entries() {
        let temp = TempDir::new().unwrap();
        let store = CheckpointStore::open(&temp.path().join("writeobj.json")).unwrap();
        let source = source();
        let destination = MemoryDestination::new();
        destination.fail_writes_at(at(5), 3, StoreError::Timeout("write".to_string()));

        let migrator = Migrator::new(&source, &destination, &store, settings());
        migrator.migrate("cpu");
        assert_eq!(store.len().unwrap(), 1);

        let report = migrator.recover_report();
        assert_eq!(report.replayed, 1);
        assert_eq!(report.windows.transferred, 1);
        assert!(report.error.is_none());
        assert!(store.is_empty().unwrap());
        assert_eq!(destination.points("cpu").len(), 15);
    }

    #[test]
    fn test_recovery_keeps_still_failing_window() {
        let temp = TempDir::new().unwrap();
        let store = CheckpointStore::open(&temp.path().join("writeobj.json")).unwrap();
        let source = source();
        let destination = MemoryDestination::new();
        destination.fail_writes_at(at(5), 100, StoreError::Rejected("bad".to_string()));

        let migrator = Migrator::new(&source, &destination, &store, settings());
        migrator.migrate("cpu");
        let before = store.pending().unwrap();

        let report = migrator.recover_report();
        assert_eq!(report.replayed, 1);
        assert_eq!(report.windows.failed, 1);
        assert_eq!(store.pending().unwrap(), before);
    }

    #[test]
    fn test_recovery_leaves_entry_when_bucket_fails() {
        let temp = TempDir::new().unwrap();
        let store = CheckpointStore::open(&temp.path().join("writeobj.json")).unwrap();
        store
            .append(CheckpointEntry::from_window(&TimeWindow {
                measurement: "cpu".to_string(),
                start: at(0),
                end: at(5),
                bucket: "cpu".to_string(),
                time_format: TimeFormat::WholeSeconds,
            }))
            .unwrap();
        let source = source();
        let destination = MemoryDestination::new();
        destination.fail_bucket("cpu");

        let migrator = Migrator::new(&source, &destination, &store, settings());
        let report = migrator.recover_report();
        assert_eq!(report.left_pending, 1);
        assert_eq!(report.replayed, 0);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_provisioning_failure_aborts_only_that_measurement() {
        let temp = TempDir::new().unwrap();
        let store = CheckpointStore::open(&temp.path().join("writeobj.json")).unwrap();
        let source = source();
        source.insert(
            "mem",
            SourceRecord::new("2024-01-01T00:00:00Z").with("v", SourceValue::Integer(1)),
        );
        source.insert(
            "mem",
            SourceRecord::new("2024-01-01T00:02:00Z").with("v", SourceValue::Integer(2)),
        );
        let destination = MemoryDestination::new();
        destination.fail_bucket("cpu");

        let migrator = Migrator::new(&source, &destination, &store, settings());
        let report = migrator.run(&["cpu".to_string(), "mem".to_string()], true);

        assert!(report.entities[0].is_aborted());
        assert_eq!(report.entities[1].status, EntityStatus::Completed);
        assert!(report.has_failures());
        assert_eq!(destination.write_calls(), 1);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_rerun_overwrites_boundary_point() {
        let temp = TempDir::new().unwrap();
        let store = CheckpointStore::open(&temp.path().join("writeobj.json")).unwrap();
        let source = MemorySource::new();
        source.insert(
            "cpu",
            SourceRecord::new("2024-01-01T00:00:00Z").with("v", SourceValue::Integer(1)),
        );
        source.insert(
            "cpu",
            SourceRecord::new("2024-01-01T00:10:00Z").with("v", SourceValue::Integer(2)),
        );
        let destination = MemoryDestination::new();
        let migrator = Migrator::new(&source, &destination, &store, settings());

        let first = migrator.migrate("cpu");
        assert_eq!(first.status, EntityStatus::Completed);
        // The newest record sits on the exclusive end boundary.
        assert_eq!(destination.points("cpu").len(), 1);

        // Resuming at the last written point rewrites it in place.
        let second = migrator.migrate("cpu");
        assert_eq!(second.status, EntityStatus::Completed);
        assert_eq!(second.windows.points, 1);
        assert_eq!(destination.points("cpu").len(), 1);
    }

    #[test]
    fn test_caught_up_destination_is_up_to_date() {
        let temp = TempDir::new().unwrap();
        let store = CheckpointStore::open(&temp.path().join("writeobj.json")).unwrap();
        let source = MemorySource::new();
        let record =
            SourceRecord::new("2024-01-01T00:10:00Z").with("v", SourceValue::Integer(2));
        source.insert("cpu", record.clone());
        let destination = MemoryDestination::new();
        destination.ensure_bucket("cpu").unwrap();
        let point = crate::models::DataPoint::from_record("cpu", &record).unwrap();
        destination.write_points("cpu", &[point]).unwrap();

        let migrator = Migrator::new(&source, &destination, &store, settings());
        assert_eq!(migrator.migrate("cpu").status, EntityStatus::UpToDate);
    }

    #[test]
    fn test_unwritable_checkpoint_aborts_only_failing_measurement() {
        let temp = TempDir::new().unwrap();
        let state_dir = temp.path().join("state");
        let store = CheckpointStore::open(&state_dir.join("writeobj.json")).unwrap();
        std::fs::remove_dir_all(&state_dir).unwrap();

        let source = source();
        source.insert(
            "mem",
            SourceRecord::new("2024-01-01T00:00:00Z").with("v", SourceValue::Integer(1)),
        );
        source.insert(
            "mem",
            SourceRecord::new("2024-01-01T00:04:00Z").with("v", SourceValue::Integer(2)),
        );

        let destination = MemoryDestination::new();
        destination.fail_writes_at(at(5), 100, StoreError::Rejected("bad".to_string()));
        let migrator = Migrator::new(&source, &destination, &store, settings());
        let err = migrator.migrate_entity("cpu").unwrap_err();
        assert!(err.is_checkpoint_failure());

        let destination = MemoryDestination::new();
        destination.fail_writes_at(at(5), 100, StoreError::Rejected("bad".to_string()));
        let migrator = Migrator::new(&source, &destination, &store, settings());
        let report = migrator.run(&["cpu".to_string(), "mem".to_string()], true);

        match &report.entities[0].status {
            EntityStatus::Aborted(reason) => {
                assert!(reason.contains("checkpoint file could not be persisted"))
            }
            other => panic!("expected abort, got {other:?}"),
        }
        assert_eq!(report.entities[1].status, EntityStatus::Completed);
        assert_eq!(report.entities[1].windows.failed, 0);
        assert!(report.has_failures());
    }

    #[test]
    fn test_missing_measurement_reports_no_data() {
        let temp = TempDir::new().unwrap();
        let store = CheckpointStore::open(&temp.path().join("writeobj.json")).unwrap();
        let source = MemorySource::new();
        let destination = MemoryDestination::new();
        let migrator = Migrator::new(&source, &destination, &store, settings());
        let report = migrator.migrate("ghost");
        assert_eq!(report.status, EntityStatus::NoData);
        assert!(!report.is_aborted());
    }
}
