//! Moving one window of data from the source to the destination.
//!
//! Layers, innermost first:
//! - [`TransferWorker::attempt`]: read, transform, write once
//! - [`TransferWorker::transfer`]: the attempt under the retry policy
//! - checkpointing of failed outcomes, done by the caller

use tracing::{debug, warn};

use super::retry::{RetryPolicy, RetryResult, StepOutcome};
use crate::models::{DataPoint, FailureKind, SourceRecord, TimeWindow};
use crate::store::{DestinationStore, SourceStore};

/// What happened to one window.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowOutcome {
    Transferred {
        window: TimeWindow,
        points: usize,
        attempts: u32,
    },
    Failed {
        window: TimeWindow,
        kind: FailureKind,
        reason: String,
        attempts: u32,
    },
}

impl WindowOutcome {
    pub fn window(&self) -> &TimeWindow {
        match self {
            WindowOutcome::Transferred { window, .. } | WindowOutcome::Failed { window, .. } => {
                window
            }
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, WindowOutcome::Failed { .. })
    }
}

/// Convert a window's source records into destination points.
///
/// Records that end up with no field cannot be written and are skipped.
/// An unparseable timestamp fails the whole window.
pub fn transform(window: &TimeWindow, records: &[SourceRecord]) -> anyhow::Result<Vec<DataPoint>> {
    let mut points = Vec::with_capacity(records.len());
    for record in records {
        let point = DataPoint::from_record(&window.measurement, record)?;
        if point.fields.is_empty() {
            warn!(
                measurement = %window.measurement,
                time = %record.time,
                "skipping record without numeric or boolean values"
            );
            continue;
        }
        points.push(point);
    }
    Ok(points)
}

pub struct TransferWorker<'a> {
    source: &'a dyn SourceStore,
    destination: &'a dyn DestinationStore,
    retry: RetryPolicy,
}

impl<'a> TransferWorker<'a> {
    pub fn new(
        source: &'a dyn SourceStore,
        destination: &'a dyn DestinationStore,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            source,
            destination,
            retry,
        }
    }

    /// One pass over the window. Returns the number of points written.
    pub fn attempt(&self, window: &TimeWindow) -> StepOutcome<usize> {
        let records = match self.source.query_range(
            &window.measurement,
            &window.start_text(),
            &window.end_text(),
        ) {
            Ok(records) => records,
            Err(e) => return StepOutcome::from_store_error(&e),
        };

        let points = match transform(window, &records) {
            Ok(points) => points,
            Err(e) => return StepOutcome::Fatal(format!("{e:#}")),
        };
        if points.is_empty() {
            return StepOutcome::Success(0);
        }

        match self.destination.write_points(&window.bucket, &points) {
            Ok(()) => StepOutcome::Success(points.len()),
            Err(e) => StepOutcome::from_store_error(&e),
        }
    }

    /// Transfer a window, retrying transient failures.
    ///
    /// Never touches the checkpoint store; a failed outcome is for the caller
    /// to record.
    pub fn transfer(&self, window: TimeWindow) -> WindowOutcome {
        let label = window.to_string();
        match self.retry.run(&label, |_| self.attempt(&window)) {
            RetryResult::Succeeded { value, attempts } => {
                debug!(window = %label, points = value, attempts, "window transferred");
                WindowOutcome::Transferred {
                    window,
                    points: value,
                    attempts,
                }
            }
            RetryResult::Failed {
                kind,
                reason,
                attempts,
            } => WindowOutcome::Failed {
                window,
                kind,
                reason,
                attempts,
            },
        }
    }
}
