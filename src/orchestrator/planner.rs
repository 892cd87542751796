//! Splitting a task's time range into transfer windows.

use anyhow::{bail, Result};
use chrono::Duration;
use std::collections::HashMap;

use crate::models::{MigrationTask, TimeWindow};

/// Window size per measurement, with a default for everything not listed.
#[derive(Debug, Clone)]
pub struct WindowSizes {
    default: Duration,
    overrides: HashMap<String, Duration>,
}

impl WindowSizes {
    pub fn new(default: Duration) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, measurement: &str, size: Duration) -> Self {
        self.overrides.insert(measurement.to_string(), size);
        self
    }

    pub fn for_measurement(&self, measurement: &str) -> Duration {
        self.overrides
            .get(measurement)
            .copied()
            .unwrap_or(self.default)
    }
}

/// Cut `[task.start, task.end)` into consecutive windows of at most `size`.
///
/// The last window is clipped to `task.end`. An empty range yields no windows.
pub fn plan_windows(task: &MigrationTask, size: Duration) -> Result<Vec<TimeWindow>> {
    if size <= Duration::zero() {
        bail!("Window size must be positive, got {size}");
    }

    let mut windows = Vec::new();
    let mut cursor = task.start;
    while cursor < task.end {
        let next = match cursor.checked_add_signed(size) {
            Some(next) if next < task.end => next,
            _ => task.end,
        };
        windows.push(TimeWindow {
            measurement: task.measurement.clone(),
            start: cursor,
            end: next,
            bucket: task.bucket.clone(),
            time_format: task.time_format,
        });
        cursor = next;
    }
    Ok(windows)
}
