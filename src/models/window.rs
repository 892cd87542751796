use chrono::{DateTime, Utc};
use std::fmt;

use super::time::TimeFormat;

/// One measurement's migration for a single run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationTask {
    pub measurement: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub bucket: String,
    pub time_format: TimeFormat,
}

impl MigrationTask {
    /// True when there is nothing left to transfer.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Half-open `[start, end)` slice of a task: the unit of transfer, retry and
/// parallelism.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimeWindow {
    pub measurement: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub bucket: String,
    pub time_format: TimeFormat,
}

impl TimeWindow {
    pub fn start_text(&self) -> String {
        self.time_format.format(&self.start)
    }

    pub fn end_text(&self) -> String {
        self.time_format.format(&self.end)
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}, {}) -> {}",
            self.measurement,
            self.start_text(),
            self.end_text(),
            self.bucket
        )
    }
}
