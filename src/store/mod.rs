//! Boundaries to the source and destination time-series stores.
//!
//! The migration engine only talks to these traits. The InfluxDB adapters
//! speak HTTP; the in-memory adapters back tests and offline planning.

pub mod http;
pub mod influx_v1;
pub mod influx_v2;
pub mod line_protocol;
pub mod memory;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{DataPoint, SourceRecord};

pub use influx_v1::InfluxV1Source;
pub use influx_v2::InfluxV2Destination;
pub use memory::{MemoryDestination, MemorySource};

/// Errors raised by store adapters.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The request did not complete in time (read or write timeout).
    #[error("timed out: {0}")]
    Timeout(String),

    /// The store could not be reached or asked us to back off.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store refused the request (bad data, auth, missing bucket).
    #[error("rejected: {0}")]
    Rejected(String),

    /// The store answered with something we could not interpret.
    #[error("unexpected response: {0}")]
    Protocol(String),
}

impl StoreError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Timeout(_) | StoreError::Unavailable(_))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Read side: the store migrated from.
pub trait SourceStore: Send + Sync {
    /// Names of every measurement in the source database.
    fn list_measurements(&self) -> StoreResult<Vec<String>>;

    /// Time text of the oldest record, or `None` when the measurement is empty.
    fn earliest_timestamp(&self, measurement: &str) -> StoreResult<Option<String>>;

    /// Time text of the newest record, or `None` when the measurement is empty.
    fn latest_timestamp(&self, measurement: &str) -> StoreResult<Option<String>>;

    /// Records with `start <= time < end`, ordered by time.
    ///
    /// `start` and `end` are already rendered in the task's time format.
    fn query_range(
        &self,
        measurement: &str,
        start: &str,
        end: &str,
    ) -> StoreResult<Vec<SourceRecord>>;
}

/// Write side: the store migrated into.
pub trait DestinationStore: Send + Sync {
    /// Create the bucket if absent. Returns the bucket name to write into.
    fn ensure_bucket(&self, name: &str) -> StoreResult<String>;

    /// Most recent point time within the lookback horizon, if any.
    fn last_timestamp(&self, bucket: &str) -> StoreResult<Option<DateTime<Utc>>>;

    /// Write all points as one batch. Rewriting an existing
    /// (measurement, tag set, time) overwrites rather than duplicates.
    fn write_points(&self, bucket: &str, points: &[DataPoint]) -> StoreResult<()>;
}
