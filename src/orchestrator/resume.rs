//! Working out what a measurement still needs migrated.

use anyhow::anyhow;
use tracing::{debug, info};

use crate::models::{MigrationError, MigrationTask, TimeFormat};
use crate::store::{DestinationStore, SourceStore};

pub struct ResumeCoordinator<'a> {
    source: &'a dyn SourceStore,
    destination: &'a dyn DestinationStore,
}

impl<'a> ResumeCoordinator<'a> {
    pub fn new(source: &'a dyn SourceStore, destination: &'a dyn DestinationStore) -> Self {
        Self {
            source,
            destination,
        }
    }

    /// Ensure the measurement's bucket exists and compute this run's range.
    ///
    /// The range starts at the newest point already in the bucket, or at the
    /// oldest source record for a fresh bucket, and ends at the newest source
    /// record as of now. Returns `None` when the source has no data.
    pub fn plan_task(&self, measurement: &str) -> Result<Option<MigrationTask>, MigrationError> {
        let bucket = self
            .destination
            .ensure_bucket(measurement)
            .map_err(|e| MigrationError::ContainerProvisioning {
                bucket: measurement.to_string(),
                source: anyhow!(e),
            })?;

        let planning = |source: anyhow::Error| MigrationError::Planning {
            measurement: measurement.to_string(),
            source,
        };

        let Some(latest) = self
            .source
            .latest_timestamp(measurement)
            .map_err(|e| planning(anyhow!(e)))?
        else {
            info!(measurement, "no source data, nothing to migrate");
            return Ok(None);
        };
        let (end, _) = TimeFormat::detect(&latest).map_err(planning)?;

        let last_written = self
            .destination
            .last_timestamp(&bucket)
            .map_err(|e| planning(anyhow!(e)))?;

        let (start, time_format) = match last_written {
            Some(last) => {
                debug!(measurement, %last, "resuming from last written point");
                (last, TimeFormat::for_instant(&last))
            }
            None => {
                let earliest = self
                    .source
                    .earliest_timestamp(measurement)
                    .map_err(|e| planning(anyhow!(e)))?
                    .ok_or_else(|| planning(anyhow!("source reported a latest but no earliest record")))?;
                debug!(measurement, %earliest, "fresh bucket, starting from oldest record");
                TimeFormat::detect(&earliest).map_err(planning)?
            }
        };

        let task = MigrationTask {
            measurement: measurement.to_string(),
            start,
            end,
            bucket,
            time_format,
        };
        info!(
            measurement,
            start = %time_format.format(&task.start),
            end = %time_format.format(&task.end),
            "planned migration range"
        );
        Ok(Some(task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SourceRecord, SourceValue};
    use crate::store::{MemoryDestination, MemorySource};
    use chrono::{DateTime, TimeZone, Utc};

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, 0).unwrap()
    }

    fn source_with(times: &[&str]) -> MemorySource {
        let source = MemorySource::new();
        for time in times {
            source.insert(
                "cpu",
                SourceRecord::new(*time).with("v", SourceValue::Integer(1)),
            );
        }
        source
    }

    #[test]
    fn test_fresh_bucket_starts_at_source_earliest() {
        let source = source_with(&["2024-01-01T00:00:00Z", "2024-01-01T00:15:00Z"]);
        let destination = MemoryDestination::new();
        let task = ResumeCoordinator::new(&source, &destination)
            .plan_task("cpu")
            .unwrap()
            .unwrap();
        assert_eq!(task.start, at(0));
        assert_eq!(task.end, at(15));
        assert_eq!(task.bucket, "cpu");
        assert_eq!(task.time_format, TimeFormat::WholeSeconds);
        assert!(destination.has_bucket("cpu"));
    }

    #[test]
    fn test_fractional_source_keeps_fractional_format() {
        let source = source_with(&["2024-01-01T00:00:00.250000Z", "2024-01-01T00:15:00Z"]);
        let destination = MemoryDestination::new();
        let task = ResumeCoordinator::new(&source, &destination)
            .plan_task("cpu")
            .unwrap()
            .unwrap();
        assert_eq!(task.time_format, TimeFormat::Fractional);
    }

    #[test]
    fn test_resumes_from_destination_last_timestamp() {
        let source = source_with(&["2024-01-01T00:00:00Z", "2024-01-01T00:15:00Z"]);
        let destination = MemoryDestination::new();
        destination.ensure_bucket("cpu").unwrap();
        let point = crate::models::DataPoint::from_record(
            "cpu",
            &SourceRecord::new("2024-01-01T00:07:00Z").with("v", SourceValue::Integer(1)),
        )
        .unwrap();
        destination.write_points("cpu", &[point]).unwrap();

        let task = ResumeCoordinator::new(&source, &destination)
            .plan_task("cpu")
            .unwrap()
            .unwrap();
        assert_eq!(task.start, at(7));
        assert_eq!(task.end, at(15));
    }

    #[test]
    fn test_no_source_data_means_no_task() {
        let source = MemorySource::new();
        let destination = MemoryDestination::new();
        let task = ResumeCoordinator::new(&source, &destination)
            .plan_task("cpu")
            .unwrap();
        assert!(task.is_none());
    }

    #[test]
    fn test_bucket_failure_is_provisioning_error() {
        let source = source_with(&["2024-01-01T00:00:00Z"]);
        let destination = MemoryDestination::new();
        destination.fail_bucket("cpu");
        let err = ResumeCoordinator::new(&source, &destination)
            .plan_task("cpu")
            .unwrap_err();
        assert!(matches!(
            err,
            MigrationError::ContainerProvisioning { ref bucket, .. } if bucket == "cpu"
        ));
    }
}
