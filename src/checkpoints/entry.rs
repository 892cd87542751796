use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{TimeFormat, TimeWindow};

/// A window that failed to transfer and still needs a retry.
///
/// Field names and the text form of the timestamps match the JSON written by
/// earlier tooling, so an existing `writeobj.json` loads unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointEntry {
    pub measurement: String,
    /// Window start, rendered in `time_format`.
    pub start_dt: String,
    /// Window end, rendered in `time_format`.
    pub end_dt: String,
    pub bucket_name: String,
    pub time_format: TimeFormat,
}

impl CheckpointEntry {
    pub fn from_window(window: &TimeWindow) -> Self {
        Self {
            measurement: window.measurement.clone(),
            start_dt: window.start_text(),
            end_dt: window.end_text(),
            bucket_name: window.bucket.clone(),
            time_format: window.time_format,
        }
    }

    /// Rebuild the window this entry was recorded from.
    pub fn to_window(&self) -> Result<TimeWindow> {
        let parse = |text: &str| {
            TimeFormat::detect(text)
                .map(|(at, _)| at)
                .with_context(|| format!("Invalid checkpoint entry for {}", self.measurement))
        };
        Ok(TimeWindow {
            measurement: self.measurement.clone(),
            start: parse(&self.start_dt)?,
            end: parse(&self.end_dt)?,
            bucket: self.bucket_name.clone(),
            time_format: self.time_format,
        })
    }
}

impl fmt::Display for CheckpointEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}, {}) -> {}",
            self.measurement, self.start_dt, self.end_dt, self.bucket_name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn window() -> TimeWindow {
        TimeWindow {
            measurement: "cpu".to_string(),
            start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 1, 1, 0, 10, 0).unwrap(),
            bucket: "cpu".to_string(),
            time_format: TimeFormat::WholeSeconds,
        }
    }

    #[test]
    fn test_entry_copies_window_fields() {
        let entry = CheckpointEntry::from_window(&window());
        assert_eq!(entry.start_dt, "2024-01-01T00:05:00Z");
        assert_eq!(entry.end_dt, "2024-01-01T00:10:00Z");
        assert_eq!(entry.to_window().unwrap(), window());
    }

    #[test]
    fn test_legacy_json_shape() {
        let json = r#"{
            "measurement": "Single",
            "start_dt": "2023-06-01T10:00:00.000000Z",
            "end_dt": "2023-06-01T10:03:00.000000Z",
            "bucket_name": "Single",
            "time_format": "%Y-%m-%dT%H:%M:%S.%fZ"
        }"#;
        let entry: CheckpointEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.time_format, TimeFormat::Fractional);
        let w = entry.to_window().unwrap();
        assert_eq!(w.duration(), chrono::Duration::minutes(3));
        assert_eq!(w.start_text(), "2023-06-01T10:00:00.000000Z");

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["time_format"], "%Y-%m-%dT%H:%M:%S.%fZ");
    }

    #[test]
    fn test_bad_timestamp_is_an_error() {
        let mut entry = CheckpointEntry::from_window(&window());
        entry.end_dt = "yesterday".to_string();
        assert!(entry.to_window().is_err());
    }
}
