//! Timestamp text formats shared by the source store and the checkpoint file.
//!
//! InfluxDB 1.x renders RFC3339 times either with or without a fractional
//! part. Whichever shape a task's start boundary arrived in is kept for the
//! whole task so that the text written into queries and checkpoint entries
//! reads back identically.

use anyhow::{bail, Result};
use chrono::{DateTime, SecondsFormat, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// strftime pattern for timestamps carrying fractional seconds.
pub const FRACTIONAL_PATTERN: &str = "%Y-%m-%dT%H:%M:%S.%fZ";

/// strftime pattern for timestamps with whole seconds only.
pub const WHOLE_SECONDS_PATTERN: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Text encoding of a timestamp.
///
/// Serialized as the strftime pattern string so checkpoint files written by
/// older tooling (which stored the raw pattern) stay readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeFormat {
    /// `2024-01-01T00:00:00.123456Z`
    Fractional,
    /// `2024-01-01T00:00:00Z`
    WholeSeconds,
}

impl TimeFormat {
    pub fn pattern(&self) -> &'static str {
        match self {
            TimeFormat::Fractional => FRACTIONAL_PATTERN,
            TimeFormat::WholeSeconds => WHOLE_SECONDS_PATTERN,
        }
    }

    /// Render a timestamp in this format.
    ///
    /// Fractional output uses microsecond precision, matching the `%f`
    /// directive of the stored pattern.
    pub fn format(&self, at: &DateTime<Utc>) -> String {
        match self {
            TimeFormat::Fractional => at.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
            TimeFormat::WholeSeconds => at.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    /// Parse timestamp text, trying the fractional shape first and then the
    /// whole-seconds shape. Returns the instant and the shape that matched.
    pub fn detect(text: &str) -> Result<(DateTime<Utc>, TimeFormat)> {
        let trimmed = text.trim();
        if !trimmed.ends_with('Z') {
            bail!("Unsupported timestamp '{text}': expected a UTC time ending in 'Z'");
        }
        let parsed = match DateTime::parse_from_rfc3339(trimmed) {
            Ok(parsed) => parsed.with_timezone(&Utc),
            Err(e) => bail!("Invalid timestamp '{text}': {e}"),
        };
        let format = if trimmed.contains('.') {
            TimeFormat::Fractional
        } else {
            TimeFormat::WholeSeconds
        };
        Ok((parsed, format))
    }

    /// Parse text that is expected to be in this format.
    pub fn parse(&self, text: &str) -> Result<DateTime<Utc>> {
        let (at, detected) = Self::detect(text)?;
        if detected != *self {
            bail!(
                "Timestamp '{text}' does not match expected format {}",
                self.pattern()
            );
        }
        Ok(at)
    }

    /// The narrowest format that represents `at` without losing precision
    /// at the microsecond level.
    pub fn for_instant(at: &DateTime<Utc>) -> TimeFormat {
        if at.nanosecond() == 0 {
            TimeFormat::WholeSeconds
        } else {
            TimeFormat::Fractional
        }
    }
}

impl fmt::Display for TimeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pattern())
    }
}

impl std::str::FromStr for TimeFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            FRACTIONAL_PATTERN | "fractional" => Ok(TimeFormat::Fractional),
            WHOLE_SECONDS_PATTERN | "whole-seconds" => Ok(TimeFormat::WholeSeconds),
            _ => bail!(
                "Invalid time format: {s}. Valid values: {FRACTIONAL_PATTERN}, {WHOLE_SECONDS_PATTERN}"
            ),
        }
    }
}

impl Serialize for TimeFormat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.pattern())
    }
}

impl<'de> Deserialize<'de> for TimeFormat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_detect_fractional() {
        let (at, format) = TimeFormat::detect("2024-01-01T00:05:00.250000Z").unwrap();
        assert_eq!(format, TimeFormat::Fractional);
        assert_eq!(at.timestamp_subsec_millis(), 250);
    }

    #[test]
    fn test_detect_whole_seconds() {
        let (at, format) = TimeFormat::detect("2024-01-01T00:05:00Z").unwrap();
        assert_eq!(format, TimeFormat::WholeSeconds);
        assert_eq!(at, Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap());
    }

    #[test]
    fn test_detect_nanosecond_precision() {
        let (at, format) = TimeFormat::detect("2024-01-01T00:00:00.123456789Z").unwrap();
        assert_eq!(format, TimeFormat::Fractional);
        assert_eq!(at.timestamp_subsec_nanos(), 123_456_789);
    }

    #[test]
    fn test_detect_rejects_offsets_and_garbage() {
        assert!(TimeFormat::detect("2024-01-01T00:00:00+01:00").is_err());
        assert!(TimeFormat::detect("yesterday").is_err());
        assert!(TimeFormat::detect("").is_err());
    }

    #[test]
    fn test_format_preserves_text() {
        let text = "2024-03-10T12:30:45.500000Z";
        let (at, format) = TimeFormat::detect(text).unwrap();
        assert_eq!(format.format(&at), text);

        let text = "2024-03-10T12:30:45Z";
        let (at, format) = TimeFormat::detect(text).unwrap();
        assert_eq!(format.format(&at), text);
    }

    #[test]
    fn test_parse_enforces_expected_shape() {
        assert!(TimeFormat::WholeSeconds
            .parse("2024-01-01T00:00:00.5Z")
            .is_err());
        assert!(TimeFormat::Fractional.parse("2024-01-01T00:00:00Z").is_err());
        assert!(TimeFormat::Fractional
            .parse("2024-01-01T00:00:00.5Z")
            .is_ok());
    }

    #[test]
    fn test_pattern_serde() {
        let json = serde_json::to_string(&TimeFormat::Fractional).unwrap();
        assert_eq!(json, "\"%Y-%m-%dT%H:%M:%S.%fZ\"");
        let parsed: TimeFormat = serde_json::from_str("\"%Y-%m-%dT%H:%M:%SZ\"").unwrap();
        assert_eq!(parsed, TimeFormat::WholeSeconds);
        assert!(serde_json::from_str::<TimeFormat>("\"%d/%m/%Y\"").is_err());
    }

    #[test]
    fn test_for_instant() {
        let whole = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(TimeFormat::for_instant(&whole), TimeFormat::WholeSeconds);
        let fractional = whole + chrono::Duration::milliseconds(10);
        assert_eq!(TimeFormat::for_instant(&fractional), TimeFormat::Fractional);
    }
}
