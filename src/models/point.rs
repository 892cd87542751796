//! Source records and the destination points they become.
//!
//! Every non-time column of a source record is tagged once, at ingestion, as
//! one of the [`SourceValue`] variants. Field/tag classification then only
//! looks at the variant.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;

use super::time::TimeFormat;

/// A single cell read from the source store.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
}

impl SourceValue {
    /// Tag a JSON cell. Returns `None` for nulls (column absent in this row).
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => None,
            serde_json::Value::Bool(b) => Some(SourceValue::Boolean(*b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Some(SourceValue::Integer(i)),
                None => n.as_f64().map(SourceValue::Float),
            },
            serde_json::Value::String(s) => Some(SourceValue::Text(s.clone())),
            other => Some(SourceValue::Text(other.to_string())),
        }
    }
}

impl fmt::Display for SourceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceValue::Integer(i) => write!(f, "{i}"),
            SourceValue::Float(v) => write!(f, "{v}"),
            SourceValue::Boolean(b) => write!(f, "{b}"),
            SourceValue::Text(s) => write!(f, "{s}"),
        }
    }
}

/// A row as returned by the source store, time still in text form.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub time: String,
    pub values: BTreeMap<String, SourceValue>,
}

impl SourceRecord {
    pub fn new(time: impl Into<String>) -> Self {
        Self {
            time: time.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: SourceValue) -> Self {
        self.values.insert(key.into(), value);
        self
    }
}

/// A numeric or boolean value carried as a point field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

/// Where a source value lands on a destination point.
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    Field(FieldValue),
    Tag(String),
}

/// Booleans and numbers become fields; everything else becomes a string tag.
pub fn classify(value: &SourceValue) -> Classified {
    match value {
        SourceValue::Integer(i) => Classified::Field(FieldValue::Integer(*i)),
        SourceValue::Float(v) => Classified::Field(FieldValue::Float(*v)),
        SourceValue::Boolean(b) => Classified::Field(FieldValue::Boolean(*b)),
        SourceValue::Text(s) => Classified::Tag(s.clone()),
    }
}

/// One record in destination representation.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    pub measurement: String,
    pub time: DateTime<Utc>,
    pub fields: BTreeMap<String, FieldValue>,
    pub tags: BTreeMap<String, String>,
}

impl DataPoint {
    /// Build a point from a source record.
    ///
    /// The `time` column is parsed with [`TimeFormat::detect`]; every other
    /// column goes through [`classify`].
    pub fn from_record(measurement: &str, record: &SourceRecord) -> anyhow::Result<Self> {
        let (time, _) = TimeFormat::detect(&record.time)?;
        let mut fields = BTreeMap::new();
        let mut tags = BTreeMap::new();

        for (key, value) in &record.values {
            if key == "time" {
                continue;
            }
            match classify(value) {
                Classified::Field(field) => {
                    fields.insert(key.clone(), field);
                }
                Classified::Tag(tag) => {
                    tags.insert(key.clone(), tag);
                }
            }
        }

        Ok(Self {
            measurement: measurement.to_string(),
            time,
            fields,
            tags,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_fields() {
        assert_eq!(
            classify(&SourceValue::Integer(7)),
            Classified::Field(FieldValue::Integer(7))
        );
        assert_eq!(
            classify(&SourceValue::Float(1.5)),
            Classified::Field(FieldValue::Float(1.5))
        );
        assert_eq!(
            classify(&SourceValue::Boolean(false)),
            Classified::Field(FieldValue::Boolean(false))
        );
    }

    #[test]
    fn test_classify_text_is_tag() {
        assert_eq!(
            classify(&SourceValue::Text("42".to_string())),
            Classified::Tag("42".to_string())
        );
    }

    #[test]
    fn test_classify_is_deterministic() {
        let values = [
            SourceValue::Integer(-3),
            SourceValue::Float(0.25),
            SourceValue::Boolean(true),
            SourceValue::Text("north".to_string()),
        ];
        for value in &values {
            assert_eq!(classify(value), classify(&value.clone()));
        }
    }

    #[test]
    fn test_from_json_tags_values_once() {
        assert_eq!(
            SourceValue::from_json(&json!(12)),
            Some(SourceValue::Integer(12))
        );
        assert_eq!(
            SourceValue::from_json(&json!(12.5)),
            Some(SourceValue::Float(12.5))
        );
        assert_eq!(
            SourceValue::from_json(&json!(true)),
            Some(SourceValue::Boolean(true))
        );
        assert_eq!(
            SourceValue::from_json(&json!("pump-3")),
            Some(SourceValue::Text("pump-3".to_string()))
        );
        assert_eq!(SourceValue::from_json(&json!(null)), None);
        assert_eq!(
            SourceValue::from_json(&json!([1, 2])),
            Some(SourceValue::Text("[1,2]".to_string()))
        );
    }

    #[test]
    fn test_point_from_record() {
        let record = SourceRecord::new("2024-01-01T00:01:00Z")
            .with("voltage", SourceValue::Float(229.5))
            .with("online", SourceValue::Boolean(true))
            .with("count", SourceValue::Integer(4))
            .with("site", SourceValue::Text("dublin".to_string()));

        let point = DataPoint::from_record("Single", &record).unwrap();
        assert_eq!(point.measurement, "Single");
        assert_eq!(point.fields.len(), 3);
        assert_eq!(point.fields["voltage"], FieldValue::Float(229.5));
        assert_eq!(point.fields["online"], FieldValue::Boolean(true));
        assert_eq!(point.fields["count"], FieldValue::Integer(4));
        assert_eq!(point.tags["site"], "dublin");
        assert_eq!(point.time.to_rfc3339(), "2024-01-01T00:01:00+00:00");
    }

    #[test]
    fn test_point_from_record_rejects_bad_time() {
        let record = SourceRecord::new("01/01/2024").with("v", SourceValue::Integer(1));
        assert!(DataPoint::from_record("m", &record).is_err());
    }
}
