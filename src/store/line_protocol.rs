//! InfluxDB line protocol encoding for [`DataPoint`]s.

use anyhow::{bail, Context, Result};
use std::fmt::Write;

use crate::models::{DataPoint, FieldValue};

fn escape_measurement(name: &str) -> String {
    escape(name, &[',', ' '])
}

fn escape_key_or_tag(value: &str) -> String {
    escape(value, &[',', '=', ' '])
}

fn escape(value: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\\' => out.push_str("\\\\"),
            c if special.contains(&c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

fn encode_field(value: &FieldValue) -> Result<String> {
    Ok(match value {
        FieldValue::Integer(i) => format!("{i}i"),
        FieldValue::Float(v) => {
            if !v.is_finite() {
                bail!("non-finite float {v} cannot be written");
            }
            format!("{v}")
        }
        FieldValue::Boolean(b) => format!("{b}"),
    })
}

/// Encode one point as a single line (no trailing newline).
///
/// Empty tag values are dropped since the protocol has no way to express
/// them. A point without fields is an error.
pub fn encode_point(point: &DataPoint) -> Result<String> {
    if point.fields.is_empty() {
        bail!(
            "point for '{}' at {} has no fields",
            point.measurement,
            point.time
        );
    }

    let mut line = escape_measurement(&point.measurement);
    for (key, value) in &point.tags {
        if value.is_empty() {
            continue;
        }
        write!(
            line,
            ",{}={}",
            escape_key_or_tag(key),
            escape_key_or_tag(value)
        )?;
    }

    let mut separator = ' ';
    for (key, value) in &point.fields {
        let encoded = encode_field(value)
            .with_context(|| format!("field '{key}' of '{}'", point.measurement))?;
        write!(line, "{separator}{}={encoded}", escape_key_or_tag(key))?;
        separator = ',';
    }

    let nanos = point
        .time
        .timestamp_nanos_opt()
        .with_context(|| format!("timestamp {} out of range", point.time))?;
    write!(line, " {nanos}")?;
    Ok(line)
}

/// Encode a batch, one point per line.
pub fn encode_batch(points: &[DataPoint]) -> Result<String> {
    let mut body = String::new();
    for point in points {
        body.push_str(&encode_point(point)?);
        body.push('\n');
    }
    Ok(body)
}
