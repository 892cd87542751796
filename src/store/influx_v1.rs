//! InfluxDB 1.x source adapter over the `/query` HTTP endpoint.

use anyhow::Result;
use reqwest::blocking::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::http::{create_http_client, endpoint, read_body, transport_error};
use super::{SourceStore, StoreError, StoreResult};
use crate::config::SourceConfig;
use crate::models::{SourceRecord, SourceValue};

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatementResult {
    #[serde(default)]
    series: Vec<Series>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Series {
    columns: Vec<String>,
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

pub struct InfluxV1Source {
    client: Client,
    url: String,
    database: String,
    credentials: Option<(String, String)>,
}

impl InfluxV1Source {
    pub fn new(config: &SourceConfig, request_timeout: Duration) -> Result<Self> {
        let credentials = config
            .username
            .as_ref()
            .map(|user| (user.clone(), config.password.clone().unwrap_or_default()));
        Ok(Self {
            client: create_http_client(request_timeout)?,
            url: config.url.clone(),
            database: config.database.clone(),
            credentials,
        })
    }

    fn query(&self, statement: &str) -> StoreResult<Vec<Series>> {
        debug!(statement, "influx v1 query");
        let url = endpoint(
            &self.url,
            "query",
            &[("db", self.database.as_str()), ("q", statement)],
        )?;
        let mut request = self.client.get(url);
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, Some(password));
        }
        let response = request
            .send()
            .map_err(|e| transport_error(e, "source query"))?;
        let body = read_body(response, "source query")?;
        parse_series(&body)
    }

    fn boundary_time(&self, measurement: &str, order: &str) -> StoreResult<Option<String>> {
        let statement = format!(
            "SELECT * FROM {} ORDER BY time {order} LIMIT 1",
            quote_identifier(measurement)
        );
        let series = self.query(&statement)?;
        let records = records_from_series(series)?;
        Ok(records.into_iter().next().map(|record| record.time))
    }
}

impl SourceStore for InfluxV1Source {
    fn list_measurements(&self) -> StoreResult<Vec<String>> {
        let series = self.query("SHOW MEASUREMENTS")?;
        let mut names = Vec::new();
        for s in series {
            for row in s.values {
                match row.first() {
                    Some(serde_json::Value::String(name)) => names.push(name.clone()),
                    other => {
                        return Err(StoreError::Protocol(format!(
                            "unexpected measurement row: {other:?}"
                        )))
                    }
                }
            }
        }
        Ok(names)
    }

    fn earliest_timestamp(&self, measurement: &str) -> StoreResult<Option<String>> {
        self.boundary_time(measurement, "ASC")
    }

    fn latest_timestamp(&self, measurement: &str) -> StoreResult<Option<String>> {
        self.boundary_time(measurement, "DESC")
    }

    fn query_range(
        &self,
        measurement: &str,
        start: &str,
        end: &str,
    ) -> StoreResult<Vec<SourceRecord>> {
        let statement = format!(
            "SELECT * FROM {} WHERE time >= {} AND time < {} ORDER BY time ASC",
            quote_identifier(measurement),
            quote_literal(start),
            quote_literal(end)
        );
        records_from_series(self.query(&statement)?)
    }
}

/// Double-quote an identifier for InfluxQL.
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Single-quote a string literal for InfluxQL.
fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

fn parse_series(body: &str) -> StoreResult<Vec<Series>> {
    let response: QueryResponse = serde_json::from_str(body)
        .map_err(|e| StoreError::Protocol(format!("invalid query response: {e}")))?;
    if let Some(error) = response.error {
        return Err(StoreError::Rejected(error));
    }
    let mut series = Vec::new();
    for result in response.results {
        if let Some(error) = result.error {
            return Err(StoreError::Rejected(error));
        }
        series.extend(result.series);
    }
    Ok(series)
}

/// Columns holding at least one non-integer number.
///
/// InfluxDB 1.x renders a whole float such as `1.0` as `1`, so a float column
/// can only be recognised by looking at every row of the series.
fn float_columns(series: &Series) -> Vec<bool> {
    let mut floats = vec![false; series.columns.len()];
    for row in &series.values {
        for (index, cell) in row.iter().enumerate().take(floats.len()) {
            if let serde_json::Value::Number(n) = cell {
                if n.as_i64().is_none() {
                    floats[index] = true;
                }
            }
        }
    }
    floats
}

/// Turn result rows into records, tagging each cell once.
///
/// Integer cells of a float column are widened so one field never carries
/// two types within a batch.
fn records_from_series(series: Vec<Series>) -> StoreResult<Vec<SourceRecord>> {
    let mut records = Vec::new();
    for s in series {
        let time_index = s
            .columns
            .iter()
            .position(|c| c == "time")
            .ok_or_else(|| StoreError::Protocol("result has no time column".to_string()))?;
        let floats = float_columns(&s);

        for row in s.values {
            let time = match row.get(time_index) {
                Some(serde_json::Value::String(t)) => t.clone(),
                other => {
                    return Err(StoreError::Protocol(format!(
                        "expected RFC3339 time text, got {other:?}"
                    )))
                }
            };
            let mut record = SourceRecord::new(time);
            for (index, (column, cell)) in s.columns.iter().zip(row.iter()).enumerate() {
                if column == "time" {
                    continue;
                }
                let value = match SourceValue::from_json(cell) {
                    Some(SourceValue::Integer(i)) if floats[index] => SourceValue::Float(i as f64),
                    Some(value) => value,
                    None => continue,
                };
                record.values.insert(column.clone(), value);
            }
            records.push(record);
        }
    }
    Ok(records)
}
