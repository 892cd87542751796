//! InfluxDB 2.x destination adapter over the `/api/v2` HTTP endpoints.

use anyhow::Result;
use chrono::{DateTime, Utc};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::json;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info};

use super::http::{create_http_client, endpoint, read_body, transport_error};
use super::line_protocol::encode_batch;
use super::{DestinationStore, StoreError, StoreResult};
use crate::config::DestinationConfig;
use crate::models::DataPoint;

#[derive(Debug, Deserialize)]
struct Organizations {
    #[serde(default)]
    orgs: Vec<Organization>,
}

#[derive(Debug, Deserialize)]
struct Organization {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct Buckets {
    #[serde(default)]
    buckets: Vec<Bucket>,
}

#[derive(Debug, Deserialize)]
struct Bucket {
    name: String,
}

pub struct InfluxV2Destination {
    client: Client,
    url: String,
    org: String,
    token: String,
    lookback_days: u32,
    org_id: OnceLock<String>,
}

impl InfluxV2Destination {
    pub fn new(config: &DestinationConfig, token: String, request_timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: create_http_client(request_timeout)?,
            url: config.url.clone(),
            org: config.org.clone(),
            token,
            lookback_days: config.lookback_days,
            org_id: OnceLock::new(),
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(AUTHORIZATION, format!("Token {}", self.token))
    }

    fn org_id(&self) -> StoreResult<String> {
        if let Some(id) = self.org_id.get() {
            return Ok(id.clone());
        }
        let url = endpoint(&self.url, "api/v2/orgs", &[("org", self.org.as_str())])?;
        let response = self
            .authorized(self.client.get(url))
            .send()
            .map_err(|e| transport_error(e, "organization lookup"))?;
        let body = read_body(response, "organization lookup")?;
        let orgs: Organizations = serde_json::from_str(&body)
            .map_err(|e| StoreError::Protocol(format!("invalid organization list: {e}")))?;
        let org = orgs
            .orgs
            .into_iter()
            .find(|o| o.name == self.org || o.id == self.org)
            .ok_or_else(|| StoreError::Rejected(format!("organization '{}' not found", self.org)))?;
        Ok(self.org_id.get_or_init(|| org.id).clone())
    }

    fn find_bucket(&self, name: &str, org_id: &str) -> StoreResult<Option<String>> {
        let url = endpoint(
            &self.url,
            "api/v2/buckets",
            &[("name", name), ("orgID", org_id)],
        )?;
        let response = self
            .authorized(self.client.get(url))
            .send()
            .map_err(|e| transport_error(e, "bucket lookup"))?;
        // A missing bucket is reported as 404 by some server versions.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = read_body(response, "bucket lookup")?;
        let buckets: Buckets = serde_json::from_str(&body)
            .map_err(|e| StoreError::Protocol(format!("invalid bucket list: {e}")))?;
        Ok(buckets
            .buckets
            .into_iter()
            .find(|b| b.name == name)
            .map(|b| b.name))
    }
}

impl DestinationStore for InfluxV2Destination {
    fn ensure_bucket(&self, name: &str) -> StoreResult<String> {
        let org_id = self.org_id()?;
        if let Some(existing) = self.find_bucket(name, &org_id)? {
            return Ok(existing);
        }

        info!(bucket = name, "creating destination bucket");
        let url = endpoint(&self.url, "api/v2/buckets", &[])?;
        let response = self
            .authorized(self.client.post(url))
            .json(&json!({ "orgID": org_id, "name": name, "retentionRules": [] }))
            .send()
            .map_err(|e| transport_error(e, "bucket creation"))?;
        let body = read_body(response, "bucket creation")?;
        let created: Bucket = serde_json::from_str(&body)
            .map_err(|e| StoreError::Protocol(format!("invalid bucket response: {e}")))?;
        Ok(created.name)
    }

    fn last_timestamp(&self, bucket: &str) -> StoreResult<Option<DateTime<Utc>>> {
        let flux = last_time_query(bucket, self.lookback_days);
        debug!(%flux, "destination last timestamp query");
        let url = endpoint(&self.url, "api/v2/query", &[("org", self.org.as_str())])?;
        let response = self
            .authorized(self.client.post(url))
            .header(ACCEPT, "application/csv")
            .json(&json!({
                "query": flux,
                "type": "flux",
                "dialect": { "header": true, "annotations": [] }
            }))
            .send()
            .map_err(|e| transport_error(e, "last timestamp query"))?;
        let body = read_body(response, "last timestamp query")?;
        max_time_from_csv(&body)
    }

    fn write_points(&self, bucket: &str, points: &[DataPoint]) -> StoreResult<()> {
        let body = encode_batch(points).map_err(|e| StoreError::Rejected(format!("{e:#}")))?;
        let url = endpoint(
            &self.url,
            "api/v2/write",
            &[
                ("org", self.org.as_str()),
                ("bucket", bucket),
                ("precision", "ns"),
            ],
        )?;
        let response = self
            .authorized(self.client.post(url))
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body)
            .send()
            .map_err(|e| transport_error(e, "write"))?;
        read_body(response, "write")?;
        Ok(())
    }
}

fn last_time_query(bucket: &str, lookback_days: u32) -> String {
    let bucket = bucket.replace('\\', "\\\\").replace('"', "\\\"");
    format!(
        "from(bucket: \"{bucket}\") |> range(start: -{lookback_days}d) |> last() \
         |> keep(columns: [\"_time\"]) |> group() |> max(column: \"_time\")"
    )
}

/// Pick the latest `_time` out of an annotated-CSV query response.
fn max_time_from_csv(body: &str) -> StoreResult<Option<DateTime<Utc>>> {
    let mut time_column: Option<usize> = None;
    let mut latest: Option<DateTime<Utc>> = None;

    for line in body.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            time_column = None;
            continue;
        }
        let cells: Vec<&str> = line.split(',').collect();
        if let Some(idx) = cells.iter().position(|c| *c == "_time") {
            time_column = Some(idx);
            continue;
        }
        let Some(idx) = time_column else {
            continue;
        };
        let Some(cell) = cells.get(idx) else {
            continue;
        };
        let parsed = DateTime::parse_from_rfc3339(cell)
            .map_err(|e| StoreError::Protocol(format!("invalid _time '{cell}': {e}")))?
            .with_timezone(&Utc);
        latest = Some(latest.map_or(parsed, |l| l.max(parsed)));
    }

    Ok(latest)
}
