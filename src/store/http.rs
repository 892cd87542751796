//! HTTP plumbing shared by the InfluxDB adapters.
//!
//! Transport errors and status codes are folded into [`StoreError`] here so
//! the adapters only deal with the store's own payloads.

use anyhow::{Context, Result};
use reqwest::blocking::{Client, Response};
use reqwest::{StatusCode, Url};
use std::io::Read;
use std::time::Duration;

use super::{StoreError, StoreResult};

pub(crate) const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;

// Query responses for a single window are bounded by the window size, but a
// misconfigured window could still pull an enormous body.
pub(crate) const MAX_RESPONSE_SIZE: u64 = 512 * 1024 * 1024;

/// Create a client with a connect timeout and an overall request timeout.
pub(crate) fn create_http_client(request_timeout: Duration) -> Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
        .timeout(request_timeout)
        .user_agent(concat!("tsmigrate/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to create HTTP client")
}

/// Join `path` onto `base` and append query parameters.
pub(crate) fn endpoint(base: &str, path: &str, params: &[(&str, &str)]) -> StoreResult<Url> {
    let joined = format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'));
    Url::parse_with_params(&joined, params)
        .map_err(|e| StoreError::Protocol(format!("invalid URL {joined}: {e}")))
}

/// Map a transport-level failure.
pub(crate) fn transport_error(error: reqwest::Error, context: &str) -> StoreError {
    if error.is_timeout() {
        StoreError::Timeout(format!("{context}: {error}"))
    } else if error.is_connect() || error.is_request() || error.is_body() {
        StoreError::Unavailable(format!("{context}: {error}"))
    } else {
        StoreError::Protocol(format!("{context}: {error}"))
    }
}

/// Map a non-success status. 5xx and 429 are worth retrying, the rest are not.
pub(crate) fn status_error(status: StatusCode, body: &str, context: &str) -> StoreError {
    let reason = status.canonical_reason().unwrap_or("Unknown error");
    let message = format!(
        "{context}: HTTP {} - {reason} {}",
        status.as_u16(),
        body.trim()
    );
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        StoreError::Unavailable(message)
    } else {
        StoreError::Rejected(message)
    }
}

/// Read the body of a response, enforcing [`MAX_RESPONSE_SIZE`] and turning
/// unsuccessful statuses into errors.
pub(crate) fn read_body(response: Response, context: &str) -> StoreResult<String> {
    let status = response.status();
    if let Some(content_length) = response.content_length() {
        if content_length > MAX_RESPONSE_SIZE {
            return Err(StoreError::Protocol(format!(
                "{context}: Content-Length {content_length} bytes exceeds maximum allowed size of {MAX_RESPONSE_SIZE} bytes"
            )));
        }
    }

    let mut body = String::new();
    response
        .take(MAX_RESPONSE_SIZE + 1)
        .read_to_string(&mut body)
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                StoreError::Timeout(format!("{context}: {e}"))
            } else {
                StoreError::Unavailable(format!("{context}: {e}"))
            }
        })?;
    if body.len() as u64 > MAX_RESPONSE_SIZE {
        return Err(StoreError::Protocol(format!(
            "{context}: response exceeds maximum allowed size of {MAX_RESPONSE_SIZE} bytes"
        )));
    }

    if !status.is_success() {
        return Err(status_error(status, &body, context));
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_and_encodes() {
        let url = endpoint(
            "http://localhost:8086/",
            "/query",
            &[("db", "telemetry"), ("q", "SHOW MEASUREMENTS")],
        )
        .unwrap();
        assert_eq!(url.path(), "/query");
        assert_eq!(
            url.query(),
            Some("db=telemetry&q=SHOW+MEASUREMENTS")
        );
    }

    #[test]
    fn test_endpoint_rejects_garbage() {
        assert!(matches!(
            endpoint("not a url", "query", &[]),
            Err(StoreError::Protocol(_))
        ));
    }

    #[test]
    fn test_status_error_classification() {
        assert!(status_error(StatusCode::SERVICE_UNAVAILABLE, "", "write").is_transient());
        assert!(status_error(StatusCode::TOO_MANY_REQUESTS, "", "write").is_transient());
        assert!(!status_error(StatusCode::BAD_REQUEST, "bad line", "write").is_transient());
        assert!(!status_error(StatusCode::UNAUTHORIZED, "", "write").is_transient());
    }
}
