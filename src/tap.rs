use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use regex::Regex;
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use tracing::{debug, info, warn};

use crate::config::TapConfig;
use crate::error::PipelineError;
use crate::model::HttpMeta;

#[cfg(test)]
pub(crate) mod test_server;

pub const KNOWN_DISCOVERY_METHODS: &[&str] = &[
    "Transit",
    "Radial Velocity",
    "Imaging",
    "Microlensing",
    "Eclipse Timing Variations",
    "Transit Timing Variations",
    "Astrometry",
    "Pulsar Timing",
    "Pulsation Timing Variations",
    "Orbital Brightness Modulation",
    "Disk Kinematics",
];

const USER_AGENT: &str = concat!("exoplanet-report/", env!("CARGO_PKG_VERSION"), " (reqwest)");

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_backoff_ms: u64,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 500,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TapFetch {
    pub csv_bytes: Vec<u8>,
    pub adql: String,
    pub url: String,
    pub http: HttpMeta,
}

pub fn identifier_regex() -> Result<Regex> {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").context("failed to compile identifier regex")
}

// Only the method filter is applied. Metric nulls are left to the analysis.
pub fn build_adql(table: &str, columns: &[String], discovery_methods: &[String]) -> Result<String> {
    let mut unknown: Vec<&str> = discovery_methods
        .iter()
        .map(String::as_str)
        .filter(|method| !KNOWN_DISCOVERY_METHODS.contains(method))
        .collect();
    unknown.sort_unstable();
    unknown.dedup();
    if !unknown.is_empty() {
        let quoted: Vec<String> = unknown.iter().map(|method| format!("'{method}'")).collect();
        return Err(PipelineError::validation(format!(
            "unknown discovery method(s): {}",
            quoted.join(", ")
        ))
        .into());
    }

    let identifier = identifier_regex()?;
    if !identifier.is_match(table) {
        return Err(PipelineError::validation(format!("invalid TAP table name: {table:?}")).into());
    }
    if let Some(column) = columns.iter().find(|column| !identifier.is_match(column)) {
        return Err(PipelineError::validation(format!("invalid column name: {column:?}")).into());
    }
    if columns.is_empty() {
        return Err(PipelineError::validation("no columns selected for TAP query").into());
    }

    let methods: Vec<String> = discovery_methods.iter().map(|method| format!("'{method}'")).collect();
    Ok(format!(
        "select {} from {} where discoverymethod in ({})",
        columns.join(", "),
        table,
        methods.join(", ")
    ))
}

pub fn sync_url(endpoint: &str) -> String {
    format!("{}/sync", endpoint.trim_end_matches('/'))
}

fn is_retryable(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    )
}

fn wants_post_fallback(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_REQUEST | StatusCode::URI_TOO_LONG | StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE
    )
}

// Transport errors and 502/503/504 are retried. A GET rejected with
// 400/414/431 is re-sent once as a form-encoded POST.
pub fn fetch_tap_csv(
    tap: &TapConfig,
    columns: &[String],
    discovery_methods: &[String],
    retry: &RetryPolicy,
) -> Result<TapFetch> {
    let adql = build_adql(&tap.table, columns, discovery_methods)?;
    let url = sync_url(&tap.endpoint);
    let params = [("query", adql.as_str()), ("format", tap.fmt.as_str())];

    let client = Client::builder()
        .timeout(retry.timeout)
        .user_agent(USER_AGENT)
        .build()
        .context("failed to build HTTP client")?;

    let mut last_error = anyhow!("no TAP attempt made");
    for attempt in 1..=retry.max_attempts {
        match send_once(&client, &url, &params) {
            Ok(response) if response.status().is_success() => {
                let fetch = read_response(response, adql.clone())?;
                info!(
                    url = %fetch.url,
                    attempt,
                    bytes = fetch.csv_bytes.len(),
                    "fetched TAP csv"
                );
                return Ok(fetch);
            }
            Ok(response) => {
                let status = response.status();
                last_error = anyhow!("TAP request failed with status {status}");
                if !is_retryable(status) {
                    break;
                }
                warn!(attempt, %status, "transient TAP status");
            }
            Err(err) => {
                warn!(attempt, error = %err, "TAP transport error");
                last_error = err.into();
            }
        }

        if attempt < retry.max_attempts {
            thread::sleep(Duration::from_millis(
                retry.base_backoff_ms.saturating_mul(attempt as u64),
            ));
        }
    }

    Err(last_error.context(format!(
        "TAP fetch failed after {} attempts",
        retry.max_attempts
    )))
}

fn send_once(client: &Client, url: &str, params: &[(&str, &str)]) -> reqwest::Result<Response> {
    let response = client.get(url).query(params).send()?;
    if wants_post_fallback(response.status()) {
        debug!(status = %response.status(), "GET rejected; retrying as POST");
        return client.post(url).form(params).send();
    }
    Ok(response)
}

fn read_response(response: Response, adql: String) -> Result<TapFetch> {
    let status = response.status();
    let url = response.url().to_string();
    let headers = response.headers().clone();
    let csv_bytes = response
        .bytes()
        .context("failed to read TAP response body")?
        .to_vec();
    if csv_bytes.is_empty() {
        bail!("TAP response body was empty");
    }

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let content_length_bytes = headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok());

    Ok(TapFetch {
        http: HttpMeta {
            status: Some(status.as_u16()),
            content_type,
            response_bytes: Some(csv_bytes.len()),
            content_length_bytes,
        },
        csv_bytes,
        adql,
        url,
    })
}
