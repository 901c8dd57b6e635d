use async_trait::async_trait;
use oncall_core::{OncallError, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error};

pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Read access to a time-series backend.
#[async_trait]
pub trait TimeSeries: Send + Sync {
    /// Instant value of `series` at unix time `at`. `Ok(None)` means the
    /// backend answered but had no sample.
    async fn query_instant(&self, series: &str, at: i64) -> Result<Option<f64>>;

    /// Fail-soft variant of [`TimeSeries::query_instant`]: any failure or
    /// missing sample is logged and replaced by `default`.
    async fn last_value(&self, series: &str, at: i64, default: f64) -> f64 {
        match self.query_instant(series, at).await {
            Ok(Some(value)) => value,
            Ok(None) => {
                debug!(
                    "No sample for '{}' at {}, using default {}",
                    series, at, default
                );
                default
            }
            Err(e) => {
                error!("Query for '{}' at {} failed: {}", series, at, e);
                default
            }
        }
    }
}

/// Client for the Prometheus HTTP API (`/api/v1/query`).
pub struct PrometheusClient {
    base_url: String,
    client: reqwest::Client,
}

impl PrometheusClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_QUERY_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OncallError::InvalidConfig(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl TimeSeries for PrometheusClient {
    async fn query_instant(&self, series: &str, at: i64) -> Result<Option<f64>> {
        let url = format!("{}/api/v1/query", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("query", series.to_string()), ("time", at.to_string())])
            .send()
            .await
            .map_err(|e| OncallError::Query(format!("GET {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OncallError::Query(format!("GET {} returned {}", url, status)));
        }

        let body = response
            .text()
            .await
            .map_err(|e| OncallError::Query(format!("Reading body of {}: {}", url, e)))?;

        parse_query_response(&body)
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    data: QueryData,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    result: Vec<InstantSample>,
}

#[derive(Debug, Deserialize)]
struct InstantSample {
    /// `[<unix time>, "<value>"]`
    value: (serde_json::Value, serde_json::Value),
}

/// Extracts `data.result[0].value[1]` from an instant query response.
pub fn parse_query_response(body: &str) -> Result<Option<f64>> {
    let response: QueryResponse = serde_json::from_str(body)
        .map_err(|e| OncallError::MalformedResponse(e.to_string()))?;

    let Some(sample) = response.data.result.first() else {
        return Ok(None);
    };

    let value = match &sample.value.1 {
        serde_json::Value::String(s) => s.trim().parse::<f64>().map_err(|e| {
            OncallError::MalformedResponse(format!("Sample value '{}': {}", s, e))
        })?,
        serde_json::Value::Number(n) => n.as_f64().ok_or_else(|| {
            OncallError::MalformedResponse(format!("Sample value {} is not a float", n))
        })?,
        other => {
            return Err(OncallError::MalformedResponse(format!(
                "Unexpected sample value {}",
                other
            )))
        }
    };

    // Counters are finite and non-negative.
    if !value.is_finite() || value < 0.0 {
        return Err(OncallError::MalformedResponse(format!(
            "Sample value {} is not a valid counter reading",
            value
        )));
    }

    Ok(Some(value))
}
