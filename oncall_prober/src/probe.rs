use oncall_core::{sleep_or_cancel, CancellationToken, OncallError, Result};
use oncall_metrics::ProbeMetrics;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const HEALTHCHECK_PATH: &str = "/healthcheck";
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The health check answered 200.
    Healthy,
    /// The health check answered with any other status.
    Unhealthy { status: u16 },
}

pub struct Prober {
    client: reqwest::Client,
    healthcheck_url: String,
    metrics: Arc<ProbeMetrics>,
}

impl Prober {
    pub fn new(base_url: &str, metrics: Arc<ProbeMetrics>) -> Result<Self> {
        Self::with_timeout(base_url, PROBE_TIMEOUT, metrics)
    }

    pub fn with_timeout(
        base_url: &str,
        timeout: Duration,
        metrics: Arc<ProbeMetrics>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OncallError::InvalidConfig(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            healthcheck_url: format!("{}{}", base_url.trim_end_matches('/'), HEALTHCHECK_PATH),
            metrics,
        })
    }

    pub fn healthcheck_url(&self) -> &str {
        &self.healthcheck_url
    }

    /// Sends one health check request. Does not touch the metrics.
    pub async fn check(&self) -> Result<ProbeOutcome> {
        let response = self
            .client
            .get(&self.healthcheck_url)
            .send()
            .await
            .map_err(|e| OncallError::Probe(format!("GET {}: {}", self.healthcheck_url, e)))?;

        let status = response.status().as_u16();
        if status == 200 {
            Ok(ProbeOutcome::Healthy)
        } else {
            Ok(ProbeOutcome::Unhealthy { status })
        }
    }

    /// One probe attempt: counts it, checks the service and updates the
    /// success counter and health gauge from the outcome.
    pub async fn tick(&self) -> Result<ProbeOutcome> {
        self.metrics.record_attempt();

        let outcome = self.check().await;
        match outcome {
            Ok(ProbeOutcome::Healthy) => self.metrics.record_success(),
            Ok(ProbeOutcome::Unhealthy { .. }) | Err(_) => self.metrics.record_failure(),
        }
        outcome
    }

    /// Probes every `interval` until `shutdown` is cancelled. Probe failures
    /// are logged and never end the loop.
    pub async fn run(&self, interval: Duration, shutdown: CancellationToken) -> Result<()> {
        info!(
            "Probing {} every {:?}",
            self.healthcheck_url, interval
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            match self.tick().await {
                Ok(ProbeOutcome::Healthy) => debug!("Probe succeeded"),
                Ok(ProbeOutcome::Unhealthy { status }) => {
                    warn!("Probe returned status {}", status)
                }
                Err(e) if e.is_transient() => error!("{}", e),
                Err(e) => return Err(e),
            }

            if !sleep_or_cancel(&shutdown, interval).await {
                break;
            }
        }

        info!("Probe loop stopped");
        Ok(())
    }
}
