use oncall_core::{OncallError, Result};
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

pub const REQUESTS_TOTAL: &str = "oncall_web_probe_requests_total";
pub const REQUESTS_SUCCESS_TOTAL: &str = "oncall_web_probe_requests_success_total";
pub const PROBE_HEALTHY: &str = "oncall_web_probe_healthy";

/// Point-in-time copy of the probe metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeSnapshot {
    pub requests_total: u64,
    pub requests_success: u64,
    pub healthy: i64,
}

/// Counters and gauge updated by the probe loop and read by the exporter.
///
/// Each instance owns its own [`Registry`], so nothing lives in process-wide
/// statics. Updates are atomic; readers never see a torn value.
#[derive(Clone)]
pub struct ProbeMetrics {
    registry: Registry,
    requests_total: IntCounter,
    requests_success: IntCounter,
    healthy: IntGauge,
}

impl ProbeMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let requests_total = IntCounter::new(REQUESTS_TOTAL, "Total HTTP requests to /healthcheck")
            .map_err(registration_error)?;
        let requests_success = IntCounter::new(
            REQUESTS_SUCCESS_TOTAL,
            "Successful HTTP requests (status 200)",
        )
        .map_err(registration_error)?;
        let healthy = IntGauge::new(PROBE_HEALTHY, "1 if last probe was successful")
            .map_err(registration_error)?;

        registry
            .register(Box::new(requests_total.clone()))
            .map_err(registration_error)?;
        registry
            .register(Box::new(requests_success.clone()))
            .map_err(registration_error)?;
        registry
            .register(Box::new(healthy.clone()))
            .map_err(registration_error)?;

        Ok(Self {
            registry,
            requests_total,
            requests_success,
            healthy,
        })
    }

    /// Same as [`ProbeMetrics::new`], plus the standard `process_*` series
    /// for the running process where the platform supports them.
    pub fn with_process_metrics() -> Result<Self> {
        let metrics = Self::new()?;

        #[cfg(target_os = "linux")]
        metrics
            .registry
            .register(Box::new(
                prometheus::process_collector::ProcessCollector::for_self(),
            ))
            .map_err(registration_error)?;

        Ok(metrics)
    }

    /// Counts one probe attempt, whatever its outcome.
    pub fn record_attempt(&self) {
        self.requests_total.inc();
    }

    pub fn record_success(&self) {
        self.requests_success.inc();
        self.healthy.set(1);
    }

    pub fn record_failure(&self) {
        self.healthy.set(0);
    }

    pub fn snapshot(&self) -> ProbeSnapshot {
        ProbeSnapshot {
            requests_total: self.requests_total.get(),
            requests_success: self.requests_success.get(),
            healthy: self.healthy.get(),
        }
    }

    /// Renders every registered family in the Prometheus text format.
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&families, &mut buffer)
            .map_err(|e| OncallError::Other(anyhow::anyhow!("Failed to encode metrics: {}", e)))?;

        String::from_utf8(buffer)
            .map_err(|e| OncallError::Other(anyhow::anyhow!("Metrics are not UTF-8: {}", e)))
    }
}

fn registration_error(e: prometheus::Error) -> OncallError {
    OncallError::Other(anyhow::anyhow!("Failed to register probe metric: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_at_zero() {
        let metrics = ProbeMetrics::new().unwrap();
        assert_eq!(
            metrics.snapshot(),
            ProbeSnapshot {
                requests_total: 0,
                requests_success: 0,
                healthy: 0,
            }
        );
    }

    #[test]
    fn test_success_and_failure_updates() {
        let metrics = ProbeMetrics::new().unwrap();

        metrics.record_attempt();
        metrics.record_success();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_total, 1);
        assert_eq!(snapshot.requests_success, 1);
        assert_eq!(snapshot.healthy, 1);

        metrics.record_attempt();
        metrics.record_failure();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_total, 2);
        assert_eq!(snapshot.requests_success, 1);
        assert_eq!(snapshot.healthy, 0);
    }

    #[test]
    fn test_encode_exposes_all_series() {
        let metrics = ProbeMetrics::new().unwrap();
        metrics.record_attempt();
        metrics.record_attempt();
        metrics.record_success();

        let text = metrics.encode().unwrap();
        assert!(text.contains("# TYPE oncall_web_probe_requests_total counter"));
        assert!(text.contains("oncall_web_probe_requests_total 2"));
        assert!(text.contains("# TYPE oncall_web_probe_requests_success_total counter"));
        assert!(text.contains("oncall_web_probe_requests_success_total 1"));
        assert!(text.contains("# TYPE oncall_web_probe_healthy gauge"));
        assert!(text.contains("oncall_web_probe_healthy 1"));
    }

    #[test]
    fn test_instances_do_not_share_state() {
        let first = ProbeMetrics::new().unwrap();
        let second = ProbeMetrics::new().unwrap();
        first.record_attempt();
        assert_eq!(second.snapshot().requests_total, 0);
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let metrics = ProbeMetrics::new().unwrap();
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let metrics = metrics.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        metrics.record_attempt();
                        metrics.record_success();
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_total, 4000);
        assert_eq!(snapshot.requests_success, 4000);
    }
}
