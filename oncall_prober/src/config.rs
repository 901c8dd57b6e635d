use clap::Parser;
use oncall_core::{logging::parse_level, parse_interval, LogFormat, OncallError};
use std::time::Duration;
use tracing::level_filters::LevelFilter;

/// Prober settings. Every flag can also come from the environment (or a
/// `.env` file).
#[derive(Parser, Debug, Clone)]
#[command(name = "oncall-prober")]
#[command(about = "Probes the on-call web service and exports availability counters", long_about = None)]
#[command(version)]
pub struct ProberConfig {
    /// Base URL of the probed service; `/healthcheck` is appended
    #[arg(long, env = "ONCALL_EXPORTER_API_URL", default_value = "http://oncall:8080", value_parser = parse_base_url)]
    pub api_url: String,

    /// Pause between probes (seconds, or a duration such as `30s`)
    #[arg(long, env = "ONCALL_EXPORTER_SCRAPE_INTERVAL", default_value = "30", value_parser = parse_interval)]
    pub scrape_interval: Duration,

    /// Log level (trace, debug, info, warning, error)
    #[arg(long, env = "ONCALL_EXPORTER_LOG_LEVEL", default_value = "info", value_parser = parse_level)]
    pub log_level: LevelFilter,

    /// Log output format (text or json)
    #[arg(long, env = "ONCALL_EXPORTER_LOG_FORMAT", default_value = "text")]
    pub log_format: LogFormat,

    /// Port of the metrics endpoint
    #[arg(long, env = "ONCALL_EXPORTER_METRICS_PORT", default_value_t = 9081)]
    pub metrics_port: u16,
}

fn parse_base_url(s: &str) -> Result<String, OncallError> {
    let url = reqwest::Url::parse(s.trim())
        .map_err(|e| OncallError::InvalidConfig(format!("Invalid API URL '{}': {}", s, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(url.as_str().trim_end_matches('/').to_string()),
        other => Err(OncallError::InvalidConfig(format!(
            "API URL must be http or https, got '{}'",
            other
        ))),
    }
}
