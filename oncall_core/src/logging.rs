use crate::error::{OncallError, Result};
use std::str::FromStr;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = OncallError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "plain" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(OncallError::InvalidConfig(format!(
                "Unknown log format '{}', expected 'text' or 'json'",
                other
            ))),
        }
    }
}

/// Parses a log level name. Accepts the usual tracing names plus the
/// `WARNING`/`CRITICAL` spellings and numeric levels (10 debug through
/// 50 critical) operators carry over from other tooling.
pub fn parse_level(s: &str) -> Result<LevelFilter> {
    let level = match s.trim().to_ascii_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" | "10" => LevelFilter::DEBUG,
        "info" | "20" => LevelFilter::INFO,
        "warn" | "warning" | "30" => LevelFilter::WARN,
        "error" | "critical" | "fatal" | "40" | "50" => LevelFilter::ERROR,
        "off" => LevelFilter::OFF,
        other => {
            return Err(OncallError::InvalidConfig(format!(
                "Unknown log level '{}'",
                other
            )))
        }
    };
    Ok(level)
}

/// Installs the global subscriber. `RUST_LOG`, when set, overrides `level`.
pub fn init(level: LevelFilter, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let installed = match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .try_init(),
    };

    installed.map_err(|e| {
        OncallError::InvalidConfig(format!("Failed to install log subscriber: {}", e))
    })
}
