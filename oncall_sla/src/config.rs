use crate::store::{mysql::validate_identifier, MySqlSettings};
use clap::Parser;
use oncall_core::{logging::parse_level, parse_interval, LogFormat, OncallError};
use std::time::Duration;
use tracing::level_filters::LevelFilter;

/// SLA recorder settings. Every flag can also come from the environment (or
/// a `.env` file).
#[derive(Parser, Debug, Clone)]
#[command(name = "oncall-sla")]
#[command(about = "Records the on-call web availability SLI against its SLO", long_about = None)]
#[command(version)]
pub struct SlaConfig {
    /// Base URL of the Prometheus HTTP API
    #[arg(long, env = "PROMETHEUS_API_URL", default_value = "http://sage-query.sage.svc:9090", value_parser = parse_base_url)]
    pub prometheus_api_url: String,

    /// Pause between recordings (seconds, or a duration such as `1m`)
    #[arg(long, env = "SCRAPE_INTERVAL", default_value = "60", value_parser = parse_interval)]
    pub scrape_interval: Duration,

    /// Log level (trace, debug, info, warning, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", value_parser = parse_level)]
    pub log_level: LevelFilter,

    /// Log output format (text or json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: LogFormat,

    #[arg(long, env = "MYSQL_HOST", default_value = "mysql")]
    pub mysql_host: String,

    #[arg(long, env = "MYSQL_PORT", default_value_t = 3306)]
    pub mysql_port: u16,

    #[arg(long, env = "MYSQL_USER", default_value = "root")]
    pub mysql_user: String,

    #[arg(long = "mysql-pass", env = "MYSQL_PASS", default_value = "1234", hide_env_values = true, hide_default_value = true)]
    pub mysql_password: String,

    /// Database holding the indicators table; created if missing
    #[arg(long, env = "MYSQL_DB_NAME", default_value = "sla", value_parser = parse_database_name)]
    pub mysql_db_name: String,
}

impl SlaConfig {
    pub fn mysql(&self) -> MySqlSettings {
        MySqlSettings {
            host: self.mysql_host.clone(),
            port: self.mysql_port,
            user: self.mysql_user.clone(),
            password: self.mysql_password.clone(),
            database: self.mysql_db_name.clone(),
        }
    }
}

fn parse_base_url(s: &str) -> Result<String, OncallError> {
    let url = reqwest::Url::parse(s.trim()).map_err(|e| {
        OncallError::InvalidConfig(format!("Invalid Prometheus URL '{}': {}", s, e))
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url.as_str().trim_end_matches('/').to_string()),
        other => Err(OncallError::InvalidConfig(format!(
            "Prometheus URL must be http or https, got '{}'",
            other
        ))),
    }
}

fn parse_database_name(s: &str) -> Result<String, OncallError> {
    validate_identifier(s)?;
    Ok(s.to_string())
}
