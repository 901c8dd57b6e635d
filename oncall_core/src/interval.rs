use crate::error::{OncallError, Result};
use std::time::Duration;

/// Parses a loop interval. A bare integer is a number of seconds, anything
/// else goes through humantime (`90s`, `2m`, `1m 30s`).
pub fn parse_interval(s: &str) -> Result<Duration> {
    let s = s.trim();
    let interval = match s.parse::<u64>() {
        Ok(secs) => Duration::from_secs(secs),
        Err(_) => humantime::parse_duration(s)
            .map_err(|e| OncallError::InvalidConfig(format!("Invalid interval '{}': {}", s, e)))?,
    };

    if interval.is_zero() {
        return Err(OncallError::InvalidConfig(
            "Interval must be greater than zero".to_string(),
        ));
    }

    Ok(interval)
}
