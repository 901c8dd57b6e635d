use crate::registry::{REQUESTS_SUCCESS_TOTAL, REQUESTS_TOTAL};
use chrono::{DateTime, Utc};
use tracing::warn;

pub const AVAILABILITY_SLI: &str = "oncall_web_availability_sli";
pub const AVAILABILITY_SLO: f64 = 0.999;

/// Storage format of [`IndicatorRecord::timestamp`].
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Ratio of good to total events.
///
/// No traffic (`total <= 0`) counts as fully available. A ratio outside
/// `[0, 1]` can only come from the two counters being scraped at slightly
/// different moments; it is clamped and logged.
pub fn compute_sli(good: f64, total: f64) -> f64 {
    if total <= 0.0 {
        return 1.0;
    }

    let ratio = good / total;
    if !(0.0..=1.0).contains(&ratio) {
        warn!(
            "SLI out of range (good={}, total={}), clamping {} to [0, 1]",
            good, total, ratio
        );
        return ratio.clamp(0.0, 1.0);
    }
    ratio
}

/// An indicator computed as `good_series / total_series` and checked
/// against `slo`.
#[derive(Debug, Clone, PartialEq)]
pub struct RatioIndicator {
    pub name: String,
    pub slo: f64,
    pub good_series: String,
    pub total_series: String,
}

impl RatioIndicator {
    pub fn new(
        name: impl Into<String>,
        slo: f64,
        good_series: impl Into<String>,
        total_series: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            slo,
            good_series: good_series.into(),
            total_series: total_series.into(),
        }
    }

    /// Web availability as seen by the prober.
    pub fn availability() -> Self {
        Self::new(
            AVAILABILITY_SLI,
            AVAILABILITY_SLO,
            REQUESTS_SUCCESS_TOTAL,
            REQUESTS_TOTAL,
        )
    }

    pub fn evaluate(&self, good: f64, total: f64, timestamp: DateTime<Utc>) -> IndicatorRecord {
        IndicatorRecord::new(&self.name, self.slo, compute_sli(good, total), timestamp)
    }
}

/// One evaluation of an indicator. `is_bad` is derived from `value` and
/// `slo` on construction and cannot drift from them.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorRecord {
    timestamp: DateTime<Utc>,
    name: String,
    slo: f64,
    value: f64,
    is_bad: bool,
}

impl IndicatorRecord {
    pub fn new(name: impl Into<String>, slo: f64, value: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            name: name.into(),
            slo,
            value,
            is_bad: value < slo,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slo(&self) -> f64 {
        self.slo
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn is_bad(&self) -> bool {
        self.is_bad
    }
}
