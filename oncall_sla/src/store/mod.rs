pub mod mysql;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use oncall_core::Result;
use oncall_metrics::IndicatorRecord;

pub use mysql::{MySqlIndicatorStore, MySqlSettings};

/// Append-only sink for indicator records.
#[async_trait]
pub trait IndicatorStore: Send + Sync {
    /// Creates whatever the store needs. Safe to call on every startup.
    async fn ensure_schema(&self) -> Result<()>;

    /// Appends one record. Errors are [`oncall_core::OncallError::Persistence`].
    async fn insert(&self, record: &IndicatorRecord) -> Result<()>;
}
