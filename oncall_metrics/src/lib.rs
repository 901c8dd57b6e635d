pub mod exporter;
pub mod registry;
pub mod slo;
pub mod timeseries;

pub use exporter::MetricsExporter;
pub use registry::{ProbeMetrics, ProbeSnapshot};
pub use slo::{compute_sli, IndicatorRecord, RatioIndicator};
pub use timeseries::{PrometheusClient, TimeSeries};
