mod config;
mod recorder;
mod store;

use clap::Parser;
use config::SlaConfig;
use oncall_metrics::PrometheusClient;
use recorder::SlaRecorder;
use store::MySqlIndicatorStore;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = SlaConfig::parse();

    oncall_core::logging::init(config.log_level, config.log_format)?;

    let shutdown = oncall_core::shutdown_token();

    // Connection and schema problems stop the process before the loop starts.
    let Some(store) = MySqlIndicatorStore::open(&config.mysql(), &shutdown).await? else {
        info!("SLA recorder stopped before startup completed");
        return Ok(());
    };
    info!("Schema ready in database '{}'", store.database());

    let client = PrometheusClient::new(&config.prometheus_api_url)?;
    info!("Starting SLA recorder against {}", client.base_url());

    let recorder = SlaRecorder::new(client, store);
    let result = recorder.run(config.scrape_interval, shutdown).await;

    if let Err(e) = recorder.into_store().close().await {
        warn!("{}", e);
    }
    result?;

    info!("SLA recorder stopped");
    Ok(())
}
