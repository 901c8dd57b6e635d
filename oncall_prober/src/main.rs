mod config;
mod probe;

use clap::Parser;
use config::ProberConfig;
use oncall_core::CancellationToken;
use oncall_metrics::{MetricsExporter, ProbeMetrics};
use probe::Prober;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = ProberConfig::parse();

    oncall_core::logging::init(config.log_level, config.log_format)?;

    let metrics = Arc::new(ProbeMetrics::with_process_metrics()?);
    let shutdown = oncall_core::shutdown_token();

    // The endpoint must be up before the first probe.
    let exporter = MetricsExporter::bind(config.metrics_port, metrics.clone()).await?;
    let server = exporter.spawn(shutdown.clone());

    let prober = Prober::new(&config.api_url, metrics)?;
    info!(
        "Starting prober on {}, metrics on port {}",
        prober.healthcheck_url(),
        config.metrics_port
    );

    supervise(
        prober.run(config.scrape_interval, shutdown.clone()),
        server,
        shutdown,
    )
    .await?;

    info!("Prober stopped");
    Ok(())
}

/// Drives the probe loop next to the exporter task. The exporter only
/// finishes early when it fails, and then probing stops too.
async fn supervise<F>(
    probing: F,
    mut server: JoinHandle<oncall_core::Result<()>>,
    shutdown: CancellationToken,
) -> anyhow::Result<()>
where
    F: Future<Output = oncall_core::Result<()>>,
{
    tokio::pin!(probing);

    tokio::select! {
        result = &mut probing => {
            shutdown.cancel();
            server.await??;
            result?;
        }
        joined = &mut server => {
            let requested = shutdown.is_cancelled();
            shutdown.cancel();

            if let Err(e) = joined? {
                error!("Metrics exporter failed: {}", e);
                return Err(e.into());
            }
            if !requested {
                anyhow::bail!("Metrics exporter stopped unexpectedly");
            }
            probing.await?;
        }
    }

    Ok(())
}
