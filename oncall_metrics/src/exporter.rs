use crate::registry::ProbeMetrics;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use oncall_core::{CancellationToken, OncallError, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Pull endpoint serving the probe metrics at `GET /metrics`.
///
/// Binding happens in [`MetricsExporter::bind`], separately from serving, so
/// a taken port surfaces as a startup error before any probing starts.
pub struct MetricsExporter {
    listener: TcpListener,
    metrics: Arc<ProbeMetrics>,
}

impl MetricsExporter {
    pub async fn bind(port: u16, metrics: Arc<ProbeMetrics>) -> Result<Self> {
        Self::bind_addr(SocketAddr::from(([0, 0, 0, 0], port)), metrics).await
    }

    pub async fn bind_addr(addr: SocketAddr, metrics: Arc<ProbeMetrics>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| OncallError::Bind {
                addr: addr.to_string(),
                source,
            })?;

        Ok(Self { listener, metrics })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves until `shutdown` is cancelled, then drops the listener.
    pub async fn serve(self, shutdown: CancellationToken) -> Result<()> {
        let addr = self.local_addr()?;
        info!("Serving metrics on http://{}/metrics", addr);

        axum::serve(self.listener, router(self.metrics))
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("Metrics endpoint on {} closed", addr);
        Ok(())
    }

    pub fn spawn(self, shutdown: CancellationToken) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(self.serve(shutdown))
    }
}

pub fn router(metrics: Arc<ProbeMetrics>) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(metrics)
}

async fn render_metrics(State(metrics): State<Arc<ProbeMetrics>>) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        ),
        Err(e) => {
            error!("Failed to render metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain")],
                e.to_string(),
            )
        }
    }
}
