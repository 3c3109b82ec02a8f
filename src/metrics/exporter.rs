use crate::metrics::collector::AgentMetrics;
use crate::Result;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const TEXT_FORMAT: &str = "text/plain; version=0.0.4";

pub struct PrometheusExporter {
    metrics: AgentMetrics,
    address: SocketAddr,
}

impl PrometheusExporter {
    pub fn new(metrics: AgentMetrics, address: SocketAddr) -> Self {
        Self { metrics, address }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/metrics", get(render_metrics))
            .route("/healthz", get(healthz))
            .with_state(self.metrics.clone())
    }

    /// Bind the configured address and serve until cancelled.
    pub async fn serve(self, cancel: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(self.address).await?;
        self.serve_on(listener, cancel).await
    }

    pub async fn serve_on(self, listener: TcpListener, cancel: CancellationToken) -> Result<()> {
        info!("Serving metrics on {}", listener.local_addr()?);
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await?;
        Ok(())
    }
}

async fn render_metrics(State(metrics): State<AgentMetrics>) -> Response {
    match metrics.render() {
        Ok(body) => ([(header::CONTENT_TYPE, TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            error!("Failed to render metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}
