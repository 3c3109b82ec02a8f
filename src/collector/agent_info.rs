use super::ticker;
use crate::client::UpstreamClient;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Heartbeat: report agent info once at start, then every `interval`.
pub async fn run_agent_info_loop(
    client: Arc<dyn UpstreamClient>,
    interval: Duration,
    cancel: CancellationToken,
) {
    info!("Sending agent info every {:?}", interval);
    send(client.as_ref()).await;

    let mut interval = ticker(interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => send(client.as_ref()).await,
        }
    }
    debug!("Agent info loop stopped");
}

async fn send(client: &dyn UpstreamClient) {
    if let Err(e) = client.send_agent_info().await {
        warn!("Failed to send agent info: {}", e);
    }
}
