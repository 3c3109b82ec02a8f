//! Traffic topology distribution and metrics forwarding
//!
//! Every tick the collector resolves the topology from the cache, pushes the
//! target list and IP map to each collector sidecar, then scrapes each sidecar
//! and forwards the converted batch upstream.

pub mod prom;
pub mod remote_write;
pub mod sidecar;
pub mod topology;

pub use sidecar::SidecarClient;
pub use topology::{Topology, TopologyResolver};

use crate::client::UpstreamClient;
use crate::collector::ticker;
use crate::k8s::types::PodInfo;
use crate::metrics::AgentMetrics;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct TrafficCollector {
    resolver: TopologyResolver,
    sidecars: SidecarClient,
    client: Arc<dyn UpstreamClient>,
    metrics: AgentMetrics,
    interval: Duration,
}

impl TrafficCollector {
    pub fn new(
        resolver: TopologyResolver,
        sidecars: SidecarClient,
        client: Arc<dyn UpstreamClient>,
        metrics: AgentMetrics,
        interval: Duration,
    ) -> Self {
        Self {
            resolver,
            sidecars,
            client,
            metrics,
            interval,
        }
    }

    /// Resolve the topology and push it to every collector. The whole
    /// topology is resolved before the first push.
    pub async fn distribute(&self, cancel: &CancellationToken) -> Topology {
        let topology = self.resolver.resolve();
        debug!(
            "Resolved {} pod IPs, {} service IPs, {} targets",
            topology.ip_map.pod_ips.len(),
            topology.ip_map.service_ips.len(),
            topology.targets.len()
        );

        if topology.collectors.is_empty() {
            warn!("No traffic collector pods found, skipping distribution");
            return topology;
        }

        for collector in &topology.collectors {
            if cancel.is_cancelled() {
                break;
            }
            let Some(ip) = collector.pod_ip.as_deref() else {
                debug!("Collector {}/{} has no pod IP yet", collector.namespace, collector.name);
                continue;
            };

            if let Err(e) = self.sidecars.set_targets(ip, &topology.targets).await {
                error!("Failed to set targets on {}: {}", collector.name, e);
                self.metrics.record_sidecar_failure("set_targets");
            }
            if let Err(e) = self.sidecars.set_service_ips(ip, &topology.ip_map).await {
                error!("Failed to push IP map to {}: {}", collector.name, e);
                self.metrics.record_sidecar_failure("set_service_ips");
            }
        }
        topology
    }

    /// Scrape every collector and forward its batch upstream.
    pub async fn collect_metrics(&self, collectors: &[PodInfo], cancel: &CancellationToken) {
        for collector in collectors {
            if cancel.is_cancelled() {
                break;
            }
            let Some(ip) = collector.pod_ip.as_deref() else {
                continue;
            };

            let request = match self.sidecars.scrape(ip).await {
                Ok(request) => request,
                Err(e) => {
                    error!("Failed to scrape {}: {}", collector.name, e);
                    self.metrics.record_sidecar_failure("scrape");
                    continue;
                }
            };

            debug!("Forwarding {} series from {}", request.timeseries.len(), collector.name);
            if let Err(e) = self.client.send_metrics(&request).await {
                error!("Failed to send traffic metrics from {}: {}", collector.name, e);
            }
        }
    }

    pub async fn run_cycle(&self, cancel: &CancellationToken) {
        let topology = self.distribute(cancel).await;
        self.collect_metrics(&topology.collectors, cancel).await;
    }

    /// Distribute once immediately, then distribute and collect every interval.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!("Collecting traffic metrics every {:?}", self.interval);
        self.distribute(&cancel).await;

        let mut interval = ticker(self.interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => self.run_cycle(&cancel).await,
            }
        }
        debug!("Traffic collection loop stopped");
    }
}
