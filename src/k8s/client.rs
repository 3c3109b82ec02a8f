use crate::{KubetrailError, Result};
use kube::client::ClientBuilder;
use kube::discovery::{ApiResource, Discovery};
use kube::{Client, Config};
use kubetrail_common::Gvr;
use std::collections::HashMap;
use std::time::Duration;
use tower::limit::RateLimitLayer;
use tracing::{debug, info};

pub struct K8sClient {
    client: Client,
}

impl K8sClient {
    /// Connect with the inferred cluster config, throttled to `qps` requests
    /// per second on average with bursts of up to `burst`.
    pub async fn connect(qps: f32, burst: u32) -> Result<Self> {
        debug!("Initializing Kubernetes client (qps={}, burst={})", qps, burst);

        let config = Config::infer().await.map_err(|e| {
            KubetrailError::Discovery(format!("Failed to load K8s config: {}", e))
        })?;
        let client = ClientBuilder::try_from(config)
            .map_err(|e| KubetrailError::Discovery(format!("Failed to create K8s client: {}", e)))?
            .with_layer(&RateLimitLayer::new(u64::from(burst), request_window(qps, burst)))
            .build();

        info!("Successfully connected to Kubernetes cluster");

        Ok(Self { client })
    }

    pub fn client(&self) -> Client {
        self.client.clone()
    }

    /// Enumerate the resource types the API server serves in the given groups.
    ///
    /// Failure here is fatal to the agent: it would otherwise run with a
    /// watch set it cannot verify.
    pub async fn discover(&self, groups: &[&str]) -> Result<HashMap<Gvr, ApiResource>> {
        info!("Discovering server resources for groups {:?}", groups);

        let discovery = Discovery::new(self.client.clone())
            .filter(groups)
            .run()
            .await
            .map_err(|e| KubetrailError::Discovery(e.to_string()))?;

        let mut served = HashMap::new();
        for group in discovery.groups() {
            for version in group.versions() {
                for (resource, _capabilities) in group.versioned_resources(version) {
                    let gvr = Gvr::new(&resource.group, &resource.version, &resource.plural);
                    served.insert(gvr, resource);
                }
            }
        }

        info!("Discovered {} served resource types", served.len());
        Ok(served)
    }
}

/// Window in which `burst` requests may be issued so the sustained rate is `qps`.
fn request_window(qps: f32, burst: u32) -> Duration {
    Duration::from_secs_f64(f64::from(burst) / f64::from(qps))
}
