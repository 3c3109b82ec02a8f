//! Agent wiring
//!
//! Registers change handlers on the cache, waits for the initial sync, then
//! runs every loop as its own task until the shared token is cancelled.

use crate::client::UpstreamClient;
use crate::collector::{
    forward_change_events, run_agent_info_loop, BackupScheduler, ChangeDetector, KafkaCollector,
    TopicLister,
};
use crate::config::AgentConfig;
use crate::k8s::cache::{ObjectCache, ResourceEventHandler};
use crate::k8s::redact::Sanitizer;
use crate::k8s::registry::Registry;
use crate::metrics::AgentMetrics;
use crate::traffic::{SidecarClient, TopologyResolver, TrafficCollector};
use crate::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct Agent {
    config: AgentConfig,
    registry: Registry,
    cache: Arc<dyn ObjectCache>,
    client: Arc<dyn UpstreamClient>,
    metrics: AgentMetrics,
    topic_lister: Option<Arc<dyn TopicLister>>,
}

impl Agent {
    pub fn new(
        config: AgentConfig,
        registry: Registry,
        cache: Arc<dyn ObjectCache>,
        client: Arc<dyn UpstreamClient>,
        metrics: AgentMetrics,
    ) -> Self {
        Self {
            config,
            registry,
            cache,
            client,
            metrics,
            topic_lister: None,
        }
    }

    /// Enable Kafka topic change collection.
    pub fn with_topic_lister(mut self, lister: Arc<dyn TopicLister>) -> Self {
        self.topic_lister = Some(lister);
        self
    }

    /// Attach the handler to every served watched type and subscribe the
    /// cache-only types. Returns the number of watched types registered.
    pub fn register(&self, handler: Arc<dyn ResourceEventHandler>) -> Result<usize> {
        let mut registered = 0;
        for gvr in self.registry.watched() {
            if !self.cache.is_served(gvr) {
                warn!("Resource {} is not served by the cluster, not watching it", gvr);
                continue;
            }
            self.cache.add_handler(gvr, Arc::clone(&handler))?;
            registered += 1;
        }

        for gvr in self.registry.cache_only() {
            self.cache.subscribe(gvr)?;
        }

        info!(
            "Watching {} resource types, caching {} more",
            registered,
            self.registry.cache_only().len()
        );
        Ok(registered)
    }

    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        self.config.validate()?;
        let sanitizer = Sanitizer::new(self.config.redact_env);

        let (sender, receiver) = mpsc::channel(self.config.change_queue_capacity);
        let detector = Arc::new(ChangeDetector::new(sanitizer, self.metrics.clone(), sender));
        self.register(Arc::clone(&detector) as Arc<dyn ResourceEventHandler>)?;

        self.cache.start(cancel.clone())?;
        info!("Waiting for initial cache sync");
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = self.cache.wait_for_initial_sync() => {}
        }
        info!("Initial cache sync complete");

        let mut tasks = JoinSet::new();
        tasks.spawn(forward_change_events(
            receiver,
            Arc::clone(&self.client),
            cancel.clone(),
        ));

        let backup_set = self
            .registry
            .backup()
            .iter()
            .filter(|gvr| self.cache.is_served(gvr))
            .cloned()
            .collect();
        let backup = Arc::new(BackupScheduler::new(
            Arc::clone(&self.cache),
            Arc::clone(&self.client),
            self.metrics.clone(),
            sanitizer,
            backup_set,
            self.config.event_collection_interval(),
            self.config.backup_collection_interval(),
        ));
        tasks.spawn(Arc::clone(&backup).run_event_loop(cancel.clone()));
        tasks.spawn(backup.run_backup_loop(cancel.clone()));

        tasks.spawn(run_agent_info_loop(
            Arc::clone(&self.client),
            self.config.agent_info_interval(),
            cancel.clone(),
        ));

        match self.config.sidecar_selector()? {
            Some(selector) => {
                info!("Traffic collectors selected by {}", selector);
                let resolver = TopologyResolver::new(Arc::clone(&self.cache), selector, sanitizer);
                let sidecars = SidecarClient::new(
                    self.config.traffic_server_port,
                    self.config.traffic_metrics_port,
                )?;
                let traffic = Arc::new(TrafficCollector::new(
                    resolver,
                    sidecars,
                    Arc::clone(&self.client),
                    self.metrics.clone(),
                    self.config.traffic_collection_interval(),
                ));
                tasks.spawn(traffic.run(cancel.clone()));
            }
            None => warn!("No traffic collector selector configured, traffic collection won't run"),
        }

        if let Some(lister) = &self.topic_lister {
            let kafka = KafkaCollector::new(
                Arc::clone(lister),
                detector,
                self.config.kafka_bootstrap_servers.clone(),
                self.config.kafka_polling_interval(),
            );
            tasks.spawn(kafka.run(cancel.clone()));
        }

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!("Agent task failed: {}", e);
            }
        }
        info!("Agent stopped");
        Ok(())
    }
}
