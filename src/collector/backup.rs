//! Periodic full-state snapshots
//!
//! Two loops share one scheduler: Events on the event-collection interval,
//! and the backup set on the slower backup interval.

use super::ticker;
use crate::client::UpstreamClient;
use crate::k8s::cache::ObjectCache;
use crate::k8s::redact::Sanitizer;
use crate::k8s::registry::ResourceRole;
use crate::metrics::AgentMetrics;
use crate::Result;
use chrono::Utc;
use kubetrail_common::{Gvr, LabelSelector, ResourceSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub struct BackupScheduler {
    cache: Arc<dyn ObjectCache>,
    client: Arc<dyn UpstreamClient>,
    metrics: AgentMetrics,
    sanitizer: Sanitizer,
    backup_set: Vec<Gvr>,
    event_interval: Duration,
    backup_interval: Duration,
}

impl BackupScheduler {
    pub fn new(
        cache: Arc<dyn ObjectCache>,
        client: Arc<dyn UpstreamClient>,
        metrics: AgentMetrics,
        sanitizer: Sanitizer,
        backup_set: Vec<Gvr>,
        event_interval: Duration,
        backup_interval: Duration,
    ) -> Self {
        Self {
            cache,
            client,
            metrics,
            sanitizer,
            backup_set,
            event_interval,
            backup_interval,
        }
    }

    /// Snapshot of every cached object of one type; `None` when there are none.
    pub fn snapshot(&self, gvr: &Gvr) -> Result<Option<ResourceSnapshot>> {
        let objects = self.cache.list(gvr, &LabelSelector::everything(), None)?;
        let Some(kind) = objects.first().map(|o| o.kind().to_string()) else {
            return Ok(None);
        };

        let objects = objects
            .into_iter()
            .map(|o| self.sanitizer.sanitize(o))
            .collect();
        let snapshot = ResourceSnapshot::new(objects, Utc::now());
        self.metrics.record_snapshot(&kind);
        Ok(Some(snapshot))
    }

    async fn send(&self, gvr: &Gvr, snapshot: ResourceSnapshot) {
        debug!("Sending snapshot of {} {} objects", snapshot.len(), gvr);
        if let Err(e) = self.client.send_resource_snapshot(&snapshot).await {
            error!("Failed to send {} snapshot: {}", gvr, e);
        }
    }

    /// One event-collection cycle.
    pub async fn collect_events(&self) {
        let gvr = ResourceRole::Event.gvr();
        match self.snapshot(&gvr) {
            Ok(Some(snapshot)) => self.send(&gvr, snapshot).await,
            Ok(None) => debug!("No events to collect"),
            Err(e) => error!("Failed to list events: {}", e),
        }
    }

    /// One backup cycle over the backup set, in order. Returns the number of
    /// snapshots produced. Stops between kinds once cancelled.
    pub async fn backup_collect(&self, cancel: &CancellationToken) -> usize {
        let mut produced = 0;
        for gvr in &self.backup_set {
            if cancel.is_cancelled() {
                break;
            }
            match self.snapshot(gvr) {
                Ok(Some(snapshot)) => {
                    self.send(gvr, snapshot).await;
                    produced += 1;
                }
                Ok(None) => debug!("Nothing to back up for {}", gvr),
                Err(e) => error!("Skipping backup of {}: {}", gvr, e),
            }
        }
        produced
    }

    pub async fn run_event_loop(self: Arc<Self>, cancel: CancellationToken) {
        info!("Collecting events every {:?}", self.event_interval);
        let mut interval = ticker(self.event_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => self.collect_events().await,
            }
        }
        debug!("Event collection loop stopped");
    }

    pub async fn run_backup_loop(self: Arc<Self>, cancel: CancellationToken) {
        info!(
            "Backing up {} resource types every {:?}",
            self.backup_set.len(),
            self.backup_interval
        );
        let mut interval = ticker(self.backup_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let produced = self.backup_collect(&cancel).await;
                    info!("Backup cycle produced {} snapshots", produced);
                }
            }
        }
        debug!("Backup loop stopped");
    }
}
