//! Agent self-metrics
//!
//! Counters are prometheus atomics, so every handler and loop can record
//! without coordination.

use crate::Result;
use prometheus::{IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

#[derive(Clone)]
pub struct AgentMetrics {
    registry: Arc<Registry>,
    /// Change events built, by event type and object kind
    pub change_events: IntCounterVec,
    /// Snapshots built, by object kind
    pub resource_snapshots: IntCounterVec,
    /// Failed sidecar pushes and scrapes, by operation
    pub sidecar_failures: IntCounterVec,
}

impl AgentMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let change_events = IntCounterVec::new(
            Opts::new("change_event_total", "Change events built by the agent"),
            &["event_type", "object_kind"],
        )?;
        registry.register(Box::new(change_events.clone()))?;

        let resource_snapshots = IntCounterVec::new(
            Opts::new("resource_snapshot_total", "Resource snapshots built by the agent"),
            &["object_kind"],
        )?;
        registry.register(Box::new(resource_snapshots.clone()))?;

        let sidecar_failures = IntCounterVec::new(
            Opts::new(
                "sidecar_request_failures_total",
                "Failed requests to traffic collector sidecars",
            ),
            &["operation"],
        )?;
        registry.register(Box::new(sidecar_failures.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            change_events,
            resource_snapshots,
            sidecar_failures,
        })
    }

    pub fn record_change_event(&self, event_type: &str, object_kind: &str) {
        self.change_events
            .with_label_values(&[event_type, object_kind])
            .inc();
    }

    pub fn record_snapshot(&self, object_kind: &str) {
        self.resource_snapshots.with_label_values(&[object_kind]).inc();
    }

    pub fn record_sidecar_failure(&self, operation: &str) {
        self.sidecar_failures.with_label_values(&[operation]).inc();
    }

    pub fn change_event_count(&self, event_type: &str, object_kind: &str) -> u64 {
        self.change_events
            .with_label_values(&[event_type, object_kind])
            .get()
    }

    pub fn snapshot_count(&self, object_kind: &str) -> u64 {
        self.resource_snapshots
            .with_label_values(&[object_kind])
            .get()
    }

    /// Render all metrics in Prometheus text format
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        Ok(encoder.encode_to_string(&self.registry.gather())?)
    }
}
