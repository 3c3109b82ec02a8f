//! Change detection
//!
//! Turns raw cache notifications into reportable [`ChangeEvent`]s. Handlers
//! run inline on the watch task, so the only work done there is deciding,
//! sanitising and a non-blocking hand-off to the forwarding task.

use crate::client::UpstreamClient;
use crate::k8s::cache::ResourceEventHandler;
use crate::k8s::redact::{is_config_map_or_secret, Sanitizer};
use crate::metrics::AgentMetrics;
use chrono::{DateTime, Utc};
use kubetrail_common::value::mapping_changed;
use kubetrail_common::{ChangeEvent, ResourceObject};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Whether an update is worth reporting.
///
/// ConfigMaps and Secrets are reported only when `data` changed. Everything
/// else is reported when the resourceVersion moved or `status` changed.
pub fn is_reportable_update(old: &ResourceObject, new: &ResourceObject) -> bool {
    if is_config_map_or_secret(new) {
        return mapping_changed(old.data(), new.data());
    }
    old.resource_version() != new.resource_version() || mapping_changed(old.status(), new.status())
}

pub struct ChangeDetector {
    sanitizer: Sanitizer,
    metrics: AgentMetrics,
    sender: mpsc::Sender<ChangeEvent>,
}

impl ChangeDetector {
    pub fn new(sanitizer: Sanitizer, metrics: AgentMetrics, sender: mpsc::Sender<ChangeEvent>) -> Self {
        Self {
            sanitizer,
            metrics,
            sender,
        }
    }

    pub fn added(&self, object: ResourceObject, now: DateTime<Utc>) -> ChangeEvent {
        let time = object.creation_timestamp().unwrap_or(now);
        ChangeEvent::added(self.sanitizer.sanitize(object), time)
    }

    pub fn deleted(&self, object: ResourceObject, now: DateTime<Utc>) -> ChangeEvent {
        let time = object.deletion_timestamp().unwrap_or(now);
        ChangeEvent::deleted(self.sanitizer.sanitize(object), time)
    }

    /// `None` when the update is not reportable.
    pub fn updated(
        &self,
        old: ResourceObject,
        new: ResourceObject,
        now: DateTime<Utc>,
    ) -> Option<ChangeEvent> {
        if !is_reportable_update(&old, &new) {
            return None;
        }
        Some(ChangeEvent::updated(
            self.sanitizer.sanitize(old),
            self.sanitizer.sanitize(new),
            now,
        ))
    }

    pub(crate) fn emit(&self, event: ChangeEvent) {
        let kind = event.object().map(|o| o.kind().to_string()).unwrap_or_default();
        self.metrics.record_change_event(event.event_type.as_str(), &kind);

        if let Some(object) = event.object() {
            debug!(
                "{} {} {}/{}",
                event.event_type,
                kind,
                object.namespace(),
                object.name()
            );
        }

        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                warn!("Change queue full, dropping {} for {}", event.event_type, kind);
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Change queue closed, dropping event for {}", kind);
            }
        }
    }
}

fn convert(raw: Value, action: &str) -> Option<ResourceObject> {
    match ResourceObject::try_from(raw) {
        Ok(object) => Some(object),
        Err(e) => {
            error!("Dropping {} notification: {}", action, e);
            None
        }
    }
}

impl ResourceEventHandler for ChangeDetector {
    fn on_add(&self, object: Value) {
        if let Some(object) = convert(object, "add") {
            self.emit(self.added(object, Utc::now()));
        }
    }

    fn on_update(&self, old: Value, new: Value) {
        let (Some(old), Some(new)) = (convert(old, "update"), convert(new, "update")) else {
            return;
        };
        if let Some(event) = self.updated(old, new, Utc::now()) {
            self.emit(event);
        }
    }

    fn on_delete(&self, object: Value) {
        if let Some(object) = convert(object, "delete") {
            self.emit(self.deleted(object, Utc::now()));
        }
    }
}

/// Drain the change queue into the upstream client until cancelled or the
/// queue closes.
pub async fn forward_change_events(
    mut receiver: mpsc::Receiver<ChangeEvent>,
    client: Arc<dyn UpstreamClient>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = receiver.recv() => event,
        };
        let Some(event) = event else {
            break;
        };

        if let Err(e) = client.send_change_event(&event).await {
            error!("Failed to send {} change event: {}", event.event_type, e);
        }
    }
    debug!("Change event forwarder stopped");
}
