//! In-memory doubles shared by unit tests

use crate::client::UpstreamClient;
use crate::k8s::cache::{ObjectCache, ResourceEventHandler};
use crate::k8s::store::Store;
use crate::{KubetrailError, Result};
use async_trait::async_trait;
use kubetrail_common::{ChangeEvent, Gvr, LabelSelector, ResourceObject, ResourceSnapshot, WriteRequest};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Object cache over fixed contents. Listing a failing type returns an error.
#[derive(Default)]
pub struct StaticCache {
    stores: HashMap<Gvr, Store>,
    failing: HashSet<Gvr>,
    served: Option<HashSet<Gvr>>,
    handlers: Mutex<Vec<Gvr>>,
    subscribed: Mutex<Vec<Gvr>>,
}

impl StaticCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, gvr: Gvr, objects: Vec<Value>) -> Self {
        let store = self.stores.entry(gvr).or_default();
        for object in objects {
            store.apply(object);
        }
        self
    }

    pub fn failing(mut self, gvr: Gvr) -> Self {
        self.failing.insert(gvr);
        self
    }

    /// Restrict the served set; by default every type is served.
    pub fn serving(mut self, gvrs: Vec<Gvr>) -> Self {
        self.served = Some(gvrs.into_iter().collect());
        self
    }

    pub fn handler_gvrs(&self) -> Vec<Gvr> {
        self.handlers.lock().unwrap().clone()
    }

    pub fn subscribed(&self) -> Vec<Gvr> {
        self.subscribed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectCache for StaticCache {
    fn is_served(&self, gvr: &Gvr) -> bool {
        self.served.as_ref().map_or(true, |served| served.contains(gvr))
    }

    fn subscribe(&self, gvr: &Gvr) -> Result<()> {
        if !self.is_served(gvr) {
            return Err(KubetrailError::UnknownResource(gvr.clone()));
        }
        self.subscribed.lock().unwrap().push(gvr.clone());
        Ok(())
    }

    fn add_handler(&self, gvr: &Gvr, _handler: Arc<dyn ResourceEventHandler>) -> Result<()> {
        if !self.is_served(gvr) {
            return Err(KubetrailError::UnknownResource(gvr.clone()));
        }
        self.handlers.lock().unwrap().push(gvr.clone());
        Ok(())
    }

    fn start(&self, _cancel: CancellationToken) -> Result<()> {
        Ok(())
    }

    async fn wait_for_initial_sync(&self) {}

    fn list(
        &self,
        gvr: &Gvr,
        selector: &LabelSelector,
        namespace: Option<&str>,
    ) -> Result<Vec<ResourceObject>> {
        if self.failing.contains(gvr) {
            return Err(KubetrailError::NotSubscribed(gvr.clone()));
        }
        Ok(self
            .stores
            .get(gvr)
            .map(|store| store.list(selector, namespace))
            .unwrap_or_default())
    }
}

/// Upstream client that records everything it is asked to send.
#[derive(Default)]
pub struct RecordingClient {
    pub changes: Mutex<Vec<ChangeEvent>>,
    pub snapshots: Mutex<Vec<ResourceSnapshot>>,
    pub metrics: Mutex<Vec<WriteRequest>>,
    pub agent_infos: AtomicUsize,
}

impl RecordingClient {
    pub fn changes(&self) -> Vec<ChangeEvent> {
        self.changes.lock().unwrap().clone()
    }

    pub fn snapshots(&self) -> Vec<ResourceSnapshot> {
        self.snapshots.lock().unwrap().clone()
    }

    pub fn metrics(&self) -> Vec<WriteRequest> {
        self.metrics.lock().unwrap().clone()
    }

    pub fn agent_info_count(&self) -> usize {
        self.agent_infos.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamClient for RecordingClient {
    async fn send_change_event(&self, event: &ChangeEvent) -> Result<()> {
        self.changes.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn send_resource_snapshot(&self, snapshot: &ResourceSnapshot) -> Result<()> {
        self.snapshots.lock().unwrap().push(snapshot.clone());
        Ok(())
    }

    async fn send_metrics(&self, request: &WriteRequest) -> Result<()> {
        self.metrics.lock().unwrap().push(request.clone());
        Ok(())
    }

    async fn send_agent_info(&self) -> Result<()> {
        self.agent_infos.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn label_map(pairs: &[(&str, &str)]) -> Value {
    Value::Object(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect::<Map<String, Value>>(),
    )
}

pub fn pod(
    namespace: &str,
    name: &str,
    labels: &[(&str, &str)],
    phase: &str,
    pod_ip: &str,
    host_ip: &str,
) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "labels": label_map(labels),
            "managedFields": [{"manager": "kubelet", "operation": "Update"}]
        },
        "spec": {"containers": [{"name": "app", "image": "nginx"}]},
        "status": {"phase": phase, "podIP": pod_ip, "hostIP": host_ip}
    })
}

/// Controller object with `spec.selector.matchLabels` and matching template labels.
pub fn workload(
    api_version: &str,
    kind: &str,
    namespace: &str,
    name: &str,
    labels: &[(&str, &str)],
    selector: &[(&str, &str)],
) -> Value {
    json!({
        "apiVersion": api_version,
        "kind": kind,
        "metadata": {"name": name, "namespace": namespace, "labels": label_map(labels)},
        "spec": {
            "selector": {"matchLabels": label_map(selector)},
            "template": {
                "metadata": {"labels": label_map(selector)},
                "spec": {"containers": [{"name": "app", "image": "nginx"}]}
            }
        }
    })
}

pub fn with_owner(mut object: Value, api_version: &str, kind: &str, name: &str) -> Value {
    object["metadata"]["ownerReferences"] = json!([
        {"apiVersion": api_version, "kind": kind, "name": name, "uid": "0000"}
    ]);
    object
}

pub fn service(namespace: &str, name: &str, cluster_ip: &str, selector: &[(&str, &str)]) -> Value {
    let mut spec = json!({"clusterIP": cluster_ip, "ports": [{"port": 80}]});
    if !selector.is_empty() {
        spec["selector"] = label_map(selector);
    }
    json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": {"name": name, "namespace": namespace},
        "spec": spec
    })
}

pub fn object(value: Value) -> ResourceObject {
    ResourceObject::try_from(value).unwrap()
}
