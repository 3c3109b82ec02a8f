//! Shared object cache
//!
//! One informer per subscribed resource type keeps a local [`Store`] in sync
//! with the API server and fans changes out to registered handlers. All
//! readers (change detection, backups, topology) go through [`ObjectCache`]
//! so they can run against a static cache in tests.

use super::store::{Store, StoreChange};
use super::watcher::ResourceWatcher;
use crate::{KubetrailError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use kube::discovery::ApiResource;
use kube::Client;
use kubetrail_common::{Gvr, LabelSelector, ResourceObject};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Receives add/update/delete notifications for one resource type.
///
/// Called inline on the informer task; implementations must not block.
pub trait ResourceEventHandler: Send + Sync {
    fn on_add(&self, object: Value);
    fn on_update(&self, old: Value, new: Value);
    fn on_delete(&self, object: Value);
}

#[async_trait]
pub trait ObjectCache: Send + Sync {
    /// Whether the cluster serves this resource type at all.
    fn is_served(&self, gvr: &Gvr) -> bool;

    /// Make sure the type is cached, without attaching a handler.
    fn subscribe(&self, gvr: &Gvr) -> Result<()>;

    fn add_handler(&self, gvr: &Gvr, handler: Arc<dyn ResourceEventHandler>) -> Result<()>;

    /// Start one watch per subscribed type. Types subscribed afterwards are not watched.
    fn start(&self, cancel: CancellationToken) -> Result<()>;

    /// Resolves once every subscribed type finished its initial list.
    async fn wait_for_initial_sync(&self);

    fn list(
        &self,
        gvr: &Gvr,
        selector: &LabelSelector,
        namespace: Option<&str>,
    ) -> Result<Vec<ResourceObject>>;
}

pub(crate) struct Informer {
    gvr: Gvr,
    resource: ApiResource,
    store: Store,
    handlers: RwLock<Vec<Arc<dyn ResourceEventHandler>>>,
    synced: watch::Sender<bool>,
}

impl Informer {
    pub(crate) fn new(gvr: Gvr, resource: ApiResource) -> Self {
        let (synced, _) = watch::channel(false);
        Self {
            gvr,
            resource,
            store: Store::new(),
            handlers: RwLock::new(Vec::new()),
            synced,
        }
    }

    pub(crate) fn gvr(&self) -> &Gvr {
        &self.gvr
    }

    pub(crate) fn resource(&self) -> &ApiResource {
        &self.resource
    }

    pub(crate) fn store(&self) -> &Store {
        &self.store
    }

    fn add_handler(&self, handler: Arc<dyn ResourceEventHandler>) {
        if let Ok(mut handlers) = self.handlers.write() {
            handlers.push(handler);
        }
    }

    pub(crate) fn dispatch(&self, change: StoreChange) {
        let handlers = match self.handlers.read() {
            Ok(handlers) => handlers.clone(),
            Err(_) => return,
        };

        for handler in handlers {
            match &change {
                StoreChange::Added(object) => handler.on_add(object.clone()),
                StoreChange::Updated { old, new } => handler.on_update(old.clone(), new.clone()),
                StoreChange::Deleted(object) => handler.on_delete(object.clone()),
            }
        }
    }

    pub(crate) fn mark_synced(&self) {
        if !self.synced.send_replace(true) {
            info!("Initial sync of {} complete ({} objects)", self.gvr, self.store.len());
        }
    }

    pub(crate) fn subscribe_synced(&self) -> watch::Receiver<bool> {
        self.synced.subscribe()
    }
}

/// Object cache backed by API server watches
pub struct KubeCache {
    client: Client,
    served: HashMap<Gvr, ApiResource>,
    informers: DashMap<Gvr, Arc<Informer>>,
    started: AtomicBool,
}

impl KubeCache {
    pub fn new(client: Client, served: HashMap<Gvr, ApiResource>) -> Self {
        Self {
            client,
            served,
            informers: DashMap::new(),
            started: AtomicBool::new(false),
        }
    }

    fn informer(&self, gvr: &Gvr) -> Result<Arc<Informer>> {
        let resource = self
            .served
            .get(gvr)
            .ok_or_else(|| KubetrailError::UnknownResource(gvr.clone()))?;

        let informer = self
            .informers
            .entry(gvr.clone())
            .or_insert_with(|| {
                debug!("Subscribing to {}", gvr);
                Arc::new(Informer::new(gvr.clone(), resource.clone()))
            })
            .clone();
        Ok(informer)
    }
}

#[async_trait]
impl ObjectCache for KubeCache {
    fn is_served(&self, gvr: &Gvr) -> bool {
        self.served.contains_key(gvr)
    }

    fn subscribe(&self, gvr: &Gvr) -> Result<()> {
        self.informer(gvr).map(|_| ())
    }

    fn add_handler(&self, gvr: &Gvr, handler: Arc<dyn ResourceEventHandler>) -> Result<()> {
        self.informer(gvr)?.add_handler(handler);
        Ok(())
    }

    fn start(&self, cancel: CancellationToken) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(KubetrailError::Config(
                "object cache already started".to_string(),
            ));
        }

        info!("Starting {} resource watches", self.informers.len());
        for entry in self.informers.iter() {
            let watcher = ResourceWatcher::new(self.client.clone(), Arc::clone(entry.value()));
            tokio::spawn(watcher.run(cancel.clone()));
        }
        Ok(())
    }

    async fn wait_for_initial_sync(&self) {
        let receivers: Vec<_> = self
            .informers
            .iter()
            .map(|entry| entry.value().subscribe_synced())
            .collect();

        for mut rx in receivers {
            let _ = rx.wait_for(|synced| *synced).await;
        }
    }

    fn list(
        &self,
        gvr: &Gvr,
        selector: &LabelSelector,
        namespace: Option<&str>,
    ) -> Result<Vec<ResourceObject>> {
        let informer = self
            .informers
            .get(gvr)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| KubetrailError::NotSubscribed(gvr.clone()))?;
        Ok(informer.store().list(selector, namespace))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl ResourceEventHandler for Recorder {
        fn on_add(&self, object: Value) {
            self.seen.lock().unwrap().push(format!("add {}", object["metadata"]["name"]));
        }

        fn on_update(&self, _old: Value, new: Value) {
            self.seen.lock().unwrap().push(format!("update {}", new["metadata"]["name"]));
        }

        fn on_delete(&self, object: Value) {
            self.seen.lock().unwrap().push(format!("delete {}", object["metadata"]["name"]));
        }
    }

    fn informer() -> Informer {
        let gvr = Gvr::new("", "v1", "pods");
        let resource = ApiResource {
            group: String::new(),
            version: "v1".to_string(),
            api_version: "v1".to_string(),
            kind: "Pod".to_string(),
            plural: "pods".to_string(),
        };
        Informer::new(gvr, resource)
    }

    #[test]
    fn test_dispatch_reaches_every_handler() {
        let informer = informer();
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        informer.add_handler(first.clone());
        informer.add_handler(second.clone());

        let pod = json!({"metadata": {"name": "a"}});
        informer.dispatch(StoreChange::Added(pod.clone()));
        informer.dispatch(StoreChange::Updated {
            old: pod.clone(),
            new: pod.clone(),
        });
        informer.dispatch(StoreChange::Deleted(pod));

        let expected = vec!["add \"a\"", "update \"a\"", "delete \"a\""];
        assert_eq!(*first.seen.lock().unwrap(), expected);
        assert_eq!(*second.seen.lock().unwrap(), expected);
    }

    #[tokio::test]
    async fn test_synced_flag_releases_waiters() {
        let informer = Arc::new(informer());
        let mut rx = informer.subscribe_synced();
        assert!(!*rx.borrow());

        let waiter = tokio::spawn(async move {
            rx.wait_for(|synced| *synced).await.map(|_| ()).is_ok()
        });
        informer.mark_synced();
        assert!(waiter.await.unwrap());
    }
}
