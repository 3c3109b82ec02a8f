//! Watch loop for one cached resource type
//!
//! Streams watch events from the API server into the informer's store and
//! dispatches the resulting changes. Transient watch errors are retried with
//! backoff inside the stream; the stream is only restarted if it ends.

use super::cache::Informer;
use super::store::ObjectKey;
use crate::Result;
use futures::{Stream, StreamExt};
use kube::api::{Api, DynamicObject};
use kube::core::TypeMeta;
use kube::discovery::ApiResource;
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::Client;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const RESTART_DELAY: Duration = Duration::from_secs(1);

pub struct ResourceWatcher {
    client: Client,
    informer: Arc<Informer>,
}

impl ResourceWatcher {
    pub(crate) fn new(client: Client, informer: Arc<Informer>) -> Self {
        Self { client, informer }
    }

    /// Watch until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        let gvr = self.informer.gvr().clone();
        debug!("Starting watch for {}", gvr);

        loop {
            let api: Api<DynamicObject> =
                Api::all_with(self.client.clone(), self.informer.resource());
            let stream = watcher::watcher(api, watcher::Config::default()).default_backoff();

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = drive(&self.informer, stream) => {}
            }

            warn!("Watch stream for {} ended, restarting...", gvr);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(RESTART_DELAY) => {}
            }
        }

        debug!("Watch for {} stopped", gvr);
    }
}

/// Apply watch events to the informer until the stream ends. Errors are
/// logged and skipped; the stream keeps its own position.
async fn drive<S>(informer: &Informer, stream: S)
where
    S: Stream<Item = std::result::Result<Event<DynamicObject>, watcher::Error>>,
{
    let mut stream = std::pin::pin!(stream);

    // Objects seen since the last Init, swapped into the store on InitDone.
    let mut relist: Option<BTreeMap<ObjectKey, Value>> = None;

    while let Some(item) = stream.next().await {
        match item {
            Ok(event) => handle(informer, event, &mut relist),
            Err(e) => warn!("Watch for {} failed: {}, retrying", informer.gvr(), e),
        }
    }
}

fn handle(informer: &Informer, event: Event<DynamicObject>, relist: &mut Option<BTreeMap<ObjectKey, Value>>) {
    let store = informer.store();
    match event {
        Event::Init => {
            *relist = Some(BTreeMap::new());
        }
        Event::InitApply(object) => {
            let Some(value) = decode(informer, object) else {
                return;
            };
            if let (Some(buffer), Some(key)) = (relist.as_mut(), ObjectKey::of(&value)) {
                buffer.insert(key, value);
            }
        }
        Event::InitDone => {
            let fresh = relist.take().unwrap_or_default();
            for change in store.replace(fresh) {
                informer.dispatch(change);
            }
            informer.mark_synced();
        }
        Event::Apply(object) => {
            if let Some(change) = decode(informer, object).and_then(|v| store.apply(v)) {
                informer.dispatch(change);
            }
        }
        Event::Delete(object) => {
            if let Some(change) = decode(informer, object).and_then(|v| store.delete(v)) {
                informer.dispatch(change);
            }
        }
    }
}

fn decode(informer: &Informer, object: DynamicObject) -> Option<Value> {
    match to_value(informer.resource(), object) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("Dropping undecodable {} object: {}", informer.gvr(), e);
            None
        }
    }
}

/// Serialize a watched object, restoring `apiVersion`/`kind` that list
/// responses leave off individual items.
fn to_value(resource: &ApiResource, mut object: DynamicObject) -> Result<Value> {
    if object.types.is_none() {
        object.types = Some(TypeMeta {
            api_version: resource.api_version.clone(),
            kind: resource.kind.clone(),
        });
    }
    Ok(serde_json::to_value(object)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::ObjectMeta;
    use kubetrail_common::Gvr;

    fn resource() -> ApiResource {
        ApiResource {
            group: "apps".to_string(),
            version: "v1".to_string(),
            api_version: "apps/v1".to_string(),
            kind: "Deployment".to_string(),
            plural: "deployments".to_string(),
        }
    }

    #[test]
    fn test_to_value_fills_missing_type_meta() {
        let object = DynamicObject {
            types: None,
            metadata: ObjectMeta {
                name: Some("web".to_string()),
                namespace: Some("shop".to_string()),
                ..Default::default()
            },
            data: serde_json::json!({"spec": {"replicas": 2}}),
        };

        let value = to_value(&resource(), object).unwrap();
        assert_eq!(value["apiVersion"], "apps/v1");
        assert_eq!(value["kind"], "Deployment");
        assert_eq!(value["metadata"]["name"], "web");
        assert_eq!(value["spec"]["replicas"], 2);
    }

    #[test]
    fn test_to_value_keeps_existing_type_meta() {
        let object = DynamicObject {
            types: Some(TypeMeta {
                api_version: "apps/v1beta2".to_string(),
                kind: "Deployment".to_string(),
            }),
            metadata: ObjectMeta::default(),
            data: serde_json::json!({}),
        };

        let value = to_value(&resource(), object).unwrap();
        assert_eq!(value["apiVersion"], "apps/v1beta2");
    }

    fn deployment(name: &str) -> DynamicObject {
        DynamicObject {
            types: None,
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("shop".to_string()),
                ..Default::default()
            },
            data: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn test_watch_errors_do_not_end_the_stream() {
        let informer = Informer::new(Gvr::new("apps", "v1", "deployments"), resource());
        let synced = informer.subscribe_synced();
        let events = futures::stream::iter(vec![
            Ok(Event::Init),
            Ok(Event::InitApply(deployment("web"))),
            Err(watcher::Error::NoResourceVersion),
            Ok(Event::InitApply(deployment("api"))),
            Ok(Event::InitDone),
            Err(watcher::Error::NoResourceVersion),
            Ok(Event::Apply(deployment("worker"))),
        ]);

        drive(&informer, events).await;

        assert!(*synced.borrow());
        assert_eq!(informer.store().len(), 3);
    }
}
