//! Per-kind object store backing the cache
//!
//! Holds raw object bodies keyed by namespace/name and turns watch
//! notifications and relists into add/update/delete changes.

use dashmap::DashMap;
use kubetrail_common::{LabelSelector, ResourceObject};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    /// Key of a raw object; `None` when it has no `metadata.name`.
    pub fn of(value: &Value) -> Option<Self> {
        let metadata = value.get("metadata")?;
        Some(Self {
            namespace: metadata
                .get("namespace")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            name: metadata.get("name")?.as_str()?.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreChange {
    Added(Value),
    Updated { old: Value, new: Value },
    Deleted(Value),
}

/// Thread-safe store of one resource kind
#[derive(Clone, Default)]
pub struct Store {
    inner: Arc<DashMap<ObjectKey, Value>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an object, reporting whether it was new.
    pub fn apply(&self, value: Value) -> Option<StoreChange> {
        let key = ObjectKey::of(&value)?;
        let change = match self.inner.insert(key, value.clone()) {
            Some(old) => StoreChange::Updated { old, new: value },
            None => StoreChange::Added(value),
        };
        Some(change)
    }

    /// Remove an object. The change carries the final state from the watch event.
    pub fn delete(&self, value: Value) -> Option<StoreChange> {
        let key = ObjectKey::of(&value)?;
        self.inner.remove(&key);
        Some(StoreChange::Deleted(value))
    }

    /// Swap in the result of a full relist.
    ///
    /// Objects present before and after become updates, new ones adds, and
    /// objects missing from the relist deletes. Readers never observe an
    /// empty store in between.
    pub fn replace(&self, fresh: BTreeMap<ObjectKey, Value>) -> Vec<StoreChange> {
        let mut changes = Vec::with_capacity(fresh.len());

        let mut gone: Vec<(ObjectKey, Value)> = self
            .inner
            .iter()
            .filter(|entry| !fresh.contains_key(entry.key()))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        gone.sort_by(|a, b| a.0.cmp(&b.0));

        for (key, value) in fresh {
            match self.inner.insert(key, value.clone()) {
                Some(old) => changes.push(StoreChange::Updated { old, new: value }),
                None => changes.push(StoreChange::Added(value)),
            }
        }

        for (key, value) in gone {
            self.inner.remove(&key);
            changes.push(StoreChange::Deleted(value));
        }

        changes
    }

    /// Objects matching the selector, optionally restricted to one namespace,
    /// ordered by namespace then name.
    pub fn list(&self, selector: &LabelSelector, namespace: Option<&str>) -> Vec<ResourceObject> {
        let mut entries: Vec<(ObjectKey, Value)> = self
            .inner
            .iter()
            .filter(|entry| namespace.map_or(true, |ns| entry.key().namespace == ns))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        entries
            .into_iter()
            .filter_map(|(key, value)| match ResourceObject::try_from(value) {
                Ok(object) => Some(object),
                Err(e) => {
                    debug!("Skipping unreadable cached object {}/{}: {}", key.namespace, key.name, e);
                    None
                }
            })
            .filter(|object| selector.matches(&object.labels()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pod(namespace: &str, name: &str, rv: &str, app: &str) -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": name,
                "namespace": namespace,
                "resourceVersion": rv,
                "labels": {"app": app}
            }
        })
    }

    fn key(namespace: &str, name: &str) -> ObjectKey {
        ObjectKey {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_apply_reports_add_then_update() {
        let store = Store::new();

        let first = store.apply(pod("a", "x", "1", "web")).unwrap();
        assert!(matches!(first, StoreChange::Added(_)));

        let second = store.apply(pod("a", "x", "2", "web")).unwrap();
        match second {
            StoreChange::Updated { old, new } => {
                assert_eq!(old["metadata"]["resourceVersion"], "1");
                assert_eq!(new["metadata"]["resourceVersion"], "2");
            }
            other => panic!("expected update, got {:?}", other),
        }
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_apply_without_name_is_ignored() {
        let store = Store::new();
        assert!(store.apply(json!({"metadata": {}})).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_delete_removes() {
        let store = Store::new();
        store.apply(pod("a", "x", "1", "web"));
        let change = store.delete(pod("a", "x", "2", "web")).unwrap();
        assert!(matches!(change, StoreChange::Deleted(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_replace_diffs_against_current_state() {
        let store = Store::new();
        store.apply(pod("a", "kept", "1", "web"));
        store.apply(pod("a", "gone", "1", "web"));

        let mut fresh = BTreeMap::new();
        fresh.insert(key("a", "kept"), pod("a", "kept", "2", "web"));
        fresh.insert(key("a", "new"), pod("a", "new", "1", "web"));

        let changes = store.replace(fresh);
        assert_eq!(changes.len(), 3);
        assert!(matches!(&changes[0], StoreChange::Updated { .. }));
        assert!(matches!(&changes[1], StoreChange::Added(v) if v["metadata"]["name"] == "new"));
        assert!(matches!(&changes[2], StoreChange::Deleted(v) if v["metadata"]["name"] == "gone"));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_list_filters_namespace_and_selector() {
        let store = Store::new();
        store.apply(pod("b", "y", "1", "web"));
        store.apply(pod("a", "x", "1", "web"));
        store.apply(pod("a", "z", "1", "db"));
        store.apply(json!({"metadata": {"name": "broken", "namespace": "a"}}));

        let all = store.list(&LabelSelector::everything(), None);
        let names: Vec<_> = all.iter().map(|o| o.name()).collect();
        assert_eq!(names, vec!["x", "z", "y"]);

        let web: LabelSelector = "app=web".parse().unwrap();
        let in_a = store.list(&web, Some("a"));
        assert_eq!(in_a.len(), 1);
        assert_eq!(in_a[0].name(), "x");
    }
}
