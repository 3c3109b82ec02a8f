use crate::object::ResourceObject;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "object_add")]
    Add,
    #[serde(rename = "object_update")]
    Update,
    #[serde(rename = "object_delete")]
    Delete,
    /// Change observed outside the cluster object graph.
    #[serde(rename = "external_update")]
    ExternalUpdate,
}

impl EventType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            EventType::Add => "object_add",
            EventType::Update => "object_update",
            EventType::Delete => "object_delete",
            EventType::ExternalUpdate => "external_update",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One reportable mutation of a cluster object.
///
/// Add carries only `new_object`, Delete only `old_object`, Update both.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent {
    pub old_object: Option<ResourceObject>,
    pub new_object: Option<ResourceObject>,
    pub event_type: EventType,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub time: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn added(object: ResourceObject, time: DateTime<Utc>) -> Self {
        Self {
            old_object: None,
            new_object: Some(object),
            event_type: EventType::Add,
            time,
        }
    }

    pub fn updated(old: ResourceObject, new: ResourceObject, time: DateTime<Utc>) -> Self {
        Self {
            old_object: Some(old),
            new_object: Some(new),
            event_type: EventType::Update,
            time,
        }
    }

    pub fn deleted(object: ResourceObject, time: DateTime<Utc>) -> Self {
        Self {
            old_object: Some(object),
            new_object: None,
            event_type: EventType::Delete,
            time,
        }
    }

    /// A change observed outside the cluster, carrying both revisions.
    pub fn external(old: ResourceObject, new: ResourceObject, time: DateTime<Utc>) -> Self {
        Self {
            old_object: Some(old),
            new_object: Some(new),
            event_type: EventType::ExternalUpdate,
            time,
        }
    }

    /// The most recent revision the event carries.
    pub fn object(&self) -> Option<&ResourceObject> {
        self.new_object.as_ref().or(self.old_object.as_ref())
    }
}

/// Full listing of one resource kind at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceSnapshot {
    pub objects: Vec<ResourceObject>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub time: DateTime<Utc>,
}

impl ResourceSnapshot {
    /// Objects are ordered by namespace, then name.
    pub fn new(mut objects: Vec<ResourceObject>, time: DateTime<Utc>) -> Self {
        objects.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        Self { objects, time }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn pod(namespace: &str, name: &str) -> ResourceObject {
        ResourceObject::try_from(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": name, "namespace": namespace}
        }))
        .unwrap()
    }

    #[test]
    fn test_event_shapes() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let add = ChangeEvent::added(pod("a", "x"), t);
        assert!(add.old_object.is_none());
        assert_eq!(add.event_type, EventType::Add);

        let delete = ChangeEvent::deleted(pod("a", "x"), t);
        assert!(delete.new_object.is_none());
        assert_eq!(delete.object().map(|o| o.name()), Some("x"));

        let external = ChangeEvent::external(pod("a", "x"), pod("a", "y"), t);
        assert_eq!(external.event_type, EventType::ExternalUpdate);
        assert_eq!(external.object().map(|o| o.name()), Some("y"));
        assert_eq!(
            serde_json::to_value(&external).unwrap()["event_type"],
            "external_update"
        );
    }

    #[test]
    fn test_event_serialization() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let value = serde_json::to_value(ChangeEvent::added(pod("a", "x"), t)).unwrap();

        assert_eq!(value["event_type"], "object_add");
        assert_eq!(value["time"], 1_704_067_200);
        assert!(value["old_object"].is_null());
        assert_eq!(value["new_object"]["kind"], "Pod");
    }

    #[test]
    fn test_snapshot_orders_objects() {
        let snapshot = ResourceSnapshot::new(
            vec![pod("b", "a"), pod("a", "z"), pod("a", "b")],
            Utc::now(),
        );
        let keys: Vec<_> = snapshot
            .objects
            .iter()
            .map(|o| format!("{}/{}", o.namespace(), o.name()))
            .collect();
        assert_eq!(keys, vec!["a/b", "a/z", "b/a"]);
    }
}
