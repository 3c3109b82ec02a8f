use kubetrail_common::ResourceObject;
use serde::{Deserialize, Serialize};

pub const POD_RUNNING: &str = "Running";

/// The handful of pod fields traffic topology needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodInfo {
    pub name: String,
    pub namespace: String,
    pub pod_ip: Option<String>,
    pub host_ip: Option<String>,
    pub phase: String,
}

impl PodInfo {
    pub fn from_object(pod: &ResourceObject) -> Self {
        let non_empty = |path: &[&str]| {
            pod.nested_str(path)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Self {
            name: pod.name().to_string(),
            namespace: pod.namespace().to_string(),
            pod_ip: non_empty(&["status", "podIP"]),
            host_ip: non_empty(&["status", "hostIP"]),
            phase: pod
                .nested_str(&["status", "phase"])
                .unwrap_or("Unknown")
                .to_string(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase == POD_RUNNING
    }

    /// Host-networked pods share the node's address.
    pub fn is_host_network(&self) -> bool {
        self.pod_ip.is_some() && self.pod_ip == self.host_ip
    }

    /// Pod IP usable for workload attribution: present and not the node's.
    pub fn workload_ip(&self) -> Option<&str> {
        if self.is_host_network() {
            None
        } else {
            self.pod_ip.as_deref()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pod(status: serde_json::Value) -> ResourceObject {
        ResourceObject::try_from(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "web-1", "namespace": "shop"},
            "status": status
        }))
        .unwrap()
    }

    #[test]
    fn test_from_object() {
        let info = PodInfo::from_object(&pod(json!({
            "phase": "Running",
            "podIP": "10.1.0.7",
            "hostIP": "192.168.0.2"
        })));
        assert_eq!(info.name, "web-1");
        assert_eq!(info.namespace, "shop");
        assert!(info.is_running());
        assert_eq!(info.workload_ip(), Some("10.1.0.7"));
    }

    #[test]
    fn test_host_network_pod_has_no_workload_ip() {
        let info = PodInfo::from_object(&pod(json!({
            "phase": "Running",
            "podIP": "192.168.0.2",
            "hostIP": "192.168.0.2"
        })));
        assert!(info.is_host_network());
        assert_eq!(info.workload_ip(), None);
    }

    #[test]
    fn test_missing_status_defaults() {
        let info = PodInfo::from_object(&pod(json!({"podIP": ""})));
        assert_eq!(info.phase, "Unknown");
        assert!(!info.is_running());
        assert_eq!(info.pod_ip, None);
        assert_eq!(info.workload_ip(), None);
    }
}
