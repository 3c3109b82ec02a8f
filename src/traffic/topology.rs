//! Traffic topology
//!
//! Each cycle rebuilds, from the cache alone, which workload owns every pod
//! and service IP, and which running pods are traffic targets versus
//! collector sidecars.

use crate::k8s::cache::ObjectCache;
use crate::k8s::redact::Sanitizer;
use crate::k8s::registry::ResourceRole;
use crate::k8s::types::PodInfo;
use crate::Result;
use kubetrail_common::{IpIdentityMap, LabelSelector, ResourceObject, WorkloadIdentity};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// A child controller that should be attributed to its owner instead.
struct OwnershipRule {
    child_kind: &'static str,
    owner_kind: &'static str,
    owner_api_version: &'static str,
}

const OWNERSHIP_RULES: &[OwnershipRule] = &[
    OwnershipRule {
        child_kind: "Job",
        owner_kind: "CronJob",
        owner_api_version: "batch/v1",
    },
    OwnershipRule {
        child_kind: "ReplicaSet",
        owner_kind: "Deployment",
        owner_api_version: "apps/v1",
    },
];

/// Searched in order when attributing a service.
const SERVICE_BACKENDS: [ResourceRole; 3] = [
    ResourceRole::Deployment,
    ResourceRole::StatefulSet,
    ResourceRole::DaemonSet,
];

/// Workloads whose pods get attributed.
const POD_OWNERS: [ResourceRole; 4] = [
    ResourceRole::Deployment,
    ResourceRole::StatefulSet,
    ResourceRole::DaemonSet,
    ResourceRole::Job,
];

/// Identity of a workload, substituting the owner where a rule applies.
pub fn workload_identity(object: &ResourceObject) -> WorkloadIdentity {
    let owner = object.owner_references().into_iter().find(|owner| {
        OWNERSHIP_RULES.iter().any(|rule| {
            rule.child_kind == object.kind()
                && rule.owner_kind == owner.kind
                && rule.owner_api_version == owner.api_version
        })
    });

    match owner {
        Some(owner) => WorkloadIdentity::new(
            &owner.api_version,
            &owner.kind,
            object.namespace(),
            &owner.name,
        ),
        None => WorkloadIdentity::new(
            object.api_version(),
            object.kind(),
            object.namespace(),
            object.name(),
        ),
    }
}

/// Pod selector of a workload: `spec.selector`, else the pod template labels.
/// `None` when neither yields a non-empty selector.
pub fn workload_selector(object: &ResourceObject) -> Result<Option<LabelSelector>> {
    if let Some(raw) = object.nested(&["spec", "selector"]) {
        let selector = LabelSelector::from_label_selector(raw)?;
        if !selector.is_everything() {
            return Ok(Some(selector));
        }
    }
    Ok(object
        .nested(&["spec", "template", "metadata", "labels"])
        .and_then(LabelSelector::from_label_map))
}

#[derive(Debug, Clone, Default)]
pub struct Topology {
    pub ip_map: IpIdentityMap,
    /// Running pods outside the collector selector, ready to push.
    pub targets: Vec<ResourceObject>,
    pub collectors: Vec<PodInfo>,
}

pub struct TopologyResolver {
    cache: Arc<dyn ObjectCache>,
    sidecar_selector: LabelSelector,
    sanitizer: Sanitizer,
}

impl TopologyResolver {
    pub fn new(cache: Arc<dyn ObjectCache>, sidecar_selector: LabelSelector, sanitizer: Sanitizer) -> Self {
        Self {
            cache,
            sidecar_selector,
            sanitizer,
        }
    }

    pub fn resolve(&self) -> Topology {
        let ip_map = IpIdentityMap {
            pod_ips: self.pod_ips(),
            service_ips: self.service_ips(),
        };
        let (targets, collectors) = self.partition();
        Topology {
            ip_map,
            targets,
            collectors,
        }
    }

    /// Cluster IP → identity for services backed by exactly one workload.
    pub fn service_ips(&self) -> BTreeMap<String, WorkloadIdentity> {
        let mut service_ips = BTreeMap::new();
        let services = match self
            .cache
            .list(&ResourceRole::Service.gvr(), &LabelSelector::everything(), None)
        {
            Ok(services) => services,
            Err(e) => {
                warn!("Skipping service attribution: {}", e);
                return service_ips;
            }
        };

        for service in services {
            let Some(selector) = service
                .nested(&["spec", "selector"])
                .and_then(LabelSelector::from_label_map)
            else {
                continue;
            };
            let Some(cluster_ip) = service
                .nested_str(&["spec", "clusterIP"])
                .filter(|ip| !ip.is_empty() && *ip != "None")
            else {
                continue;
            };

            if let Some(identity) = self.service_backend(&service, &selector) {
                service_ips.insert(cluster_ip.to_string(), identity);
            }
        }
        service_ips
    }

    fn service_backend(&self, service: &ResourceObject, selector: &LabelSelector) -> Option<WorkloadIdentity> {
        for role in SERVICE_BACKENDS {
            let workloads = match self.cache.list(&role.gvr(), selector, Some(service.namespace())) {
                Ok(workloads) => workloads,
                Err(e) => {
                    warn!("Skipping {} lookup for service {}: {}", role.kind(), service.name(), e);
                    continue;
                }
            };

            match workloads.as_slice() {
                [] => continue,
                [workload] => return Some(workload_identity(workload)),
                many => {
                    debug!(
                        "Service {}/{} matches {} {}s, not attributing",
                        service.namespace(),
                        service.name(),
                        many.len(),
                        role.kind()
                    );
                    return None;
                }
            }
        }
        None
    }

    /// Pod IP → identity for pods selected by a known workload.
    pub fn pod_ips(&self) -> BTreeMap<String, WorkloadIdentity> {
        let mut pod_ips = BTreeMap::new();
        let pods_gvr = ResourceRole::Pod.gvr();

        for role in POD_OWNERS {
            let workloads = match self
                .cache
                .list(&role.gvr(), &LabelSelector::everything(), None)
            {
                Ok(workloads) => workloads,
                Err(e) => {
                    warn!("Skipping {} pod attribution: {}", role.kind(), e);
                    continue;
                }
            };

            for workload in workloads {
                let selector = match workload_selector(&workload) {
                    Ok(Some(selector)) => selector,
                    Ok(None) => continue,
                    Err(e) => {
                        debug!("Unusable selector on {} {}: {}", role.kind(), workload.name(), e);
                        continue;
                    }
                };

                let pods = match self.cache.list(&pods_gvr, &selector, Some(workload.namespace())) {
                    Ok(pods) => pods,
                    Err(e) => {
                        warn!("Failed to list pods for {} {}: {}", role.kind(), workload.name(), e);
                        continue;
                    }
                };

                let identity = workload_identity(&workload);
                for pod in &pods {
                    if let Some(ip) = PodInfo::from_object(pod).workload_ip() {
                        pod_ips.insert(ip.to_string(), identity.clone());
                    }
                }
            }
        }
        pod_ips
    }

    /// Split running pods into traffic targets and collector sidecars.
    pub fn partition(&self) -> (Vec<ResourceObject>, Vec<PodInfo>) {
        let pods = match self
            .cache
            .list(&ResourceRole::Pod.gvr(), &LabelSelector::everything(), None)
        {
            Ok(pods) => pods,
            Err(e) => {
                warn!("Failed to list pods: {}", e);
                return (Vec::new(), Vec::new());
            }
        };

        let mut targets = Vec::new();
        let mut collectors = Vec::new();
        for pod in pods {
            let info = PodInfo::from_object(&pod);
            if !info.is_running() {
                continue;
            }

            if self.sidecar_selector.matches(&pod.labels()) {
                collectors.push(info);
            } else {
                debug!("Targeting pod {}/{}", info.namespace, info.name);
                let mut target = self.sanitizer.sanitize(pod);
                target.remove_metadata_field("managedFields");
                targets.push(target);
            }
        }
        (targets, collectors)
    }
}
