//! Static resource registry
//!
//! Which resource types the agent watches, which it only caches, and which it
//! snapshots on the slow backup cadence.

use crate::{KubetrailError, Result};
use kubetrail_common::Gvr;
use std::collections::HashSet;

/// Resource types with a fixed role in traffic topology and event collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceRole {
    Pod,
    Service,
    Event,
    Deployment,
    StatefulSet,
    DaemonSet,
    Job,
    CronJob,
}

impl ResourceRole {
    pub fn gvr(&self) -> Gvr {
        let (group, version, resource) = match self {
            ResourceRole::Pod => ("", "v1", "pods"),
            ResourceRole::Service => ("", "v1", "services"),
            ResourceRole::Event => ("", "v1", "events"),
            ResourceRole::Deployment => ("apps", "v1", "deployments"),
            ResourceRole::StatefulSet => ("apps", "v1", "statefulsets"),
            ResourceRole::DaemonSet => ("apps", "v1", "daemonsets"),
            ResourceRole::Job => ("batch", "v1", "jobs"),
            ResourceRole::CronJob => ("batch", "v1", "cronjobs"),
        };
        Gvr::new(group, version, resource)
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            ResourceRole::Pod => "Pod",
            ResourceRole::Service => "Service",
            ResourceRole::Event => "Event",
            ResourceRole::Deployment => "Deployment",
            ResourceRole::StatefulSet => "StatefulSet",
            ResourceRole::DaemonSet => "DaemonSet",
            ResourceRole::Job => "Job",
            ResourceRole::CronJob => "CronJob",
        }
    }
}

// Group, Version, Resource
const WATCHED: &[(&str, &str, &str)] = &[
    ("", "v1", "configmaps"),
    ("", "v1", "namespaces"),
    ("", "v1", "nodes"),
    ("", "v1", "persistentvolumeclaims"),
    ("", "v1", "persistentvolumes"),
    ("", "v1", "pods"),
    ("", "v1", "resourcequotas"),
    ("", "v1", "secrets"),
    ("", "v1", "serviceaccounts"),
    ("", "v1", "services"),
    ("apps", "v1", "daemonsets"),
    ("apps", "v1", "deployments"),
    ("apps", "v1", "replicasets"),
    ("apps", "v1", "statefulsets"),
    ("batch", "v1", "cronjobs"),
    ("batch", "v1", "jobs"),
    ("networking.k8s.io", "v1", "ingressclasses"),
    ("networking.k8s.io", "v1", "ingresses"),
    ("networking.k8s.io", "v1", "networkpolicies"),
];

// Kept in the cache for periodic listing only; no change events.
const CACHE_ONLY: &[(&str, &str, &str)] = &[("", "v1", "events")];

// Iterated in this order on every backup cycle.
const BACKUP: &[(&str, &str, &str)] = &[
    ("", "v1", "namespaces"),
    ("", "v1", "nodes"),
    ("", "v1", "persistentvolumes"),
    ("", "v1", "persistentvolumeclaims"),
    ("", "v1", "services"),
    ("", "v1", "pods"),
    ("apps", "v1", "deployments"),
    ("apps", "v1", "statefulsets"),
    ("apps", "v1", "daemonsets"),
    ("apps", "v1", "replicasets"),
    ("batch", "v1", "cronjobs"),
    ("batch", "v1", "jobs"),
    ("networking.k8s.io", "v1", "ingresses"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
    watched: Vec<Gvr>,
    cache_only: Vec<Gvr>,
    backup: Vec<Gvr>,
}

impl Registry {
    /// Build a registry, rejecting duplicate watched types and backup types
    /// that would never be cached.
    pub fn new(watched: Vec<Gvr>, cache_only: Vec<Gvr>, backup: Vec<Gvr>) -> Result<Self> {
        let mut seen = HashSet::new();
        for gvr in watched.iter().chain(&cache_only) {
            if !seen.insert(gvr) {
                return Err(KubetrailError::Config(format!(
                    "resource {gvr} is registered more than once"
                )));
            }
        }

        if let Some(missing) = backup.iter().find(|gvr| !seen.contains(gvr)) {
            return Err(KubetrailError::Config(format!(
                "backup resource {missing} is not watched or cached"
            )));
        }

        Ok(Self {
            watched,
            cache_only,
            backup,
        })
    }

    pub fn watched(&self) -> &[Gvr] {
        &self.watched
    }

    pub fn cache_only(&self) -> &[Gvr] {
        &self.cache_only
    }

    pub fn backup(&self) -> &[Gvr] {
        &self.backup
    }

    /// Every type the object cache has to hold.
    pub fn cached(&self) -> impl Iterator<Item = &Gvr> {
        self.watched.iter().chain(&self.cache_only)
    }

    /// API groups spanned by the cached types, for discovery filtering.
    pub fn groups(&self) -> Vec<&str> {
        let mut groups: Vec<&str> = self.cached().map(|g| g.group.as_str()).collect();
        groups.sort_unstable();
        groups.dedup();
        groups
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            watched: to_gvrs(WATCHED),
            cache_only: to_gvrs(CACHE_ONLY),
            backup: to_gvrs(BACKUP),
        }
    }
}

fn to_gvrs(entries: &[(&str, &str, &str)]) -> Vec<Gvr> {
    entries
        .iter()
        .map(|(g, v, r)| Gvr::new(*g, *v, *r))
        .collect()
}
