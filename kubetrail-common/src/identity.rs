use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Canonical key for a workload: `apiVersion|kind|namespace|name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkloadIdentity(String);

impl WorkloadIdentity {
    pub fn new(api_version: &str, kind: &str, namespace: &str, name: &str) -> Self {
        Self(format!("{api_version}|{kind}|{namespace}|{name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkloadIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pod and service IP attribution, rebuilt from scratch every traffic cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpIdentityMap {
    pub pod_ips: BTreeMap<String, WorkloadIdentity>,
    pub service_ips: BTreeMap<String, WorkloadIdentity>,
}

impl IpIdentityMap {
    pub fn is_empty(&self) -> bool {
        self.pod_ips.is_empty() && self.service_ips.is_empty()
    }
}
