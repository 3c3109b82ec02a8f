//! Agent configuration
//!
//! Loaded from an optional YAML file. Every key is optional and falls back to
//! its default; command-line flags are applied on top by the CLI.

use crate::{KubetrailError, Result};
use kubetrail_common::LabelSelector;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_SIDECAR_SELECTOR: &str = "app=webbai-traffic-collector";
pub const DEFAULT_UPSTREAM_URL: &str = "https://api.webb.ai";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    pub event_collection_interval_secs: u64,
    pub backup_collection_interval_secs: u64,
    pub traffic_collection_interval_secs: u64,
    pub agent_info_interval_secs: u64,

    /// Selects the traffic collector sidecar pods. Empty disables traffic collection.
    pub traffic_collector_selector: String,
    pub traffic_server_port: u16,
    pub traffic_metrics_port: u16,

    /// Strip container environment variables from every reported object.
    pub redact_env: bool,

    pub metrics_address: SocketAddr,
    pub upstream_url: String,
    pub change_queue_capacity: usize,

    /// Client-side throttle towards the API server.
    pub kube_api_qps: f32,
    pub kube_api_burst: u32,

    /// Comma-separated brokers. Empty disables topic change collection.
    pub kafka_bootstrap_servers: String,
    pub kafka_polling_interval_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            event_collection_interval_secs: 300,
            backup_collection_interval_secs: 3600,
            traffic_collection_interval_secs: 60,
            agent_info_interval_secs: 60,
            traffic_collector_selector: DEFAULT_SIDECAR_SELECTOR.to_string(),
            traffic_server_port: 8897,
            traffic_metrics_port: 9095,
            redact_env: false,
            metrics_address: SocketAddr::from(([0, 0, 0, 0], 9090)),
            upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
            change_queue_capacity: 1024,
            kube_api_qps: 20.0,
            kube_api_burst: 30,
            kafka_bootstrap_servers: String::new(),
            kafka_polling_interval_secs: 300,
        }
    }
}

impl AgentConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&raw)
            .map_err(|e| KubetrailError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn validate(&self) -> Result<()> {
        let intervals = [
            ("event_collection_interval_secs", self.event_collection_interval_secs),
            ("backup_collection_interval_secs", self.backup_collection_interval_secs),
            ("traffic_collection_interval_secs", self.traffic_collection_interval_secs),
            ("agent_info_interval_secs", self.agent_info_interval_secs),
            ("kafka_polling_interval_secs", self.kafka_polling_interval_secs),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, secs)| *secs == 0) {
            return Err(KubetrailError::Config(format!("{name} must be positive")));
        }

        if self.change_queue_capacity == 0 {
            return Err(KubetrailError::Config(
                "change_queue_capacity must be positive".to_string(),
            ));
        }
        if self.traffic_server_port == 0 || self.traffic_metrics_port == 0 {
            return Err(KubetrailError::Config(
                "traffic sidecar ports must be non-zero".to_string(),
            ));
        }

        if !(self.kube_api_qps > 0.0) || self.kube_api_burst == 0 {
            return Err(KubetrailError::Config(
                "kube_api_qps and kube_api_burst must be positive".to_string(),
            ));
        }

        self.sidecar_selector()?;
        Ok(())
    }

    /// `None` when traffic collection is disabled.
    pub fn sidecar_selector(&self) -> Result<Option<LabelSelector>> {
        let raw = self.traffic_collector_selector.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        Ok(Some(raw.parse()?))
    }

    /// Broker addresses; empty when topic collection is disabled.
    pub fn kafka_brokers(&self) -> Vec<String> {
        self.kafka_bootstrap_servers
            .split(',')
            .map(str::trim)
            .filter(|broker| !broker.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn kafka_polling_interval(&self) -> Duration {
        Duration::from_secs(self.kafka_polling_interval_secs)
    }

    pub fn event_collection_interval(&self) -> Duration {
        Duration::from_secs(self.event_collection_interval_secs)
    }

    pub fn backup_collection_interval(&self) -> Duration {
        Duration::from_secs(self.backup_collection_interval_secs)
    }

    pub fn traffic_collection_interval(&self) -> Duration {
        Duration::from_secs(self.traffic_collection_interval_secs)
    }

    pub fn agent_info_interval(&self) -> Duration {
        Duration::from_secs(self.agent_info_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = AgentConfig::default();
        config.validate().unwrap();
        assert_eq!(config.backup_collection_interval(), Duration::from_secs(3600));
        assert!(config.sidecar_selector().unwrap().is_some());
        assert_eq!(config.kube_api_qps, 20.0);
        assert_eq!(config.kube_api_burst, 30);
        assert!(config.kafka_brokers().is_empty());
        assert_eq!(config.kafka_polling_interval(), Duration::from_secs(300));
    }

    #[test]
    fn test_kafka_brokers_split_and_trimmed() {
        let file = write_config(
            "kafka_bootstrap_servers: \"kafka-0:9092, kafka-1:9092,,\"\nkafka_polling_interval_secs: 30\n",
        );
        let config = AgentConfig::from_file(file.path()).unwrap();
        assert_eq!(config.kafka_brokers(), vec!["kafka-0:9092", "kafka-1:9092"]);
        assert_eq!(config.kafka_polling_interval(), Duration::from_secs(30));
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_non_positive_throttle() {
        let no_qps = AgentConfig {
            kube_api_qps: 0.0,
            ..Default::default()
        };
        assert!(matches!(no_qps.validate(), Err(KubetrailError::Config(_))));

        let no_burst = AgentConfig {
            kube_api_burst: 0,
            ..Default::default()
        };
        assert!(matches!(no_burst.validate(), Err(KubetrailError::Config(_))));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let file = write_config(
            "backup_collection_interval_secs: 120\nredact_env: true\nmetrics_address: 127.0.0.1:9999\n",
        );
        let config = AgentConfig::from_file(file.path()).unwrap();

        assert_eq!(config.backup_collection_interval_secs, 120);
        assert!(config.redact_env);
        assert_eq!(config.metrics_address, "127.0.0.1:9999".parse().unwrap());
        assert_eq!(config.event_collection_interval_secs, 300);
        assert_eq!(config.traffic_collector_selector, DEFAULT_SIDECAR_SELECTOR);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let file = write_config("backup_interval: 10\n");
        let err = AgentConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, KubetrailError::Config(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = AgentConfig::from_file(Path::new("/nonexistent/kubetrail.yaml")).unwrap_err();
        assert!(matches!(err, KubetrailError::Io(_)));
    }

    #[test]
    fn test_empty_selector_disables_traffic() {
        let config = AgentConfig {
            traffic_collector_selector: "  ".to_string(),
            ..Default::default()
        };
        assert!(config.sidecar_selector().unwrap().is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_zero_interval_and_bad_selector() {
        let zero = AgentConfig {
            traffic_collection_interval_secs: 0,
            ..Default::default()
        };
        assert!(zero
            .validate()
            .unwrap_err()
            .to_string()
            .contains("traffic_collection_interval_secs"));

        let bad = AgentConfig {
            traffic_collector_selector: "app in (a".to_string(),
            ..Default::default()
        };
        assert!(matches!(bad.validate(), Err(KubetrailError::Selector(_))));
    }
}
