pub mod commands;

use crate::config::AgentConfig;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kubetrail")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Kubernetes change, backup and traffic collection agent", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Path to a YAML config file")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the agent against the current cluster")]
    Run(RunArgs),
    #[command(about = "Print the watched, cached and backed up resource types")]
    Registry,
    #[command(about = "Scrape a collector metrics endpoint and print the converted batch")]
    Scrape {
        #[arg(help = "Metrics URL, e.g. http://10.0.0.5:9095/webbai_metrics")]
        url: String,
    },
}

#[derive(Args, Default)]
pub struct RunArgs {
    #[arg(long, help = "Seconds between event snapshots")]
    pub event_interval: Option<u64>,

    #[arg(long, help = "Seconds between full resource backups")]
    pub backup_interval: Option<u64>,

    #[arg(long, help = "Seconds between traffic collection cycles")]
    pub traffic_interval: Option<u64>,

    #[arg(long, help = "Label selector for traffic collector pods; empty disables traffic collection")]
    pub traffic_selector: Option<String>,

    #[arg(long, help = "Port of the collector target API")]
    pub traffic_server_port: Option<u16>,

    #[arg(long, help = "Port of the collector metrics endpoint")]
    pub traffic_metrics_port: Option<u16>,

    #[arg(long, action = ArgAction::Set, help = "Redact container environment values (true or false)")]
    pub redact_env: Option<bool>,

    #[arg(long, help = "Address for the agent's own metrics endpoint")]
    pub metrics_address: Option<SocketAddr>,

    #[arg(long, help = "Base URL of the upstream API")]
    pub upstream_url: Option<String>,

    #[arg(long, help = "Sustained request rate towards the API server")]
    pub kube_api_qps: Option<f32>,

    #[arg(long, help = "Request burst allowed towards the API server")]
    pub kube_api_burst: Option<u32>,

    #[arg(long, help = "Comma-separated Kafka brokers; empty disables topic collection")]
    pub kafka_bootstrap_servers: Option<String>,

    #[arg(long, help = "Seconds between Kafka topic listings")]
    pub kafka_polling_interval: Option<u64>,
}

impl RunArgs {
    /// Layer flags given on the command line over the loaded config.
    pub fn apply(&self, config: &mut AgentConfig) {
        if let Some(secs) = self.event_interval {
            config.event_collection_interval_secs = secs;
        }
        if let Some(secs) = self.backup_interval {
            config.backup_collection_interval_secs = secs;
        }
        if let Some(secs) = self.traffic_interval {
            config.traffic_collection_interval_secs = secs;
        }
        if let Some(selector) = &self.traffic_selector {
            config.traffic_collector_selector = selector.clone();
        }
        if let Some(port) = self.traffic_server_port {
            config.traffic_server_port = port;
        }
        if let Some(port) = self.traffic_metrics_port {
            config.traffic_metrics_port = port;
        }
        if let Some(redact) = self.redact_env {
            config.redact_env = redact;
        }
        if let Some(address) = self.metrics_address {
            config.metrics_address = address;
        }
        if let Some(url) = &self.upstream_url {
            config.upstream_url = url.clone();
        }
        if let Some(qps) = self.kube_api_qps {
            config.kube_api_qps = qps;
        }
        if let Some(burst) = self.kube_api_burst {
            config.kube_api_burst = burst;
        }
        if let Some(servers) = &self.kafka_bootstrap_servers {
            config.kafka_bootstrap_servers = servers.clone();
        }
        if let Some(secs) = self.kafka_polling_interval {
            config.kafka_polling_interval_secs = secs;
        }
    }
}
