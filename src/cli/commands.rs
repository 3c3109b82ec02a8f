use crate::agent::Agent;
use crate::cli::{Commands, RunArgs};
use crate::client::{Credentials, HttpUpstreamClient, NoOpClient, UpstreamClient};
use crate::collector::KafkaTopicLister;
use crate::config::AgentConfig;
use crate::k8s::{K8sClient, KubeCache, Registry};
use crate::metrics::{AgentMetrics, PrometheusExporter};
use crate::traffic::sidecar::scrape_url;
use crate::{Result, VERSION};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub async fn handle_command(
    command: Commands,
    config_path: Option<&Path>,
    cancel: CancellationToken,
) -> Result<()> {
    match command {
        Commands::Run(args) => handle_run(args, config_path, cancel).await,
        Commands::Registry => handle_registry(),
        Commands::Scrape { url } => handle_scrape(&url).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<AgentConfig> {
    match path {
        Some(path) => {
            info!("Loading config from {}", path.display());
            AgentConfig::from_file(path)
        }
        None => Ok(AgentConfig::default()),
    }
}

async fn handle_run(args: RunArgs, config_path: Option<&Path>, cancel: CancellationToken) -> Result<()> {
    let mut config = load_config(config_path)?;
    args.apply(&mut config);
    config.validate()?;

    let registry = Registry::default();
    let k8s = K8sClient::connect(config.kube_api_qps, config.kube_api_burst).await?;
    let served = k8s.discover(&registry.groups()).await?;
    let cache = Arc::new(KubeCache::new(k8s.client(), served));

    let client: Arc<dyn UpstreamClient> = match Credentials::from_env() {
        Some(credentials) => {
            info!("Reporting to {}", config.upstream_url);
            let client = HttpUpstreamClient::connect(&config.upstream_url, credentials, VERSION)
                .await?
                .with_kafka_server(&config.kafka_bootstrap_servers);
            Arc::new(client)
        }
        None => {
            warn!("CLIENT_ID or API_KEY not set, collected data will be discarded");
            Arc::new(NoOpClient)
        }
    };

    let metrics = AgentMetrics::new()?;
    let exporter = PrometheusExporter::new(metrics.clone(), config.metrics_address);
    let exporter_cancel = cancel.clone();
    let exporter_task = tokio::spawn(async move {
        if let Err(e) = exporter.serve(exporter_cancel).await {
            error!("Metrics endpoint failed: {}", e);
        }
    });

    let brokers = config.kafka_brokers();
    let topic_lister = if brokers.is_empty() {
        None
    } else {
        match KafkaTopicLister::connect(brokers).await {
            Ok(lister) => {
                info!("Collecting Kafka topic changes from {}", config.kafka_bootstrap_servers);
                Some(lister)
            }
            Err(e) => {
                error!("Kafka topic collection disabled: {}", e);
                None
            }
        }
    };

    let mut agent = Agent::new(config, registry, cache, client, metrics);
    if let Some(lister) = topic_lister {
        agent = agent.with_topic_lister(Arc::new(lister));
    }
    let result = agent.run(cancel.clone()).await;

    cancel.cancel();
    if let Err(e) = exporter_task.await {
        error!("Metrics endpoint task failed: {}", e);
    }
    result
}

fn handle_registry() -> Result<()> {
    let registry = Registry::default();

    println!("Watched ({}):", registry.watched().len());
    for gvr in registry.watched() {
        println!("  {}", gvr);
    }
    println!("Cache only ({}):", registry.cache_only().len());
    for gvr in registry.cache_only() {
        println!("  {}", gvr);
    }
    println!("Backed up ({}):", registry.backup().len());
    for gvr in registry.backup() {
        println!("  {}", gvr);
    }
    Ok(())
}

async fn handle_scrape(url: &str) -> Result<()> {
    let http = reqwest::Client::new();
    let request = scrape_url(&http, url).await?;
    info!("Converted {} series from {}", request.timeseries.len(), url);
    println!("{}", serde_json::to_string_pretty(&request)?);
    Ok(())
}
