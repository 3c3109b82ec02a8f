//! Kafka topic change collection
//!
//! Polls the broker's topic list on a fixed interval. The first listing is
//! only a baseline; every later listing that differs from the previous one is
//! reported as an external update carrying both listings.

use super::{ticker, ChangeDetector};
use crate::{KubetrailError, Result};
use async_trait::async_trait;
use chrono::Utc;
use kubetrail_common::value::deep_equal;
use kubetrail_common::{ChangeEvent, ResourceObject};
use rskafka::client::{Client, ClientBuilder};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const TOPICS_API_VERSION: &str = "kafka/v1";
const TOPICS_KIND: &str = "KafkaTopics";
const TOPICS_NAME: &str = "ListTopics";

/// Source of the broker's current topic listing.
#[async_trait]
pub trait TopicLister: Send + Sync {
    /// Topics keyed by name.
    async fn list_topics(&self) -> Result<Value>;
}

pub struct KafkaTopicLister {
    client: Client,
}

impl KafkaTopicLister {
    pub async fn connect(brokers: Vec<String>) -> Result<Self> {
        let client = ClientBuilder::new(brokers)
            .build()
            .await
            .map_err(|e| KubetrailError::Kafka(format!("Failed to connect to brokers: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl TopicLister for KafkaTopicLister {
    async fn list_topics(&self) -> Result<Value> {
        let topics = self
            .client
            .list_topics()
            .await
            .map_err(|e| KubetrailError::Kafka(format!("Failed to list topics: {}", e)))?;

        let listing: Map<String, Value> = topics
            .into_iter()
            .map(|topic| {
                let partitions: Vec<i32> = topic.partitions.into_iter().collect();
                (
                    topic.name,
                    json!({"numPartitions": partitions.len(), "partitions": partitions}),
                )
            })
            .collect();
        Ok(Value::Object(listing))
    }
}

pub struct KafkaCollector {
    lister: Arc<dyn TopicLister>,
    detector: Arc<ChangeDetector>,
    bootstrap_servers: String,
    interval: Duration,
    previous: Option<Value>,
}

impl KafkaCollector {
    pub fn new(
        lister: Arc<dyn TopicLister>,
        detector: Arc<ChangeDetector>,
        bootstrap_servers: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            lister,
            detector,
            bootstrap_servers: bootstrap_servers.into(),
            interval,
            previous: None,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Collecting Kafka topic changes every {:?}", self.interval);

        let mut interval = ticker(self.interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => self.poll().await,
            }
        }
        debug!("Kafka collector stopped");
    }

    async fn poll(&mut self) {
        let current = match self.lister.list_topics().await {
            Ok(topics) => topics,
            Err(e) => {
                warn!("Failed to collect Kafka topics: {}", e);
                return;
            }
        };

        let Some(previous) = self.previous.replace(current.clone()) else {
            debug!("Recorded baseline Kafka topic listing");
            return;
        };
        if deep_equal(&previous, &current) {
            return;
        }

        match (self.listing(previous), self.listing(current)) {
            (Ok(old), Ok(new)) => {
                info!("Kafka topics changed on {}", self.bootstrap_servers);
                self.detector.emit(ChangeEvent::external(old, new, Utc::now()));
            }
            (Err(e), _) | (_, Err(e)) => warn!("Failed to build Kafka change event: {}", e),
        }
    }

    fn listing(&self, topics: Value) -> Result<ResourceObject> {
        let raw = json!({
            "apiVersion": TOPICS_API_VERSION,
            "kind": TOPICS_KIND,
            "metadata": {"name": TOPICS_NAME},
            "bootstrapServers": self.bootstrap_servers,
            "topics": topics,
        });
        Ok(ResourceObject::try_from(raw)?)
    }
}
