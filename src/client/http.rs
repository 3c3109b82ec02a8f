//! HTTP upstream client
//!
//! Authenticates with an OAuth client-credentials grant and posts JSON bodies
//! with a bearer token. A 401 triggers exactly one token refresh and retry.

use super::UpstreamClient;
use crate::{KubetrailError, Result};
use async_trait::async_trait;
use chrono::Utc;
use kubetrail_common::{ChangeEvent, EventType, ResourceSnapshot, WriteRequest};
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, info};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const TOKEN_PATH: &str = "oauth/token";
const CHANGES_PATH: &str = "k8s_changes";
const RESOURCES_PATH: &str = "k8s_resources";
const METRICS_PATH: &str = "metrics";
const AGENT_INFO_PATH: &str = "agent_info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl Credentials {
    /// Read `CLIENT_ID` and `API_KEY`; `None` unless both are non-empty.
    pub fn from_env() -> Option<Self> {
        let client_id = std::env::var("CLIENT_ID").ok().filter(|v| !v.is_empty())?;
        let client_secret = std::env::var("API_KEY").ok().filter(|v| !v.is_empty())?;
        Some(Self {
            client_id,
            client_secret,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentInfo {
    pub agent_version: String,
    pub last_change_collection_time: i64,
    pub last_resource_collection_time: i64,
    pub last_traffic_collection_time: i64,
    pub kafka_server: String,
    pub last_kafka_collection_time: i64,
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    grant_type: &'static str,
    audience: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

pub struct HttpUpstreamClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Credentials,
    token: RwLock<String>,
    agent_version: String,
    kafka_server: String,
    last_change: AtomicI64,
    last_resource: AtomicI64,
    last_traffic: AtomicI64,
    last_kafka: AtomicI64,
}

impl HttpUpstreamClient {
    pub fn new(base_url: &str, credentials: Credentials, agent_version: &str) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            token: RwLock::new(String::new()),
            agent_version: agent_version.to_string(),
            kafka_server: String::new(),
            last_change: AtomicI64::new(0),
            last_resource: AtomicI64::new(0),
            last_traffic: AtomicI64::new(0),
            last_kafka: AtomicI64::new(0),
        })
    }

    /// Brokers reported in agent info when topic collection is enabled.
    pub fn with_kafka_server(mut self, servers: &str) -> Self {
        self.kafka_server = servers.to_string();
        self
    }

    /// Build a client and obtain the first token.
    pub async fn connect(base_url: &str, credentials: Credentials, agent_version: &str) -> Result<Self> {
        let client = Self::new(base_url, credentials, agent_version)?;
        client.refresh_token().await?;
        Ok(client)
    }

    pub fn agent_info(&self) -> AgentInfo {
        AgentInfo {
            agent_version: self.agent_version.clone(),
            last_change_collection_time: self.last_change.load(Ordering::Relaxed),
            last_resource_collection_time: self.last_resource.load(Ordering::Relaxed),
            last_traffic_collection_time: self.last_traffic.load(Ordering::Relaxed),
            kafka_server: self.kafka_server.clone(),
            last_kafka_collection_time: self.last_kafka.load(Ordering::Relaxed),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn current_token(&self) -> String {
        self.token.read().map(|t| t.clone()).unwrap_or_default()
    }

    async fn refresh_token(&self) -> Result<()> {
        let url = self.url(TOKEN_PATH);
        info!("Requesting a new token from {}", url);

        let request = TokenRequest {
            client_id: &self.credentials.client_id,
            client_secret: &self.credentials.client_secret,
            grant_type: "client_credentials",
            audience: &self.credentials.client_id,
        };
        let response = check_status(self.http.post(&url).json(&request).send().await?)?;
        let token: TokenResponse = response.json().await?;

        if let Ok(mut current) = self.token.write() {
            *current = token.access_token;
        }
        Ok(())
    }

    async fn send_authorized<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<Response> {
        Ok(self
            .http
            .post(url)
            .bearer_auth(self.current_token())
            .json(body)
            .send()
            .await?)
    }

    async fn post_json<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<()> {
        let url = self.url(path);
        debug!("Posting to {}", url);

        let response = self.send_authorized(&url, body).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            self.refresh_token().await?;
            let retried = self.send_authorized(&url, body).await?;
            check_status(retried)?;
            return Ok(());
        }

        check_status(response)?;
        Ok(())
    }
}

pub(crate) fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(KubetrailError::HttpStatus {
            url: response.url().to_string(),
            status: status.as_u16(),
        })
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstreamClient {
    async fn send_change_event(&self, event: &ChangeEvent) -> Result<()> {
        self.post_json(CHANGES_PATH, event).await?;
        let last = match event.event_type {
            EventType::ExternalUpdate => &self.last_kafka,
            _ => &self.last_change,
        };
        last.store(event.time.timestamp(), Ordering::Relaxed);
        Ok(())
    }

    async fn send_resource_snapshot(&self, snapshot: &ResourceSnapshot) -> Result<()> {
        self.post_json(RESOURCES_PATH, snapshot).await?;
        self.last_resource.store(snapshot.time.timestamp(), Ordering::Relaxed);
        Ok(())
    }

    async fn send_metrics(&self, request: &WriteRequest) -> Result<()> {
        let collected = Utc::now().timestamp();
        self.post_json(METRICS_PATH, request).await?;
        self.last_traffic.store(collected, Ordering::Relaxed);
        Ok(())
    }

    async fn send_agent_info(&self) -> Result<()> {
        let info = self.agent_info();
        self.post_json(AGENT_INFO_PATH, &info).await
    }
}
