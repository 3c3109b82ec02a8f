//! HTTP calls to traffic collector sidecars

use super::prom::parse_text;
use super::remote_write::to_write_request;
use crate::client::http::check_status;
use crate::Result;
use chrono::Utc;
use kubetrail_common::{IpIdentityMap, ResourceObject, WriteRequest};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

const SIDECAR_TIMEOUT: Duration = Duration::from_secs(10);

const SET_TARGETS_PATH: &str = "pods/set-targeted";
const SERVICE_IPS_PATH: &str = "service_ips";
const METRICS_PATH: &str = "webbai_metrics";

pub struct SidecarClient {
    http: reqwest::Client,
    server_port: u16,
    metrics_port: u16,
}

impl SidecarClient {
    pub fn new(server_port: u16, metrics_port: u16) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(SIDECAR_TIMEOUT).build()?;
        Ok(Self {
            http,
            server_port,
            metrics_port,
        })
    }

    pub async fn set_targets(&self, pod_ip: &str, targets: &[ResourceObject]) -> Result<()> {
        let url = format!("http://{}:{}/{}", pod_ip, self.server_port, SET_TARGETS_PATH);
        self.post(&url, targets).await
    }

    pub async fn set_service_ips(&self, pod_ip: &str, ip_map: &IpIdentityMap) -> Result<()> {
        let url = format!("http://{}:{}/{}", pod_ip, self.server_port, SERVICE_IPS_PATH);
        self.post(&url, ip_map).await
    }

    /// Scrape a sidecar and convert its counters and histograms into a batch.
    pub async fn scrape(&self, pod_ip: &str) -> Result<WriteRequest> {
        let url = format!("http://{}:{}/{}", pod_ip, self.metrics_port, METRICS_PATH);
        scrape_url(&self.http, &url).await
    }

    async fn post<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<()> {
        debug!("Posting to sidecar {}", url);
        check_status(self.http.post(url).json(body).send().await?)?;
        Ok(())
    }
}

pub async fn fetch_metrics(http: &reqwest::Client, url: &str) -> Result<String> {
    debug!("Scraping {}", url);
    let response = check_status(http.get(url).send().await?)?;
    Ok(response.text().await?)
}

pub async fn scrape_url(http: &reqwest::Client, url: &str) -> Result<WriteRequest> {
    let body = fetch_metrics(http, url).await?;
    let families = parse_text(&body)?;
    Ok(to_write_request(&families, Utc::now().timestamp_millis()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{object, pod};
    use crate::KubetrailError;
    use kubetrail_common::WorkloadIdentity;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn sidecar() -> (MockServer, SidecarClient) {
        let server = MockServer::start().await;
        let port = server.address().port();
        (server, SidecarClient::new(port, port).unwrap())
    }

    #[tokio::test]
    async fn test_set_targets_posts_pod_list() {
        let (server, client) = sidecar().await;
        let target = object(pod("shop", "web-1", &[("app", "web")], "Running", "10.0.0.1", "192.168.0.1"));
        let expected = serde_json::to_value(vec![&target]).unwrap();

        Mock::given(method("POST"))
            .and(path("/pods/set-targeted"))
            .and(body_json(expected))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client.set_targets("127.0.0.1", &[target]).await.unwrap();
    }

    #[tokio::test]
    async fn test_set_service_ips_posts_map() {
        let (server, client) = sidecar().await;
        let mut ip_map = IpIdentityMap::default();
        ip_map.service_ips.insert(
            "10.96.0.10".to_string(),
            WorkloadIdentity::new("apps/v1", "Deployment", "shop", "web"),
        );

        Mock::given(method("POST"))
            .and(path("/service_ips"))
            .and(body_json(json!({
                "pod_ips": {},
                "service_ips": {"10.96.0.10": "apps/v1|Deployment|shop|web"}
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client.set_service_ips("127.0.0.1", &ip_map).await.unwrap();
    }

    #[tokio::test]
    async fn test_push_failure_is_reported() {
        let (server, client) = sidecar().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client.set_targets("127.0.0.1", &[]).await.unwrap_err();
        assert!(matches!(err, KubetrailError::HttpStatus { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_scrape_converts_exposition() {
        let (server, client) = sidecar().await;
        Mock::given(method("GET"))
            .and(path("/webbai_metrics"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "# TYPE requests_total counter\nrequests_total{code=\"200\"} 5\n# TYPE up gauge\nup 1\n",
            ))
            .mount(&server)
            .await;

        let request = client.scrape("127.0.0.1").await.unwrap();
        assert_eq!(request.timeseries.len(), 1);
        assert_eq!(request.timeseries[0].label("__name__"), Some("requests_total"));
        assert_eq!(request.timeseries[0].samples[0].value, 5.0);
    }

    #[tokio::test]
    async fn test_scrape_rejects_malformed_body() {
        let (server, client) = sidecar().await;
        Mock::given(method("GET"))
            .and(path("/webbai_metrics"))
            .respond_with(ResponseTemplate::new(200).set_body_string("# TYPE c counter\nc{ 1\n"))
            .mount(&server)
            .await;

        let err = client.scrape("127.0.0.1").await.unwrap_err();
        assert!(matches!(err, KubetrailError::MetricsParse { line: 2, .. }));
    }
}
