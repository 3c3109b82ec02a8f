use kubetrail_common::{ConversionError, Gvr, SelectorError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KubetrailError {
    #[error("Kubernetes error: {0}")]
    Kubernetes(#[from] kube::Error),

    #[error("Failed to discover server resources: {0}")]
    Discovery(String),

    #[error("Resource {0} is not served by the cluster")]
    UnknownResource(Gvr),

    #[error("Resource {0} is not subscribed in the object cache")]
    NotSubscribed(Gvr),

    #[error("Object conversion failed: {0}")]
    Conversion(#[from] ConversionError),

    #[error("Invalid label selector: {0}")]
    Selector(#[from] SelectorError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request to {url} failed with status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Failed to parse metrics at line {line}: {message}")]
    MetricsParse { line: usize, message: String },

    #[error("Metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Kafka error: {0}")]
    Kafka(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, KubetrailError>;
