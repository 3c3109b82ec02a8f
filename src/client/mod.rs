//! Outbound delivery of change events, snapshots, metrics and heartbeats
//!
//! Collectors only see [`UpstreamClient`]. Failures are returned to the
//! caller, which logs them; nothing above the transport retries.

pub mod http;

use crate::Result;
use async_trait::async_trait;
use kubetrail_common::{ChangeEvent, ResourceSnapshot, WriteRequest};

pub use http::{AgentInfo, Credentials, HttpUpstreamClient};

#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn send_change_event(&self, event: &ChangeEvent) -> Result<()>;

    async fn send_resource_snapshot(&self, snapshot: &ResourceSnapshot) -> Result<()>;

    async fn send_metrics(&self, request: &WriteRequest) -> Result<()>;

    /// Report agent version and the last successful collection times.
    async fn send_agent_info(&self) -> Result<()>;
}

/// Discards everything. Used when no upstream credentials are configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpClient;

#[async_trait]
impl UpstreamClient for NoOpClient {
    async fn send_change_event(&self, _event: &ChangeEvent) -> Result<()> {
        Ok(())
    }

    async fn send_resource_snapshot(&self, _snapshot: &ResourceSnapshot) -> Result<()> {
        Ok(())
    }

    async fn send_metrics(&self, _request: &WriteRequest) -> Result<()> {
        Ok(())
    }

    async fn send_agent_info(&self) -> Result<()> {
        Ok(())
    }
}
