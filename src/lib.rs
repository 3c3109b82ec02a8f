pub mod agent;
pub mod cli;
pub mod client;
pub mod collector;
pub mod config;
pub mod error;
pub mod k8s;
pub mod metrics;
pub mod traffic;

#[cfg(test)]
mod test_support;

pub use error::{KubetrailError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
