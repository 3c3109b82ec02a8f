pub mod cache;
pub mod client;
pub mod redact;
pub mod registry;
pub mod store;
pub mod types;
pub mod watcher;

pub use cache::{KubeCache, ObjectCache, ResourceEventHandler};
pub use client::K8sClient;
pub use redact::Sanitizer;
pub use registry::{Registry, ResourceRole};
pub use types::PodInfo;
