//! Shared data model for kubetrail
//!
//! Types in this crate describe what flows out of the agent:
//! - change events and resource snapshots sent upstream
//! - workload identities and IP maps pushed to traffic sidecars
//! - remote-write batches built from scraped sidecar metrics
//!
//! Everything here is a plain value type. Nothing holds a connection or a
//! cache handle, so the types can be shared with other tools that read the
//! agent's output.

pub mod error;
pub mod event;
pub mod gvr;
pub mod identity;
pub mod labels;
pub mod object;
pub mod series;
pub mod value;

pub use error::{ConversionError, SelectorError};
pub use event::{ChangeEvent, EventType, ResourceSnapshot};
pub use gvr::Gvr;
pub use identity::{IpIdentityMap, WorkloadIdentity};
pub use labels::{LabelSelector, Requirement};
pub use object::{OwnerReference, ResourceObject};
pub use series::{Label, Sample, TimeSeries, WriteRequest};
