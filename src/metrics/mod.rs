pub mod collector;
pub mod exporter;

pub use collector::AgentMetrics;
pub use exporter::PrometheusExporter;
