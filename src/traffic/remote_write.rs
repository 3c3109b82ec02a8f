//! Conversion of parsed families into a remote-write batch

use super::prom::{FamilyMetrics, LabelPairs, MetricFamily};
use kubetrail_common::{Label, Sample, TimeSeries, WriteRequest};

const METRIC_NAME_LABEL: &str = "__name__";
const BUCKET_LABEL: &str = "le";

/// Build one batch from scraped families, stamping every sample with `timestamp_ms`.
///
/// Counters yield one series per metric. Histograms yield `_count`, `_sum`
/// and one `_bucket` series per bucket. `__name__` is always the last label.
pub fn to_write_request(families: &[MetricFamily], timestamp_ms: i64) -> WriteRequest {
    let mut timeseries = Vec::new();

    for family in families {
        match &family.metrics {
            FamilyMetrics::Counter(metrics) => {
                for metric in metrics {
                    timeseries.push(series(
                        base_labels(&metric.labels),
                        &family.name,
                        metric.value,
                        timestamp_ms,
                    ));
                }
            }
            FamilyMetrics::Histogram(metrics) => {
                for metric in metrics {
                    let labels = base_labels(&metric.labels);

                    timeseries.push(series(
                        labels.clone(),
                        &format!("{}_count", family.name),
                        metric.count,
                        timestamp_ms,
                    ));
                    timeseries.push(series(
                        labels.clone(),
                        &format!("{}_sum", family.name),
                        metric.sum,
                        timestamp_ms,
                    ));

                    for bucket in &metric.buckets {
                        let mut bucket_labels = labels.clone();
                        bucket_labels.push(Label::new(BUCKET_LABEL, format_bound(bucket.upper_bound)));
                        timeseries.push(series(
                            bucket_labels,
                            &format!("{}_bucket", family.name),
                            bucket.cumulative_count,
                            timestamp_ms,
                        ));
                    }
                }
            }
        }
    }

    WriteRequest { timeseries }
}

/// Labels with an empty name or value are dropped.
fn base_labels(pairs: &LabelPairs) -> Vec<Label> {
    pairs
        .iter()
        .filter(|(name, value)| !name.is_empty() && !value.is_empty())
        .map(|(name, value)| Label::new(name.as_str(), value.as_str()))
        .collect()
}

fn series(mut labels: Vec<Label>, name: &str, value: f64, timestamp_ms: i64) -> TimeSeries {
    labels.push(Label::new(METRIC_NAME_LABEL, name));
    TimeSeries {
        labels,
        samples: vec![Sample {
            value,
            timestamp: timestamp_ms,
        }],
    }
}

fn format_bound(bound: f64) -> String {
    if bound == f64::INFINITY {
        "+Inf".to_string()
    } else if bound == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        bound.to_string()
    }
}
