//! Prometheus text exposition parser
//!
//! Only counter and histogram families are kept; every other family type and
//! untyped samples are skipped.

use crate::{KubetrailError, Result};
use std::collections::HashMap;

pub type LabelPairs = Vec<(String, String)>;

#[derive(Debug, Clone, PartialEq)]
pub struct CounterMetric {
    pub labels: LabelPairs,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub upper_bound: f64,
    pub cumulative_count: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct HistogramMetric {
    pub labels: LabelPairs,
    pub count: f64,
    pub sum: f64,
    pub buckets: Vec<Bucket>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FamilyMetrics {
    Counter(Vec<CounterMetric>),
    Histogram(Vec<HistogramMetric>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub name: String,
    pub metrics: FamilyMetrics,
}

struct SampleLine {
    name: String,
    labels: LabelPairs,
    value: f64,
}

/// Parse an exposition body into counter and histogram families, in the
/// order their `# TYPE` lines appear.
pub fn parse_text(body: &str) -> Result<Vec<MetricFamily>> {
    let mut families: Vec<MetricFamily> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (number, raw) in body.lines().enumerate() {
        let line_no = number + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(comment) = line.strip_prefix('#') {
            let mut parts = comment.split_whitespace();
            if parts.next() == Some("TYPE") {
                let (Some(name), Some(kind)) = (parts.next(), parts.next()) else {
                    return Err(parse_error(line_no, "incomplete TYPE line"));
                };
                let metrics = match kind {
                    "counter" => FamilyMetrics::Counter(Vec::new()),
                    "histogram" => FamilyMetrics::Histogram(Vec::new()),
                    _ => continue,
                };
                if index.contains_key(name) {
                    return Err(parse_error(line_no, &format!("second TYPE line for {name}")));
                }
                index.insert(name.to_string(), families.len());
                families.push(MetricFamily {
                    name: name.to_string(),
                    metrics,
                });
            }
            continue;
        }

        let sample = parse_sample(line).map_err(|message| parse_error(line_no, &message))?;
        route_sample(&mut families, &index, sample).map_err(|message| parse_error(line_no, &message))?;
    }

    Ok(families)
}

fn parse_error(line: usize, message: &str) -> KubetrailError {
    KubetrailError::MetricsParse {
        line,
        message: message.to_string(),
    }
}

fn route_sample(
    families: &mut [MetricFamily],
    index: &HashMap<String, usize>,
    sample: SampleLine,
) -> std::result::Result<(), String> {
    if let Some(&i) = index.get(&sample.name) {
        if let FamilyMetrics::Counter(metrics) = &mut families[i].metrics {
            metrics.push(CounterMetric {
                labels: sample.labels,
                value: sample.value,
            });
            return Ok(());
        }
    }

    for suffix in ["_bucket", "_sum", "_count"] {
        let Some(base) = sample.name.strip_suffix(suffix) else {
            continue;
        };
        let Some(&i) = index.get(base) else {
            continue;
        };
        let FamilyMetrics::Histogram(metrics) = &mut families[i].metrics else {
            continue;
        };
        return add_histogram_sample(metrics, suffix, sample);
    }

    // Gauge, summary, untyped
    Ok(())
}

fn add_histogram_sample(
    metrics: &mut Vec<HistogramMetric>,
    suffix: &str,
    sample: SampleLine,
) -> std::result::Result<(), String> {
    let mut labels = sample.labels;
    let mut upper_bound = None;
    if suffix == "_bucket" {
        let position = labels
            .iter()
            .position(|(name, _)| name == "le")
            .ok_or_else(|| format!("bucket sample {} without le label", sample.name))?;
        let (_, raw) = labels.remove(position);
        upper_bound = Some(parse_float(&raw)?);
    }

    let metric = match metrics.iter_mut().position(|m| m.labels == labels) {
        Some(i) => &mut metrics[i],
        None => {
            metrics.push(HistogramMetric {
                labels,
                ..Default::default()
            });
            let last = metrics.len() - 1;
            &mut metrics[last]
        }
    };

    match (suffix, upper_bound) {
        ("_bucket", Some(upper_bound)) => metric.buckets.push(Bucket {
            upper_bound,
            cumulative_count: sample.value,
        }),
        ("_sum", _) => metric.sum = sample.value,
        _ => metric.count = sample.value,
    }
    Ok(())
}

fn parse_sample(line: &str) -> std::result::Result<SampleLine, String> {
    let name_end = line
        .find(|c: char| c == '{' || c.is_whitespace())
        .ok_or_else(|| "sample without value".to_string())?;
    let name = &line[..name_end];
    if !is_metric_name(name) {
        return Err(format!("invalid metric name {name:?}"));
    }

    let mut rest = &line[name_end..];
    let mut labels = Vec::new();
    if rest.starts_with('{') {
        let (parsed, remainder) = parse_labels(&rest[1..])?;
        labels = parsed;
        rest = remainder;
    }

    let mut fields = rest.split_whitespace();
    let value = fields
        .next()
        .ok_or_else(|| format!("sample {name} without value"))
        .and_then(parse_float)?;
    if let Some(timestamp) = fields.next() {
        timestamp
            .parse::<i64>()
            .map_err(|_| format!("invalid timestamp {timestamp:?}"))?;
    }
    if fields.next().is_some() {
        return Err(format!("trailing data after sample {name}"));
    }

    Ok(SampleLine {
        name: name.to_string(),
        labels,
        value,
    })
}

/// Parse `name="value",...}` and return the labels plus the text after `}`.
fn parse_labels(input: &str) -> std::result::Result<(LabelPairs, &str), String> {
    let mut labels = Vec::new();
    let mut rest = input.trim_start();

    loop {
        if let Some(after) = rest.strip_prefix('}') {
            return Ok((labels, after));
        }

        let eq = rest
            .find('=')
            .ok_or_else(|| "label without value".to_string())?;
        let name = rest[..eq].trim();
        if !is_label_name(name) {
            return Err(format!("invalid label name {name:?}"));
        }

        let after_eq = rest[eq + 1..].trim_start();
        let quoted = after_eq
            .strip_prefix('"')
            .ok_or_else(|| format!("unquoted value for label {name}"))?;
        let (value, after_value) = parse_quoted(quoted)?;
        labels.push((name.to_string(), value));

        rest = after_value.trim_start();
        if let Some(after_comma) = rest.strip_prefix(',') {
            rest = after_comma.trim_start();
        } else if !rest.starts_with('}') {
            return Err("expected ',' or '}' in label set".to_string());
        }
    }
}

fn parse_quoted(input: &str) -> std::result::Result<(String, &str), String> {
    let mut value = String::new();
    let mut chars = input.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Ok((value, &input[i + 1..])),
            '\\' => match chars.next() {
                Some((_, 'n')) => value.push('\n'),
                Some((_, '\\')) => value.push('\\'),
                Some((_, '"')) => value.push('"'),
                Some((_, other)) => return Err(format!("invalid escape \\{other}")),
                None => break,
            },
            other => value.push(other),
        }
    }
    Err("unterminated label value".to_string())
}

fn parse_float(raw: &str) -> std::result::Result<f64, String> {
    raw.parse::<f64>()
        .map_err(|_| format!("invalid value {raw:?}"))
}

fn is_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == ':')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

fn is_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
