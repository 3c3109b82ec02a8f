//! Label selectors
//!
//! Supports the equality-based and set-based selector grammar used on the
//! command line (`app=web,tier!=db,env in (prod,staging),!canary`), plain
//! `key: value` maps as found on a Service's `.spec.selector`, and
//! `metav1.LabelSelector` objects (`matchLabels` + `matchExpressions`).

use crate::error::SelectorError;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Equals(String, String),
    NotEquals(String, String),
    In(String, BTreeSet<String>),
    NotIn(String, BTreeSet<String>),
    Exists(String),
    DoesNotExist(String),
}

impl Requirement {
    /// Negative requirements match objects that lack the key entirely.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Requirement::Equals(k, v) => labels.get(k) == Some(v),
            Requirement::NotEquals(k, v) => labels.get(k) != Some(v),
            Requirement::In(k, values) => labels.get(k).is_some_and(|v| values.contains(v)),
            Requirement::NotIn(k, values) => !labels.get(k).is_some_and(|v| values.contains(v)),
            Requirement::Exists(k) => labels.contains_key(k),
            Requirement::DoesNotExist(k) => !labels.contains_key(k),
        }
    }

    fn parse(term: &str) -> Result<Self, SelectorError> {
        if let Some(key) = term.strip_prefix('!') {
            return Ok(Requirement::DoesNotExist(validate_key(key.trim())?));
        }

        if let Some(open) = term.find('(') {
            let head = term[..open].trim();
            let (key, operator) = head
                .rsplit_once(char::is_whitespace)
                .ok_or_else(|| SelectorError::MalformedValueSet(term.to_string()))?;
            let key = validate_key(key.trim())?;
            let values = parse_value_set(&term[open..])?;

            return match operator {
                "in" => Ok(Requirement::In(key, values)),
                "notin" => Ok(Requirement::NotIn(key, values)),
                other => Err(SelectorError::UnknownOperator {
                    key,
                    operator: other.to_string(),
                }),
            };
        }

        if let Some((key, value)) = term.split_once("!=") {
            return Ok(Requirement::NotEquals(
                validate_key(key.trim())?,
                value.trim().to_string(),
            ));
        }

        if let Some((key, value)) = term.split_once("==").or_else(|| term.split_once('=')) {
            return Ok(Requirement::Equals(
                validate_key(key.trim())?,
                value.trim().to_string(),
            ));
        }

        Ok(Requirement::Exists(validate_key(term)?))
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |values: &BTreeSet<String>| values.iter().cloned().collect::<Vec<_>>().join(",");
        match self {
            Requirement::Equals(k, v) => write!(f, "{k}={v}"),
            Requirement::NotEquals(k, v) => write!(f, "{k}!={v}"),
            Requirement::In(k, values) => write!(f, "{k} in ({})", join(values)),
            Requirement::NotIn(k, values) => write!(f, "{k} notin ({})", join(values)),
            Requirement::Exists(k) => write!(f, "{k}"),
            Requirement::DoesNotExist(k) => write!(f, "!{k}"),
        }
    }
}

/// Conjunction of requirements. The empty selector matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
}

impl LabelSelector {
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn is_everything(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    /// Equality selector from a plain `key: value` map.
    pub fn from_labels(labels: &BTreeMap<String, String>) -> Self {
        Self {
            requirements: labels
                .iter()
                .map(|(k, v)| Requirement::Equals(k.clone(), v.clone()))
                .collect(),
        }
    }

    /// Equality selector from a JSON mapping of strings (`.spec.selector` of a Service).
    ///
    /// Returns `None` when the value is not a mapping or is empty, since a
    /// missing selector must not be read as "select everything".
    pub fn from_label_map(value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        let labels: BTreeMap<String, String> = map
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
            .collect();

        if labels.is_empty() {
            None
        } else {
            Some(Self::from_labels(&labels))
        }
    }

    /// Selector from a `metav1.LabelSelector` object.
    pub fn from_label_selector(value: &Value) -> Result<Self, SelectorError> {
        let object = value
            .as_object()
            .ok_or_else(|| SelectorError::MalformedObject("expected a mapping".to_string()))?;

        let mut requirements = Vec::new();

        if let Some(match_labels) = object.get("matchLabels") {
            let match_labels = match_labels.as_object().ok_or_else(|| {
                SelectorError::MalformedObject("matchLabels must be a mapping".to_string())
            })?;
            for (key, value) in match_labels {
                let value = value.as_str().ok_or_else(|| {
                    SelectorError::MalformedObject(format!("matchLabels.{key} must be a string"))
                })?;
                requirements.push(Requirement::Equals(key.clone(), value.to_string()));
            }
        }

        if let Some(expressions) = object.get("matchExpressions") {
            let expressions = expressions.as_array().ok_or_else(|| {
                SelectorError::MalformedObject("matchExpressions must be a sequence".to_string())
            })?;
            for expression in expressions {
                requirements.push(parse_expression(expression)?);
            }
        }

        Ok(Self { requirements })
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

impl FromStr for LabelSelector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::everything());
        }

        let requirements = split_terms(s)
            .into_iter()
            .map(|term| {
                let term = term.trim();
                if term.is_empty() {
                    Err(SelectorError::EmptyRequirement(s.to_string()))
                } else {
                    Requirement::parse(term)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { requirements })
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms: Vec<String> = self.requirements.iter().map(|r| r.to_string()).collect();
        f.write_str(&terms.join(","))
    }
}

/// Split on commas that are not inside a `( ... )` value set.
fn split_terms(s: &str) -> Vec<&str> {
    let mut terms = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                terms.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    terms.push(&s[start..]);
    terms
}

fn parse_value_set(raw: &str) -> Result<BTreeSet<String>, SelectorError> {
    let inner = raw
        .trim()
        .strip_prefix('(')
        .and_then(|r| r.strip_suffix(')'))
        .ok_or_else(|| SelectorError::MalformedValueSet(raw.to_string()))?;

    Ok(inner
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect())
}

fn parse_expression(expression: &Value) -> Result<Requirement, SelectorError> {
    let key = expression
        .get("key")
        .and_then(Value::as_str)
        .ok_or_else(|| SelectorError::MalformedObject("expression without key".to_string()))?;
    let key = validate_key(key)?;
    let operator = expression
        .get("operator")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let values: BTreeSet<String> = expression
        .get("values")
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    match operator {
        "In" => Ok(Requirement::In(key, values)),
        "NotIn" => Ok(Requirement::NotIn(key, values)),
        "Exists" => Ok(Requirement::Exists(key)),
        "DoesNotExist" => Ok(Requirement::DoesNotExist(key)),
        other => Err(SelectorError::UnknownOperator {
            key,
            operator: other.to_string(),
        }),
    }
}

fn validate_key(key: &str) -> Result<String, SelectorError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'));
    if valid {
        Ok(key.to_string())
    } else {
        Err(SelectorError::InvalidKey(key.to_string()))
    }
}
