//! Semi-structured cluster objects
//!
//! A [`ResourceObject`] owns the full JSON body of one cluster object as the
//! API server returned it. The agent reads well-known fields through typed
//! accessors and forwards the rest untouched.

use crate::error::ConversionError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Back-link from a child object to its controlling parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerReference {
    pub kind: String,
    pub api_version: String,
    pub name: String,
}

/// One cluster object, validated to carry `kind`, `apiVersion` and `metadata`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResourceObject(Map<String, Value>);

impl TryFrom<Value> for ResourceObject {
    type Error = ConversionError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let map = match value {
            Value::Object(map) => map,
            other => return Err(ConversionError::NotAnObject(type_name(&other))),
        };

        if !map.get("kind").is_some_and(Value::is_string) {
            return Err(ConversionError::MissingField("kind"));
        }
        if !map.get("apiVersion").is_some_and(Value::is_string) {
            return Err(ConversionError::MissingField("apiVersion"));
        }
        if !map.get("metadata").is_some_and(Value::is_object) {
            return Err(ConversionError::MissingField("metadata"));
        }

        Ok(Self(map))
    }
}

impl ResourceObject {
    pub fn kind(&self) -> &str {
        self.str_field("kind").unwrap_or_default()
    }

    pub fn api_version(&self) -> &str {
        self.str_field("apiVersion").unwrap_or_default()
    }

    /// Namespace, or the empty string for cluster-scoped objects.
    pub fn namespace(&self) -> &str {
        self.metadata_str("namespace").unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        self.metadata_str("name").unwrap_or_default()
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.metadata_str("resourceVersion")
    }

    /// String-valued labels; entries with non-string values are skipped.
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.metadata()
            .and_then(|m| m.get("labels"))
            .and_then(Value::as_object)
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn owner_references(&self) -> Vec<OwnerReference> {
        self.metadata()
            .and_then(|m| m.get("ownerReferences"))
            .and_then(Value::as_array)
            .map(|refs| {
                refs.iter()
                    .filter_map(|r| {
                        Some(OwnerReference {
                            kind: r.get("kind")?.as_str()?.to_string(),
                            api_version: r.get("apiVersion")?.as_str()?.to_string(),
                            name: r.get("name")?.as_str()?.to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// `metadata.creationTimestamp` when present and valid RFC 3339.
    pub fn creation_timestamp(&self) -> Option<DateTime<Utc>> {
        self.metadata_str("creationTimestamp").and_then(parse_rfc3339)
    }

    /// `metadata.deletionTimestamp` when present and valid RFC 3339.
    pub fn deletion_timestamp(&self) -> Option<DateTime<Utc>> {
        self.metadata_str("deletionTimestamp").and_then(parse_rfc3339)
    }

    pub fn spec(&self) -> Option<&Value> {
        self.0.get("spec")
    }

    pub fn status(&self) -> Option<&Value> {
        self.0.get("status")
    }

    pub fn data(&self) -> Option<&Value> {
        self.0.get("data")
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Walk mapping keys from the object root.
    pub fn nested(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        rest.iter()
            .try_fold(self.0.get(*first)?, |value, key| value.get(*key))
    }

    /// Convenience for string leaves, e.g. `&["status", "podIP"]`.
    pub fn nested_str(&self, path: &[&str]) -> Option<&str> {
        self.nested(path).and_then(Value::as_str)
    }

    pub fn nested_mut(&mut self, path: &[&str]) -> Option<&mut Value> {
        let (first, rest) = path.split_first()?;
        rest.iter()
            .try_fold(self.0.get_mut(*first)?, |value, key| value.get_mut(*key))
    }

    pub fn remove_field(&mut self, name: &str) -> Option<Value> {
        self.0.remove(name)
    }

    pub fn remove_metadata_field(&mut self, name: &str) -> Option<Value> {
        self.0
            .get_mut("metadata")
            .and_then(Value::as_object_mut)
            .and_then(|m| m.remove(name))
    }

    /// Sort key used for deterministic snapshot ordering.
    pub fn sort_key(&self) -> (&str, &str) {
        (self.namespace(), self.name())
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    fn metadata(&self) -> Option<&Map<String, Value>> {
        self.0.get("metadata").and_then(Value::as_object)
    }

    fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata()
            .and_then(|m| m.get(key))
            .and_then(Value::as_str)
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }
}

fn parse_rfc3339(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}
