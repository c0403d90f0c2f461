//! Data passed across steps: activity parameters and the process result.
//!
//! Both are JSON-backed so they can be persisted with the step log and read
//! back after a restart, when the original Rust values are long gone.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Input container passed to both forward and backward of a step.
///
/// A snapshot is stored with every step, so later mutations by the caller
/// (e.g. adding "arg2" before the next step) never change what an earlier
/// step's compensation sees.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityParameters(BTreeMap<String, serde_json::Value>);

impl ActivityParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any previous one under the same key.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Builder-style `put`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.put(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Decode a value into a concrete type; `None` if absent or of another shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.0
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Ordered result fragments contributed by successful forward activities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessResult(Vec<serde_json::Value>);

impl ProcessResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, fragment: impl Into<serde_json::Value>) {
        self.0.push(fragment.into());
    }

    /// Append all fragments of `other`, keeping their order.
    pub fn merge(&mut self, other: ProcessResult) {
        self.0.extend(other.0);
    }

    pub fn fragments(&self) -> &[serde_json::Value] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &serde_json::Value> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parameters_put_and_typed_get() {
        let mut params = ActivityParameters::new();
        params.put("arg1", "param1").put("arg2", 42);

        assert_eq!(params.get("arg1"), Some(&json!("param1")));
        assert_eq!(params.get_as::<i64>("arg2"), Some(42));
        assert_eq!(params.get_as::<bool>("arg2"), None);
        assert_eq!(params.get_as::<i64>("missing"), None);
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn parameters_snapshot_is_independent() {
        let params = ActivityParameters::new().with("arg1", "param1");
        let snapshot = params.clone();
        let params = params.with("arg2", 42);

        assert!(!snapshot.contains_key("arg2"));
        assert!(params.contains_key("arg2"));
    }

    #[test]
    fn result_merge_keeps_order() {
        let mut result = ProcessResult::new();
        result.add("first");

        let mut fragment = ProcessResult::new();
        fragment.add(420);
        fragment.add(json!({"k": "v"}));
        result.merge(fragment);

        assert_eq!(
            result.fragments(),
            &[json!("first"), json!(420), json!({"k": "v"})]
        );
    }

    #[test]
    fn result_is_a_plain_json_array() {
        let mut result = ProcessResult::new();
        result.add(1);
        result.add("two");
        assert_eq!(serde_json::to_value(&result).unwrap(), json!([1, "two"]));
    }
}
