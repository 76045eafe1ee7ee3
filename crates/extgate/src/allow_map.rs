//! The allow-map: identifier to allowed/denied.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

/// Mapping from normalized identifier to an explicit decision.
///
/// `true` means explicitly allowed, `false` explicitly denied. An identifier
/// that is absent is "not mentioned". Keys keep the spelling they were last
/// written with, but no two keys are equal ignoring case: writing an
/// identifier replaces any entry that differs from it only in case.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AllowMap {
    entries: BTreeMap<String, bool>,
}

impl AllowMap {
    /// Create an empty allow-map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the explicit decision for an identifier, ignoring case.
    pub fn get(&self, id: &str) -> Option<bool> {
        self.entries.get(id).copied().or_else(|| {
            let folded = id.to_lowercase();
            self.entries
                .iter()
                .find(|(key, _)| key.to_lowercase() == folded)
                .map(|(_, allowed)| *allowed)
        })
    }

    /// Mark an identifier as allowed.
    pub fn allow(&mut self, id: impl Into<String>) {
        self.set(id.into(), true);
    }

    /// Mark an identifier as denied.
    pub fn deny(&mut self, id: impl Into<String>) {
        self.set(id.into(), false);
    }

    /// Forget an identifier in every spelling. Returns the previous
    /// decision, if any.
    pub fn remove(&mut self, id: &str) -> Option<bool> {
        let mut previous = None;
        for key in self.keys_folding_to(id) {
            previous = self.entries.remove(&key).or(previous);
        }
        previous
    }

    /// Write a decision, replacing entries that differ only in case. Returns
    /// the spellings that were replaced.
    fn set(&mut self, id: String, allowed: bool) -> Vec<String> {
        let replaced: Vec<String> = self
            .keys_folding_to(&id)
            .into_iter()
            .filter(|key| *key != id)
            .collect();
        for key in &replaced {
            self.entries.remove(key);
        }
        self.entries.insert(id, allowed);
        replaced
    }

    fn keys_folding_to(&self, id: &str) -> Vec<String> {
        let folded = id.to_lowercase();
        self.entries
            .keys()
            .filter(|key| key.to_lowercase() == folded)
            .cloned()
            .collect()
    }

    /// Iterate over `(identifier, allowed)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Identifiers explicitly allowed.
    pub fn allowed(&self) -> impl Iterator<Item = &str> {
        self.iter().filter(|(_, v)| *v).map(|(k, _)| k)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build an allow-map from a loosely-typed JSON value.
    ///
    /// Non-object values yield an empty map and non-boolean entries are
    /// skipped. Keys that differ only in case are merged, the later one in
    /// document order winning. Each skipped or merged item is described in
    /// the returned warnings.
    pub fn from_json_lenient(value: &Value) -> (Self, Vec<String>) {
        let mut map = Self::new();
        let mut warnings = Vec::new();

        let Some(object) = value.as_object() else {
            warnings.push(format!(
                "allow-map is not an object (found {}), treating as empty",
                json_kind(value)
            ));
            return (map, warnings);
        };

        for (key, entry) in object {
            match entry.as_bool() {
                Some(allowed) => {
                    for replaced in map.set(key.clone(), allowed) {
                        warnings.push(format!(
                            "allow-map entry {key:?} replaces {replaced:?}, keys differ only in case"
                        ));
                    }
                }
                None => warnings.push(format!(
                    "ignoring allow-map entry {key:?}: expected boolean, found {}",
                    json_kind(entry)
                )),
            }
        }

        (map, warnings)
    }

    /// Convert to a JSON object.
    pub fn to_json(&self) -> Value {
        let object: Map<String, Value> = self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), Value::Bool(*v)))
            .collect();
        Value::Object(object)
    }
}

impl<K: Into<String>> FromIterator<(K, bool)> for AllowMap {
    fn from_iter<T: IntoIterator<Item = (K, bool)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (id, allowed) in iter {
            map.set(id.into(), allowed);
        }
        map
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
