//! Key-value primitives for the system policy store.
//!
//! A policy key is a flat set of named, typed values, the shape of a
//! registry key under a policies hive. Two implementations are provided: an
//! in-memory key and a key persisted as a single JSON file.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// A typed value stored under a policy key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PolicyValue {
    /// A string value
    String(String),
    /// A 32-bit integer value, used for booleans as 0/1
    Dword(u32),
}

impl PolicyValue {
    /// A 0/1 integer value for a boolean.
    pub fn flag(enabled: bool) -> Self {
        PolicyValue::Dword(u32::from(enabled))
    }
}

/// Read/write access to the values of one policy key.
pub trait PolicyKey: Send + Sync {
    /// Read a named value. Returns `None` if it does not exist.
    fn get(&self, name: &str) -> Result<Option<PolicyValue>, StoreError>;

    /// Create or replace a named value.
    fn set(&self, name: &str, value: PolicyValue) -> Result<(), StoreError>;

    /// Human-readable location of the key, for logs.
    fn location(&self) -> String;
}

/// A policy key held in memory.
#[derive(Debug, Default)]
pub struct MemoryPolicyKey {
    values: RwLock<BTreeMap<String, PolicyValue>>,
}

impl MemoryPolicyKey {
    /// Create an empty key.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a key pre-populated with one value.
    pub fn with_value(self, name: impl Into<String>, value: PolicyValue) -> Self {
        if let Ok(mut values) = self.values.write() {
            values.insert(name.into(), value);
        }
        self
    }

    /// Snapshot of all values.
    pub fn values(&self) -> BTreeMap<String, PolicyValue> {
        self.values.read().map(|v| v.clone()).unwrap_or_default()
    }
}

impl PolicyKey for MemoryPolicyKey {
    fn get(&self, name: &str) -> Result<Option<PolicyValue>, StoreError> {
        let values = self
            .values
            .read()
            .map_err(|_| StoreError::Key("policy key lock poisoned".to_string()))?;
        Ok(values.get(name).cloned())
    }

    fn set(&self, name: &str, value: PolicyValue) -> Result<(), StoreError> {
        let mut values = self
            .values
            .write()
            .map_err(|_| StoreError::Key("policy key lock poisoned".to_string()))?;
        values.insert(name.to_string(), value);
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

/// A policy key persisted as a JSON file.
///
/// The file holds an object mapping value names to `{"type", "value"}`
/// pairs. A missing file is an empty key and is created on the first write.
/// A file that cannot be parsed is logged and read as an empty key.
#[derive(Clone, Debug)]
pub struct FilePolicyKey {
    path: PathBuf,
}

impl FilePolicyKey {
    /// Create a key backed by `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, PolicyValue>, StoreError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };
        if text.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        match serde_json::from_str(&text) {
            Ok(values) => Ok(values),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "policy key file is corrupt, treating as empty"
                );
                Ok(BTreeMap::new())
            }
        }
    }

    fn write_all(&self, values: &BTreeMap<String, PolicyValue>) -> Result<(), StoreError> {
        let text = serde_json::to_string_pretty(values)?;
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
        writeln!(tmp, "{text}").map_err(|e| StoreError::io(dir, e))?;
        tmp.persist(&self.path)
            .map_err(|e| StoreError::io(&self.path, e.error))?;
        Ok(())
    }
}

impl PolicyKey for FilePolicyKey {
    fn get(&self, name: &str) -> Result<Option<PolicyValue>, StoreError> {
        Ok(self.read_all()?.remove(name))
    }

    fn set(&self, name: &str, value: PolicyValue) -> Result<(), StoreError> {
        let mut values = self.read_all()?;
        values.insert(name.to_string(), value);
        self.write_all(&values)
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}
