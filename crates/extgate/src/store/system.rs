//! Allow-map store backed by the machine-wide policy key.

use serde::{Deserialize, Serialize};

use super::key::{PolicyKey, PolicyValue};
use super::{AllowMapStore, LoadedPolicy, PolicyContext, UpdateSettings, log_warnings};
use crate::allow_map::AllowMap;
use crate::error::StoreError;

/// Value layout used inside the system policy key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemLayout {
    /// `AllowedExtensions` holds the full tri-state map. Update settings are
    /// left alone.
    #[default]
    Managed,
    /// `extensions.allowed` holds only allowed entries, and update settings
    /// are written as 0/1 values next to it.
    Legacy,
}

impl SystemLayout {
    /// Name of the value holding the serialized allow-map.
    pub fn allow_map_value(&self) -> &'static str {
        match self {
            SystemLayout::Managed => "AllowedExtensions",
            SystemLayout::Legacy => "extensions.allowed",
        }
    }
}

/// Value names for update settings in the legacy layout.
pub const AUTO_UPDATE_VALUE: &str = "extensions.autoUpdate";
/// See [`AUTO_UPDATE_VALUE`].
pub const AUTO_CHECK_UPDATES_VALUE: &str = "extensions.autoCheckUpdates";
/// See [`AUTO_UPDATE_VALUE`].
pub const GALLERY_ENABLED_VALUE: &str = "extensions.gallery.enabled";

/// Stores the allow-map as compact JSON text in a policy key.
#[derive(Debug)]
pub struct SystemPolicyStore<K: PolicyKey> {
    key: K,
    layout: SystemLayout,
}

impl<K: PolicyKey> SystemPolicyStore<K> {
    /// Create a store over `key` using `layout`.
    pub fn new(key: K, layout: SystemLayout) -> Self {
        Self { key, layout }
    }

    /// The underlying policy key.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// The value layout in use.
    pub fn layout(&self) -> SystemLayout {
        self.layout
    }

    fn parse_value(&self, value: Option<PolicyValue>) -> (AllowMap, Vec<String>) {
        let name = self.layout.allow_map_value();
        match value {
            None => (AllowMap::new(), Vec::new()),
            Some(PolicyValue::String(text)) if text.trim().is_empty() => (AllowMap::new(), Vec::new()),
            Some(PolicyValue::String(text)) => match serde_json::from_str(&text) {
                Ok(json) => AllowMap::from_json_lenient(&json),
                Err(e) => (
                    AllowMap::new(),
                    vec![format!("{name} could not be parsed ({e}), treating as empty")],
                ),
            },
            Some(PolicyValue::Dword(_)) => (
                AllowMap::new(),
                vec![format!("{name} is not a string value, treating as empty")],
            ),
        }
    }
}

impl<K: PolicyKey> AllowMapStore for SystemPolicyStore<K> {
    type Carrier = ();

    fn context(&self) -> PolicyContext {
        PolicyContext::System
    }

    fn load(&self) -> Result<LoadedPolicy<()>, StoreError> {
        let value = self.key.get(self.layout.allow_map_value())?;
        let (map, warnings) = self.parse_value(value);
        log_warnings(&self.key.location(), &warnings);

        tracing::debug!(
            key = %self.key.location(),
            layout = ?self.layout,
            entries = map.len(),
            "loaded system policy"
        );

        Ok(LoadedPolicy {
            map,
            carrier: (),
            warnings,
        })
    }

    fn persist(
        &self,
        map: &AllowMap,
        _carrier: (),
        settings: &UpdateSettings,
    ) -> Result<(), StoreError> {
        let stored = match self.layout {
            SystemLayout::Managed => map.clone(),
            SystemLayout::Legacy => map.iter().filter(|(_, allowed)| *allowed).collect(),
        };
        let text = serde_json::to_string(&stored.to_json())?;
        self.key
            .set(self.layout.allow_map_value(), PolicyValue::String(text))?;

        match self.layout {
            SystemLayout::Managed => {
                tracing::debug!("update settings are not written by the managed layout");
            }
            SystemLayout::Legacy => {
                self.key
                    .set(AUTO_UPDATE_VALUE, PolicyValue::flag(settings.auto_update))?;
                self.key.set(
                    AUTO_CHECK_UPDATES_VALUE,
                    PolicyValue::flag(settings.auto_check_updates),
                )?;
                self.key.set(
                    GALLERY_ENABLED_VALUE,
                    PolicyValue::flag(settings.gallery_enabled),
                )?;
            }
        }

        tracing::debug!(
            key = %self.key.location(),
            layout = ?self.layout,
            entries = stored.len(),
            "persisted system policy"
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::MemoryPolicyKey;

    #[test]
    fn test_missing_value_is_empty() {
        let store = SystemPolicyStore::new(MemoryPolicyKey::new(), SystemLayout::Managed);
        let loaded = store.load().unwrap();
        assert!(loaded.map.is_empty());
        assert!(loaded.warnings.is_empty());
    }

    #[test]
    fn test_corrupt_value_is_recoverable() {
        let key = MemoryPolicyKey::new()
            .with_value("AllowedExtensions", PolicyValue::String("{oops".into()));
        let store = SystemPolicyStore::new(key, SystemLayout::Managed);
        let loaded = store.load().unwrap();
        assert!(loaded.map.is_empty());
        assert_eq!(loaded.warnings.len(), 1);
    }

    #[test]
    fn test_wrong_type_is_recoverable() {
        let key = MemoryPolicyKey::new().with_value("AllowedExtensions", PolicyValue::Dword(1));
        let store = SystemPolicyStore::new(key, SystemLayout::Managed);
        let loaded = store.load().unwrap();
        assert!(loaded.map.is_empty());
        assert_eq!(loaded.warnings.len(), 1);
    }

    #[test]
    fn test_managed_roundtrip_keeps_denies() {
        let store = SystemPolicyStore::new(MemoryPolicyKey::new(), SystemLayout::Managed);
        let map: AllowMap = [("good", true), ("bad.ext", false)].into_iter().collect();
        store.persist(&map, (), &UpdateSettings::default()).unwrap();

        assert_eq!(
            store.key().get("AllowedExtensions").unwrap(),
            Some(PolicyValue::String(r#"{"bad.ext":false,"good":true}"#.into()))
        );
        assert_eq!(store.key().get(AUTO_UPDATE_VALUE).unwrap(), None);
        assert_eq!(store.load().unwrap().map, map);
    }

    #[test]
    fn test_legacy_writes_only_allowed_and_flags() {
        let store = SystemPolicyStore::new(MemoryPolicyKey::new(), SystemLayout::Legacy);
        let map: AllowMap = [("good", true), ("bad.ext", false)].into_iter().collect();
        let settings = UpdateSettings {
            auto_update: false,
            auto_check_updates: true,
            gallery_enabled: false,
        };
        store.persist(&map, (), &settings).unwrap();

        let values = store.key().values();
        assert_eq!(
            values.get("extensions.allowed"),
            Some(&PolicyValue::String(r#"{"good":true}"#.into()))
        );
        assert_eq!(values.get(AUTO_UPDATE_VALUE), Some(&PolicyValue::Dword(0)));
        assert_eq!(values.get(AUTO_CHECK_UPDATES_VALUE), Some(&PolicyValue::Dword(1)));
        assert_eq!(values.get(GALLERY_ENABLED_VALUE), Some(&PolicyValue::Dword(0)));
        assert!(!values.contains_key("AllowedExtensions"));
    }
}
