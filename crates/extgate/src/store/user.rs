//! Allow-map store backed by the per-user settings document.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::{AllowMapStore, LoadedPolicy, PolicyContext, UpdateSettings, log_warnings};
use crate::allow_map::AllowMap;
use crate::error::StoreError;
use crate::settings::{
    ALLOWED_KEY, AUTO_CHECK_UPDATES_KEY, AUTO_UPDATE_KEY, IGNORE_RECOMMENDATIONS_KEY,
    SettingsDocument,
};

/// Stores the allow-map under `extensions.allowed` in the user's settings file.
///
/// The settings file is created empty if it does not exist. Writes go to a
/// temporary file in the same directory which then replaces the original.
/// Comments in the original file are not preserved.
#[derive(Clone, Debug)]
pub struct UserSettingsStore {
    path: PathBuf,
}

impl UserSettingsStore {
    /// Create a store for the settings file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the settings file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }

    /// Read the settings text, creating an empty file if there is none.
    /// Invalid UTF-8 is replaced and reported as a warning.
    fn read_or_create(&self) -> Result<(String, Option<String>), StoreError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(text) => Ok((text, None)),
                Err(e) => {
                    let warning = format!(
                        "settings file is not valid UTF-8 (at byte {}), \
                         invalid bytes will be replaced when saved",
                        e.utf8_error().valid_up_to()
                    );
                    Ok((String::from_utf8_lossy(e.as_bytes()).into_owned(), Some(warning)))
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let dir = self.parent_dir();
                std::fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
                std::fs::File::create(&self.path).map_err(|e| StoreError::io(&self.path, e))?;
                tracing::debug!(path = %self.path.display(), "created empty settings file");
                Ok((String::new(), None))
            }
            Err(e) => Err(StoreError::io(&self.path, e)),
        }
    }
}

impl AllowMapStore for UserSettingsStore {
    type Carrier = SettingsDocument;

    fn context(&self) -> PolicyContext {
        PolicyContext::User
    }

    fn load(&self) -> Result<LoadedPolicy<SettingsDocument>, StoreError> {
        let (text, encoding_warning) = self.read_or_create()?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(&text);

        let (document, parse_warnings) = SettingsDocument::parse_lenient(text);
        let (map, map_warnings) = document.allow_map();
        let warnings: Vec<String> = encoding_warning
            .into_iter()
            .chain(parse_warnings)
            .chain(map_warnings)
            .collect();
        log_warnings(&self.path.display().to_string(), &warnings);

        tracing::debug!(
            path = %self.path.display(),
            settings = document.len(),
            entries = map.len(),
            "loaded user settings"
        );

        Ok(LoadedPolicy {
            map,
            carrier: document,
            warnings,
        })
    }

    fn persist(
        &self,
        map: &AllowMap,
        mut carrier: SettingsDocument,
        settings: &UpdateSettings,
    ) -> Result<(), StoreError> {
        carrier.set(ALLOWED_KEY, map.to_json());
        carrier.set(AUTO_UPDATE_KEY, Value::Bool(settings.auto_update));
        carrier.set(AUTO_CHECK_UPDATES_KEY, Value::Bool(settings.auto_check_updates));
        carrier.set(IGNORE_RECOMMENDATIONS_KEY, Value::Bool(true));

        let text = carrier.to_pretty_string()?;
        let dir = self.parent_dir();
        std::fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| StoreError::io(dir, e))?;
        writeln!(tmp, "{text}").map_err(|e| StoreError::io(dir, e))?;
        tmp.persist(&self.path)
            .map_err(|e| StoreError::io(&self.path, e.error))?;

        tracing::debug!(
            path = %self.path.display(),
            entries = map.len(),
            "persisted user settings"
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> UserSettingsStore {
        UserSettingsStore::new(dir.path().join("User").join("settings.json"))
    }

    #[test]
    fn test_load_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let loaded = store.load().unwrap();
        assert!(loaded.map.is_empty());
        assert!(loaded.carrier.is_empty());
        assert!(store.path().exists());
    }

    #[test]
    fn test_load_corrupt_is_recoverable() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "this is { not json").unwrap();

        let loaded = store.load().unwrap();
        assert!(loaded.map.is_empty());
        assert_eq!(loaded.warnings.len(), 1);
    }

    #[test]
    fn test_load_with_bom_and_comments() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(
            store.path(),
            "\u{feff}{\n  // allow-list\n  \"extensions.allowed\": {\"ms-python\": true},\n}",
        )
        .unwrap();

        let loaded = store.load().unwrap();
        assert!(loaded.warnings.is_empty(), "{:?}", loaded.warnings);
        assert_eq!(loaded.map.get("ms-python"), Some(true));
    }

    #[test]
    fn test_load_invalid_utf8_warns() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(
            store.path(),
            b"{\"name\": \"caf\xe9\", \"extensions.allowed\": {\"a.b\": true}}",
        )
        .unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.warnings.len(), 1, "{:?}", loaded.warnings);
        assert!(loaded.warnings[0].contains("not valid UTF-8"));
        assert_eq!(loaded.map.get("a.b"), Some(true));
        assert_eq!(loaded.carrier.get("name"), Some(&json!("caf\u{fffd}")));
    }

    #[test]
    fn test_persist_preserves_unrelated_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(
            store.path(),
            r#"{"editor.fontSize": 14, "workbench.colorTheme": "Default Dark+", "nested": {"b": [1, 2], "a": null}}"#,
        )
        .unwrap();

        let loaded = store.load().unwrap();
        let mut map = loaded.map.clone();
        map.allow("microsoft");
        store
            .persist(&map, loaded.carrier, &UpdateSettings::default())
            .unwrap();

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.map.get("microsoft"), Some(true));
        assert_eq!(reloaded.carrier.get("editor.fontSize"), Some(&json!(14)));
        assert_eq!(
            reloaded.carrier.get("workbench.colorTheme"),
            Some(&json!("Default Dark+"))
        );
        assert_eq!(
            reloaded.carrier.get("nested"),
            Some(&json!({"b": [1, 2], "a": null}))
        );
        let keys: Vec<_> = reloaded.carrier.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(&keys[..3], &["editor.fontSize", "workbench.colorTheme", "nested"]);
    }

    #[test]
    fn test_persist_writes_owned_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        let loaded = store.load().unwrap();

        let settings = UpdateSettings {
            auto_update: false,
            auto_check_updates: true,
            gallery_enabled: true,
        };
        store
            .persist(&AllowMap::new(), loaded.carrier, &settings)
            .unwrap();

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.carrier.get(ALLOWED_KEY), Some(&json!({})));
        assert_eq!(reloaded.carrier.get(AUTO_UPDATE_KEY), Some(&json!(false)));
        assert_eq!(reloaded.carrier.get(AUTO_CHECK_UPDATES_KEY), Some(&json!(true)));
        assert_eq!(
            reloaded.carrier.get(IGNORE_RECOMMENDATIONS_KEY),
            Some(&json!(true))
        );
    }
}
