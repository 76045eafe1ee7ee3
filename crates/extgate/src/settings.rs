//! The per-user settings document.
//!
//! The settings file is JSON with comments. It is parsed after a textual
//! pre-pass that removes `/* ... */` block comments, `//` line comments and
//! trailing commas. The pre-pass is purely lexical: a `//` or `/*` inside a
//! string value (a URL, say) is removed too, which usually makes the
//! document unparseable and therefore treated as empty. This is a known
//! limitation of the pre-pass, not something the parser corrects.
//!
//! Every key the document holds is kept in its original order and passed
//! through unchanged; only the keys listed below are written by this crate.

use regex_lite::Regex;
use serde_json::{Map, Value};

use crate::allow_map::AllowMap;

/// Key holding the allow-map.
pub const ALLOWED_KEY: &str = "extensions.allowed";
/// Key holding the auto-update toggle.
pub const AUTO_UPDATE_KEY: &str = "extensions.autoUpdate";
/// Key holding the auto-check-updates toggle.
pub const AUTO_CHECK_UPDATES_KEY: &str = "extensions.autoCheckUpdates";
/// Key holding the ignore-recommendations toggle (always written `true`).
pub const IGNORE_RECOMMENDATIONS_KEY: &str = "extensions.ignoreRecommendations";

const BLOCK_COMMENT: &str = r"(?s)/\*.*?\*/";
const LINE_COMMENT: &str = r"//[^\n]*";
const TRAILING_COMMA: &str = r",(\s*[}\]])";

/// Remove comments and trailing commas from JSON-with-comments text.
///
/// Block comments are removed first, then line comments, then any comma
/// directly followed (ignoring whitespace) by `}` or `]`. None of these
/// passes know about string literals.
pub fn strip_comments(text: &str) -> Result<String, regex_lite::Error> {
    let block = Regex::new(BLOCK_COMMENT)?;
    let line = Regex::new(LINE_COMMENT)?;
    let trailing = Regex::new(TRAILING_COMMA)?;

    let out = block.replace_all(text, "");
    let out = line.replace_all(&out, "");
    Ok(trailing.replace_all(&out, "$1").into_owned())
}

/// An open-ended, ordered settings document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SettingsDocument {
    root: Map<String, Value>,
}

impl SettingsDocument {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse settings text, never failing.
    ///
    /// Empty text, text that does not parse after the pre-pass, or a
    /// top-level value that is not an object all produce an empty document
    /// plus a warning.
    pub fn parse_lenient(text: &str) -> (Self, Vec<String>) {
        let mut warnings = Vec::new();
        let stripped = match strip_comments(text) {
            Ok(stripped) => stripped,
            Err(e) => {
                warnings.push(format!(
                    "comment pre-pass failed ({e}), parsing settings as plain JSON"
                ));
                text.to_string()
            }
        };
        if stripped.trim().is_empty() {
            warnings.push("settings document is empty, starting from an empty document".to_string());
            return (Self::new(), warnings);
        }

        match serde_json::from_str::<Value>(&stripped) {
            Ok(Value::Object(root)) => return (Self { root }, warnings),
            Ok(_) => warnings.push(
                "settings document is not a JSON object, starting from an empty document"
                    .to_string(),
            ),
            Err(e) => warnings.push(format!(
                "settings document could not be parsed ({e}), starting from an empty document"
            )),
        }
        (Self::new(), warnings)
    }

    /// Get a setting by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.root.get(key)
    }

    /// Set a setting, keeping its position if it already exists.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.root.insert(key.into(), value);
    }

    /// Number of top-level settings.
    pub fn len(&self) -> usize {
        self.root.len()
    }

    /// Returns true if the document holds no settings.
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Iterate over the settings in document order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.root.iter()
    }

    /// Extract the allow-map, if the document has one.
    pub fn allow_map(&self) -> (AllowMap, Vec<String>) {
        match self.root.get(ALLOWED_KEY) {
            Some(value) => AllowMap::from_json_lenient(value),
            None => (AllowMap::new(), Vec::new()),
        }
    }

    /// Serialize as pretty-printed JSON.
    pub fn to_pretty_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.root)
    }
}

impl From<Map<String, Value>> for SettingsDocument {
    fn from(root: Map<String, Value>) -> Self {
        Self { root }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_strip_comments_output() {
        let text = "/* a */{\"x\": 1, // b\n\"y\": [2,],\n}";
        assert_eq!(strip_comments(text).unwrap(), "{\"x\": 1, \n\"y\": [2]\n}");
    }

    #[test]
    fn test_strip_line_comments() {
        let text = "{\n  // leading\n  \"a\": 1 // trailing\n}";
        let (doc, warnings) = SettingsDocument::parse_lenient(text);
        assert!(warnings.is_empty());
        assert_eq!(doc.get("a"), Some(&json!(1)));
    }

    #[test]
    fn test_strip_block_comments() {
        let text = "/* header\n spanning lines */ {\"a\": /* inline */ true}";
        let (doc, warnings) = SettingsDocument::parse_lenient(text);
        assert!(warnings.is_empty());
        assert_eq!(doc.get("a"), Some(&json!(true)));
    }

    #[test]
    fn test_trailing_commas_tolerated() {
        let text = "{\"a\": [1, 2,], \"b\": {\"c\": true,},\n}";
        let (doc, warnings) = SettingsDocument::parse_lenient(text);
        assert!(warnings.is_empty(), "{warnings:?}");
        assert_eq!(doc.get("a"), Some(&json!([1, 2])));
        assert_eq!(doc.len(), 2);
    }

    #[test]
    fn test_comment_like_text_in_strings_is_stripped() {
        // Known limitation: the pre-pass is not string-aware.
        let text = r#"{"url": "https://example.com"}"#;
        let (doc, warnings) = SettingsDocument::parse_lenient(text);
        assert!(doc.is_empty());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_corrupt_yields_empty_with_warning() {
        let (doc, warnings) = SettingsDocument::parse_lenient("{ not json at all");
        assert!(doc.is_empty());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_empty_yields_empty_with_warning() {
        let (doc, warnings) = SettingsDocument::parse_lenient("  \n");
        assert!(doc.is_empty());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_non_object_yields_empty() {
        let (doc, warnings) = SettingsDocument::parse_lenient("[1, 2, 3]");
        assert!(doc.is_empty());
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_preserves_key_order() {
        let text = r#"{"zeta": 1, "alpha": 2, "mid": {"y": 1, "x": 2}}"#;
        let (doc, _) = SettingsDocument::parse_lenient(text);
        let keys: Vec<_> = doc.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);

        let out = serde_json::to_string(doc.get("mid").unwrap()).unwrap();
        assert_eq!(out, r#"{"y":1,"x":2}"#);
    }

    #[test]
    fn test_allow_map_extraction() {
        let text = r#"{"extensions.allowed": {"ms-python": true, "evil.x": false}}"#;
        let (doc, _) = SettingsDocument::parse_lenient(text);
        let (map, warnings) = doc.allow_map();
        assert!(warnings.is_empty());
        assert_eq!(map.get("ms-python"), Some(true));
        assert_eq!(map.get("evil.x"), Some(false));
    }

    #[test]
    fn test_allow_map_absent() {
        let (doc, _) = SettingsDocument::parse_lenient(r#"{"editor.fontSize": 14}"#);
        let (map, warnings) = doc.allow_map();
        assert!(map.is_empty());
        assert!(warnings.is_empty());
    }
}
