//! Merging add/deny/remove operations onto an allow-map.

use serde::{Deserialize, Serialize};

use crate::allow_map::AllowMap;
use crate::identifier::normalize_all;

/// A batch of changes to apply to an allow-map.
///
/// Lists are applied in a fixed order, later lists winning: `add`, then
/// `deny`, then `remove`. An identifier named in more than one list ends in
/// the state of the last list that names it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyChanges {
    /// Identifiers to mark as allowed
    #[serde(default)]
    pub add: Vec<String>,
    /// Identifiers to mark as denied
    #[serde(default)]
    pub deny: Vec<String>,
    /// Identifiers to forget entirely
    #[serde(default)]
    pub remove: Vec<String>,
}

impl PolicyChanges {
    /// Create an empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add identifiers to allow.
    pub fn add<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Add identifiers to deny.
    pub fn deny<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deny.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Add identifiers to remove.
    pub fn remove<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.remove.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Normalize every list, dropping blank entries.
    pub fn normalized(&self) -> Self {
        Self {
            add: normalize_all(&self.add),
            deny: normalize_all(&self.deny),
            remove: normalize_all(&self.remove),
        }
    }

    /// Returns true if no list has any entry.
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.deny.is_empty() && self.remove.is_empty()
    }
}

/// Apply `changes` onto `map` and return the result.
///
/// Identifiers are used as given; callers normalize first (see
/// [`PolicyChanges::normalized`]). Existing entries are matched ignoring
/// case, so a deny or remove written in a different case than the stored
/// key still takes effect.
pub fn reconcile(mut map: AllowMap, changes: &PolicyChanges) -> AllowMap {
    for id in &changes.add {
        map.allow(id.as_str());
    }
    for id in &changes.deny {
        map.deny(id.as_str());
    }
    for id in &changes.remove {
        if map.remove(id).is_some() {
            tracing::debug!(id = %id, "removed allow-map entry");
        }
    }
    map
}
