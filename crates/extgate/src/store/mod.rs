//! Backing stores for the allow-map.
//!
//! A store loads the current allow-map together with an opaque carrier, and
//! persists a new allow-map using that carrier. The carrier lets a store
//! write back everything it read that this crate does not own:
//!
//! - [`UserSettingsStore`] carries the whole per-user settings document so
//!   unrelated settings survive a run unchanged.
//! - [`SystemPolicyStore`] is stateless; its carrier is `()`.
//!
//! Corrupt content never fails a load. It is logged, reported through
//! [`LoadedPolicy::warnings`], and treated as empty.

mod key;
mod system;
mod user;

use serde::{Deserialize, Serialize};

use crate::allow_map::AllowMap;
use crate::error::StoreError;

pub use key::{FilePolicyKey, MemoryPolicyKey, PolicyKey, PolicyValue};
pub use system::{SystemLayout, SystemPolicyStore};
pub use user::UserSettingsStore;

/// The scope a policy is applied to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyContext {
    /// The current user's settings document
    User,
    /// The machine-wide policy key
    System,
}

impl std::fmt::Display for PolicyContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyContext::User => write!(f, "user"),
            PolicyContext::System => write!(f, "system"),
        }
    }
}

/// Update-related settings written alongside the allow-map.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSettings {
    /// Whether extensions update automatically
    pub auto_update: bool,
    /// Whether the application checks for extension updates
    pub auto_check_updates: bool,
    /// Whether the extension gallery is enabled (system legacy layout only)
    pub gallery_enabled: bool,
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            auto_update: true,
            auto_check_updates: true,
            gallery_enabled: true,
        }
    }
}

/// An allow-map as read from a store.
#[derive(Debug)]
pub struct LoadedPolicy<C> {
    /// The allow-map found in the store (empty if absent or corrupt)
    pub map: AllowMap,
    /// Store-specific state needed to persist without losing data
    pub carrier: C,
    /// Recoverable problems found while loading
    pub warnings: Vec<String>,
}

/// A backing store for the allow-map.
pub trait AllowMapStore {
    /// State carried from `load` to `persist`.
    type Carrier;

    /// The context this store serves.
    fn context(&self) -> PolicyContext;

    /// Load the current allow-map.
    ///
    /// Fails only if the store exists but cannot be accessed.
    fn load(&self) -> Result<LoadedPolicy<Self::Carrier>, StoreError>;

    /// Persist `map` and the update settings, preserving the carrier.
    fn persist(
        &self,
        map: &AllowMap,
        carrier: Self::Carrier,
        settings: &UpdateSettings,
    ) -> Result<(), StoreError>;
}

pub(crate) fn log_warnings(location: &str, warnings: &[String]) {
    for warning in warnings {
        tracing::warn!(location = %location, "{warning}");
    }
}
