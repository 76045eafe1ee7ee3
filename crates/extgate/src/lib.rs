//! Extgate: extension allow-list policy
//!
//! Extgate keeps an allow-map of extension identifiers for a desktop
//! application, either in the user's settings document or in a machine-wide
//! policy key, and can uninstall installed extensions that the map does not
//! permit.
//!
//! A run goes through these steps:
//!
//! - normalize the requested add/deny/remove identifiers ([`normalize`])
//! - load the current map from a store ([`AllowMapStore`])
//! - apply the changes with fixed precedence ([`reconcile`])
//! - optionally enforce the result ([`Enforcer`])
//! - persist the map without disturbing unrelated settings
//!
//! [`PolicyRunner`] drives the whole sequence.
//!
//! ## Example
//!
//! ```rust,no_run
//! use extgate::{InstallLocations, PolicyChanges, PolicyContext, PolicyRunner, RunRequest};
//!
//! let runner = PolicyRunner::new(RunRequest {
//!     context: PolicyContext::User,
//!     changes: PolicyChanges::new().add(["ms-python.*", "redhat.java"]),
//!     remove_unapproved: true,
//!     ..RunRequest::default()
//! });
//! let report = runner.run(&InstallLocations::detect())?;
//! println!("{} rules", report.allow_map.len());
//! # Ok::<(), extgate::PolicyError>(())
//! ```

mod allow_map;
mod compliance;
mod enforce;
mod error;
mod identifier;
mod locations;
mod manager;
mod reconcile;
mod runner;
mod settings;

pub mod store;

pub use allow_map::AllowMap;
pub use compliance::{
    ComplianceDecision, ComplianceEvaluator, DenyPrecedence, MatchedRule, is_allowed,
};
pub use enforce::{EnforcementReport, Enforcer, ExtensionManager, ItemReport, Outcome};
pub use error::{ManagerError, PolicyError, StoreError};
pub use identifier::{normalize, normalize_all};
pub use locations::{InstallLocations, Platform};
pub use manager::CodeCli;
pub use reconcile::{PolicyChanges, reconcile};
pub use runner::{PolicyRunner, RunReport, RunRequest, resolve_context};
pub use settings::{SettingsDocument, strip_comments};
pub use store::{
    AllowMapStore, LoadedPolicy, PolicyContext, SystemLayout, UpdateSettings, UserSettingsStore,
};
