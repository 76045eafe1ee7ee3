//! The top-level policy run.
//!
//! A run resolves the context, normalizes the requested changes, loads the
//! current allow-map, reconciles, optionally enforces, and persists.
//! Enforcement always sees the reconciled map, so a rule added in the same
//! run is already in effect when extensions are evaluated.

use serde::{Deserialize, Serialize};

use crate::allow_map::AllowMap;
use crate::compliance::{ComplianceEvaluator, DenyPrecedence};
use crate::enforce::{EnforcementReport, Enforcer, ExtensionManager};
use crate::error::PolicyError;
use crate::locations::InstallLocations;
use crate::manager::CodeCli;
use crate::reconcile::{PolicyChanges, reconcile};
use crate::store::{
    AllowMapStore, FilePolicyKey, PolicyContext, SystemLayout, SystemPolicyStore, UpdateSettings,
    UserSettingsStore,
};

/// Everything a single run needs to know.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    /// The context asked for
    pub context: PolicyContext,
    /// Use the system context even if no machine-wide install is found
    #[serde(default)]
    pub force_system: bool,
    /// Raw (not yet normalized) changes
    #[serde(default)]
    pub changes: PolicyChanges,
    /// Uninstall extensions the resulting allow-map does not permit
    #[serde(default)]
    pub remove_unapproved: bool,
    /// Report what would change without uninstalling or persisting
    #[serde(default)]
    pub dry_run: bool,
    /// Update settings written with the allow-map
    #[serde(default)]
    pub update: UpdateSettings,
    /// How deny entries interact with allow entries during enforcement
    #[serde(default)]
    pub deny_precedence: DenyPrecedence,
    /// Value layout for the system store
    #[serde(default)]
    pub system_layout: SystemLayout,
}

impl Default for RunRequest {
    fn default() -> Self {
        Self {
            context: PolicyContext::User,
            force_system: false,
            changes: PolicyChanges::default(),
            remove_unapproved: false,
            dry_run: false,
            update: UpdateSettings::default(),
            deny_precedence: DenyPrecedence::default(),
            system_layout: SystemLayout::default(),
        }
    }
}

/// The result of a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// The context asked for
    pub requested_context: PolicyContext,
    /// The context actually used
    pub context: PolicyContext,
    /// True if System was requested but User was used
    pub fell_back: bool,
    /// The normalized changes that were applied
    pub changes: PolicyChanges,
    /// The allow-map after reconciliation
    pub allow_map: AllowMap,
    /// Recoverable problems met during the run
    pub warnings: Vec<String>,
    /// Enforcement results, if removal was requested
    pub enforcement: Option<EnforcementReport>,
    /// Whether the allow-map was written back
    pub persisted: bool,
    /// Why writing the allow-map back failed, if it did
    pub persist_error: Option<String>,
}

impl RunReport {
    /// Returns true if an uninstall or the final write failed.
    pub fn has_failures(&self) -> bool {
        self.persist_error.is_some()
            || self.enforcement.as_ref().is_some_and(|e| e.has_failures())
    }
}

/// Pick the context to use.
///
/// System is honoured only when the machine-wide install exists or when
/// forced. Returns the context and whether a fallback to User happened.
pub fn resolve_context(
    requested: PolicyContext,
    force_system: bool,
    system_install_present: bool,
) -> (PolicyContext, bool) {
    if force_system {
        return (PolicyContext::System, false);
    }
    match requested {
        PolicyContext::System if !system_install_present => (PolicyContext::User, true),
        other => (other, false),
    }
}

/// Runs one policy request against a store.
#[derive(Clone, Debug, Default)]
pub struct PolicyRunner {
    request: RunRequest,
}

impl PolicyRunner {
    /// Create a runner for `request`.
    pub fn new(request: RunRequest) -> Self {
        Self { request }
    }

    /// The request being run.
    pub fn request(&self) -> &RunRequest {
        &self.request
    }

    /// Run against the stores at `locations`, discovering the extension
    /// manager from the same locations when removal is requested.
    pub fn run(&self, locations: &InstallLocations) -> Result<RunReport, PolicyError> {
        let manager = if self.request.remove_unapproved {
            CodeCli::discover(locations.extension_manager_candidates.as_slice())
        } else {
            None
        };
        if self.request.remove_unapproved && manager.is_none() {
            tracing::warn!("extension manager not found, unapproved extensions will not be removed");
        }
        self.run_with(
            locations,
            manager.as_ref().map(|m| m as &dyn ExtensionManager),
        )
    }

    /// Run against the stores at `locations` with an explicit manager.
    pub fn run_with(
        &self,
        locations: &InstallLocations,
        manager: Option<&dyn ExtensionManager>,
    ) -> Result<RunReport, PolicyError> {
        let (context, fell_back) = resolve_context(
            self.request.context,
            self.request.force_system,
            locations.system_install_present(),
        );

        let mut report = match context {
            PolicyContext::User => {
                self.apply(&UserSettingsStore::new(&locations.user_settings), manager)?
            }
            PolicyContext::System => {
                let key = FilePolicyKey::new(&locations.system_policy);
                self.apply(
                    &SystemPolicyStore::new(key, self.request.system_layout),
                    manager,
                )?
            }
        };

        report.requested_context = self.request.context;
        report.fell_back = fell_back;
        if fell_back {
            let warning = format!(
                "system install not found at {}, applying policy to the user context",
                locations.system_install_dir.display()
            );
            tracing::warn!("{warning}");
            report.warnings.insert(0, warning);
        }
        Ok(report)
    }

    /// Load, reconcile, optionally enforce, and persist using `store`.
    ///
    /// Load failures abort the run before anything changes. A persist
    /// failure happens after enforcement, so it is recorded in the report
    /// alongside the enforcement results instead of being returned.
    pub fn apply<S, M>(&self, store: &S, manager: Option<&M>) -> Result<RunReport, PolicyError>
    where
        S: AllowMapStore,
        M: ExtensionManager + ?Sized,
    {
        let context = store.context();
        let changes = self.request.changes.normalized();
        let loaded = store.load()?;

        let map = reconcile(loaded.map, &changes);
        tracing::debug!(
            context = %context,
            added = changes.add.len(),
            denied = changes.deny.len(),
            removed = changes.remove.len(),
            entries = map.len(),
            "reconciled allow-map"
        );

        let enforcement = self.request.remove_unapproved.then(|| {
            Enforcer::new(ComplianceEvaluator::new(self.request.deny_precedence))
                .dry_run(self.request.dry_run)
                .enforce(&map, manager)
        });

        let mut warnings = loaded.warnings;
        let mut persist_error = None;
        let persisted = if self.request.dry_run {
            tracing::info!(context = %context, "dry run, allow-map not persisted");
            false
        } else {
            match store.persist(&map, loaded.carrier, &self.request.update) {
                Ok(()) => true,
                Err(e) => {
                    tracing::error!(context = %context, error = %e, "failed to persist allow-map");
                    warnings.push(format!("allow-map not saved: {e}"));
                    persist_error = Some(e.to_string());
                    false
                }
            }
        };

        tracing::info!(
            context = %context,
            entries = map.len(),
            removed = enforcement.as_ref().map_or(0, |e| e.removed().count()),
            "policy applied"
        );

        Ok(RunReport {
            requested_context: context,
            context,
            fell_back: false,
            changes,
            allow_map: map,
            warnings,
            enforcement,
            persisted,
            persist_error,
        })
    }
}
