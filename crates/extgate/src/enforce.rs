//! Uninstalling installed extensions that the allow-map does not permit.

use serde::Serialize;

use crate::allow_map::AllowMap;
use crate::compliance::{ComplianceDecision, ComplianceEvaluator, MatchedRule};
use crate::error::ManagerError;

/// The application's extension manager.
///
/// Implementations report failures as values; the enforcement engine never
/// inspects process-specific error details.
pub trait ExtensionManager {
    /// Identifiers of the currently installed extensions.
    fn list_installed(&self) -> Result<Vec<String>, ManagerError>;

    /// Uninstall one extension.
    fn uninstall(&self, id: &str) -> Result<(), ManagerError>;
}

/// What happened to one installed extension.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Outcome {
    /// Permitted, left installed
    Kept {
        /// The allow-map rule that permits it
        rule: MatchedRule,
    },
    /// Not permitted and uninstalled
    Uninstalled {
        /// Why it was not permitted
        reason: String,
    },
    /// Not permitted; would be uninstalled outside a dry run
    WouldUninstall {
        /// Why it is not permitted
        reason: String,
    },
    /// Not permitted, but uninstalling failed
    Failed {
        /// Why it is not permitted
        reason: String,
        /// The uninstall error
        error: String,
    },
}

impl Outcome {
    /// Returns true if the extension was or would be removed.
    pub fn is_removal(&self) -> bool {
        matches!(
            self,
            Outcome::Uninstalled { .. } | Outcome::WouldUninstall { .. }
        )
    }
}

/// The outcome for one installed extension.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ItemReport {
    /// Installed identifier as reported by the extension manager
    pub id: String,
    /// What happened to it
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Per-item results of an enforcement pass.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EnforcementReport {
    /// False if no extension manager was available or listing failed
    pub performed: bool,
    /// One entry per installed extension, in listing order
    pub items: Vec<ItemReport>,
}

impl EnforcementReport {
    fn skipped() -> Self {
        Self::default()
    }

    /// Identifiers that were (or would be) uninstalled.
    pub fn removed(&self) -> impl Iterator<Item = &str> {
        self.items
            .iter()
            .filter(|i| i.outcome.is_removal())
            .map(|i| i.id.as_str())
    }

    /// Items whose uninstall failed.
    pub fn failures(&self) -> impl Iterator<Item = &ItemReport> {
        self.items
            .iter()
            .filter(|i| matches!(i.outcome, Outcome::Failed { .. }))
    }

    /// Returns true if any uninstall failed.
    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }
}

/// Drives the extension manager to remove non-compliant extensions.
#[derive(Clone, Copy, Debug, Default)]
pub struct Enforcer {
    evaluator: ComplianceEvaluator,
    dry_run: bool,
}

impl Enforcer {
    /// Create an enforcer using `evaluator` for compliance decisions.
    pub fn new(evaluator: ComplianceEvaluator) -> Self {
        Self {
            evaluator,
            dry_run: false,
        }
    }

    /// Report removals without uninstalling anything.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Evaluate every installed extension and uninstall the ones `map` does
    /// not permit.
    ///
    /// Without a manager nothing happens. A failure to list or to uninstall
    /// is recorded and never aborts the pass: each item is independent.
    pub fn enforce<M: ExtensionManager + ?Sized>(
        &self,
        map: &AllowMap,
        manager: Option<&M>,
    ) -> EnforcementReport {
        let Some(manager) = manager else {
            tracing::debug!("no extension manager available, skipping enforcement");
            return EnforcementReport::skipped();
        };

        let installed = match manager.list_installed() {
            Ok(installed) => installed,
            Err(e) => {
                tracing::warn!(error = %e, "could not list installed extensions, skipping enforcement");
                return EnforcementReport::skipped();
            }
        };

        if map.is_empty() && !installed.is_empty() {
            tracing::warn!(
                installed = installed.len(),
                "allow-list is empty, every installed extension is non-compliant"
            );
        }

        let items = installed
            .into_iter()
            .map(|id| {
                let outcome = self.apply(&id, map, manager);
                ItemReport { id, outcome }
            })
            .collect();

        EnforcementReport {
            performed: true,
            items,
        }
    }

    fn apply<M: ExtensionManager + ?Sized>(
        &self,
        id: &str,
        map: &AllowMap,
        manager: &M,
    ) -> Outcome {
        let reason = match self.evaluator.decide(id, map) {
            ComplianceDecision::Allow(rule) => {
                tracing::debug!(id = %id, rule = %rule, "extension permitted");
                return Outcome::Kept { rule };
            }
            ComplianceDecision::Deny(reason) => reason,
        };

        if self.dry_run {
            tracing::info!(id = %id, reason = %reason, "would uninstall extension");
            return Outcome::WouldUninstall { reason };
        }

        match manager.uninstall(id) {
            Ok(()) => {
                tracing::info!(id = %id, reason = %reason, "uninstalled extension");
                Outcome::Uninstalled { reason }
            }
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "failed to uninstall extension");
                Outcome::Failed {
                    reason,
                    error: e.to_string(),
                }
            }
        }
    }
}
