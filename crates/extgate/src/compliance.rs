//! Compliance decisions for installed extensions.

use serde::{Deserialize, Serialize};

use crate::allow_map::AllowMap;

/// How explicit `false` entries interact with broader `true` entries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyPrecedence {
    /// Any matching `true` rule allows. Deny entries only document intent.
    #[default]
    AllowWins,
    /// Any matching `false` rule denies, even if a `true` rule also matches.
    DenyWins,
}

/// The rule that matched an identifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "key", rename_all = "snake_case")]
pub enum MatchedRule {
    /// The full identifier is listed
    Exact(String),
    /// The identifier's publisher is listed
    Publisher(String),
}

impl MatchedRule {
    /// The allow-map key that matched.
    pub fn key(&self) -> &str {
        match self {
            MatchedRule::Exact(k) | MatchedRule::Publisher(k) => k,
        }
    }
}

impl std::fmt::Display for MatchedRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchedRule::Exact(k) => write!(f, "{k}"),
            MatchedRule::Publisher(k) => write!(f, "{k}.*"),
        }
    }
}

/// The result of a compliance check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ComplianceDecision {
    /// The identifier is permitted by the given rule.
    Allow(MatchedRule),
    /// The identifier is not permitted, with a reason.
    Deny(String),
}

impl ComplianceDecision {
    /// Returns true if the identifier is permitted.
    pub fn is_allowed(&self) -> bool {
        matches!(self, ComplianceDecision::Allow(_))
    }

    /// Returns the denial reason if denied, None if allowed.
    pub fn denial_reason(&self) -> Option<&str> {
        match self {
            ComplianceDecision::Allow(_) => None,
            ComplianceDecision::Deny(reason) => Some(reason),
        }
    }
}

/// Evaluates installed identifiers against an allow-map.
///
/// Matching is case-insensitive. A key matches an identifier if it equals
/// the identifier or if the identifier starts with the key followed by `.`
/// (publisher match). An empty map permits nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct ComplianceEvaluator {
    precedence: DenyPrecedence,
}

impl ComplianceEvaluator {
    /// Create an evaluator with the given deny precedence.
    pub fn new(precedence: DenyPrecedence) -> Self {
        Self { precedence }
    }

    /// The configured deny precedence.
    pub fn precedence(&self) -> DenyPrecedence {
        self.precedence
    }

    /// Decide whether `installed_id` is permitted under `map`.
    pub fn decide(&self, installed_id: &str, map: &AllowMap) -> ComplianceDecision {
        let id = installed_id.to_lowercase();

        let mut allow: Option<MatchedRule> = None;
        let mut deny: Option<MatchedRule> = None;

        for (key, allowed) in map.iter() {
            let Some(rule) = match_rule(&id, key) else {
                continue;
            };
            let slot = if allowed { &mut allow } else { &mut deny };
            // Prefer an exact match over a publisher match.
            if slot.is_none() || matches!(rule, MatchedRule::Exact(_)) {
                *slot = Some(rule);
            }
        }

        match (allow, deny, self.precedence) {
            (_, Some(rule), DenyPrecedence::DenyWins) => {
                ComplianceDecision::Deny(format!("explicitly denied by {rule}"))
            }
            (Some(rule), _, _) => ComplianceDecision::Allow(rule),
            (None, Some(rule), _) => {
                ComplianceDecision::Deny(format!("explicitly denied by {rule}"))
            }
            (None, None, _) if map.is_empty() => {
                ComplianceDecision::Deny("allow-list is empty".to_string())
            }
            (None, None, _) => ComplianceDecision::Deny("not in allow-list".to_string()),
        }
    }

    /// Returns true if `installed_id` is permitted under `map`.
    pub fn is_allowed(&self, installed_id: &str, map: &AllowMap) -> bool {
        self.decide(installed_id, map).is_allowed()
    }
}

/// Returns true if `installed_id` is permitted under `map` with the default
/// precedence (any matching allow rule wins).
pub fn is_allowed(installed_id: &str, map: &AllowMap) -> bool {
    ComplianceEvaluator::default().is_allowed(installed_id, map)
}

fn match_rule(lower_id: &str, key: &str) -> Option<MatchedRule> {
    let lower_key = key.to_lowercase();
    if lower_id == lower_key {
        return Some(MatchedRule::Exact(key.to_string()));
    }
    lower_id
        .strip_prefix(lower_key.as_str())
        .filter(|rest| rest.starts_with('.'))
        .map(|_| MatchedRule::Publisher(key.to_string()))
}
