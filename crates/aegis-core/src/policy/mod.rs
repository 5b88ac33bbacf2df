//! Policy model: what a route does with the findings for its prompts.
//!
//! A [`Policy`] is an immutable value built from configuration. The
//! [`PolicyStore`] owns the table of configured policies and resolves one per
//! route; [`evaluate`] folds a finding list into a single [`PolicyAction`].

mod evaluator;
mod store;

pub use evaluator::evaluate;
pub use store::{PolicyStore, PolicyTable};

use crate::error::CoreError;
use crate::finding::Severity;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Id used when a route names no policy.
pub const DEFAULT_POLICY_ID: &str = "Default";

/// Default confirm-token lifetime.
pub const DEFAULT_CONFIRM_TTL_SECONDS: u64 = 120;

/// Longest confirm-token lifetime a policy may configure.
pub const MAX_CONFIRM_TTL_SECONDS: u64 = 86_400;

/// Enforcement action, totally ordered `Allow < Confirm < Block`.
///
/// The ordering is the aggregation rule: the worst action wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum PolicyAction {
    Allow,
    Confirm,
    Block,
}

impl PolicyAction {
    /// Lowercase name, as carried in the decision header.
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyAction::Allow => "allow",
            PolicyAction::Confirm => "confirm",
            PolicyAction::Block => "block",
        }
    }
}

impl FromStr for PolicyAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(PolicyAction::Allow),
            "confirm" => Ok(PolicyAction::Confirm),
            "block" => Ok(PolicyAction::Block),
            other => Err(format!("unknown policy action '{other}'")),
        }
    }
}

impl TryFrom<String> for PolicyAction {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for PolicyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Forced action for one finding type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeOverride {
    pub action: PolicyAction,
}

/// Settings of the confirm step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmOptions {
    pub ttl_seconds: u64,
}

impl Default for ConfirmOptions {
    fn default() -> Self {
        Self {
            ttl_seconds: DEFAULT_CONFIRM_TTL_SECONDS,
        }
    }
}

/// A named mapping from findings to enforcement actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    pub id: String,
    /// Applied when neither a type override nor the severity map decides.
    pub default_action: PolicyAction,
    /// Configured entries are layered over the default low/medium/high map.
    #[serde(deserialize_with = "merge_severity_defaults")]
    pub severity_to_action: HashMap<Severity, PolicyAction>,
    /// Keyed by lowercased finding type.
    #[serde(deserialize_with = "lowercase_keys")]
    pub type_overrides: HashMap<String, TypeOverride>,
    pub confirm: ConfirmOptions,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            id: DEFAULT_POLICY_ID.to_string(),
            default_action: PolicyAction::Confirm,
            severity_to_action: HashMap::from([
                (Severity::Low, PolicyAction::Allow),
                (Severity::Medium, PolicyAction::Confirm),
                (Severity::High, PolicyAction::Block),
            ]),
            type_overrides: HashMap::new(),
            confirm: ConfirmOptions::default(),
        }
    }
}

impl Policy {
    /// Default-configured policy carrying the given id.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_default_action(mut self, action: PolicyAction) -> Self {
        self.default_action = action;
        self
    }

    pub fn with_severity_action(mut self, severity: Severity, action: PolicyAction) -> Self {
        self.severity_to_action.insert(severity, action);
        self
    }

    pub fn with_type_override(mut self, finding_type: &str, action: PolicyAction) -> Self {
        self.type_overrides
            .insert(finding_type.to_ascii_lowercase(), TypeOverride { action });
        self
    }

    pub fn with_confirm_ttl(mut self, ttl_seconds: u64) -> Self {
        self.confirm.ttl_seconds = ttl_seconds;
        self
    }

    /// Action for a single finding: type override, then severity, then the default.
    pub fn resolve_action(&self, severity: Option<Severity>, finding_type: Option<&str>) -> PolicyAction {
        if let Some(kind) = finding_type.map(str::trim).filter(|t| !t.is_empty()) {
            if let Some(forced) = self.type_overrides.get(&kind.to_ascii_lowercase()) {
                return forced.action;
            }
        }

        severity
            .and_then(|s| self.severity_to_action.get(&s).copied())
            .unwrap_or(self.default_action)
    }

    /// Confirm-token lifetime, clamped to [`MAX_CONFIRM_TTL_SECONDS`].
    pub fn confirm_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.confirm.ttl_seconds.min(MAX_CONFIRM_TTL_SECONDS))
    }

    /// Reject settings that cannot be enforced.
    pub fn check(&self) -> Result<(), CoreError> {
        let ttl = self.confirm.ttl_seconds;
        if ttl == 0 || ttl > MAX_CONFIRM_TTL_SECONDS {
            return Err(CoreError::InvalidPolicy(format!(
                "policy '{}': confirm.ttl_seconds must be between 1 and {MAX_CONFIRM_TTL_SECONDS}, got {ttl}",
                self.id
            )));
        }
        Ok(())
    }
}

fn merge_severity_defaults<'de, D>(
    deserializer: D,
) -> Result<HashMap<Severity, PolicyAction>, D::Error>
where
    D: Deserializer<'de>,
{
    let configured = HashMap::<Severity, PolicyAction>::deserialize(deserializer)?;
    let mut merged = Policy::default().severity_to_action;
    merged.extend(configured);
    Ok(merged)
}

fn lowercase_keys<'de, D>(deserializer: D) -> Result<HashMap<String, TypeOverride>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = HashMap::<String, TypeOverride>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v))
        .collect())
}
