//! Policy table and per-route resolution.

use super::{Policy, DEFAULT_POLICY_ID};
use crate::error::CoreError;
use crate::route::RouteConfig;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Immutable, case-insensitive table of configured policies.
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    policies: HashMap<String, Policy>,
}

impl PolicyTable {
    /// Build a table from `id -> policy` pairs. Each policy's `id` is set to
    /// its key; ids that differ only in case are rejected.
    pub fn from_map<I>(entries: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = (String, Policy)>,
    {
        let mut policies = HashMap::new();
        for (id, mut policy) in entries {
            let id = id.trim().to_string();
            if id.is_empty() {
                return Err(CoreError::InvalidPolicy("policy id must not be empty".to_string()));
            }
            policy.id = id.clone();
            policy.check()?;
            if policies.insert(id.to_ascii_lowercase(), policy).is_some() {
                return Err(CoreError::InvalidPolicy(format!(
                    "policy '{id}' is defined more than once (ids are case-insensitive)"
                )));
            }
        }
        Ok(Self { policies })
    }

    pub fn get(&self, id: &str) -> Option<&Policy> {
        self.policies.get(&id.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.policies.values().map(|p| p.id.as_str())
    }
}

/// Resolves the policy for a route.
///
/// Readers take an `Arc` snapshot of the current table, so a reload swaps the
/// whole table at once and never blocks in-flight requests for longer than the
/// pointer swap.
#[derive(Debug, Default)]
pub struct PolicyStore {
    table: RwLock<Arc<PolicyTable>>,
}

impl PolicyStore {
    pub fn new(table: PolicyTable) -> Self {
        Self {
            table: RwLock::new(Arc::new(table)),
        }
    }

    /// Current table snapshot.
    pub fn snapshot(&self) -> Arc<PolicyTable> {
        match self.table.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Swap in a new table (configuration reload).
    pub fn replace(&self, table: PolicyTable) {
        let table = Arc::new(table);
        match self.table.write() {
            Ok(mut guard) => *guard = table,
            Err(poisoned) => *poisoned.into_inner() = table,
        }
    }

    /// Resolve the policy for `route` (or for no route at all).
    ///
    /// The returned value always carries the id that was looked up. An unknown
    /// id yields a default-configured policy under that id, so enforcement
    /// still falls back to the cautious default action; the miss is logged.
    pub fn policy_for_route(&self, route: Option<&RouteConfig>) -> Policy {
        let policy_id = route
            .and_then(RouteConfig::policy_id)
            .unwrap_or(DEFAULT_POLICY_ID);

        let table = self.snapshot();
        match table.get(policy_id) {
            Some(policy) => Policy {
                id: policy_id.to_string(),
                ..policy.clone()
            },
            None => {
                tracing::warn!(
                    policy_id,
                    route_id = route.map(|r| r.id.as_str()),
                    "policy not configured; enforcing default policy settings"
                );
                Policy::with_id(policy_id)
            }
        }
    }

    /// Whether `id` names a configured policy.
    pub fn contains(&self, id: &str) -> bool {
        self.snapshot().get(id).is_some()
    }
}
