//! Policy resolution.
//!
//! The [`PolicyManager`] turns a principal's roles into a [`ResolvedPolicy`]:
//! the de-duplicated set of rules reachable from those roles. Loading never
//! fails; a store failure yields a degraded policy instead.

use std::collections::HashSet;

use graphward_types::Principal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::context::{ContextSettings, SecurityContext};
use crate::permissions::PolicyRule;
use crate::roles::{DEFAULT_MAX_INHERITANCE_DEPTH, expand_roles};
use crate::store::{PolicyStore, StoreError};

/// How roles are resolved during a policy load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySettings {
    /// Walk `INHERITS_FROM` edges from each assigned role.
    pub follow_inheritance: bool,
    pub max_inheritance_depth: usize,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            follow_inheritance: true,
            max_inheritance_depth: DEFAULT_MAX_INHERITANCE_DEPTH,
        }
    }
}

/// The rules in effect for one principal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedPolicy {
    rules: Vec<PolicyRule>,
    roles: Vec<String>,
    degraded: bool,
}

impl ResolvedPolicy {
    /// A policy with no rules.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a policy from rules, keeping the first rule of each name.
    pub fn from_rules(rules: impl IntoIterator<Item = PolicyRule>) -> Self {
        let mut policy = Self::empty();
        policy.extend(rules);
        policy
    }

    /// Marks the policy as loaded from a failing store.
    pub fn mark_degraded(mut self) -> Self {
        self.degraded = true;
        self
    }

    fn extend(&mut self, rules: impl IntoIterator<Item = PolicyRule>) {
        let mut seen: HashSet<String> = self.rules.iter().map(|r| r.name.clone()).collect();
        for rule in rules {
            if seen.insert(rule.name.clone()) {
                self.rules.push(rule);
            }
        }
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    /// Roles the rules were collected from, inherited ones included.
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Returns whether some store read failed during the load.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }
}

/// Resolves principals to policies against a [`PolicyStore`].
#[derive(Debug, Clone)]
pub struct PolicyManager<S> {
    store: S,
    settings: PolicySettings,
    context_settings: ContextSettings,
}

impl<S: PolicyStore> PolicyManager<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            settings: PolicySettings::default(),
            context_settings: ContextSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: PolicySettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the settings handed to every context this manager creates.
    pub fn with_context_settings(mut self, settings: ContextSettings) -> Self {
        self.context_settings = settings;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &PolicySettings {
        &self.settings
    }

    pub fn context_settings(&self) -> &ContextSettings {
        &self.context_settings
    }

    /// Loads every rule reachable from the principal's roles.
    ///
    /// Never fails. Unknown roles contribute nothing; store failures yield an
    /// empty contribution and mark the result degraded.
    pub fn load_policy(&self, principal: &Principal) -> ResolvedPolicy {
        let mut policy = ResolvedPolicy::empty();

        let roles = if self.settings.follow_inheritance {
            let expansion =
                expand_roles(&self.store, &principal.roles, self.settings.max_inheritance_depth);
            policy.degraded |= expansion.degraded;
            expansion.roles
        } else {
            principal.roles.clone()
        };

        for role in &roles {
            let records = match self.store.permissions_for_role(role) {
                Ok(records) => records,
                Err(StoreError::Partial { records, reason }) => {
                    error!(
                        principal = %principal.id,
                        role = %role,
                        kept = records.len(),
                        reason = %reason,
                        "Unreadable permissions skipped, continuing with degraded policy"
                    );
                    policy.degraded = true;
                    records
                }
                Err(e) => {
                    error!(
                        principal = %principal.id,
                        role = %role,
                        error = %e,
                        "Policy store failure, continuing with degraded policy"
                    );
                    policy.degraded = true;
                    continue;
                }
            };

            let rules = records.into_iter().filter_map(|record| {
                let name = record.name.clone();
                match PolicyRule::try_from(record) {
                    Ok(rule) => Some(rule),
                    Err(e) => {
                        warn!(permission = %name, role = %role, error = %e, "Skipping permission");
                        None
                    }
                }
            });
            policy.extend(rules);
        }

        policy.roles = roles;

        debug!(
            principal = %principal.id,
            rules = policy.len(),
            degraded = policy.degraded,
            "Policy loaded"
        );

        policy
    }

    /// Creates a per-request security context for `principal`.
    ///
    /// No policy is loaded for a superuser.
    pub fn context_for(&self, principal: &Principal) -> SecurityContext {
        if principal.is_superuser {
            info!(principal = %principal.id, "Superuser context, policy bypassed");
            return SecurityContext::new(
                principal.clone(),
                ResolvedPolicy::empty(),
                self.context_settings,
            );
        }

        let policy = self.load_policy(principal);
        SecurityContext::new(principal.clone(), policy, self.context_settings)
    }
}
