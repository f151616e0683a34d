//! Per-request security context.
//!
//! A [`SecurityContext`] answers three questions for one principal, each
//! memoized per `(label-or-type, action)` for the lifetime of the context:
//!
//! - which row filters apply to a node label ([`SecurityContext::row_filters`])
//! - which properties are denied on a node label ([`SecurityContext::denied_properties`])
//! - which filters apply to a relationship type ([`SecurityContext::edge_filters`])
//!
//! Contexts are created and dropped within a single request. The caches use
//! `RefCell`, so a context is `!Sync` and never shared between threads.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};

use graphward_types::Principal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::filter::FilterExpression;
use crate::permissions::{GrantType, PolicyRule};
use crate::policy::ResolvedPolicy;

/// Parameter name bound to the principal id.
pub const PRINCIPAL_PARAM: &str = "security_principal";

/// Parameter name bound to the principal's role names.
pub const ROLES_PARAM: &str = "security_roles";

/// Outcome for a label or type that no GRANT rule mentions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultDecision {
    /// Unmentioned labels are unrestricted.
    #[default]
    Allow,
    /// Unmentioned labels are invisible.
    Deny,
}

/// Behavior switches for a [`SecurityContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSettings {
    pub default_decision: DefaultDecision,
    /// Hide everything when the policy load hit a store failure.
    pub deny_on_store_failure: bool,
    pub audit: bool,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            default_decision: DefaultDecision::Allow,
            deny_on_store_failure: false,
            audit: true,
        }
    }
}

/// Values bound into every secured query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityParameters {
    pub principal: String,
    pub roles: Vec<String>,
}

type CacheKey = (String, String);

fn cache_key(name: &str, action: &str) -> CacheKey {
    (name.to_string(), action.to_ascii_lowercase())
}

/// Security state for one principal during one request.
#[derive(Debug)]
pub struct SecurityContext {
    principal: Principal,
    policy: ResolvedPolicy,
    settings: ContextSettings,
    row_cache: RefCell<HashMap<CacheKey, Vec<FilterExpression>>>,
    edge_cache: RefCell<HashMap<CacheKey, Vec<FilterExpression>>>,
    property_cache: RefCell<HashMap<CacheKey, BTreeSet<String>>>,
    rule_scans: Cell<usize>,
}

impl SecurityContext {
    pub fn new(principal: Principal, policy: ResolvedPolicy, settings: ContextSettings) -> Self {
        Self {
            principal,
            policy,
            settings,
            row_cache: RefCell::new(HashMap::new()),
            edge_cache: RefCell::new(HashMap::new()),
            property_cache: RefCell::new(HashMap::new()),
            rule_scans: Cell::new(0),
        }
    }

    /// Disables audit logging (for testing).
    pub fn without_audit(mut self) -> Self {
        self.settings.audit = false;
        self
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn policy(&self) -> &ResolvedPolicy {
        &self.policy
    }

    pub fn settings(&self) -> &ContextSettings {
        &self.settings
    }

    pub fn is_superuser(&self) -> bool {
        self.principal.is_superuser
    }

    pub fn audit_enabled(&self) -> bool {
        self.settings.audit
    }

    /// Number of times the rule list has been walked.
    ///
    /// Cached lookups do not count.
    pub fn rule_scans(&self) -> usize {
        self.rule_scans.get()
    }

    /// Principal id and role names, for binding as query parameters.
    pub fn security_parameters(&self) -> SecurityParameters {
        SecurityParameters {
            principal: self.principal.id.to_string(),
            roles: self.principal.roles.clone(),
        }
    }

    /// Row filters for nodes labelled `label`.
    ///
    /// Every returned expression must hold for a node to be visible.
    pub fn row_filters(&self, label: &str, action: &str) -> Vec<FilterExpression> {
        if self.is_superuser() {
            return Vec::new();
        }

        let key = cache_key(label, action);
        if let Some(cached) = self.row_cache.borrow().get(&key) {
            debug!(label = %label, action = %action, "Row filter cache hit");
            return cached.clone();
        }

        let filters = self.build_filters("label", label, |rule| {
            rule.applies_to_node(label, action)
        });
        self.row_cache.borrow_mut().insert(key, filters.clone());
        filters
    }

    /// Filters for relationships of type `edge_type`.
    pub fn edge_filters(&self, edge_type: &str, action: &str) -> Vec<FilterExpression> {
        if self.is_superuser() {
            return Vec::new();
        }

        let key = cache_key(edge_type, action);
        if let Some(cached) = self.edge_cache.borrow().get(&key) {
            debug!(edge_type = %edge_type, action = %action, "Edge filter cache hit");
            return cached.clone();
        }

        let filters = self.build_filters("edge_type", edge_type, |rule| {
            rule.applies_to_edge(edge_type, action)
        });
        self.edge_cache.borrow_mut().insert(key, filters.clone());
        filters
    }

    /// Properties of `label` whose values must be redacted.
    pub fn denied_properties(&self, label: &str, action: &str) -> BTreeSet<String> {
        if self.is_superuser() {
            return BTreeSet::new();
        }

        let key = cache_key(label, action);
        if let Some(cached) = self.property_cache.borrow().get(&key) {
            return cached.clone();
        }

        self.rule_scans.set(self.rule_scans.get() + 1);
        let denied: BTreeSet<String> = self
            .policy
            .rules()
            .iter()
            .filter_map(|rule| rule.denied_property(label, action))
            .map(str::to_string)
            .collect();

        if self.settings.audit && !denied.is_empty() {
            warn!(
                principal = %self.principal.id,
                label = %label,
                properties = ?denied,
                "Properties redacted"
            );
        }

        self.property_cache.borrow_mut().insert(key, denied.clone());
        denied
    }

    fn build_filters(
        &self,
        kind: &'static str,
        name: &str,
        applies: impl Fn(&PolicyRule) -> bool,
    ) -> Vec<FilterExpression> {
        self.rule_scans.set(self.rule_scans.get() + 1);

        if self.policy.is_degraded() && self.settings.deny_on_store_failure {
            if self.settings.audit {
                warn!(
                    principal = %self.principal.id,
                    kind,
                    name = %name,
                    "Degraded policy, denying access"
                );
            }
            return vec![FilterExpression::Never];
        }

        let mut granted = false;
        let mut filters: Vec<FilterExpression> = Vec::new();

        for rule in self.policy.rules().iter().filter(|rule| applies(rule)) {
            if rule.grant == GrantType::Grant {
                granted = true;
            }
            if let Some(filter) = rule.row_filter()
                && !filters.contains(&filter)
            {
                filters.push(filter);
            }
        }

        if !granted && self.settings.default_decision == DefaultDecision::Deny {
            filters.push(FilterExpression::Never);
        }

        if self.settings.audit {
            if filters.iter().any(FilterExpression::is_never) {
                warn!(
                    principal = %self.principal.id,
                    kind,
                    name = %name,
                    "Access denied"
                );
            } else if !filters.is_empty() {
                info!(
                    principal = %self.principal.id,
                    kind,
                    name = %name,
                    filters = filters.len(),
                    "Access filtered"
                );
            }
        }

        filters
    }
}
