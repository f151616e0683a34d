//! Configuration management for graphward
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (`GRAPHWARD_*` prefix, highest precedence)
//! 2. graphward.local.toml (gitignored, local overrides)
//! 3. graphward.toml (git-tracked, project config)
//! 4. ~/.config/graphward/config.toml (user defaults)
//! 5. Built-in defaults (lowest precedence)
//!
//! ```toml
//! [security]
//! default_decision = "deny"
//! deny_on_store_failure = true
//! audit = true
//!
//! [policy]
//! follow_inheritance = true
//! max_inheritance_depth = 16
//! document = "policy.toml"
//! ```

use anyhow::Result;
use graphward_rbac::{ContextSettings, DEFAULT_MAX_INHERITANCE_DEPTH, DefaultDecision, PolicySettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::{LOCAL_CONFIG_FILE, PROJECT_CONFIG_FILE, Paths};

/// Main graphward configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphwardConfig {
    pub security: SecurityConfig,
    pub policy: PolicyConfig,
}

/// How security contexts decide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Outcome for labels and edge types no GRANT mentions.
    pub default_decision: DefaultDecision,
    pub deny_on_store_failure: bool,
    pub audit: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            default_decision: DefaultDecision::Allow,
            deny_on_store_failure: false,
            audit: true,
        }
    }
}

/// Where policy comes from and how roles are expanded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub follow_inheritance: bool,
    pub max_inheritance_depth: usize,
    /// Policy document (TOML, or JSON by extension). Relative to the project dir.
    pub document: Option<PathBuf>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            follow_inheritance: true,
            max_inheritance_depth: DEFAULT_MAX_INHERITANCE_DEPTH,
            document: None,
        }
    }
}

impl GraphwardConfig {
    /// A configuration that hides whatever policy does not grant.
    pub fn strict() -> Self {
        Self {
            security: SecurityConfig {
                default_decision: DefaultDecision::Deny,
                deny_on_store_failure: true,
                audit: true,
            },
            ..Default::default()
        }
    }

    pub fn context_settings(&self) -> ContextSettings {
        ContextSettings {
            default_decision: self.security.default_decision,
            deny_on_store_failure: self.security.deny_on_store_failure,
            audit: self.security.audit,
        }
    }

    pub fn policy_settings(&self) -> PolicySettings {
        PolicySettings {
            follow_inheritance: self.policy.follow_inheritance,
            max_inheritance_depth: self.policy.max_inheritance_depth,
        }
    }

    /// Resolve relative paths to absolute
    pub fn resolve_paths(&mut self, base_dir: impl AsRef<Path>) {
        if let Some(document) = &self.policy.document
            && document.is_relative()
        {
            self.policy.document = Some(base_dir.as_ref().join(document));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.policy.follow_inheritance && self.policy.max_inheritance_depth == 0 {
            return Err(ConfigError::ValidationError(
                "policy.max_inheritance_depth must be at least 1 when following inheritance"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Render as TOML, as written in graphward.toml
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
