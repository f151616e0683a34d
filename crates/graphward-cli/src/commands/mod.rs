//! CLI command implementations.

pub mod config;
pub mod explain;
pub mod rewrite;
pub mod version;

use std::path::Path;

use anyhow::{Context, Result};
use graphward::{
    ConfigLoader, GraphwardConfig, MemoryPolicyStore, PolicyManager, Principal,
};

/// Loads the configuration for `project`, applying a `--policy` override.
pub fn load_config(project: &Path, policy: Option<&Path>) -> Result<GraphwardConfig> {
    let mut config = ConfigLoader::new()
        .with_project_dir(project)
        .load()
        .context("Failed to load configuration")?;
    if let Some(policy) = policy {
        config.policy.document = Some(policy.to_path_buf());
    }
    Ok(config)
}

/// Builds a policy manager over the configured policy document.
///
/// Without a document every principal gets an empty policy.
pub fn open_manager(config: &GraphwardConfig) -> Result<PolicyManager<MemoryPolicyStore>> {
    let store = match &config.policy.document {
        Some(path) => MemoryPolicyStore::load(path)
            .with_context(|| format!("Failed to load policy document {}", path.display()))?,
        None => {
            tracing::warn!("No policy document configured, using an empty policy");
            MemoryPolicyStore::new()
        }
    };
    Ok(PolicyManager::new(store)
        .with_settings(config.policy_settings())
        .with_context_settings(config.context_settings()))
}

pub fn principal(id: String, roles: Vec<String>, superuser: bool) -> Principal {
    let principal = if superuser {
        Principal::superuser(id)
    } else {
        Principal::new(id)
    };
    principal.with_roles(roles)
}
