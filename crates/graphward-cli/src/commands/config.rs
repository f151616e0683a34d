//! Configuration management commands.

use std::path::Path;

use anyhow::Result;
use graphward_config::Paths;

use super::{load_config, open_manager};

/// Show the effective configuration.
pub fn show(project: &Path, policy: Option<&Path>, format: &str) -> Result<()> {
    let config = load_config(project, policy)?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&config)?),
        "toml" => println!("{}", config.to_toml()?),
        _ => {
            println!("Graphward Configuration");
            println!("=======================\n");

            println!("Security:");
            println!("  Default decision: {:?}", config.security.default_decision);
            println!(
                "  Deny on store failure: {}",
                config.security.deny_on_store_failure
            );
            println!("  Audit: {}", config.security.audit);
            println!();

            println!("Policy:");
            println!("  Follow inheritance: {}", config.policy.follow_inheritance);
            println!(
                "  Max inheritance depth: {}",
                config.policy.max_inheritance_depth
            );
            println!(
                "  Document: {}",
                config
                    .policy
                    .document
                    .as_ref()
                    .map_or("None".to_string(), |p| p.display().to_string())
            );
        }
    }

    Ok(())
}

/// Validate configuration files and the policy document they name.
pub fn validate(project: &Path, policy: Option<&Path>) -> Result<()> {
    println!("Validating configuration in {}...", project.display());
    if !Paths::is_configured(project) {
        println!("  No {} found, using defaults", graphward_config::PROJECT_CONFIG_FILE);
    }

    let config = match load_config(project, policy) {
        Ok(config) => config,
        Err(e) => {
            println!("✗ Configuration validation failed:");
            println!("  {e:#}");
            return Err(e);
        }
    };
    println!("✓ Configuration is valid");

    if config.policy.document.is_some() {
        if let Err(e) = open_manager(&config) {
            println!("✗ Policy document is invalid:");
            println!("  {e:#}");
            return Err(e);
        }
        println!("✓ Policy document is valid");
    }
    Ok(())
}
