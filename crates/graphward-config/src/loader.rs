//! Configuration loader with multi-source merging

use crate::{GraphwardConfig, Paths};
use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
    user_config: bool,
}

impl ConfigLoader {
    /// Create a new config loader with default project directory (current dir)
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "GRAPHWARD".to_string(),
            user_config: true,
        }
    }

    /// Set the project directory
    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the environment variable prefix (default: "GRAPHWARD")
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Skip ~/.config/graphward/config.toml
    pub fn without_user_config(mut self) -> Self {
        self.user_config = false;
        self
    }

    /// Load configuration from all sources with proper precedence
    ///
    /// Environment variables use `__` between section and key, so
    /// `GRAPHWARD_SECURITY__DEFAULT_DECISION=deny` sets
    /// `security.default_decision`.
    pub fn load(self) -> Result<GraphwardConfig> {
        let mut builder = config::Config::builder();

        // 1. Start with built-in defaults
        let defaults = GraphwardConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        // 2. User config (~/.config/graphward/config.toml)
        if self.user_config
            && let Ok(user_config_file) = Paths::new().user_config_file()
            && user_config_file.exists()
        {
            builder = builder.add_source(
                config::File::from(user_config_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // 3. Project config (graphward.toml), then local overrides
        for file in [
            Paths::project_config_file(&self.project_dir),
            Paths::local_config_file(&self.project_dir),
        ] {
            if file.exists() {
                builder = builder.add_source(
                    config::File::from(file)
                        .required(false)
                        .format(config::FileFormat::Toml),
                );
            }
        }

        // 4. Environment variables (GRAPHWARD_*)
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let mut graphward_config: GraphwardConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        graphward_config.resolve_paths(&self.project_dir);
        graphward_config.validate()?;

        Ok(graphward_config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphward_rbac::DefaultDecision;
    use std::fs;
    use tempfile::tempdir;

    fn loader(dir: &Path) -> ConfigLoader {
        // A prefix nobody sets, so the developer's environment cannot leak in.
        ConfigLoader::new()
            .with_project_dir(dir)
            .with_env_prefix("GRAPHWARD_TEST_UNSET")
            .without_user_config()
    }

    #[test]
    fn test_load_defaults() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let config = loader(temp_dir.path()).load().expect("Failed to load config");

        assert_eq!(config, GraphwardConfig::default());
    }

    #[test]
    fn test_load_project_config() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        let config_content = r#"
[security]
default_decision = "deny"
deny_on_store_failure = true

[policy]
max_inheritance_depth = 4
document = "policy.toml"
"#;
        fs::write(project_dir.join("graphward.toml"), config_content)
            .expect("Failed to write config");

        let config = loader(project_dir).load().expect("Failed to load config");

        assert_eq!(config.security.default_decision, DefaultDecision::Deny);
        assert!(config.security.deny_on_store_failure);
        assert!(config.security.audit);
        assert_eq!(config.policy.max_inheritance_depth, 4);
        assert_eq!(
            config.policy.document,
            Some(project_dir.join("policy.toml"))
        );
    }

    #[test]
    fn test_local_overrides() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("graphward.toml"),
            "[security]\ndefault_decision = \"deny\"\naudit = true\n",
        )
        .expect("Failed to write project config");
        fs::write(
            project_dir.join("graphward.local.toml"),
            "[security]\naudit = false\n",
        )
        .expect("Failed to write local config");

        let config = loader(project_dir).load().expect("Failed to load config");

        assert_eq!(config.security.default_decision, DefaultDecision::Deny);
        assert!(!config.security.audit);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let project_dir = temp_dir.path();

        fs::write(
            project_dir.join("graphward.toml"),
            "[policy]\nmax_inheritance_depth = 0\n",
        )
        .expect("Failed to write config");
        assert!(loader(project_dir).load().is_err());

        fs::write(
            project_dir.join("graphward.toml"),
            "[security]\ndefault_decision = \"maybe\"\n",
        )
        .expect("Failed to write config");
        assert!(loader(project_dir).load().is_err());
    }

    // Environment variables are process-global, so they are not set here:
    //
    // GRAPHWARD_SECURITY__DEFAULT_DECISION=deny
    // GRAPHWARD_POLICY__MAX_INHERITANCE_DEPTH=8
    //
    // override the corresponding file values.
}
