//! Graphward CLI.
//!
//! Shows what a principal's policy does to a graph query, without a backend.
//!
//! # Quick Start
//!
//! ```bash
//! # Rewrite a query for a role
//! graphward --policy policy.toml rewrite \
//!     --principal alice --role restricted_analyst \
//!     "MATCH (g:Geography) RETURN g.name"
//!
//! # Show the filters a role gets for a label
//! graphward --policy policy.toml explain --role restricted_analyst --label Geography
//!
//! # Show the effective configuration
//! graphward config show --format toml
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

/// Graphward - attribute-based security for property-graph queries.
#[derive(Parser)]
#[command(name = "graphward")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project directory holding graphward.toml.
    #[arg(long, global = true, default_value = ".")]
    project: PathBuf,

    /// Policy document, overriding `policy.document` from the configuration.
    #[arg(long, global = true)]
    policy: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// The caller a command evaluates policy for.
#[derive(Args)]
struct PrincipalArgs {
    /// Principal identifier.
    #[arg(long, default_value = "cli")]
    principal: String,

    /// Assigned role (repeatable).
    #[arg(short, long = "role")]
    roles: Vec<String>,

    /// Evaluate as a superuser, bypassing policy.
    #[arg(long)]
    superuser: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information.
    Version,

    /// Rewrite a query for a principal and show what was restricted.
    Rewrite {
        /// Cypher query to rewrite.
        query: String,

        #[command(flatten)]
        who: PrincipalArgs,

        /// Output format (text, json).
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show the filters and redactions a principal gets for a label or edge type.
    Explain {
        /// Node label to explain.
        #[arg(long, required_unless_present = "edge_type", conflicts_with = "edge_type")]
        label: Option<String>,

        /// Relationship type to explain.
        #[arg(long)]
        edge_type: Option<String>,

        /// Action to evaluate.
        #[arg(short, long, default_value = "read")]
        action: String,

        #[command(flatten)]
        who: PrincipalArgs,
    },

    /// Configuration commands.
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration.
    Show {
        /// Output format (text, toml, json).
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Validate configuration files and the policy document.
    Validate,
}

fn main() -> Result<()> {
    // Logs go to stderr so command output stays parseable.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    let project = cli.project.as_path();
    let policy = cli.policy.as_deref();

    match cli.command {
        Commands::Version => {
            commands::version::run();
            Ok(())
        }
        Commands::Rewrite { query, who, format } => {
            let principal = commands::principal(who.principal, who.roles, who.superuser);
            commands::rewrite::run(project, policy, &principal, &query, &format)
        }
        Commands::Explain {
            label,
            edge_type,
            action,
            who,
        } => {
            let principal = commands::principal(who.principal, who.roles, who.superuser);
            let target = match (label, edge_type) {
                (Some(label), _) => commands::explain::Target::Label(label),
                (None, Some(edge_type)) => commands::explain::Target::EdgeType(edge_type),
                (None, None) => anyhow::bail!("either --label or --edge-type is required"),
            };
            commands::explain::run(project, policy, &principal, &target, &action)
        }
        Commands::Config(cmd) => match cmd {
            ConfigCommands::Show { format } => commands::config::show(project, policy, &format),
            ConfigCommands::Validate => commands::config::validate(project, policy),
        },
    }
}
