//! Policy explanation command.

use std::path::Path;

use anyhow::Result;
use graphward::{FilterExpression, Principal};

use super::{load_config, open_manager};

/// What to explain.
pub enum Target {
    Label(String),
    EdgeType(String),
}

/// Prints the filters and redactions `principal` gets for `target`.
pub fn run(
    project: &Path,
    policy: Option<&Path>,
    principal: &Principal,
    target: &Target,
    action: &str,
) -> Result<()> {
    let config = load_config(project, policy)?;
    let manager = open_manager(&config)?;
    let context = manager.context_for(principal).without_audit();

    println!("Principal: {}", principal.id);
    if principal.is_superuser {
        println!("  Superuser: policy bypassed");
        return Ok(());
    }
    let roles = context.policy().roles();
    println!(
        "  Roles: {}",
        if roles.is_empty() {
            "(none)".to_string()
        } else {
            roles.join(", ")
        }
    );
    println!("  Rules: {}", context.policy().len());
    if context.policy().is_degraded() {
        println!("  Degraded: yes");
    }
    println!();

    match target {
        Target::Label(label) => {
            println!("Label {label} ({action}):");
            print_filters(&context.row_filters(label, action));
            let denied = context.denied_properties(label, action);
            if denied.is_empty() {
                println!("  Redacted properties: none");
            } else {
                let list: Vec<&str> = denied.iter().map(String::as_str).collect();
                println!("  Redacted properties: {}", list.join(", "));
            }
        }
        Target::EdgeType(edge_type) => {
            println!("Edge type {edge_type} ({action}):");
            print_filters(&context.edge_filters(edge_type, action));
        }
    }
    Ok(())
}

fn print_filters(filters: &[FilterExpression]) {
    if filters.is_empty() {
        println!("  Filters: none (visible)");
    } else if filters.iter().any(FilterExpression::is_never) {
        println!("  Filters: false (hidden)");
    } else {
        println!("  Filters:");
        for filter in filters {
            println!("    {filter}");
        }
    }
}
