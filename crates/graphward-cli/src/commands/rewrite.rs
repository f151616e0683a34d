//! Query rewrite command.

use std::path::Path;

use anyhow::{Context, Result};
use graphward::{Principal, QueryRewriter, Rewrite};
use serde_json::json;

use super::{load_config, open_manager};

/// Rewrites `query` for `principal` and prints the result.
pub fn run(
    project: &Path,
    policy: Option<&Path>,
    principal: &Principal,
    query: &str,
    format: &str,
) -> Result<()> {
    let config = load_config(project, policy)?;
    let manager = open_manager(&config)?;
    let context = manager.context_for(principal);

    let rewrite = QueryRewriter::new()
        .rewrite(query, &context)
        .context("Query cannot be secured")?;

    if context.policy().is_degraded() {
        eprintln!("warning: policy is degraded, some roles could not be read");
    }

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&to_json(&rewrite))?),
        _ => print_text(&rewrite),
    }
    Ok(())
}

fn to_json(rewrite: &Rewrite) -> serde_json::Value {
    json!({
        "query": rewrite.query,
        "added_predicates": rewrite.added_predicates,
        "removed_columns": rewrite
            .removed_columns
            .iter()
            .map(|c| json!({"name": c.name, "position": c.position}))
            .collect::<Vec<_>>(),
        "denied_properties": rewrite.denied_properties,
        "placeholder": rewrite.placeholder,
    })
}

fn print_text(rewrite: &Rewrite) {
    println!("{}", rewrite.query);

    if !rewrite.added_predicates.is_empty() {
        println!();
        println!("Added predicates:");
        for predicate in &rewrite.added_predicates {
            println!("  {predicate}");
        }
    }

    if !rewrite.removed_columns.is_empty() {
        println!();
        println!("Redacted columns:");
        for column in &rewrite.removed_columns {
            println!("  {} (position {})", column.name, column.position);
        }
    }

    if !rewrite.denied_properties.is_empty() {
        println!();
        println!("Denied properties:");
        for (alias, properties) in &rewrite.denied_properties {
            let list: Vec<&str> = properties.iter().map(String::as_str).collect();
            println!("  {alias}: {}", list.join(", "));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphward::RemovedColumn;

    #[test]
    fn test_json_shape() {
        let mut rewrite = Rewrite::passthrough("MATCH (b:BalanceSheet) RETURN b.product_name");
        rewrite.removed_columns.push(RemovedColumn {
            name: "b.price".into(),
            position: 1,
        });
        rewrite
            .denied_properties
            .entry("b".into())
            .or_default()
            .insert("price".into());

        let value = to_json(&rewrite);
        assert_eq!(value["query"], rewrite.query);
        assert_eq!(value["removed_columns"][0]["name"], "b.price");
        assert_eq!(value["removed_columns"][0]["position"], 1);
        assert_eq!(value["denied_properties"]["b"][0], "price");
        assert_eq!(value["placeholder"], false);
    }
}
