//! CLI tests that run the binary against policy and config files.

#![allow(deprecated)] // Command::cargo_bin is deprecated but replacement requires newer assert_cmd

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const POLICY: &str = r#"
[[permissions]]
name = "deny:france"
resource = "node"
action = "read"
grant_type = "DENY"
node_label = "Geography"
property_filter = { name = "France" }

[[permissions]]
name = "deny:price"
resource = "property"
action = "read"
grant_type = "DENY"
node_label = "BalanceSheet"
property_name = "price"

[[roles]]
name = "restricted_analyst"
permissions = ["deny:france"]

[[roles]]
name = "clerk"
permissions = ["deny:price"]
"#;

fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("policy.toml"), POLICY).unwrap();
    dir
}

fn graphward(project: &Path) -> Command {
    let mut cmd = Command::cargo_bin("graphward").unwrap();
    cmd.arg("--project").arg(project);
    cmd
}

// ============================================================================
// Basics
// ============================================================================

#[test]
fn version_command_succeeds() {
    Command::cargo_bin("graphward")
        .unwrap()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("graphward"));
}

#[test]
fn help_flag_shows_usage() {
    Command::cargo_bin("graphward")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("attribute-based"));
}

#[test]
fn no_command_shows_help() {
    Command::cargo_bin("graphward")
        .unwrap()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

// ============================================================================
// Rewrite
// ============================================================================

#[test]
fn rewrite_adds_row_filter() {
    let dir = project();
    graphward(dir.path())
        .args(["--policy", "policy.toml"])
        .current_dir(dir.path())
        .args(["rewrite", "--role", "restricted_analyst"])
        .arg("MATCH (g:Geography) RETURN g.name")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "MATCH (g:Geography) WHERE NOT (g.name = 'France') RETURN g.name",
        ));
}

#[test]
fn rewrite_reports_redacted_columns() {
    let dir = project();
    graphward(dir.path())
        .arg("--policy")
        .arg(dir.path().join("policy.toml"))
        .args(["rewrite", "--role", "clerk"])
        .arg("MATCH (b:BalanceSheet) RETURN b.product_name, b.price")
        .assert()
        .success()
        .stdout(predicate::str::contains("RETURN b.product_name\n"))
        .stdout(predicate::str::contains("b.price (position 1)"));
}

#[test]
fn rewrite_superuser_is_unchanged() {
    let dir = project();
    graphward(dir.path())
        .arg("--policy")
        .arg(dir.path().join("policy.toml"))
        .args(["rewrite", "--superuser", "--role", "restricted_analyst"])
        .arg("MATCH (g:Geography) RETURN g.name")
        .assert()
        .success()
        .stdout("MATCH (g:Geography) RETURN g.name\n");
}

#[test]
fn rewrite_json_output() {
    let dir = project();
    graphward(dir.path())
        .arg("--policy")
        .arg(dir.path().join("policy.toml"))
        .args(["rewrite", "--role", "restricted_analyst", "--format", "json"])
        .arg("MATCH (g:Geography) RETURN g.name")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"added_predicates\""))
        .stdout(predicate::str::contains("NOT (g.name = 'France')"));
}

#[test]
fn rewrite_rejects_unsupported_query() {
    let dir = project();
    graphward(dir.path())
        .arg("--policy")
        .arg(dir.path().join("policy.toml"))
        .args(["rewrite", "--role", "restricted_analyst"])
        .arg("MATCH (g:Geography) WITH g RETURN g.name")
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be secured"));
}

#[test]
fn rewrite_missing_policy_document_fails() {
    let dir = TempDir::new().unwrap();
    graphward(dir.path())
        .arg("--policy")
        .arg(dir.path().join("absent.toml"))
        .args(["rewrite", "MATCH (g:Geography) RETURN g.name"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load policy document"));
}

// ============================================================================
// Explain
// ============================================================================

#[test]
fn explain_label_shows_filters_and_redactions() {
    let dir = project();
    graphward(dir.path())
        .arg("--policy")
        .arg(dir.path().join("policy.toml"))
        .args(["explain", "--role", "restricted_analyst", "--role", "clerk"])
        .args(["--label", "BalanceSheet"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Roles: restricted_analyst, clerk"))
        .stdout(predicate::str::contains("Redacted properties: price"));
}

#[test]
fn explain_requires_target() {
    let dir = project();
    graphward(dir.path())
        .args(["explain", "--role", "clerk"])
        .assert()
        .failure();
}

// ============================================================================
// Config
// ============================================================================

#[test]
fn config_show_reads_project_file() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("graphward.toml"),
        "[security]\ndefault_decision = \"deny\"\n",
    )
    .unwrap();

    graphward(dir.path())
        .args(["config", "show", "--format", "toml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("default_decision = \"deny\""));
}

#[test]
fn config_validate_rejects_zero_depth() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("graphward.toml"),
        "[policy]\nmax_inheritance_depth = 0\n",
    )
    .unwrap();

    graphward(dir.path())
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("validation failed"));
}
