//! # graphward-types: Core types for `graphward`
//!
//! Shared types used across the workspace:
//! - Principal identity ([`PrincipalId`], [`Principal`])
//! - Scalar policy values ([`Scalar`])
//! - Cypher literal rendering ([`quote_identifier`], [`string_literal`])

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

// ============================================================================
// Principal
// ============================================================================

/// Identifier of an authenticated caller, as produced by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PrincipalId(String);

impl PrincipalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PrincipalId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PrincipalId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// An authenticated identity evaluated against policy.
///
/// A superuser bypasses every filter; no rule is ever evaluated for one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub roles: Vec<String>,
    #[serde(default)]
    pub is_superuser: bool,
}

impl Principal {
    /// Creates a regular (non-superuser) principal with no roles.
    pub fn new(id: impl Into<PrincipalId>) -> Self {
        Self {
            id: id.into(),
            roles: Vec::new(),
            is_superuser: false,
        }
    }

    /// Creates a superuser principal.
    pub fn superuser(id: impl Into<PrincipalId>) -> Self {
        Self {
            is_superuser: true,
            ..Self::new(id)
        }
    }

    /// Assigns a role. Duplicate assignments are ignored.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        let role = role.into();
        if !self.roles.contains(&role) {
            self.roles.push(role);
        }
        self
    }

    /// Assigns several roles at once.
    pub fn with_roles<I, S>(self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        roles.into_iter().fold(self, Principal::with_role)
    }
}

// ============================================================================
// Scalar
// ============================================================================

/// A scalar value appearing in a permission's property filter.
///
/// Deserializes from plain JSON/TOML scalars (`"France"`, `42`, `1.5`, `true`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl Scalar {
    /// Converts a JSON value, rejecting arrays and objects.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Null => Some(Scalar::Null),
            serde_json::Value::Bool(b) => Some(Scalar::Boolean(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Scalar::Integer)
                .or_else(|| n.as_f64().map(Scalar::Float)),
            serde_json::Value::String(s) => Some(Scalar::String(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Renders this scalar as a Cypher literal.
    ///
    /// Floats always carry a fractional part so they re-parse as floats.
    pub fn to_cypher(&self) -> String {
        match self {
            Scalar::Null => "null".to_string(),
            Scalar::Boolean(b) => b.to_string(),
            Scalar::Integer(i) => i.to_string(),
            Scalar::Float(f) => float_literal(*f),
            Scalar::String(s) => string_literal(s),
        }
    }
}

impl Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_cypher())
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::String(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::String(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Integer(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Scalar::Integer(i64::from(value))
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Boolean(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

// ============================================================================
// Cypher literal rendering
// ============================================================================

/// Words that must be backtick-quoted when used as identifiers.
const RESERVED: &[&str] = &[
    "AND", "AS", "ASC", "ASCENDING", "BY", "CONTAINS", "DESC", "DESCENDING", "DISTINCT", "ENDS",
    "FALSE", "IN", "IS", "LIMIT", "MATCH", "NOT", "NULL", "OR", "ORDER", "RETURN", "SKIP",
    "STARTS", "TRUE", "WHERE", "WITH", "XOR",
];

/// Returns whether `name` can be written without backticks.
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !RESERVED.iter().any(|kw| kw.eq_ignore_ascii_case(name))
}

/// Renders an identifier, backtick-quoting it when necessary.
pub fn quote_identifier(name: &str) -> String {
    if is_plain_identifier(name) {
        name.to_string()
    } else {
        format!("`{}`", name.replace('`', "``"))
    }
}

/// Renders a single-quoted Cypher string literal.
pub fn string_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}

/// Renders a float literal that re-parses as a float.
pub fn float_literal(value: f64) -> String {
    if !value.is_finite() {
        value.to_string()
    } else if value.abs() >= 1e15 {
        format!("{value:e}")
    } else if value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_principal_roles_dedup() {
        let principal = Principal::new("alice")
            .with_role("analyst")
            .with_roles(["analyst", "viewer"]);

        assert_eq!(principal.roles, vec!["analyst", "viewer"]);
        assert!(!principal.is_superuser);
        assert!(Principal::superuser("root").is_superuser);
    }

    #[test]
    fn test_scalar_from_json() {
        assert_eq!(
            Scalar::from_json(&serde_json::json!("France")),
            Some(Scalar::String("France".into()))
        );
        assert_eq!(Scalar::from_json(&serde_json::json!(7)), Some(Scalar::Integer(7)));
        assert_eq!(Scalar::from_json(&serde_json::json!(1.5)), Some(Scalar::Float(1.5)));
        assert_eq!(Scalar::from_json(&serde_json::json!([1])), None);
        assert_eq!(Scalar::from_json(&serde_json::json!({"a": 1})), None);
    }

    #[test]
    fn test_scalar_to_cypher() {
        assert_eq!(Scalar::from("O'Brien").to_cypher(), r"'O\'Brien'");
        assert_eq!(Scalar::Float(2.0).to_cypher(), "2.0");
        assert_eq!(Scalar::Float(0.25).to_cypher(), "0.25");
        assert_eq!(Scalar::Float(1e20).to_cypher(), "1e20");
        assert_eq!(Scalar::Null.to_cypher(), "null");
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("country"), "country");
        assert_eq!(quote_identifier("g.price"), "`g.price`");
        assert_eq!(quote_identifier("order"), "`order`");
        assert_eq!(quote_identifier("2nd"), "`2nd`");
    }
}
