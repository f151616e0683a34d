#![allow(clippy::match_same_arms)]
//! Permission records and the policy rules loaded from them.
//!
//! A [`PermissionRecord`] is the persisted, loosely typed shape (strings and
//! optional JSON). A [`PolicyRule`] is the closed, validated form the engine
//! evaluates: a [`RuleTarget`] (node, edge or property) crossed with a
//! [`GrantType`], plus a [`RuleCondition`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use graphward_types::Scalar;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::filter::FilterExpression;

/// The action every read path asks about.
pub const READ: &str = "read";

// ============================================================================
// Resource / GrantType
// ============================================================================

/// Kind of graph element a permission governs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Node,
    Edge,
    Property,
}

impl FromStr for Resource {
    type Err = RuleConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "node" => Ok(Resource::Node),
            "edge" => Ok(Resource::Edge),
            "property" => Ok(Resource::Property),
            other => Err(RuleConversionError::UnknownResource(other.to_string())),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resource::Node => "node",
            Resource::Edge => "edge",
            Resource::Property => "property",
        };
        f.write_str(name)
    }
}

/// Whether a rule grants or denies.
///
/// DENY always takes precedence over GRANT on overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GrantType {
    Grant,
    Deny,
}

impl GrantType {
    /// Parses a persisted grant type.
    ///
    /// A missing value means GRANT. An unrecognized value is read as DENY.
    pub fn parse_lenient(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_uppercase()) {
            None => GrantType::Grant,
            Some(v) if v.is_empty() || v == "GRANT" => GrantType::Grant,
            Some(v) if v == "DENY" => GrantType::Deny,
            Some(v) => {
                warn!(grant_type = %v, "Unrecognized grant type, treating as DENY");
                GrantType::Deny
            }
        }
    }
}

/// Returns whether a rule pattern covers `name`.
///
/// `None`, `"*"`, prefix (`"Trade*"`) and suffix (`"*_log"`) patterns are
/// supported; anything else is an exact match.
pub fn pattern_matches(pattern: Option<&str>, name: &str) -> bool {
    let Some(pattern) = pattern else {
        return true;
    };

    if pattern == "*" {
        return true;
    }

    if let Some(prefix) = pattern.strip_suffix('*') {
        return name.starts_with(prefix);
    }

    if let Some(suffix) = pattern.strip_prefix('*') {
        return name.ends_with(suffix);
    }

    name == pattern
}

/// Returns whether a rule's action covers the requested action.
pub fn action_matches(rule_action: &str, requested: &str) -> bool {
    rule_action == "*" || rule_action.eq_ignore_ascii_case(requested)
}

// ============================================================================
// PermissionRecord
// ============================================================================

/// A permission as persisted in the policy store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionRecord {
    pub name: String,
    pub resource: String,
    pub action: String,
    #[serde(default, alias = "grantType", skip_serializing_if = "Option::is_none")]
    pub grant_type: Option<String>,
    #[serde(default, alias = "nodeLabel", skip_serializing_if = "Option::is_none")]
    pub node_label: Option<String>,
    #[serde(default, alias = "edgeType", skip_serializing_if = "Option::is_none")]
    pub edge_type: Option<String>,
    #[serde(default, alias = "propertyName", skip_serializing_if = "Option::is_none")]
    pub property_name: Option<String>,
    /// Either a JSON object or a string holding JSON.
    #[serde(default, alias = "propertyFilter", skip_serializing_if = "Option::is_none")]
    pub property_filter: Option<serde_json::Value>,
    #[serde(
        default,
        alias = "attributeCondition",
        alias = "attribute_conditions",
        skip_serializing_if = "Option::is_none"
    )]
    pub attribute_condition: Option<String>,
}

impl PermissionRecord {
    pub fn new(
        name: impl Into<String>,
        resource: Resource,
        action: impl Into<String>,
        grant: GrantType,
    ) -> Self {
        Self {
            name: name.into(),
            resource: resource.to_string(),
            action: action.into(),
            grant_type: Some(
                match grant {
                    GrantType::Grant => "GRANT",
                    GrantType::Deny => "DENY",
                }
                .to_string(),
            ),
            node_label: None,
            edge_type: None,
            property_name: None,
            property_filter: None,
            attribute_condition: None,
        }
    }

    pub fn with_node_label(mut self, label: impl Into<String>) -> Self {
        self.node_label = Some(label.into());
        self
    }

    pub fn with_edge_type(mut self, edge_type: impl Into<String>) -> Self {
        self.edge_type = Some(edge_type.into());
        self
    }

    pub fn with_property_name(mut self, property: impl Into<String>) -> Self {
        self.property_name = Some(property.into());
        self
    }

    pub fn with_property_filter(mut self, filter: serde_json::Value) -> Self {
        self.property_filter = Some(filter);
        self
    }

    pub fn with_attribute_condition(mut self, condition: impl Into<String>) -> Self {
        self.attribute_condition = Some(condition.into());
        self
    }
}

// ============================================================================
// PolicyRule
// ============================================================================

/// Why a record could not become a rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleConversionError {
    #[error("unknown resource '{0}'")]
    UnknownResource(String),

    #[error("property permission without a property name")]
    MissingPropertyName,
}

/// The graph element a rule governs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleTarget {
    Node {
        label: Option<String>,
    },
    Edge {
        edge_type: Option<String>,
    },
    Property {
        label: Option<String>,
        property: String,
    },
}

/// The entity condition under which a rule applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RuleCondition {
    /// No filter: the rule covers every entity of its label/type.
    Always,
    /// Equality filters and/or a raw predicate, all of which must hold.
    Filter {
        equals: BTreeMap<String, Scalar>,
        attribute: Option<String>,
    },
    /// The stored filter could not be interpreted.
    Invalid { reason: String },
}

impl RuleCondition {
    fn from_record(record: &PermissionRecord) -> Self {
        let equals = match record.property_filter.as_ref().map(parse_property_filter) {
            None => BTreeMap::new(),
            Some(Ok(map)) => map,
            Some(Err(reason)) => {
                warn!(permission = %record.name, %reason, "Malformed property filter");
                return RuleCondition::Invalid { reason };
            }
        };

        let attribute = record
            .attribute_condition
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        if equals.is_empty() && attribute.is_none() {
            RuleCondition::Always
        } else {
            RuleCondition::Filter { equals, attribute }
        }
    }

    /// Renders the condition as a positive filter expression.
    fn to_expression(&self) -> FilterExpression {
        match self {
            RuleCondition::Always => FilterExpression::All(Vec::new()),
            RuleCondition::Filter { equals, attribute } => {
                let mut parts: Vec<FilterExpression> = equals
                    .iter()
                    .map(|(property, value)| FilterExpression::Equals {
                        property: property.clone(),
                        value: value.clone(),
                    })
                    .collect();
                if let Some(condition) = attribute {
                    parts.push(FilterExpression::Condition(condition.clone()));
                }
                if parts.len() == 1 {
                    parts.remove(0)
                } else {
                    FilterExpression::All(parts)
                }
            }
            RuleCondition::Invalid { .. } => FilterExpression::Never,
        }
    }
}

/// Parses a property filter given as a JSON object or a JSON-encoded string.
fn parse_property_filter(value: &serde_json::Value) -> Result<BTreeMap<String, Scalar>, String> {
    let parsed;
    let object = match value {
        serde_json::Value::Object(map) => map,
        serde_json::Value::String(text) => {
            parsed = serde_json::from_str::<serde_json::Value>(text)
                .map_err(|e| format!("invalid JSON: {e}"))?;
            parsed
                .as_object()
                .ok_or_else(|| "filter JSON is not an object".to_string())?
        }
        serde_json::Value::Null => return Ok(BTreeMap::new()),
        _ => return Err("filter is not an object".to_string()),
    };

    object
        .iter()
        .map(|(key, value)| {
            Scalar::from_json(value)
                .map(|scalar| (key.clone(), scalar))
                .ok_or_else(|| format!("non-scalar value for '{key}'"))
        })
        .collect()
}

/// A validated policy rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub name: String,
    pub action: String,
    pub grant: GrantType,
    pub target: RuleTarget,
    pub condition: RuleCondition,
}

impl PolicyRule {
    /// Returns whether this is a node rule covering `label` for `action`.
    pub fn applies_to_node(&self, label: &str, action: &str) -> bool {
        match &self.target {
            RuleTarget::Node { label: pattern } => {
                action_matches(&self.action, action) && pattern_matches(pattern.as_deref(), label)
            }
            RuleTarget::Edge { .. } | RuleTarget::Property { .. } => false,
        }
    }

    /// Returns whether this is an edge rule covering `edge_type` for `action`.
    pub fn applies_to_edge(&self, edge_type: &str, action: &str) -> bool {
        match &self.target {
            RuleTarget::Edge { edge_type: pattern } => {
                action_matches(&self.action, action)
                    && pattern_matches(pattern.as_deref(), edge_type)
            }
            RuleTarget::Node { .. } | RuleTarget::Property { .. } => false,
        }
    }

    /// Returns the property this rule denies on `label`, if any.
    ///
    /// Property GRANTs never deny anything.
    pub fn denied_property(&self, label: &str, action: &str) -> Option<&str> {
        match (&self.target, self.grant) {
            (RuleTarget::Property { label: pattern, property }, GrantType::Deny)
                if action_matches(&self.action, action)
                    && pattern_matches(pattern.as_deref(), label) =>
            {
                Some(property.as_str())
            }
            _ => None,
        }
    }

    /// Converts this rule into a row/edge filter.
    ///
    /// - DENY without a condition collapses to constant false.
    /// - DENY with a condition becomes `NOT (<condition>)`.
    /// - GRANT without a condition adds nothing.
    /// - GRANT with a condition becomes the condition itself.
    /// - An invalid condition is constant false either way.
    pub fn row_filter(&self) -> Option<FilterExpression> {
        match (self.grant, &self.condition) {
            (GrantType::Deny, RuleCondition::Always) => Some(FilterExpression::Never),
            (GrantType::Deny, RuleCondition::Filter { .. }) => Some(FilterExpression::Not(
                Box::new(self.condition.to_expression()),
            )),
            (GrantType::Grant, RuleCondition::Always) => None,
            (GrantType::Grant, RuleCondition::Filter { .. }) => {
                Some(self.condition.to_expression())
            }
            (_, RuleCondition::Invalid { .. }) => Some(FilterExpression::Never),
        }
    }
}

impl TryFrom<PermissionRecord> for PolicyRule {
    type Error = RuleConversionError;

    fn try_from(record: PermissionRecord) -> Result<Self, Self::Error> {
        let resource: Resource = record.resource.parse()?;
        let grant = GrantType::parse_lenient(record.grant_type.as_deref());
        let condition = RuleCondition::from_record(&record);

        let target = match resource {
            Resource::Node => RuleTarget::Node {
                label: record.node_label.clone(),
            },
            Resource::Edge => RuleTarget::Edge {
                edge_type: record.edge_type.clone(),
            },
            Resource::Property => RuleTarget::Property {
                label: record.node_label.clone(),
                property: record
                    .property_name
                    .clone()
                    .filter(|p| !p.is_empty())
                    .ok_or(RuleConversionError::MissingPropertyName)?,
            },
        };

        Ok(Self {
            name: record.name,
            action: record.action,
            grant,
            target,
            condition,
        })
    }
}
