//! Filter expressions produced by the security context.
//!
//! Expressions are written over an unqualified subject: `country = 'France'`
//! rather than `g.country = 'France'`. The query rewriter binds them to the
//! alias of each pattern element.

use std::fmt;

use graphward_types::{Scalar, quote_identifier};
use serde::{Deserialize, Serialize};

/// A predicate over a single entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterExpression {
    /// `property = value` (`property IS NULL` for a null value).
    Equals { property: String, value: Scalar },
    /// Administrator-authored predicate, used verbatim.
    Condition(String),
    /// Conjunction. Empty means "always true".
    All(Vec<FilterExpression>),
    /// Negation.
    Not(Box<FilterExpression>),
    /// Constant false: nothing of this type is visible.
    Never,
}

impl FilterExpression {
    /// Returns whether this expression can never hold.
    pub fn is_never(&self) -> bool {
        matches!(self, FilterExpression::Never)
    }

    /// Renders the expression as a Cypher fragment over the unqualified subject.
    pub fn to_cypher(&self) -> String {
        self.render(None)
    }

    /// Renders the expression with equality clauses qualified by `var`.
    ///
    /// Raw conditions are emitted as written.
    pub fn to_cypher_for(&self, var: &str) -> String {
        self.render(Some(var))
    }

    fn render(&self, var: Option<&str>) -> String {
        match self {
            FilterExpression::Equals { property, value } => {
                let subject = match var {
                    Some(var) => format!("{}.{}", quote_identifier(var), quote_identifier(property)),
                    None => quote_identifier(property),
                };
                if value.is_null() {
                    format!("{subject} IS NULL")
                } else {
                    format!("{subject} = {}", value.to_cypher())
                }
            }
            FilterExpression::Condition(condition) => format!("({condition})"),
            FilterExpression::All(parts) if parts.is_empty() => "true".to_string(),
            FilterExpression::All(parts) => parts
                .iter()
                .map(|part| part.render(var))
                .collect::<Vec<_>>()
                .join(" AND "),
            FilterExpression::Not(inner) => format!("NOT ({})", inner.render(var)),
            FilterExpression::Never => "false".to_string(),
        }
    }
}

impl fmt::Display for FilterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_cypher())
    }
}
