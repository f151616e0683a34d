//! Query rewriting for property-graph security.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Original Query                              │
//! │  MATCH (g:Geography) RETURN g.name           │
//! └─────────────────┬───────────────────────────┘
//!                   │
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  QueryRewriter                               │
//! │  - Parse into the Cypher subset AST          │
//! │  - Bind row/edge filters to pattern aliases  │
//! │  - AND them onto WHERE                       │
//! │  - Drop denied `alias.prop` projections      │
//! └─────────────────┬───────────────────────────┘
//!                   │
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  Rewritten Query                             │
//! │  MATCH (g:Geography)                         │
//! │  WHERE NOT (g.name = 'France')               │
//! │  RETURN g.name                               │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Rewriting is idempotent: rewriting the output again for the same context
//! yields the same text.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use graphward_rbac::{FilterExpression, READ, SecurityContext};
use graphward_types::Scalar;
use tracing::{debug, info, warn};

use crate::ast::{BinaryOp, Expr, Query, ReturnItem};
use crate::error::RewriteError;
use crate::parser::{parse_expression, parse_query};

/// Prefix of aliases generated for anonymous pattern elements.
pub const GENERATED_ALIAS_PREFIX: &str = "_gw";

/// Functions whose variable arguments denote the entity itself.
const ENTITY_FUNCTIONS: &[&str] = &[
    "id",
    "elementid",
    "labels",
    "type",
    "properties",
    "keys",
    "startnode",
    "endnode",
];

/// A projection removed because its property is denied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedColumn {
    /// Result column name (`AS` name, or the item text).
    pub name: String,
    /// Position in the original RETURN list.
    pub position: usize,
}

/// Output of [`QueryRewriter::rewrite`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Rewrite {
    /// The query to execute.
    pub query: String,
    /// Denied properties by pattern alias.
    pub denied_properties: BTreeMap<String, BTreeSet<String>>,
    /// Projections removed from RETURN, in original order.
    pub removed_columns: Vec<RemovedColumn>,
    /// Whole-entity result columns (`b` or `properties(b)`) and the
    /// properties to null in them.
    pub entity_columns: BTreeMap<String, BTreeSet<String>>,
    /// Denied properties by node label, for redacting returned entities.
    pub denied_by_label: BTreeMap<String, BTreeSet<String>>,
    /// Whether RETURN was replaced with a single null projection.
    pub placeholder: bool,
    /// Security predicates added to WHERE.
    pub added_predicates: Vec<String>,
}

impl Rewrite {
    /// A rewrite that leaves the query untouched.
    pub fn passthrough(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// Returns whether results need post-query redaction.
    pub fn needs_redaction(&self) -> bool {
        !self.removed_columns.is_empty()
            || !self.denied_by_label.is_empty()
            || !self.entity_columns.is_empty()
    }
}

/// Rewrites queries to enforce a [`SecurityContext`].
#[derive(Debug, Clone)]
pub struct QueryRewriter {
    action: String,
}

impl Default for QueryRewriter {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryRewriter {
    /// Creates a rewriter for the `read` action.
    pub fn new() -> Self {
        Self {
            action: READ.to_string(),
        }
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    /// Rewrites `query` for the principal of `context`.
    ///
    /// A superuser gets the query back unparsed. Anything outside the
    /// supported subset is rejected rather than passed through.
    pub fn rewrite(&self, query: &str, context: &SecurityContext) -> Result<Rewrite, RewriteError> {
        if context.is_superuser() {
            if context.audit_enabled() {
                info!(principal = %context.principal().id, "Superuser query, not rewritten");
            }
            return Ok(Rewrite::passthrough(query));
        }

        let parsed = parse_query(query).map_err(|e| {
            warn!(principal = %context.principal().id, error = %e, "Rejecting query");
            RewriteError::from(e)
        })?;

        let (rewritten, mut rewrite) = self.rewrite_query(parsed, context)?;
        rewrite.query = rewritten.to_string();

        if context.audit_enabled() {
            info!(
                principal = %context.principal().id,
                predicates = rewrite.added_predicates.len(),
                removed_columns = rewrite.removed_columns.len(),
                "Query rewritten"
            );
        }
        debug!(query = %rewrite.query, "Rewritten query text");

        Ok(rewrite)
    }

    /// Rewrites a parsed query. The returned [`Rewrite`] has an empty `query`.
    pub fn rewrite_query(
        &self,
        mut query: Query,
        context: &SecurityContext,
    ) -> Result<(Query, Rewrite), RewriteError> {
        let mut rewrite = Rewrite::default();
        let mut aliases = AliasGenerator::new(query.pattern.aliases());
        let mut predicates: Vec<Expr> = Vec::new();

        // 1. Row filters and denied properties for node patterns
        for node in query.pattern.nodes_mut() {
            let Some(label) = node.label.clone() else {
                return Err(RewriteError::UnsupportedQueryShape(
                    "node pattern without a label".into(),
                ));
            };

            let filters = context.row_filters(&label, &self.action);
            if !filters.is_empty() {
                let alias = node.alias.get_or_insert_with(|| aliases.next()).clone();
                predicates.extend(filters.iter().map(|f| bind_filter(f, &alias)));
            }

            let denied = context.denied_properties(&label, &self.action);
            if denied.is_empty() {
                continue;
            }

            // `{price: 99.0}` on a denied property compares against null instead.
            let (hidden, visible): (Vec<_>, Vec<_>) = std::mem::take(&mut node.properties)
                .into_iter()
                .partition(|(key, _)| denied.contains(key));
            node.properties = visible;
            for (key, value) in hidden {
                warn!(label = %label, property = %key, "Denied property matched in pattern");
                predicates.push(Expr::binary(
                    BinaryOp::Eq,
                    Expr::Literal(Scalar::Null),
                    value,
                ));
            }

            if let Some(alias) = &node.alias {
                rewrite
                    .denied_properties
                    .entry(alias.clone())
                    .or_default()
                    .extend(denied.iter().cloned());
            }
            rewrite.denied_by_label.insert(label, denied);
        }

        // 2. Edge filters for relationship patterns
        for (rel, _) in &mut query.pattern.steps {
            let Some(rel_type) = rel.rel_type.clone() else {
                return Err(RewriteError::UnsupportedQueryShape(
                    "relationship pattern without a type".into(),
                ));
            };

            let filters = context.edge_filters(&rel_type, &self.action);
            if !filters.is_empty() {
                let alias = rel.alias.get_or_insert_with(|| aliases.next()).clone();
                predicates.extend(filters.iter().map(|f| bind_filter(f, &alias)));
            }
        }

        // 3. Denied values are null everywhere the caller can observe them
        if !rewrite.denied_by_label.is_empty() {
            let denied = &rewrite.denied_properties;
            if let Some(expr) = query.where_clause.take() {
                query.where_clause = Some(null_denied(expr, denied)?);
            }
            for node in query.pattern.nodes_mut() {
                null_denied_map(&mut node.properties, denied)?;
            }
            for (rel, _) in &mut query.pattern.steps {
                null_denied_map(&mut rel.properties, denied)?;
            }
        }

        // 4. Security predicates onto WHERE
        let mut conjuncts: Vec<Expr> = match query.where_clause.take() {
            Some(Expr::And(parts)) => parts,
            Some(other) => vec![other],
            None => Vec::new(),
        };
        for predicate in predicates {
            for part in split_conjuncts(predicate) {
                if part == Expr::Literal(Scalar::Boolean(true)) || conjuncts.contains(&part) {
                    continue;
                }
                rewrite.added_predicates.push(part.to_string());
                conjuncts.push(part);
            }
        }
        if !conjuncts.is_empty() {
            query.where_clause = Some(Expr::and(conjuncts));
        }

        // 5. Projections
        redact_projection(&mut query, &mut rewrite)?;

        Ok((query, rewrite))
    }
}

/// Drops or nulls denied property references in the projection.
fn redact_projection(query: &mut Query, rewrite: &mut Rewrite) -> Result<(), RewriteError> {
    if rewrite.denied_by_label.is_empty() {
        return Ok(());
    }
    let denied = &rewrite.denied_properties;

    let ret = &mut query.return_clause;
    let mut kept = Vec::with_capacity(ret.items.len());
    for (position, item) in std::mem::take(&mut ret.items).into_iter().enumerate() {
        if let Some((var, key)) = item.expr.as_property_of_variable()
            && denied.get(var).is_some_and(|props| props.contains(key))
        {
            warn!(column = %item.column_name(), "Removing denied projection");
            rewrite.removed_columns.push(RemovedColumn {
                name: item.column_name(),
                position,
            });
            continue;
        }

        if let Expr::Variable(var) = &item.expr
            && let Some(props) = denied.get(var)
        {
            rewrite
                .entity_columns
                .insert(item.column_name(), props.clone());
        }

        // The map is returned whole and its denied keys nulled afterwards.
        if let Some(Some(var)) = properties_subject(&item.expr)
            && let Some(props) = denied.get(var)
        {
            rewrite
                .entity_columns
                .insert(item.column_name(), props.clone());
            kept.push(item);
            continue;
        }

        let column = item.column_name();
        let expr = null_denied(item.expr, denied)?;
        // Keep the column name stable when a nested reference was nulled.
        let alias = match item.alias {
            Some(alias) => Some(alias),
            None if expr.to_string() != column => Some(column),
            None => None,
        };
        kept.push(ReturnItem { expr, alias });
    }

    if kept.is_empty()
        && let Some(first) = rewrite.removed_columns.first()
    {
        kept.push(ReturnItem {
            expr: Expr::Literal(Scalar::Null),
            alias: Some(first.name.clone()),
        });
        rewrite.placeholder = true;
    }
    ret.items = kept;

    let removed: HashSet<&str> = rewrite
        .removed_columns
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    for sort in &mut ret.order_by {
        let expr = std::mem::replace(&mut sort.expr, Expr::Literal(Scalar::Null));
        sort.expr = match expr {
            Expr::Variable(name) if removed.contains(name.as_str()) => {
                Expr::Literal(Scalar::Null)
            }
            other => null_denied(other, denied)?,
        };
    }
    Ok(())
}

/// Allocates `_gw<n>` aliases not already used in the pattern.
struct AliasGenerator {
    taken: HashSet<String>,
    next: usize,
}

impl AliasGenerator {
    fn new(taken: Vec<&str>) -> Self {
        Self {
            taken: taken.into_iter().map(str::to_string).collect(),
            next: 0,
        }
    }

    fn next(&mut self) -> String {
        loop {
            let candidate = format!("{GENERATED_ALIAS_PREFIX}{}", self.next);
            self.next += 1;
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

/// Parses a filter and binds it to `alias`. Unparseable filters become `false`.
fn bind_filter(filter: &FilterExpression, alias: &str) -> Expr {
    let text = filter.to_cypher();
    match parse_expression(&text) {
        Ok(expr) => bind(expr, alias),
        Err(e) => {
            warn!(filter = %text, error = %e, "Unparseable policy filter, denying");
            Expr::Literal(Scalar::Boolean(false))
        }
    }
}

fn split_conjuncts(expr: Expr) -> Vec<Expr> {
    match expr {
        Expr::And(parts) => parts,
        other => vec![other],
    }
}

/// Binds a policy predicate to `alias`.
///
/// Bare identifiers are properties of the governed entity; the base of a
/// property access, and a variable passed to an entity function such as
/// `id(n)`, is the entity itself.
pub fn bind(expr: Expr, alias: &str) -> Expr {
    let rebind = |e: Expr| bind(e, alias);
    match expr {
        Expr::Variable(name) => Expr::property(alias, name),
        Expr::Property(base, key) => Expr::Property(Box::new(bind_subject(*base, alias)), key),
        Expr::Function {
            name,
            distinct,
            star,
            args,
        } => {
            let entity = ENTITY_FUNCTIONS
                .iter()
                .any(|f| f.eq_ignore_ascii_case(&name));
            let args = args
                .into_iter()
                .map(|arg| {
                    if entity {
                        bind_subject(arg, alias)
                    } else {
                        bind(arg, alias)
                    }
                })
                .collect();
            Expr::Function {
                name,
                distinct,
                star,
                args,
            }
        }
        Expr::Literal(_) | Expr::Parameter(_) => expr,
        Expr::List(items) => Expr::List(items.into_iter().map(rebind).collect()),
        Expr::Not(inner) => Expr::Not(Box::new(bind(*inner, alias))),
        Expr::And(parts) => Expr::and(parts.into_iter().map(rebind)),
        Expr::Or(parts) => Expr::or(parts.into_iter().map(rebind)),
        Expr::Binary { op, left, right } => Expr::binary(op, bind(*left, alias), bind(*right, alias)),
        Expr::Negate(inner) => Expr::Negate(Box::new(bind(*inner, alias))),
        Expr::IsNull { expr, negated } => Expr::IsNull {
            expr: Box::new(bind(*expr, alias)),
            negated,
        },
    }
}

fn bind_subject(expr: Expr, alias: &str) -> Expr {
    match expr {
        Expr::Variable(_) => Expr::Variable(alias.to_string()),
        other => bind(other, alias),
    }
}

/// Replaces every `alias.prop` with a denied `prop` by `null`.
///
/// `properties(x)` of an entity with denied properties cannot be narrowed
/// to its visible keys, so it is rejected unless a visible key is read
/// from it.
fn null_denied(
    expr: Expr,
    denied: &BTreeMap<String, BTreeSet<String>>,
) -> Result<Expr, RewriteError> {
    let is_denied =
        |var: &str, key: &str| denied.get(var).is_some_and(|props| props.contains(key));

    if let Some((var, key)) = expr.as_property_of_variable()
        && is_denied(var, key)
    {
        return Ok(Expr::Literal(Scalar::Null));
    }

    let visible =
        properties_subject(&expr).map(|var| var.is_some_and(|v| !denied.contains_key(v)));
    match visible {
        Some(true) => return Ok(expr),
        Some(false) => {
            return Err(RewriteError::UnsupportedQueryShape(format!(
                "{expr} exposes denied properties"
            )));
        }
        None => {}
    }

    let all = |items: Vec<Expr>| {
        items
            .into_iter()
            .map(|e| null_denied(e, denied))
            .collect::<Result<Vec<_>, _>>()
    };
    Ok(match expr {
        Expr::Literal(_) | Expr::Parameter(_) | Expr::Variable(_) => expr,
        Expr::Property(base, key) => {
            match properties_subject(&base).map(|var| var.map(|v| is_denied(v, &key))) {
                Some(Some(true)) => Expr::Literal(Scalar::Null),
                Some(Some(false)) => Expr::Property(base, key),
                _ => Expr::Property(Box::new(null_denied(*base, denied)?), key),
            }
        }
        Expr::List(items) => Expr::List(all(items)?),
        Expr::Function {
            name,
            distinct,
            star,
            args,
        } => Expr::Function {
            name,
            distinct,
            star,
            args: all(args)?,
        },
        Expr::Not(inner) => Expr::Not(Box::new(null_denied(*inner, denied)?)),
        Expr::And(parts) => Expr::and(all(parts)?),
        Expr::Or(parts) => Expr::or(all(parts)?),
        Expr::Binary { op, left, right } => {
            Expr::binary(op, null_denied(*left, denied)?, null_denied(*right, denied)?)
        }
        Expr::Negate(inner) => Expr::Negate(Box::new(null_denied(*inner, denied)?)),
        Expr::IsNull { expr, negated } => Expr::IsNull {
            expr: Box::new(null_denied(*expr, denied)?),
            negated,
        },
    })
}

fn null_denied_map(
    properties: &mut [(String, Expr)],
    denied: &BTreeMap<String, BTreeSet<String>>,
) -> Result<(), RewriteError> {
    for (_, value) in properties {
        let expr = std::mem::replace(value, Expr::Literal(Scalar::Null));
        *value = null_denied(expr, denied)?;
    }
    Ok(())
}

/// For `properties(x)`: `Some(Some(x))` when `x` is a variable, `Some(None)` otherwise.
fn properties_subject(expr: &Expr) -> Option<Option<&str>> {
    match expr {
        Expr::Function { name, args, .. } if name.eq_ignore_ascii_case("properties") => {
            Some(match args.as_slice() {
                [Expr::Variable(var)] => Some(var.as_str()),
                _ => None,
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphward_rbac::{
        ContextSettings, DefaultDecision, GrantType, PermissionRecord, PolicyRule, Resource,
        ResolvedPolicy,
    };
    use graphward_types::Principal;
    use proptest::prelude::*;
    use serde_json::json;

    fn context(records: Vec<PermissionRecord>) -> SecurityContext {
        context_with(records, ContextSettings::default())
    }

    fn context_with(records: Vec<PermissionRecord>, settings: ContextSettings) -> SecurityContext {
        let rules = records
            .into_iter()
            .map(|r| PolicyRule::try_from(r).unwrap());
        SecurityContext::new(
            Principal::new("alice").with_role("analyst"),
            ResolvedPolicy::from_rules(rules),
            settings,
        )
        .without_audit()
    }

    fn deny_france() -> PermissionRecord {
        PermissionRecord::new("deny:france", Resource::Node, READ, GrantType::Deny)
            .with_node_label("Geography")
            .with_property_filter(json!({"name": "France"}))
    }

    fn deny_price() -> PermissionRecord {
        PermissionRecord::new("deny:price", Resource::Property, READ, GrantType::Deny)
            .with_node_label("BalanceSheet")
            .with_property_name("price")
    }

    fn rewrite(query: &str, ctx: &SecurityContext) -> Rewrite {
        QueryRewriter::new().rewrite(query, ctx).unwrap()
    }

    #[test]
    fn test_deny_filter_injected() {
        let ctx = context(vec![deny_france()]);
        let out = rewrite("MATCH (g:Geography) RETURN g.name", &ctx);
        assert_eq!(
            out.query,
            "MATCH (g:Geography) WHERE NOT (g.name = 'France') RETURN g.name"
        );
        assert_eq!(out.added_predicates, vec!["NOT (g.name = 'France')"]);
    }

    #[test]
    fn test_existing_where_is_kept() {
        let ctx = context(vec![deny_france()]);
        let out = rewrite(
            "MATCH (g:Geography) WHERE g.population > 10 OR g.capital IS NULL RETURN g.name",
            &ctx,
        );
        assert_eq!(
            out.query,
            "MATCH (g:Geography) WHERE (g.population > 10 OR g.capital IS NULL) AND NOT (g.name = 'France') RETURN g.name"
        );
    }

    #[test]
    fn test_no_rules_leaves_query_alone() {
        let ctx = context(Vec::new());
        let query = "MATCH (g:Geography) RETURN g.name ORDER BY g.name DESC SKIP 1 LIMIT 5";
        assert_eq!(rewrite(query, &ctx).query, query);
    }

    #[test]
    fn test_unconditional_deny_is_false() {
        let ctx = context(vec![
            PermissionRecord::new("deny:geo", Resource::Node, READ, GrantType::Deny)
                .with_node_label("Geography"),
        ]);
        let out = rewrite("MATCH (g:Geography) RETURN g.name", &ctx);
        assert_eq!(out.query, "MATCH (g:Geography) WHERE false RETURN g.name");
    }

    #[test]
    fn test_grant_condition_binds_to_alias() {
        let ctx = context(vec![
            PermissionRecord::new("big-wheat", Resource::Node, READ, GrantType::Grant)
                .with_node_label("Trade")
                .with_property_filter(json!({"commodity": "Wheat"}))
                .with_attribute_condition("n.value > 1000000 AND year >= $min_year"),
        ]);
        let out = rewrite("MATCH (t:Trade) RETURN t.value", &ctx);
        assert_eq!(
            out.query,
            "MATCH (t:Trade) WHERE t.commodity = 'Wheat' AND t.value > 1000000 AND t.year >= $min_year RETURN t.value"
        );
    }

    #[test]
    fn test_entity_functions_bind_to_entity() {
        let bound = bind(parse_expression("id(n) = 7 AND toLower(name) = 'x'").unwrap(), "g");
        assert_eq!(bound.to_string(), "id(g) = 7 AND toLower(g.name) = 'x'");
    }

    #[test]
    fn test_anonymous_elements_get_aliases() {
        let ctx = context(vec![
            deny_france(),
            PermissionRecord::new("wheat", Resource::Edge, READ, GrantType::Grant)
                .with_edge_type("TRADES_WITH")
                .with_property_filter(json!({"commodity": "Wheat"})),
        ]);
        let out = rewrite(
            "MATCH (_gw0:Commodity)<-[:TRADES_WITH]-(:Geography) RETURN _gw0.name",
            &ctx,
        );
        assert_eq!(
            out.query,
            "MATCH (_gw0:Commodity)<-[_gw2:TRADES_WITH]-(_gw1:Geography) WHERE NOT (_gw1.name = 'France') AND _gw2.commodity = 'Wheat' RETURN _gw0.name"
        );
    }

    #[test]
    fn test_denied_projection_removed() {
        let ctx = context(vec![deny_price()]);
        let out = rewrite("MATCH (b:BalanceSheet) RETURN b.product_name, b.price", &ctx);
        assert_eq!(out.query, "MATCH (b:BalanceSheet) RETURN b.product_name");
        assert_eq!(
            out.removed_columns,
            vec![RemovedColumn {
                name: "b.price".into(),
                position: 1
            }]
        );
        assert_eq!(
            out.denied_properties.get("b"),
            Some(&BTreeSet::from(["price".to_string()]))
        );
        assert!(!out.placeholder);
    }

    #[test]
    fn test_all_projections_removed_keeps_rows() {
        let ctx = context(vec![deny_price()]);
        let out = rewrite("MATCH (b:BalanceSheet) RETURN b.price AS p", &ctx);
        assert_eq!(out.query, "MATCH (b:BalanceSheet) RETURN null AS p");
        assert!(out.placeholder);
    }

    #[test]
    fn test_nested_denied_reference_is_nulled() {
        let ctx = context(vec![deny_price()]);
        let out = rewrite(
            "MATCH (b:BalanceSheet) WHERE b.price > 100 RETURN b.product_name, sum(b.price) ORDER BY b.price",
            &ctx,
        );
        assert_eq!(
            out.query,
            "MATCH (b:BalanceSheet) WHERE null > 100 RETURN b.product_name, sum(null) AS `sum(b.price)` ORDER BY null"
        );
    }

    #[test]
    fn test_whole_entity_recorded() {
        let ctx = context(vec![deny_price()]);
        let out = rewrite("MATCH (b:BalanceSheet) RETURN b AS sheet", &ctx);
        assert_eq!(out.query, "MATCH (b:BalanceSheet) RETURN b AS sheet");
        assert_eq!(
            out.entity_columns.get("sheet"),
            Some(&BTreeSet::from(["price".to_string()]))
        );
    }

    #[test]
    fn test_properties_map_recorded_for_redaction() {
        let ctx = context(vec![deny_price()]);
        let out = rewrite("MATCH (b:BalanceSheet) RETURN properties(b) AS p", &ctx);
        assert_eq!(out.query, "MATCH (b:BalanceSheet) RETURN properties(b) AS p");
        assert_eq!(
            out.entity_columns.get("p"),
            Some(&BTreeSet::from(["price".to_string()]))
        );
        assert!(out.needs_redaction());
    }

    #[test]
    fn test_denied_key_of_properties_map_is_nulled() {
        let ctx = context(vec![deny_price()]);
        let out = rewrite(
            "MATCH (b:BalanceSheet) WHERE properties(b).price > 50 RETURN properties(b).product_name AS name",
            &ctx,
        );
        assert_eq!(
            out.query,
            "MATCH (b:BalanceSheet) WHERE null > 50 RETURN properties(b).product_name AS name"
        );
    }

    #[test]
    fn test_properties_map_outside_return_rejected() {
        let ctx = context(vec![deny_price()]);
        for query in [
            "MATCH (b:BalanceSheet) WHERE properties(b) IS NOT NULL RETURN b.product_name",
            "MATCH (b:BalanceSheet) RETURN b.product_name ORDER BY properties(b)",
            "MATCH (b:BalanceSheet) RETURN collect(properties(b)) AS sheets",
        ] {
            let err = QueryRewriter::new().rewrite(query, &ctx).unwrap_err();
            assert!(
                matches!(err, RewriteError::UnsupportedQueryShape(_)),
                "{query}"
            );
        }
    }

    #[test]
    fn test_properties_of_unrestricted_alias_untouched() {
        let ctx = context(vec![deny_price()]);
        let query = "MATCH (g:Geography) WHERE properties(g).name = 'France' RETURN properties(g)";
        let out = rewrite(query, &ctx);
        assert_eq!(out.query, query);
        assert!(out.entity_columns.is_empty());
    }

    #[test]
    fn test_inline_denied_property_never_matches() {
        let ctx = context(vec![deny_price()]);
        let out = rewrite(
            "MATCH (b:BalanceSheet {price: 99.0, product_name: 'Gadget'}) RETURN b.product_name",
            &ctx,
        );
        assert_eq!(
            out.query,
            "MATCH (b:BalanceSheet {product_name: 'Gadget'}) WHERE null = 99.0 RETURN b.product_name"
        );
        assert_eq!(out.added_predicates, vec!["null = 99.0"]);
        assert_eq!(rewrite(&out.query, &ctx).query, out.query);
    }

    #[test]
    fn test_superuser_passthrough() {
        let ctx = SecurityContext::new(
            Principal::superuser("root"),
            ResolvedPolicy::from_rules([PolicyRule::try_from(deny_france()).unwrap()]),
            ContextSettings::default(),
        );
        let raw = "MATCH (g) RETURN g";
        let out = rewrite(raw, &ctx);
        assert_eq!(out.query, raw);
        assert!(!out.needs_redaction());
    }

    #[test]
    fn test_unlabeled_node_rejected() {
        let ctx = context(Vec::new());
        let err = QueryRewriter::new()
            .rewrite("MATCH (g) RETURN g", &ctx)
            .unwrap_err();
        assert!(matches!(err, RewriteError::UnsupportedQueryShape(_)));

        let err = QueryRewriter::new()
            .rewrite("MATCH (a:A)-[r]->(b:B) RETURN a", &ctx)
            .unwrap_err();
        assert!(matches!(err, RewriteError::UnsupportedQueryShape(_)));
    }

    #[test]
    fn test_unsupported_grammar_rejected() {
        let ctx = context(Vec::new());
        for query in [
            "MATCH (g:Geography) WITH g RETURN g",
            "OPTIONAL MATCH (g:Geography) RETURN g",
            "MATCH (g:Geography) RETURN g UNION MATCH (g:Geography) RETURN g",
            "this is not cypher",
        ] {
            assert!(
                QueryRewriter::new().rewrite(query, &ctx).is_err(),
                "{query}"
            );
        }
    }

    #[test]
    fn test_unparseable_filter_fails_closed() {
        let ctx = context(vec![
            PermissionRecord::new("broken", Resource::Node, READ, GrantType::Grant)
                .with_node_label("Geography")
                .with_attribute_condition("value >>> 3"),
        ]);
        let out = rewrite("MATCH (g:Geography) RETURN g.name", &ctx);
        assert_eq!(out.query, "MATCH (g:Geography) WHERE false RETURN g.name");
    }

    #[test]
    fn test_default_deny_hides_unmentioned_labels() {
        let settings = ContextSettings {
            default_decision: DefaultDecision::Deny,
            ..ContextSettings::default()
        };
        let ctx = context_with(
            vec![
                PermissionRecord::new("geo", Resource::Node, READ, GrantType::Grant)
                    .with_node_label("Geography"),
                PermissionRecord::new("rel", Resource::Edge, READ, GrantType::Grant),
            ],
            settings,
        );
        let out = rewrite(
            "MATCH (g:Geography)-[p:PRODUCES]->(c:Commodity) RETURN g.name, c.name",
            &ctx,
        );
        assert_eq!(
            out.query,
            "MATCH (g:Geography)-[p:PRODUCES]->(c:Commodity) WHERE false RETURN g.name, c.name"
        );
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let ctx = context(vec![
            deny_france(),
            deny_price(),
            PermissionRecord::new("wheat", Resource::Node, READ, GrantType::Grant)
                .with_node_label("Trade")
                .with_property_filter(json!({"commodity": "Wheat", "year": 2024}))
                .with_attribute_condition("value > 1.5"),
        ]);

        for query in [
            "MATCH (g:Geography) RETURN g.name",
            "MATCH (:Geography)-[:EXPORTS]->(t:Trade) RETURN t.value ORDER BY t.value LIMIT 3",
            "MATCH (b:BalanceSheet) RETURN b.price, b.product_name",
            "MATCH (b:BalanceSheet) RETURN b.price",
        ] {
            let once = rewrite(query, &ctx).query;
            let twice = rewrite(&once, &ctx).query;
            assert_eq!(once, twice, "{query}");
        }
    }

    proptest! {
        #[test]
        fn prop_rewrite_idempotent(
            name in "[A-Za-z' ]{0,12}",
            threshold in -1000i64..1000,
            existing in proptest::option::of(0i64..100),
            limit in proptest::option::of(0u64..50),
        ) {
            let ctx = context(vec![
                PermissionRecord::new("deny", Resource::Node, READ, GrantType::Deny)
                    .with_node_label("Geography")
                    .with_property_filter(json!({"name": name})),
                PermissionRecord::new("grant", Resource::Node, READ, GrantType::Grant)
                    .with_node_label("Geography")
                    .with_attribute_condition(format!("population >= {threshold}")),
            ]);

            let mut query = String::from("MATCH (g:Geography)");
            if let Some(n) = existing {
                query.push_str(&format!(" WHERE g.rank < {n}"));
            }
            query.push_str(" RETURN g.name");
            if let Some(n) = limit {
                query.push_str(&format!(" LIMIT {n}"));
            }

            let once = rewrite(&query, &ctx).query;
            let twice = rewrite(&once, &ctx).query;
            prop_assert_eq!(once, twice);
        }
    }
}
