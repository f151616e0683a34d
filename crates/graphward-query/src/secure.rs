//! Secure data access over any [`GraphExecutor`].
//!
//! Every read goes through the same pipeline:
//!
//! 1. rewrite the query for the caller's [`SecurityContext`]
//! 2. bind `$security_principal` and `$security_roles`
//! 3. execute the rewritten text
//! 4. redact the result so denied values come back as `null`
//!
//! A query that cannot be rewritten is never executed.

use std::collections::{BTreeMap, BTreeSet};

use graphward_rbac::{PRINCIPAL_PARAM, ROLES_PARAM, SecurityContext};
use graphward_types::quote_identifier;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::executor::GraphExecutor;
use crate::rewriter::{QueryRewriter, Rewrite};
use crate::value::{Entity, Params, QueryResult, Value};

/// Column used by the generated `find_*` queries.
const ENTITY_COLUMN: &str = "n";

/// A graph that only returns what the caller's policy allows.
#[derive(Debug, Clone)]
pub struct SecureGraph<E> {
    executor: E,
    rewriter: QueryRewriter,
}

impl<E: GraphExecutor> SecureGraph<E> {
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            rewriter: QueryRewriter::new(),
        }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Rewrites `query` without executing it.
    pub fn explain(&self, query: &str, context: &SecurityContext) -> Result<Rewrite> {
        Ok(self.rewriter.rewrite(query, context)?)
    }

    /// Executes a read query under `context`.
    ///
    /// The result has the shape of the original projection. Denied values
    /// are `null`; rows the policy hides are absent.
    pub fn read(
        &self,
        query: &str,
        params: &Params,
        context: &SecurityContext,
    ) -> Result<QueryResult> {
        let rewrite = self.rewriter.rewrite(query, context)?;

        let mut bound = params.clone();
        let security = context.security_parameters();
        for name in [PRINCIPAL_PARAM, ROLES_PARAM] {
            if params.contains_key(name) {
                warn!(parameter = name, "Caller-supplied security parameter overridden");
            }
        }
        bound.insert(PRINCIPAL_PARAM.to_string(), Value::String(security.principal));
        bound.insert(ROLES_PARAM.to_string(), Value::from(security.roles));

        let result = self.executor.execute(&rewrite.query, &bound)?;
        let result = redact(result, &rewrite);

        if context.audit_enabled() {
            info!(
                principal = %context.principal().id,
                query = %query,
                rewritten = %rewrite.query,
                rows_returned = result.rows.len(),
                "Secure read executed"
            );
        }

        Ok(result)
    }

    /// Every visible entity with `label`.
    pub fn find_all(&self, label: &str, context: &SecurityContext) -> Result<Vec<Entity>> {
        let query = format!(
            "MATCH ({ENTITY_COLUMN}:{}) RETURN {ENTITY_COLUMN}",
            quote_identifier(label)
        );
        self.entities(&query, &Params::new(), context)
    }

    /// The visible entity with `label` whose `id` property equals `id`.
    pub fn find_by_id(
        &self,
        label: &str,
        id: impl Into<Value>,
        context: &SecurityContext,
    ) -> Result<Option<Entity>> {
        Ok(self.find_by(label, "id", id, context)?.into_iter().next())
    }

    /// Visible entities with `label` whose `property` equals `value`.
    pub fn find_by(
        &self,
        label: &str,
        property: &str,
        value: impl Into<Value>,
        context: &SecurityContext,
    ) -> Result<Vec<Entity>> {
        let query = format!(
            "MATCH ({ENTITY_COLUMN}:{}) WHERE {ENTITY_COLUMN}.{} = $value RETURN {ENTITY_COLUMN}",
            quote_identifier(label),
            quote_identifier(property)
        );
        let params = Params::from([("value".to_string(), value.into())]);
        self.entities(&query, &params, context)
    }

    fn entities(
        &self,
        query: &str,
        params: &Params,
        context: &SecurityContext,
    ) -> Result<Vec<Entity>> {
        let result = self.read(query, params, context)?;
        Ok(result
            .rows
            .into_iter()
            .filter_map(|row| row.into_iter().next().and_then(Value::into_entity))
            .collect())
    }
}

// ============================================================================
// Redaction
// ============================================================================

/// Applies the post-query half of a [`Rewrite`] to an executor result.
pub fn redact(mut result: QueryResult, rewrite: &Rewrite) -> QueryResult {
    if !rewrite.needs_redaction() {
        return result;
    }

    restore_removed_columns(&mut result, rewrite);

    if !rewrite.denied_by_label.is_empty() {
        for row in &mut result.rows {
            for value in row {
                redact_entities(value, &rewrite.denied_by_label);
            }
        }
    }

    for (column, props) in &rewrite.entity_columns {
        let Some(index) = result.column_index(column) else {
            continue;
        };
        for row in &mut result.rows {
            if let Some(Value::Map(map)) = row.get_mut(index) {
                for prop in props {
                    if let Some(value) = map.get_mut(prop) {
                        *value = Value::Null;
                    }
                }
            }
        }
    }

    let denied_columns: Vec<usize> = result
        .columns
        .iter()
        .enumerate()
        .filter(|(_, name)| names_denied_property(name, &rewrite.denied_properties))
        .map(|(i, _)| i)
        .collect();
    for row in &mut result.rows {
        for &i in &denied_columns {
            if let Some(value) = row.get_mut(i) {
                *value = Value::Null;
            }
        }
    }

    debug!(
        removed_columns = rewrite.removed_columns.len(),
        nulled_columns = denied_columns.len(),
        rows = result.rows.len(),
        "Result redacted"
    );
    result
}

/// Re-inserts removed projections as null columns at their original positions.
fn restore_removed_columns(result: &mut QueryResult, rewrite: &Rewrite) {
    if rewrite.removed_columns.is_empty() {
        return;
    }

    if rewrite.placeholder {
        // Only the null placeholder was projected; keep its row count.
        let width = rewrite.removed_columns.len();
        result.columns = rewrite
            .removed_columns
            .iter()
            .map(|c| c.name.clone())
            .collect();
        for row in &mut result.rows {
            *row = vec![Value::Null; width];
        }
        return;
    }

    let mut removed = rewrite.removed_columns.clone();
    removed.sort_by_key(|c| c.position);

    let expected = result.columns.len() + removed.len();
    if removed.iter().any(|c| c.position >= expected) {
        warn!(
            columns = result.columns.len(),
            removed = removed.len(),
            "Result shape does not match rewrite, not restoring removed columns"
        );
        return;
    }

    for column in &removed {
        result.columns.insert(column.position, column.name.clone());
        for row in &mut result.rows {
            if column.position <= row.len() {
                row.insert(column.position, Value::Null);
            }
        }
    }
}

fn redact_entities(value: &mut Value, denied: &BTreeMap<String, BTreeSet<String>>) {
    match value {
        Value::Node(entity) => {
            for label in entity.labels.clone() {
                if let Some(props) = denied.get(&label) {
                    entity.redact(props.iter().map(String::as_str));
                }
            }
        }
        Value::List(items) => {
            for item in items {
                redact_entities(item, denied);
            }
        }
        Value::Map(map) => {
            for item in map.values_mut() {
                redact_entities(item, denied);
            }
        }
        _ => {}
    }
}

fn names_denied_property(column: &str, denied: &BTreeMap<String, BTreeSet<String>>) -> bool {
    column
        .split_once('.')
        .is_some_and(|(alias, prop)| denied.get(alias).is_some_and(|props| props.contains(prop)))
}
