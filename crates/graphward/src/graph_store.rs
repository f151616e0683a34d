//! Policy kept in the graph itself.
//!
//! Roles and permissions are ordinary nodes:
//!
//! ```text
//! (:Role {name})-[:HAS_PERMISSION]->(:Permission {name, resource, action, ...})
//! (:Role {name})-[:INHERITS_FROM]->(:Role {name})
//! ```
//!
//! The store reads them with the same executor that serves data queries,
//! bypassing the rewriter: policy lookups are never themselves filtered.

use std::collections::BTreeMap;

use graphward_query::{GraphExecutor, MemoryGraph, Params, Value};
use graphward_rbac::{PermissionRecord, PolicyDocument, PolicyStore, StoreError, collect_records};
use tracing::{debug, warn};

const PERMISSIONS_QUERY: &str =
    "MATCH (r:Role)-[:HAS_PERMISSION]->(p:Permission) WHERE r.name = $role RETURN p";

const PARENTS_QUERY: &str =
    "MATCH (r:Role)-[:INHERITS_FROM]->(parent:Role) WHERE r.name = $role RETURN parent.name";

/// A [`PolicyStore`] backed by `Role` and `Permission` nodes.
#[derive(Debug, Clone)]
pub struct GraphPolicyStore<E> {
    executor: E,
}

impl<E: GraphExecutor> GraphPolicyStore<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    fn run(&self, query: &str, role: &str) -> Result<Vec<Value>, StoreError> {
        let params = Params::from([("role".to_string(), Value::from(role))]);
        let result = self.executor.execute(query, &params).map_err(|e| {
            warn!(role, error = %e, "Policy graph query failed");
            StoreError::Unavailable(e.to_string())
        })?;
        Ok(result
            .rows
            .into_iter()
            .filter_map(|row| row.into_iter().next())
            .collect())
    }
}

impl<E: GraphExecutor> PolicyStore for GraphPolicyStore<E> {
    fn permissions_for_role(&self, role: &str) -> Result<Vec<PermissionRecord>, StoreError> {
        let records = collect_records(self.run(PERMISSIONS_QUERY, role)?.iter().map(|value| {
            record_from_value(value).inspect_err(|e| {
                warn!(role, error = %e, "Unreadable Permission node");
            })
        }))?;
        debug!(role, permissions = records.len(), "Permissions read from graph");
        Ok(records)
    }

    fn parent_roles(&self, role: &str) -> Result<Vec<String>, StoreError> {
        self.run(PARENTS_QUERY, role)?
            .into_iter()
            .map(|value| match value {
                Value::String(name) => Ok(name),
                other => Err(StoreError::Malformed(format!(
                    "role name is not a string: {other}"
                ))),
            })
            .collect()
    }
}

fn record_from_value(value: &Value) -> Result<PermissionRecord, StoreError> {
    let Some(entity) = value.as_entity() else {
        return Err(StoreError::Malformed(format!(
            "expected a Permission node, got {value}"
        )));
    };
    let json = Value::Map(entity.properties.clone()).to_json();
    serde_json::from_value(json).map_err(|e| {
        StoreError::Malformed(format!("Permission node {}: {e}", entity.id))
    })
}

/// Writes the roles and permissions of `document` into `graph`.
///
/// Property filters are stored as JSON text, the form policy graphs
/// usually carry them in.
pub fn seed_policy(graph: &mut MemoryGraph, document: &PolicyDocument) {
    let mut permissions = BTreeMap::new();
    for record in &document.permissions {
        let mut properties: Vec<(String, Value)> = vec![
            ("name".into(), Value::from(record.name.as_str())),
            ("resource".into(), Value::from(record.resource.as_str())),
            ("action".into(), Value::from(record.action.as_str())),
        ];
        let optional = [
            ("grant_type", record.grant_type.clone()),
            ("node_label", record.node_label.clone()),
            ("edge_type", record.edge_type.clone()),
            ("property_name", record.property_name.clone()),
            ("property_filter", record.property_filter.as_ref().map(ToString::to_string)),
            ("attribute_condition", record.attribute_condition.clone()),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                properties.push((key.into(), Value::String(value)));
            }
        }
        let id = graph.add_node("Permission", properties);
        permissions.insert(record.name.as_str(), id);
    }

    let mut roles = BTreeMap::new();
    let mut role_id = |graph: &mut MemoryGraph, name: &str| -> u64 {
        *roles
            .entry(name.to_string())
            .or_insert_with(|| graph.add_node("Role", [("name", name)]))
    };

    for role in &document.roles {
        let id = role_id(graph, &role.name);
        for permission in &role.permissions {
            match permissions.get(permission.as_str()) {
                Some(&target) => {
                    graph.add_edge(id, "HAS_PERMISSION", target, Vec::<(String, Value)>::new());
                }
                None => warn!(role = %role.name, permission, "Unknown permission, not linked"),
            }
        }
        for parent in &role.inherits {
            let parent_id = role_id(graph, parent);
            graph.add_edge(id, "INHERITS_FROM", parent_id, Vec::<(String, Value)>::new());
        }
    }
}
