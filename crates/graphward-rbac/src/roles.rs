//! Role inheritance.
//!
//! Roles may inherit from other roles (`Role INHERITS_FROM Role`). The graph
//! is walked once per policy load, depth-first, from each role assigned to the
//! principal. Cycles and over-deep chains are skipped, never fatal.

use std::collections::HashMap;

use tracing::{error, warn};

use crate::store::PolicyStore;

/// Default bound on inheritance chain length.
pub const DEFAULT_MAX_INHERITANCE_DEPTH: usize = 16;

/// Result of expanding a principal's roles through inheritance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleExpansion {
    /// Every reachable role, in depth-first discovery order.
    pub roles: Vec<String>,
    /// Whether reading some role's parents failed.
    pub degraded: bool,
}

/// Walks the inheritance graph from `assigned`.
///
/// Assigned roles sit at depth 0; a parent reached at a depth greater than
/// `max_depth` is skipped.
pub fn expand_roles<S: PolicyStore + ?Sized>(
    store: &S,
    assigned: &[String],
    max_depth: usize,
) -> RoleExpansion {
    let mut walk = Walk {
        store,
        max_depth,
        visited: HashMap::new(),
        path: Vec::new(),
        expansion: RoleExpansion::default(),
    };

    for role in assigned {
        walk.visit(role, 0);
    }

    walk.expansion
}

struct Walk<'a, S: ?Sized> {
    store: &'a S,
    max_depth: usize,
    /// Shallowest depth each role has been expanded at.
    visited: HashMap<String, usize>,
    path: Vec<String>,
    expansion: RoleExpansion,
}

impl<S: PolicyStore + ?Sized> Walk<'_, S> {
    fn visit(&mut self, role: &str, depth: usize) {
        // A role first reached near the depth limit is expanded again when a
        // shorter path reaches it, since its parents may have been cut off.
        match self.visited.get(role) {
            Some(&seen) if seen <= depth => return,
            Some(_) => {}
            None => self.expansion.roles.push(role.to_string()),
        }
        self.visited.insert(role.to_string(), depth);

        let parents = match self.store.parent_roles(role) {
            Ok(parents) => parents,
            Err(e) => {
                error!(role = %role, error = %e, "Failed to read parent roles");
                self.expansion.degraded = true;
                return;
            }
        };

        self.path.push(role.to_string());
        for parent in parents {
            if self.path.contains(&parent) {
                warn!(
                    role = %role,
                    parent = %parent,
                    "Role inheritance cycle detected, skipping edge"
                );
                continue;
            }
            if depth + 1 > self.max_depth {
                warn!(
                    role = %role,
                    parent = %parent,
                    max_depth = self.max_depth,
                    "Role inheritance too deep, skipping edge"
                );
                continue;
            }
            self.visit(&parent, depth + 1);
        }
        self.path.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::PermissionRecord;
    use crate::store::{MemoryPolicyStore, StoreError};

    fn roles(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| (*n).to_string()).collect()
    }

    #[test]
    fn test_no_inheritance() {
        let store = MemoryPolicyStore::new().with_role("analyst", Vec::<String>::new());
        let expansion = expand_roles(&store, &roles(&["analyst"]), 16);
        assert_eq!(expansion.roles, roles(&["analyst"]));
        assert!(!expansion.degraded);
    }

    #[test]
    fn test_chain_is_followed() {
        let store = MemoryPolicyStore::new()
            .with_inheritance("trader", "analyst")
            .with_inheritance("analyst", "viewer");

        let expansion = expand_roles(&store, &roles(&["trader"]), 16);
        assert_eq!(expansion.roles, roles(&["trader", "analyst", "viewer"]));
    }

    #[test]
    fn test_diamond_visits_once() {
        let store = MemoryPolicyStore::new()
            .with_inheritance("lead", "trader")
            .with_inheritance("lead", "analyst")
            .with_inheritance("trader", "viewer")
            .with_inheritance("analyst", "viewer");

        let expansion = expand_roles(&store, &roles(&["lead"]), 16);
        assert_eq!(
            expansion.roles,
            roles(&["lead", "trader", "viewer", "analyst"])
        );
    }

    #[test]
    fn test_cycle_is_skipped() {
        let store = MemoryPolicyStore::new()
            .with_inheritance("a", "b")
            .with_inheritance("b", "c")
            .with_inheritance("c", "a");

        let expansion = expand_roles(&store, &roles(&["a"]), 16);
        assert_eq!(expansion.roles, roles(&["a", "b", "c"]));
        assert!(!expansion.degraded);
    }

    #[test]
    fn test_self_inheritance_is_skipped() {
        let store = MemoryPolicyStore::new().with_inheritance("a", "a");
        let expansion = expand_roles(&store, &roles(&["a"]), 16);
        assert_eq!(expansion.roles, roles(&["a"]));
    }

    #[test]
    fn test_depth_limit() {
        let store = MemoryPolicyStore::new()
            .with_inheritance("r0", "r1")
            .with_inheritance("r1", "r2")
            .with_inheritance("r2", "r3");

        let expansion = expand_roles(&store, &roles(&["r0"]), 2);
        assert_eq!(expansion.roles, roles(&["r0", "r1", "r2"]));
    }

    #[test]
    fn test_shorter_path_reexpands_role() {
        // "x" is first reached at the limit through a -> b -> x, then assigned
        // directly; its parent must still be found.
        let store = MemoryPolicyStore::new()
            .with_inheritance("a", "b")
            .with_inheritance("b", "x")
            .with_inheritance("x", "y");

        let expansion = expand_roles(&store, &roles(&["a", "x"]), 2);
        assert_eq!(expansion.roles, roles(&["a", "b", "x", "y"]));
    }

    struct BrokenParents;

    impl PolicyStore for BrokenParents {
        fn permissions_for_role(&self, _role: &str) -> Result<Vec<PermissionRecord>, StoreError> {
            Ok(Vec::new())
        }

        fn parent_roles(&self, _role: &str) -> Result<Vec<String>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    #[test]
    fn test_parent_failure_degrades() {
        let expansion = expand_roles(&BrokenParents, &roles(&["analyst"]), 16);
        assert_eq!(expansion.roles, roles(&["analyst"]));
        assert!(expansion.degraded);
    }
}
