//! Engine assembly: a policy manager and a secure graph behind one handle.

use graphward_config::GraphwardConfig;
use graphward_query::{
    Entity, GraphExecutor, Params, QueryResult, Result, Rewrite, SecureGraph, Value,
};
use graphward_rbac::{
    MemoryPolicyStore, PolicyLoadError, PolicyManager, PolicyStore, SecurityContext,
};
use graphward_types::Principal;
use tracing::info;

/// Serves secured reads for any principal.
///
/// A fresh [`SecurityContext`] is built for every call, so policy changes
/// in the store are seen by the next request.
#[derive(Debug)]
pub struct Graphward<E, S> {
    manager: PolicyManager<S>,
    graph: SecureGraph<E>,
}

impl<E: GraphExecutor, S: PolicyStore> Graphward<E, S> {
    /// Creates an engine with default settings.
    pub fn new(executor: E, store: S) -> Self {
        Self {
            manager: PolicyManager::new(store),
            graph: SecureGraph::new(executor),
        }
    }

    /// Creates an engine with the security and policy settings of `config`.
    pub fn with_config(executor: E, store: S, config: &GraphwardConfig) -> Self {
        Self {
            manager: PolicyManager::new(store)
                .with_settings(config.policy_settings())
                .with_context_settings(config.context_settings()),
            graph: SecureGraph::new(executor),
        }
    }

    pub fn manager(&self) -> &PolicyManager<S> {
        &self.manager
    }

    pub fn graph(&self) -> &SecureGraph<E> {
        &self.graph
    }

    /// Builds the per-request context for `principal`.
    pub fn context_for(&self, principal: &Principal) -> SecurityContext {
        self.manager.context_for(principal)
    }

    pub fn read(
        &self,
        query: &str,
        params: &Params,
        principal: &Principal,
    ) -> Result<QueryResult> {
        let context = self.context_for(principal);
        self.graph.read(query, params, &context)
    }

    /// Rewrites `query` for `principal` without running it.
    pub fn explain(&self, query: &str, principal: &Principal) -> Result<Rewrite> {
        let context = self.context_for(principal);
        self.graph.explain(query, &context)
    }

    pub fn find_all(&self, label: &str, principal: &Principal) -> Result<Vec<Entity>> {
        let context = self.context_for(principal);
        self.graph.find_all(label, &context)
    }

    pub fn find_by_id(
        &self,
        label: &str,
        id: impl Into<Value>,
        principal: &Principal,
    ) -> Result<Option<Entity>> {
        let context = self.context_for(principal);
        self.graph.find_by_id(label, id, &context)
    }

    pub fn find_by(
        &self,
        label: &str,
        property: &str,
        value: impl Into<Value>,
        principal: &Principal,
    ) -> Result<Vec<Entity>> {
        let context = self.context_for(principal);
        self.graph.find_by(label, property, value, &context)
    }
}

impl<E: GraphExecutor> Graphward<E, MemoryPolicyStore> {
    /// Creates an engine whose policy comes from `config.policy.document`.
    ///
    /// Without a document the store is empty.
    pub fn open(
        executor: E,
        config: &GraphwardConfig,
    ) -> std::result::Result<Self, PolicyLoadError> {
        let store = match &config.policy.document {
            Some(path) => {
                let store = MemoryPolicyStore::load(path)?;
                info!(document = %path.display(), "Policy document loaded");
                store
            }
            None => MemoryPolicyStore::new(),
        };
        Ok(Self::with_config(executor, store, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphward_query::MemoryGraph;
    use graphward_rbac::DefaultDecision;
    use std::io::Write;

    fn graph() -> MemoryGraph {
        let mut graph = MemoryGraph::new();
        graph.add_node("Geography", [("name", "France")]);
        graph.add_node("Geography", [("name", "United States")]);
        graph.add_node("Commodity", [("name", "Wheat")]);
        graph
    }

    #[test]
    fn test_open_with_document() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[[permissions]]
name = "deny:france"
resource = "node"
action = "read"
grant_type = "DENY"
node_label = "Geography"
property_filter = {{ name = "France" }}

[[roles]]
name = "restricted_analyst"
permissions = ["deny:france"]
"#
        )
        .unwrap();

        let mut config = GraphwardConfig::default();
        config.policy.document = Some(file.path().to_path_buf());
        config.security.audit = false;
        let engine = Graphward::open(graph(), &config).unwrap();

        let alice = Principal::new("alice").with_role("restricted_analyst");
        let names: Vec<_> = engine
            .find_all("Geography", &alice)
            .unwrap()
            .into_iter()
            .map(|e| e.get("name").clone())
            .collect();
        assert_eq!(names, vec![Value::from("United States")]);
    }

    #[test]
    fn test_open_missing_document() {
        let mut config = GraphwardConfig::default();
        config.policy.document = Some("/nonexistent/policy.toml".into());
        assert!(matches!(
            Graphward::open(graph(), &config),
            Err(PolicyLoadError::Read { .. })
        ));
    }

    #[test]
    fn test_config_settings_applied() {
        let config = GraphwardConfig::strict();
        let engine = Graphward::with_config(graph(), MemoryPolicyStore::new(), &config);
        assert_eq!(
            engine.manager().context_settings().default_decision,
            DefaultDecision::Deny
        );

        // Nothing is granted, so nothing is visible.
        let bob = Principal::new("bob");
        assert!(engine.find_all("Commodity", &bob).unwrap().is_empty());
        let root = Principal::superuser("root");
        assert_eq!(engine.find_all("Commodity", &root).unwrap().len(), 1);
    }
}
