//! # Graphward
//!
//! Attribute-based security for property-graph queries.
//!
//! Graphward sits between a caller and a graph store. Every read is
//! rewritten for the caller's roles before it reaches the store, and every
//! result is redacted before it reaches the caller:
//!
//! - **Row filters** hide nodes a policy denies (`WHERE NOT (g.name = 'France')`)
//! - **Edge filters** restrict which relationships a path may use
//! - **Property redaction** returns denied values as `null`, keeping the shape
//! - **Fail closed**: queries that cannot be secured are never executed
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Graphward                            │
//! │  ┌───────────┐   ┌──────────────┐   ┌──────────┐   ┌──────┐  │
//! │  │ Principal │ → │ PolicyManager│ → │ Rewriter │ → │ Store│  │
//! │  │  (roles)  │   │  (contexts)  │   │ (Cypher) │   │      │  │
//! │  └───────────┘   └──────────────┘   └──────────┘   └──────┘  │
//! │                                          ↑            │      │
//! │                                          └─ redact ←──┘      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use graphward::{Graphward, MemoryGraph, MemoryPolicyStore, PermissionRecord, Principal};
//! use graphward::{GrantType, Params, Resource, Value, READ};
//!
//! let mut graph = MemoryGraph::new();
//! graph.add_node("BalanceSheet", [("product_name", Value::from("Widget")), ("price", Value::from(9.5))]);
//!
//! let store = MemoryPolicyStore::new()
//!     .with_permission(
//!         PermissionRecord::new("deny:price", Resource::Property, READ, GrantType::Deny)
//!             .with_node_label("BalanceSheet")
//!             .with_property_name("price"),
//!     )
//!     .with_role("clerk", ["deny:price"]);
//!
//! let engine = Graphward::new(graph, store);
//! let clerk = Principal::new("carol").with_role("clerk");
//! let result = engine
//!     .read("MATCH (b:BalanceSheet) RETURN b.product_name, b.price", &Params::new(), &clerk)
//!     .unwrap();
//!
//! assert_eq!(result.rows, vec![vec![Value::from("Widget"), Value::Null]]);
//! ```
//!
//! # Modules
//!
//! - **Engine**: [`Graphward`] - per-request contexts over one store
//! - **Policy**: [`PolicyManager`], [`SecurityContext`], [`GraphPolicyStore`]
//! - **Query**: [`SecureGraph`], [`QueryRewriter`], [`MemoryGraph`]

mod engine;
pub mod graph_store;

pub use engine::Graphward;
pub use graph_store::{GraphPolicyStore, seed_policy};

// Re-export configuration
pub use graphward_config::{ConfigLoader, GraphwardConfig, PolicyConfig, SecurityConfig};

// Re-export shared types
pub use graphward_types::{Principal, PrincipalId, Scalar};

// Re-export policy types
pub use graphward_rbac::{
    ContextSettings, DefaultDecision, FilterExpression, GrantType, MemoryPolicyStore,
    PermissionRecord, PolicyDocument, PolicyLoadError, PolicyManager, PolicyRule, PolicySettings,
    PolicyStore, READ, Resource, ResolvedPolicy, SecurityContext, StoreError,
};

// Re-export query types
pub use graphward_query::{
    AccessError, CypherError, Entity, ExecutorError, GraphExecutor, MemoryGraph, Params,
    QueryResult, QueryRewriter, RemovedColumn, Result, Rewrite, RewriteError, Row, SecureGraph,
    Value,
};
