//! # graphward-query: Secure reads over property graphs
//!
//! This crate turns a caller's Cypher read into one that only sees what the
//! caller's policy allows, runs it, and redacts what comes back.
//!
//! ## Cypher Subset
//!
//! Supported:
//! - a single `MATCH` path: `(a:Label)-[r:TYPE]->(b:Label)`, in any direction
//! - inline property maps on nodes and relationships
//! - `WHERE` with `AND`/`OR`/`XOR`/`NOT`, comparisons, `IN`, `STARTS WITH`,
//!   `ENDS WITH`, `CONTAINS`, `IS [NOT] NULL` and arithmetic
//! - `RETURN [DISTINCT]` with `AS`, aggregates, `ORDER BY`, `SKIP`, `LIMIT`
//! - parameters (`$name`)
//!
//! Everything else (`OPTIONAL MATCH`, `WITH`, `UNION`, `CALL`, writes,
//! several patterns) is rejected, so it can never run unfiltered.
//!
//! ## Usage
//!
//! ```
//! use graphward_query::{MemoryGraph, Params, SecureGraph, Value};
//! use graphward_rbac::{GrantType, MemoryPolicyStore, PermissionRecord, PolicyManager, Resource, READ};
//! use graphward_types::Principal;
//!
//! let mut graph = MemoryGraph::new();
//! graph.add_node("Geography", [("name", "France")]);
//! graph.add_node("Geography", [("name", "United States")]);
//!
//! let store = MemoryPolicyStore::new()
//!     .with_permission(
//!         PermissionRecord::new("deny:france", Resource::Node, READ, GrantType::Deny)
//!             .with_node_label("Geography")
//!             .with_property_filter(serde_json::json!({"name": "France"})),
//!     )
//!     .with_role("restricted_analyst", ["deny:france"]);
//! let context = PolicyManager::new(store)
//!     .context_for(&Principal::new("alice").with_role("restricted_analyst"));
//!
//! let secure = SecureGraph::new(graph);
//! let result = secure
//!     .read("MATCH (g:Geography) RETURN g.name", &Params::new(), &context)
//!     .unwrap();
//! assert_eq!(result.column("g.name"), vec![&Value::from("United States")]);
//! ```

pub mod ast;
mod error;
mod executor;
mod lexer;
pub mod memory;
mod parser;
pub mod rewriter;
pub mod secure;
mod value;

// Re-export public types
pub use error::{AccessError, CypherError, ExecutorError, Result, RewriteError};
pub use executor::GraphExecutor;
pub use memory::MemoryGraph;
pub use parser::{parse_expression, parse_query};
pub use rewriter::{GENERATED_ALIAS_PREFIX, QueryRewriter, RemovedColumn, Rewrite};
pub use secure::{SecureGraph, redact};
pub use value::{Entity, Params, QueryResult, Row, Value};
