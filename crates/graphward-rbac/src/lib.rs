//! # graphward-rbac: Policy resolution for property-graph queries
//!
//! Turns a principal's roles into the filters a query must carry:
//! - **Permission records** and the closed [`PolicyRule`] union they load into
//! - **Policy stores** ([`PolicyStore`], [`MemoryPolicyStore`])
//! - **Role inheritance** walked once per load, with cycle detection
//! - **Security contexts** answering row, edge and property questions per request
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Principal (id, roles, superuser flag)       │
//! └─────────────────┬───────────────────────────┘
//!                   │
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  PolicyManager                               │
//! │  ├─ Role inheritance walk                    │
//! │  ├─ PolicyStore reads                        │
//! │  └─ Record → PolicyRule conversion           │
//! └─────────────────┬───────────────────────────┘
//!                   │ ResolvedPolicy
//!                   ▼
//! ┌─────────────────────────────────────────────┐
//! │  SecurityContext (one per request)           │
//! │  ├─ row_filters(label, action)               │
//! │  ├─ edge_filters(type, action)               │
//! │  └─ denied_properties(label, action)         │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Precedence
//!
//! DENY always wins over GRANT. A DENY without a condition hides every entity
//! of its label; a DENY with a condition becomes `NOT (<condition>)`. GRANTs
//! only narrow when they carry a condition. Labels that no rule mentions are
//! unrestricted unless [`DefaultDecision::Deny`] is configured.
//!
//! ## Example
//!
//! ```
//! use graphward_rbac::{GrantType, MemoryPolicyStore, PermissionRecord, PolicyManager, Resource, READ};
//! use graphward_types::Principal;
//!
//! let store = MemoryPolicyStore::new()
//!     .with_permission(
//!         PermissionRecord::new("deny:france", Resource::Node, READ, GrantType::Deny)
//!             .with_node_label("Geography")
//!             .with_property_filter(serde_json::json!({"name": "France"})),
//!     )
//!     .with_role("restricted_analyst", ["deny:france"]);
//!
//! let manager = PolicyManager::new(store);
//! let context = manager.context_for(&Principal::new("alice").with_role("restricted_analyst"));
//!
//! let filters = context.row_filters("Geography", READ);
//! assert_eq!(filters[0].to_cypher_for("g"), "NOT (g.name = 'France')");
//! ```

pub mod context;
pub mod filter;
pub mod permissions;
pub mod policy;
pub mod roles;
pub mod store;

// Re-export commonly used types
pub use context::{
    ContextSettings, DefaultDecision, PRINCIPAL_PARAM, ROLES_PARAM, SecurityContext,
    SecurityParameters,
};
pub use filter::FilterExpression;
pub use permissions::{
    GrantType, PermissionRecord, PolicyRule, READ, Resource, RuleCondition, RuleConversionError,
    RuleTarget,
};
pub use policy::{PolicyManager, PolicySettings, ResolvedPolicy};
pub use roles::{DEFAULT_MAX_INHERITANCE_DEPTH, RoleExpansion, expand_roles};
pub use store::{
    MemoryPolicyStore, PolicyDocument, PolicyLoadError, PolicyStore, RoleDefinition, StoreError,
    collect_records,
};
