//! Policy stores.
//!
//! A [`PolicyStore`] is the durable source of permission records. The engine
//! only ever reads from it.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::permissions::PermissionRecord;

/// Error reading from a policy store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("Policy store unavailable: {0}")]
    Unavailable(String),

    /// The store returned data that does not describe a permission.
    #[error("Malformed policy data: {0}")]
    Malformed(String),

    /// Some of a role's permissions could not be read; `records` holds the
    /// ones that could.
    #[error("Incomplete policy data: {reason}")]
    Partial {
        records: Vec<PermissionRecord>,
        reason: String,
    },
}

/// Collects per-permission results for one role.
///
/// Failures do not discard the records that did read: they are returned in
/// [`StoreError::Partial`] so their denials still apply.
pub fn collect_records(
    results: impl IntoIterator<Item = Result<PermissionRecord, StoreError>>,
) -> Result<Vec<PermissionRecord>, StoreError> {
    let mut records = Vec::new();
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok(record) => records.push(record),
            Err(e) => failures.push(e.to_string()),
        }
    }
    if failures.is_empty() {
        Ok(records)
    } else {
        Err(StoreError::Partial {
            records,
            reason: failures.join("; "),
        })
    }
}

/// Durable source of roles and permissions.
pub trait PolicyStore {
    /// Returns the permission records directly linked to `role`.
    ///
    /// An unknown role has no permissions.
    fn permissions_for_role(&self, role: &str) -> Result<Vec<PermissionRecord>, StoreError>;

    /// Returns the roles `role` inherits from.
    fn parent_roles(&self, _role: &str) -> Result<Vec<String>, StoreError> {
        Ok(Vec::new())
    }
}

impl<S: PolicyStore + ?Sized> PolicyStore for &S {
    fn permissions_for_role(&self, role: &str) -> Result<Vec<PermissionRecord>, StoreError> {
        (**self).permissions_for_role(role)
    }

    fn parent_roles(&self, role: &str) -> Result<Vec<String>, StoreError> {
        (**self).parent_roles(role)
    }
}

impl<S: PolicyStore + ?Sized> PolicyStore for Box<S> {
    fn permissions_for_role(&self, role: &str) -> Result<Vec<PermissionRecord>, StoreError> {
        (**self).permissions_for_role(role)
    }

    fn parent_roles(&self, role: &str) -> Result<Vec<String>, StoreError> {
        (**self).parent_roles(role)
    }
}

impl<S: PolicyStore + ?Sized> PolicyStore for Arc<S> {
    fn permissions_for_role(&self, role: &str) -> Result<Vec<PermissionRecord>, StoreError> {
        (**self).permissions_for_role(role)
    }

    fn parent_roles(&self, role: &str) -> Result<Vec<String>, StoreError> {
        (**self).parent_roles(role)
    }
}

// ============================================================================
// Policy documents
// ============================================================================

/// Error loading a policy document.
#[derive(Debug, Error)]
pub enum PolicyLoadError {
    #[error("Failed to read policy document at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse TOML policy document: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Failed to parse JSON policy document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Duplicate permission name '{0}'")]
    DuplicatePermission(String),

    #[error("Role '{role}' references unknown permission '{permission}'")]
    UnknownPermission { role: String, permission: String },
}

/// A role as written in a policy document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub inherits: Vec<String>,
}

/// Roles and permissions in one serializable document.
///
/// ```toml
/// [[permissions]]
/// name = "deny:france"
/// resource = "node"
/// action = "read"
/// grant_type = "DENY"
/// node_label = "Geography"
/// property_filter = { name = "France" }
///
/// [[roles]]
/// name = "restricted_analyst"
/// permissions = ["deny:france"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(default)]
    pub permissions: Vec<PermissionRecord>,
    #[serde(default)]
    pub roles: Vec<RoleDefinition>,
}

impl PolicyDocument {
    pub fn from_toml_str(text: &str) -> Result<Self, PolicyLoadError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self, PolicyLoadError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Reads a document, choosing the format by file extension (TOML unless `.json`).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyLoadError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| PolicyLoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&text)
        } else {
            Self::from_toml_str(&text)
        }
    }
}

// ============================================================================
// MemoryPolicyStore
// ============================================================================

/// In-memory policy store.
#[derive(Debug, Clone, Default)]
pub struct MemoryPolicyStore {
    permissions: BTreeMap<String, PermissionRecord>,
    roles: BTreeMap<String, RoleDefinition>,
}

impl MemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store from a document, checking that every role reference resolves.
    pub fn from_document(document: PolicyDocument) -> Result<Self, PolicyLoadError> {
        let mut store = Self::new();
        let mut seen = HashSet::new();

        for record in document.permissions {
            if !seen.insert(record.name.clone()) {
                return Err(PolicyLoadError::DuplicatePermission(record.name));
            }
            store.permissions.insert(record.name.clone(), record);
        }

        for role in document.roles {
            if let Some(missing) = role
                .permissions
                .iter()
                .find(|p| !store.permissions.contains_key(*p))
            {
                return Err(PolicyLoadError::UnknownPermission {
                    role: role.name.clone(),
                    permission: missing.clone(),
                });
            }
            store.roles.insert(role.name.clone(), role);
        }

        Ok(store)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyLoadError> {
        Self::from_document(PolicyDocument::load(path)?)
    }

    /// Adds or replaces a permission record.
    pub fn with_permission(mut self, record: PermissionRecord) -> Self {
        self.permissions.insert(record.name.clone(), record);
        self
    }

    /// Links permissions to a role, creating the role if needed.
    pub fn with_role<I, S>(mut self, role: &str, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self.role_entry(role);
        entry.permissions.extend(permissions.into_iter().map(Into::into));
        self
    }

    /// Records that `role` inherits from `parent`.
    pub fn with_inheritance(mut self, role: &str, parent: &str) -> Self {
        self.role_entry(parent);
        self.role_entry(role).inherits.push(parent.to_string());
        self
    }

    fn role_entry(&mut self, role: &str) -> &mut RoleDefinition {
        self.roles
            .entry(role.to_string())
            .or_insert_with(|| RoleDefinition {
                name: role.to_string(),
                ..RoleDefinition::default()
            })
    }

    /// Returns the document equivalent of this store.
    pub fn to_document(&self) -> PolicyDocument {
        PolicyDocument {
            permissions: self.permissions.values().cloned().collect(),
            roles: self.roles.values().cloned().collect(),
        }
    }
}

impl PolicyStore for MemoryPolicyStore {
    fn permissions_for_role(&self, role: &str) -> Result<Vec<PermissionRecord>, StoreError> {
        let Some(definition) = self.roles.get(role) else {
            return Ok(Vec::new());
        };

        collect_records(definition.permissions.iter().map(|name| {
            self.permissions.get(name).cloned().ok_or_else(|| {
                StoreError::Malformed(format!("role '{role}' links missing permission '{name}'"))
            })
        }))
    }

    fn parent_roles(&self, role: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .roles
            .get(role)
            .map(|definition| definition.inherits.clone())
            .unwrap_or_default())
    }
}
