//! Core permission-model types

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::error::RbacError;

/// Unique role identifier
pub type RoleId = i64;

/// Unique permission identifier
pub type PermissionId = i64;

/// Authenticated user identifier
pub type SubjectId = i64;

/// Well-known role names of the clinic backend
pub mod roles {
    pub const ADMIN: &str = "admin";
    pub const EMPLOYEE: &str = "employee";
    pub const CLIENT: &str = "client";
    pub const MANAGER: &str = "manager";
}

/// Operation kind on a resource.
///
/// Variants are declared in canonical order; sorted sets of actions render
/// as `CREATE,READ,UPDATE,DELETE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Create, Action::Read, Action::Update, Action::Delete];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Create => "CREATE",
            Action::Read => "READ",
            Action::Update => "UPDATE",
            Action::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = RbacError;

    /// Parses a whole action token, ignoring ASCII case.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|action| action.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| RbacError::InvalidPermissionString(format!("unknown action '{}'", value)))
    }
}

/// Named identity class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Atomic grant unit: one action on one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,

    /// Unique permission name, conventionally `<resource>_<action>`
    pub name: String,

    /// Resource tag (e.g., "invoices")
    pub resource: String,

    pub action: Action,

    #[serde(default)]
    pub description: Option<String>,
}

impl Permission {
    /// Whether this permission models the given capability
    pub fn grants(&self, resource: &str, action: Action) -> bool {
        self.resource == resource && self.action == action
    }
}

/// Every permission reachable from one role.
///
/// Derived from the store, never persisted. At most one entry per
/// (resource, action) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet {
    permissions: Vec<Permission>,
}

impl PermissionSet {
    pub fn new(permissions: Vec<Permission>) -> Self {
        let mut seen = BTreeSet::new();
        let permissions = permissions
            .into_iter()
            .filter(|p| seen.insert((p.resource.clone(), p.action)))
            .collect();
        Self { permissions }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.permissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Permission> {
        self.permissions.iter()
    }

    /// Whether a permission with this name is in the set
    pub fn contains_name(&self, name: &str) -> bool {
        self.permissions.iter().any(|p| p.name == name)
    }

    /// Whether the set grants `action` on `resource`
    pub fn allows(&self, resource: &str, action: Action) -> bool {
        self.permissions.iter().any(|p| p.grants(resource, action))
    }

    /// Actions grouped by resource, both in canonical order
    pub fn by_resource(&self) -> BTreeMap<&str, BTreeSet<Action>> {
        let mut grouped: BTreeMap<&str, BTreeSet<Action>> = BTreeMap::new();
        for p in &self.permissions {
            grouped.entry(p.resource.as_str()).or_default().insert(p.action);
        }
        grouped
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
