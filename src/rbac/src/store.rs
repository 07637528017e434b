//! Permission storage: roles, permissions and their grants

use crate::error::{RbacError, Result};
use crate::types::{roles, Action, Permission, PermissionId, Role, RoleId};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(feature = "postgres")]
pub use postgres::PostgresPermissionStore;

#[cfg(feature = "mysql")]
pub use mysql::MySqlPermissionStore;

/// Source of truth for the permission model.
///
/// Implementations return `Err(StoreUnavailable)` on infrastructure failure.
/// A role that does not exist has no permissions; that is not an error.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// All permissions granted to a role (empty for unknown roles)
    async fn permissions_for_role(&self, role: &str) -> Result<Vec<Permission>>;

    /// Identifier of a role, if it exists
    async fn role_id(&self, role: &str) -> Result<Option<RoleId>>;

    /// All roles ordered by name
    async fn list_roles(&self) -> Result<Vec<Role>>;

    /// Whether a role holds the permission with this name
    async fn role_has_permission(&self, role: &str, permission: &str) -> Result<bool> {
        let permissions = self.permissions_for_role(role).await?;
        Ok(permissions.iter().any(|p| p.name == permission))
    }

    /// Whether a role may perform `action` on `resource`
    async fn role_has_resource_permission(
        &self,
        role: &str,
        resource: &str,
        action: Action,
    ) -> Result<bool> {
        let permissions = self.permissions_for_role(role).await?;
        Ok(permissions.iter().any(|p| p.grants(resource, action)))
    }
}

#[derive(Default)]
struct Catalog {
    roles: BTreeMap<RoleId, Role>,
    permissions: BTreeMap<PermissionId, Permission>,
    grants: BTreeSet<(RoleId, PermissionId)>,
    next_role_id: RoleId,
    next_permission_id: PermissionId,
}

impl Catalog {
    fn role_by_name(&self, name: &str) -> Option<&Role> {
        self.roles.values().find(|r| r.name == name)
    }

    fn permission_by_name(&self, name: &str) -> Option<&Permission> {
        self.permissions.values().find(|p| p.name == name)
    }
}

/// In-memory permission store
///
/// Enforces the same invariants as the relational schema: unique role names,
/// unique permission names, unique (resource, action) pairs, one grant per
/// (role, permission) and cascading removal of grants.
pub struct InMemoryPermissionStore {
    catalog: Arc<RwLock<Catalog>>,
}

impl InMemoryPermissionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            catalog: Arc::new(RwLock::new(Catalog::default())),
        }
    }

    /// Create a role, failing on duplicate names
    pub async fn create_role(
        &self,
        name: impl Into<String>,
        description: Option<String>,
    ) -> Result<Role> {
        let name = name.into();
        let mut catalog = self.catalog.write().await;
        if catalog.role_by_name(&name).is_some() {
            return Err(RbacError::Conflict(format!("role '{}' already exists", name)));
        }

        catalog.next_role_id += 1;
        let role = Role {
            id: catalog.next_role_id,
            name,
            description,
        };
        catalog.roles.insert(role.id, role.clone());
        Ok(role)
    }

    /// Create a permission, failing on duplicate names or capabilities
    pub async fn create_permission(
        &self,
        name: impl Into<String>,
        resource: impl Into<String>,
        action: Action,
        description: Option<String>,
    ) -> Result<Permission> {
        let name = name.into();
        let resource = resource.into();
        let mut catalog = self.catalog.write().await;

        if catalog.permission_by_name(&name).is_some() {
            return Err(RbacError::Conflict(format!("permission '{}' already exists", name)));
        }
        if catalog.permissions.values().any(|p| p.grants(&resource, action)) {
            return Err(RbacError::Conflict(format!(
                "capability {}:{} is already modelled",
                resource, action
            )));
        }

        catalog.next_permission_id += 1;
        let permission = Permission {
            id: catalog.next_permission_id,
            name,
            resource,
            action,
            description,
        };
        catalog.permissions.insert(permission.id, permission.clone());
        Ok(permission)
    }

    /// Grant a permission to a role. Granting twice is a no-op.
    pub async fn grant(&self, role: &str, permission: &str) -> Result<()> {
        let mut catalog = self.catalog.write().await;
        let role_id = catalog
            .role_by_name(role)
            .map(|r| r.id)
            .ok_or_else(|| RbacError::RoleNotFound(role.to_string()))?;
        let permission_id = catalog
            .permission_by_name(permission)
            .map(|p| p.id)
            .ok_or_else(|| RbacError::PermissionNotFound(permission.to_string()))?;

        catalog.grants.insert((role_id, permission_id));
        debug!("Granted {} to {}", permission, role);
        Ok(())
    }

    /// Revoke a permission from a role. Returns whether a grant was removed.
    pub async fn revoke(&self, role: &str, permission: &str) -> Result<bool> {
        let mut catalog = self.catalog.write().await;
        let role_id = catalog
            .role_by_name(role)
            .map(|r| r.id)
            .ok_or_else(|| RbacError::RoleNotFound(role.to_string()))?;
        let permission_id = catalog
            .permission_by_name(permission)
            .map(|p| p.id)
            .ok_or_else(|| RbacError::PermissionNotFound(permission.to_string()))?;

        let removed = catalog.grants.remove(&(role_id, permission_id));
        debug!("Revoked {} from {} (removed={})", permission, role, removed);
        Ok(removed)
    }

    /// Delete a role together with its grants
    pub async fn delete_role(&self, role: &str) -> Result<()> {
        let mut catalog = self.catalog.write().await;
        let role_id = catalog
            .role_by_name(role)
            .map(|r| r.id)
            .ok_or_else(|| RbacError::RoleNotFound(role.to_string()))?;

        catalog.roles.remove(&role_id);
        catalog.grants.retain(|(r, _)| *r != role_id);
        Ok(())
    }

    /// Delete a permission together with its grants
    pub async fn delete_permission(&self, permission: &str) -> Result<()> {
        let mut catalog = self.catalog.write().await;
        let permission_id = catalog
            .permission_by_name(permission)
            .map(|p| p.id)
            .ok_or_else(|| RbacError::PermissionNotFound(permission.to_string()))?;

        catalog.permissions.remove(&permission_id);
        catalog.grants.retain(|(_, p)| *p != permission_id);
        Ok(())
    }

    /// Number of (role, permission) grants
    pub async fn grant_count(&self) -> usize {
        self.catalog.read().await.grants.len()
    }

    /// Store seeded with the clinic's default roles, permissions and grants
    pub async fn clinic_defaults() -> Result<Self> {
        let store = Self::new();

        store
            .create_role(roles::CLIENT, Some("Patient role with access to their own appointments and records".into()))
            .await?;
        store
            .create_role(roles::EMPLOYEE, Some("Staff role with access to patient records and appointment management".into()))
            .await?;
        store
            .create_role(roles::ADMIN, Some("Administrator role with full system access".into()))
            .await?;
        store
            .create_role(roles::MANAGER, Some("Clinic manager with administrative access but limited configuration".into()))
            .await?;

        let crud = [Action::Create, Action::Read, Action::Update, Action::Delete];
        let catalogue: [(&str, &[Action]); 10] = [
            ("users", &crud),
            ("roles", &crud),
            ("permissions", &crud),
            ("appointments", &crud),
            ("clients", &[Action::Create, Action::Read, Action::Update]),
            ("inventory", &crud),
            ("invoices", &crud),
            ("reports", &[Action::Create, Action::Read]),
            ("medical_history", &[Action::Read, Action::Update]),
            ("treatment_plans", &[Action::Create, Action::Read, Action::Update]),
        ];
        for (resource, actions) in catalogue {
            for action in actions {
                let name = format!("{}_{}", resource, action.as_str().to_lowercase());
                store.create_permission(name, resource, *action, None).await?;
            }
        }
        // Exporting a report is modelled as an update of the report
        store
            .create_permission("reports_export", "reports", Action::Update, Some("Export reports".into()))
            .await?;

        let all: Vec<String> = {
            let catalog = store.catalog.read().await;
            catalog.permissions.values().map(|p| p.name.clone()).collect()
        };

        for name in &all {
            store.grant(roles::ADMIN, name).await?;
        }

        let employee_excluded = [
            "users_delete",
            "roles_update",
            "roles_delete",
            "permissions_update",
            "permissions_delete",
            "reports_create",
            "reports_export",
        ];
        for name in all.iter().filter(|n| !employee_excluded.contains(&n.as_str())) {
            store.grant(roles::EMPLOYEE, name).await?;
        }

        for name in [
            "appointments_create",
            "appointments_read",
            "clients_read",
            "inventory_read",
            "invoices_read",
            "medical_history_read",
            "treatment_plans_read",
        ] {
            store.grant(roles::CLIENT, name).await?;
        }

        let manager_resources = ["appointments", "inventory", "invoices", "reports"];
        for name in all.iter().filter(|n| {
            manager_resources.iter().any(|r| n.starts_with(&format!("{}_", r)))
                || matches!(
                    n.as_str(),
                    "users_create"
                        | "users_read"
                        | "users_update"
                        | "medical_history_read"
                        | "medical_history_update"
                        | "treatment_plans_create"
                        | "treatment_plans_read"
                        | "treatment_plans_update"
                )
        }) {
            store.grant(roles::MANAGER, name).await?;
        }

        Ok(store)
    }
}

impl Default for InMemoryPermissionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PermissionStore for InMemoryPermissionStore {
    async fn permissions_for_role(&self, role: &str) -> Result<Vec<Permission>> {
        let catalog = self.catalog.read().await;
        let Some(role_id) = catalog.role_by_name(role).map(|r| r.id) else {
            return Ok(Vec::new());
        };

        Ok(catalog
            .grants
            .iter()
            .filter(|(r, _)| *r == role_id)
            .filter_map(|(_, p)| catalog.permissions.get(p).cloned())
            .collect())
    }

    async fn role_id(&self, role: &str) -> Result<Option<RoleId>> {
        let catalog = self.catalog.read().await;
        Ok(catalog.role_by_name(role).map(|r| r.id))
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        let catalog = self.catalog.read().await;
        let mut roles: Vec<Role> = catalog.roles.values().cloned().collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }
}
