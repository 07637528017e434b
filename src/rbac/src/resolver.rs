//! Cache-backed permission resolution
//!
//! [`PermissionResolver`] is the only path through which the rest of the
//! crate reads the permission store. Every store call is bounded by a timeout,
//! and a timeout is reported as [`RbacError::StoreUnavailable`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::PermissionCache;
use crate::error::{RbacError, Result};
use crate::store::PermissionStore;
use crate::types::{Action, PermissionSet, Role, RoleId};

/// Default upper bound on one store round-trip
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);

/// Resolves role permissions through the cache, falling back to the store
#[derive(Clone)]
pub struct PermissionResolver {
    store: Arc<dyn PermissionStore>,
    cache: Arc<PermissionCache>,
    store_timeout: Duration,
}

impl PermissionResolver {
    pub fn new(store: Arc<dyn PermissionStore>, cache: Arc<PermissionCache>) -> Self {
        Self {
            store,
            cache,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn cache(&self) -> &Arc<PermissionCache> {
        &self.cache
    }

    /// Permission set of a role (empty for unknown roles)
    pub async fn permissions_for_role(&self, role: &str) -> Result<Arc<PermissionSet>> {
        if let Some(cached) = self.cache.get(role) {
            debug!("Permission cache hit for role '{}'", role);
            return Ok(cached);
        }

        let rows = self.bounded(self.store.permissions_for_role(role)).await?;
        let set = PermissionSet::new(rows);
        debug!("Loaded {} permissions for role '{}'", set.len(), role);

        Ok(self.cache.put(role, set))
    }

    /// Whether a role holds the permission with this name
    pub async fn role_has_permission(&self, role: &str, permission: &str) -> Result<bool> {
        Ok(self.permissions_for_role(role).await?.contains_name(permission))
    }

    /// Whether a role may perform `action` on `resource`
    pub async fn role_has_resource_permission(
        &self,
        role: &str,
        resource: &str,
        action: Action,
    ) -> Result<bool> {
        Ok(self.permissions_for_role(role).await?.allows(resource, action))
    }

    /// Identifier of a role; not cached
    pub async fn role_id(&self, role: &str) -> Result<Option<RoleId>> {
        self.bounded(self.store.role_id(role)).await
    }

    /// All roles ordered by name; not cached
    pub async fn list_roles(&self) -> Result<Vec<Role>> {
        self.bounded(self.store.list_roles()).await
    }

    /// Forget every cached permission set. Call after any change to roles,
    /// permissions or grants.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!("Permission store error: {}", e);
                Err(e)
            }
            Err(_) => {
                warn!("Permission store timed out after {:?}", self.store_timeout);
                Err(RbacError::StoreUnavailable(format!(
                    "timed out after {:?}",
                    self.store_timeout
                )))
            }
        }
    }
}
