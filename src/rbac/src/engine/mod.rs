//! Access decision engine
//!
//! Checks a verified credential against a required capability in two stages:
//!
//! ```text
//! Claims → try_fast_path ──Granted──────────────→ allow (Token)
//!               │
//!          NoMatch / NoClaims
//!               ↓
//!        fallback_slow_path → PermissionResolver → allow / deny (Store)
//!               │                 [Cache] → [Store]
//!             error ─────────────────────────────→ Err (never allow)
//! ```
//!
//! The fast path never touches the store. It can be stale-permissive after a
//! revocation until the credential expires; the slow path is authoritative.

pub mod decision;
pub mod metrics;

pub use decision::{AccessDecision, DecisionPath, FastPath, Rejection};
pub use metrics::{EngineMetrics, MetricsCollector};

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::claims::{Claims, PermissionMap};
use crate::error::{RbacError, Result};
use crate::resolver::PermissionResolver;
use crate::types::Action;

const FORBIDDEN_MESSAGE: &str = "Access denied: insufficient permissions";
const INTERNAL_MESSAGE: &str = "Error checking permissions";

/// Split a `resource_action` permission name at its last underscore
pub fn split_permission_name(name: &str) -> Option<(&str, Action)> {
    let (resource, action) = name.rsplit_once('_')?;
    if resource.is_empty() {
        return None;
    }
    action.parse().ok().map(|action| (resource, action))
}

/// Two-stage access decision engine
pub struct AccessEngine {
    resolver: PermissionResolver,
    metrics: Arc<MetricsCollector>,
}

impl AccessEngine {
    pub fn new(resolver: PermissionResolver) -> Self {
        Self {
            resolver,
            metrics: Arc::new(MetricsCollector::new()),
        }
    }

    pub fn resolver(&self) -> &PermissionResolver {
        &self.resolver
    }

    /// Decide from the credential alone
    pub fn try_fast_path(claims: &Claims, resource: &str, action: Action) -> FastPath {
        match PermissionMap::from_claims(claims) {
            None => FastPath::NoClaims,
            Some(map) if map.allows(resource, action) => FastPath::Granted,
            Some(_) => FastPath::NoMatch,
        }
    }

    /// Authoritative check against the store, through the cache
    pub async fn fallback_slow_path(&self, role: &str, resource: &str, action: Action) -> Result<bool> {
        self.resolver.role_has_resource_permission(role, resource, action).await
    }

    /// Decide whether the holder of `claims` may perform `action` on `resource`.
    ///
    /// An infrastructure failure is returned as `Err` and must be treated as a
    /// deny. Other store errors (an unknown role, say) deny outright.
    pub async fn authorize(&self, claims: &Claims, resource: &str, action: Action) -> Result<AccessDecision> {
        let start = Instant::now();

        debug!(
            "Authorization request: subject={}, role={}, resource={}, action={}",
            claims.id, claims.role, resource, action
        );

        let fast = Self::try_fast_path(claims, resource, action);
        if fast == FastPath::Granted {
            let decision = AccessDecision::allow(
                DecisionPath::Token,
                format!("credential grants {}:{}", resource, action),
            );
            return Ok(self.finalize(decision, start));
        }

        debug!("Fast path inconclusive ({:?}), checking permission store", fast);

        let checked = self.fallback_slow_path(&claims.role, resource, action).await;
        self.store_decision(checked, &claims.role, &format!("{}:{}", resource, action), start)
    }

    /// Decide on a named permission such as `invoices_read`.
    ///
    /// The fast path uses the resource/action pair encoded in the name; the
    /// slow path looks the name up directly.
    pub async fn authorize_permission(&self, claims: &Claims, permission: &str) -> Result<AccessDecision> {
        let start = Instant::now();

        if let Some((resource, action)) = split_permission_name(permission) {
            if Self::try_fast_path(claims, resource, action) == FastPath::Granted {
                let decision = AccessDecision::allow(
                    DecisionPath::Token,
                    format!("credential grants {}", permission),
                );
                return Ok(self.finalize(decision, start));
            }
        } else {
            debug!("Permission name '{}' has no resource_action form", permission);
        }

        let checked = self.resolver.role_has_permission(&claims.role, permission).await;
        self.store_decision(checked, &claims.role, permission, start)
    }

    /// Allow iff the credential's role is one of `allowed_roles`
    pub async fn authorize_roles(&self, claims: &Claims, allowed_roles: &[&str]) -> AccessDecision {
        let start = Instant::now();

        let decision = if allowed_roles.contains(&claims.role.as_str()) {
            AccessDecision::allow(DecisionPath::Role, format!("role '{}' is allowed", claims.role))
        } else {
            AccessDecision::deny(DecisionPath::Role, format!("role '{}' is not allowed", claims.role))
        };

        self.finalize(decision, start)
    }

    /// [`authorize`](Self::authorize), with denials turned into a [`Rejection`]
    pub async fn enforce(
        &self,
        claims: &Claims,
        resource: &str,
        action: Action,
    ) -> std::result::Result<AccessDecision, Rejection> {
        Self::into_outcome(self.authorize(claims, resource, action).await)
    }

    /// [`authorize_permission`](Self::authorize_permission), with denials turned into a [`Rejection`]
    pub async fn enforce_permission(
        &self,
        claims: &Claims,
        permission: &str,
    ) -> std::result::Result<AccessDecision, Rejection> {
        Self::into_outcome(self.authorize_permission(claims, permission).await)
    }

    /// [`authorize_roles`](Self::authorize_roles), with denials turned into a [`Rejection`]
    pub async fn enforce_roles(
        &self,
        claims: &Claims,
        allowed_roles: &[&str],
    ) -> std::result::Result<AccessDecision, Rejection> {
        Self::into_outcome(Ok(self.authorize_roles(claims, allowed_roles).await))
    }

    /// Engine counters merged with permission cache statistics
    pub fn metrics(&self) -> EngineMetrics {
        let mut metrics = self.metrics.get_metrics();
        let cache = self.resolver.cache().stats();
        metrics.cache_hits = cache.hits;
        metrics.cache_misses = cache.misses;
        metrics
    }

    /// Drop all cached permission sets
    pub fn invalidate_cache(&self) {
        self.resolver.invalidate_all();
    }

    fn into_outcome(result: Result<AccessDecision>) -> std::result::Result<AccessDecision, Rejection> {
        match result {
            Ok(decision) if decision.allowed => Ok(decision),
            Ok(_) => Err(Rejection::Forbidden(FORBIDDEN_MESSAGE.to_string())),
            Err(e) => Err(Self::rejection(e)),
        }
    }

    /// Outward signal for an error from `authorize*`. Internal details are
    /// not exposed.
    pub fn rejection(err: RbacError) -> Rejection {
        if err.is_internal() {
            Rejection::Internal(INTERNAL_MESSAGE.to_string())
        } else {
            Rejection::from(err)
        }
    }

    /// Turn a slow-path answer into a decision. Infrastructure failures are
    /// returned as `Err`; any other store error denies.
    fn store_decision(
        &self,
        checked: Result<bool>,
        role: &str,
        capability: &str,
        start: Instant,
    ) -> Result<AccessDecision> {
        let decision = match checked {
            Ok(true) => AccessDecision::allow(DecisionPath::Store, format!("role '{}' holds {}", role, capability)),
            Ok(false) => AccessDecision::deny(DecisionPath::Store, format!("role '{}' lacks {}", role, capability)),
            Err(e) if e.is_internal() => return Err(self.store_failure(e, start)),
            Err(e) => {
                debug!("Store rejected check for role '{}': {}", role, e);
                AccessDecision::deny(DecisionPath::Store, format!("role '{}' lacks {}: {}", role, capability, e))
            }
        };

        Ok(self.finalize(decision, start))
    }

    fn store_failure(&self, err: RbacError, start: Instant) -> RbacError {
        warn!("Access check failed, denying: {}", err);
        self.metrics.record_store_error();
        self.metrics.record_latency(start.elapsed());
        err
    }

    fn finalize(&self, decision: AccessDecision, start: Instant) -> AccessDecision {
        self.metrics.record_latency(start.elapsed());
        self.metrics.record_decision(decision.allowed, decision.path);

        debug!(
            "Decision: {} via {:?} ({})",
            if decision.allowed { "ALLOW" } else { "DENY" },
            decision.path,
            decision.reason
        );

        decision
    }
}
