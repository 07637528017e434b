//! Access decision integration tests
//!
//! End-to-end flows: login → credential → verification → decision, with a
//! store double that counts calls and can be made to fail.

use async_trait::async_trait;
use clinic_rbac::{
    types::Permission, AccessEngine, Action, Claims, DecisionPath, InMemoryPermissionStore,
    PermissionCache, PermissionResolver, PermissionStore, RbacError, Rejection, Result, Role,
    TokenIssuer, TokenService, TokenVerifier,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const SECRET: &[u8] = b"integration-test-secret-32-bytes!";

/// Store double: delegates to the clinic catalogue, counts permission reads
/// and fails every call while `down` is set
struct ObservedStore {
    inner: InMemoryPermissionStore,
    reads: AtomicUsize,
    down: AtomicBool,
}

impl ObservedStore {
    async fn clinic() -> Arc<Self> {
        Arc::new(Self {
            inner: InMemoryPermissionStore::clinic_defaults().await.unwrap(),
            reads: AtomicUsize::new(0),
            down: AtomicBool::new(false),
        })
    }

    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn check_up(&self) -> Result<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(RbacError::StoreUnavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PermissionStore for ObservedStore {
    async fn permissions_for_role(&self, role: &str) -> Result<Vec<Permission>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.check_up()?;
        self.inner.permissions_for_role(role).await
    }

    async fn role_id(&self, role: &str) -> Result<Option<i64>> {
        self.check_up()?;
        self.inner.role_id(role).await
    }

    async fn list_roles(&self) -> Result<Vec<Role>> {
        self.check_up()?;
        self.inner.list_roles().await
    }
}

struct Harness {
    store: Arc<ObservedStore>,
    engine: AccessEngine,
    tokens: TokenService,
    verifier: TokenVerifier,
}

impl Harness {
    async fn new() -> Self {
        let store = ObservedStore::clinic().await;
        let resolver = PermissionResolver::new(store.clone(), Arc::new(PermissionCache::default()))
            .with_store_timeout(Duration::from_millis(500));
        let issuer = TokenIssuer::new(SECRET, Duration::from_secs(24 * 60 * 60)).unwrap();

        Self {
            store,
            engine: AccessEngine::new(resolver.clone()),
            tokens: TokenService::new(issuer, resolver),
            verifier: TokenVerifier::new(SECRET),
        }
    }

    async fn login(&self, user_id: i64, role: &str) -> Claims {
        let token = self.tokens.login(user_id, role).await.unwrap();
        self.verifier.verify(&token).unwrap()
    }
}

// ============================================================================
// SCENARIOS
// ============================================================================

#[tokio::test]
async fn test_client_reads_but_cannot_delete_appointments() {
    let harness = Harness::new().await;
    let claims = harness.login(10, "client").await;

    let decision = harness
        .engine
        .authorize(&claims, "appointments", Action::Read)
        .await
        .unwrap();
    assert!(decision.allowed);
    assert_eq!(decision.path, DecisionPath::Token);

    let decision = harness
        .engine
        .authorize(&claims, "appointments", Action::Delete)
        .await
        .unwrap();
    assert!(!decision.allowed, "client must not delete appointments");
    assert_eq!(decision.path, DecisionPath::Store);
}

#[tokio::test]
async fn test_admin_fast_path_makes_no_store_call() {
    let harness = Harness::new().await;
    let claims = harness.login(1, "admin").await;
    let reads_after_login = harness.store.reads();

    // Even an unreachable store cannot affect a fast-path allow
    harness.store.down.store(true, Ordering::SeqCst);

    let decision = harness
        .engine
        .authorize(&claims, "invoices", Action::Delete)
        .await
        .unwrap();

    assert!(decision.allowed);
    assert_eq!(decision.path, DecisionPath::Token);
    assert_eq!(harness.store.reads(), reads_after_login);
}

#[tokio::test]
async fn test_claims_without_permissions_use_store() {
    let harness = Harness::new().await;
    let claims = Claims::new(20, "employee");

    let decision = harness
        .engine
        .authorize(&claims, "inventory", Action::Read)
        .await
        .unwrap();
    assert!(decision.allowed);
    assert_eq!(decision.path, DecisionPath::Store);
    assert_eq!(harness.store.reads(), 1);
}

#[tokio::test]
async fn test_malformed_permission_claim_uses_store() {
    let harness = Harness::new().await;
    let claims = Claims::new(20, "employee").with_permissions(vec!["inventory=READ".to_string()]);

    let decision = harness
        .engine
        .authorize(&claims, "inventory", Action::Read)
        .await
        .unwrap();
    assert!(decision.allowed);
    assert_eq!(decision.path, DecisionPath::Store);
}

#[tokio::test]
async fn test_store_failure_is_internal_not_allow() {
    let harness = Harness::new().await;
    harness.store.down.store(true, Ordering::SeqCst);
    let claims = Claims::new(20, "employee");

    let result = harness.engine.authorize(&claims, "inventory", Action::Read).await;
    assert!(matches!(result, Err(RbacError::StoreUnavailable(_))));

    let rejection = harness
        .engine
        .enforce(&claims, "inventory", Action::Read)
        .await
        .unwrap_err();
    assert!(matches!(rejection, Rejection::Internal(_)));

    let metrics = harness.engine.metrics();
    assert_eq!(metrics.store_errors, 2);
    assert_eq!(metrics.allowed_decisions, 0);
}

#[tokio::test]
async fn test_revocation_is_masked_until_reissue() {
    let harness = Harness::new().await;
    let stale = harness.login(30, "employee").await;

    harness
        .store
        .inner
        .revoke("employee", "inventory_delete")
        .await
        .unwrap();
    harness.engine.invalidate_cache();

    // Pre-revocation credential still carries the grant
    let decision = harness
        .engine
        .authorize(&stale, "inventory", Action::Delete)
        .await
        .unwrap();
    assert!(decision.allowed);
    assert_eq!(decision.path, DecisionPath::Token);

    // The store is authoritative
    let slow_only = Claims::new(30, "employee");
    let decision = harness
        .engine
        .authorize(&slow_only, "inventory", Action::Delete)
        .await
        .unwrap();
    assert!(!decision.allowed);

    // A reissued credential no longer carries it
    let fresh = harness.login(30, "employee").await;
    assert!(!harness
        .engine
        .authorize(&fresh, "inventory", Action::Delete)
        .await
        .unwrap()
        .allowed);
}

// ============================================================================
// OUTWARD SIGNALS
// ============================================================================

#[tokio::test]
async fn test_three_rejection_signals() {
    let harness = Harness::new().await;

    let unauthenticated = harness
        .verifier
        .verify("garbage")
        .map_err(Rejection::from)
        .unwrap_err();
    assert!(matches!(unauthenticated, Rejection::Unauthenticated(_)));

    let client = harness.login(10, "client").await;
    let forbidden = harness
        .engine
        .enforce(&client, "users", Action::Delete)
        .await
        .unwrap_err();
    assert!(matches!(forbidden, Rejection::Forbidden(_)));

    harness.store.down.store(true, Ordering::SeqCst);
    harness.engine.invalidate_cache();
    let internal = harness
        .engine
        .enforce_permission(&Claims::new(10, "client"), "users_delete")
        .await
        .unwrap_err();
    assert!(matches!(internal, Rejection::Internal(_)));
}

#[tokio::test]
async fn test_unknown_role_is_denied_not_error() {
    let harness = Harness::new().await;
    let claims = Claims::new(99, "ghost");

    let decision = harness
        .engine
        .authorize(&claims, "appointments", Action::Read)
        .await
        .unwrap();
    assert!(!decision.allowed);
}

#[tokio::test]
async fn test_grant_visible_after_invalidation() {
    let harness = Harness::new().await;
    let claims = Claims::new(10, "client");

    assert!(!harness
        .engine
        .authorize(&claims, "reports", Action::Read)
        .await
        .unwrap()
        .allowed);

    harness.store.inner.grant("client", "reports_read").await.unwrap();
    harness.engine.invalidate_cache();

    assert!(harness
        .engine
        .authorize(&claims, "reports", Action::Read)
        .await
        .unwrap()
        .allowed);
}

#[tokio::test]
async fn test_concurrent_checks_share_cache() {
    let harness = Arc::new(Harness::new().await);
    let mut handles = Vec::new();

    for i in 0..16 {
        let harness = Arc::clone(&harness);
        handles.push(tokio::spawn(async move {
            let claims = Claims::new(i, "manager");
            harness
                .engine
                .authorize(&claims, "reports", Action::Update)
                .await
                .unwrap()
                .allowed
        }));
    }

    for handle in handles {
        assert!(handle.await.unwrap());
    }

    // Racing misses may each read the store, but the cache settles on one entry
    assert!(harness.store.reads() >= 1);
    assert_eq!(harness.engine.resolver().cache().len(), 1);
}

// ============================================================================
// METRICS
// ============================================================================

async fn time_fast_path_checks(harness: &Harness, claims: &Claims, n: usize) -> Duration {
    let start = std::time::Instant::now();
    for _ in 0..n {
        let decision = harness
            .engine
            .authorize(claims, "invoices", Action::Delete)
            .await
            .unwrap();
        assert!(decision.allowed);
    }
    start.elapsed()
}

#[tokio::test]
async fn test_decision_cost_stays_flat_after_many_decisions() {
    let harness = Harness::new().await;
    let claims = harness.login(1, "admin").await;

    let before = time_fast_path_checks(&harness, &claims, 1_000).await;
    time_fast_path_checks(&harness, &claims, 10_000).await;
    let after = time_fast_path_checks(&harness, &claims, 1_000).await;

    // Recording latency must not grow with the number of past decisions
    assert!(
        after <= before * 5 + Duration::from_millis(50),
        "decision cost grew from {:?} to {:?}",
        before,
        after
    );

    let metrics = harness.engine.metrics();
    assert_eq!(metrics.total_requests, 12_000);
    assert_eq!(metrics.fast_path_allows, 12_000);
    assert!(metrics.latency_p99_ms > 0.0);
}
