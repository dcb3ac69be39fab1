//! Test helpers: an app state wired to in-memory backends.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use access_service::config::AccessConfig;
use access_service::models::{
    Membership, MembershipState, Principal, Role, SessionOriginPolicy, Tenant,
};
use access_service::services::{
    AuditService, AuthorizationService, CredentialVerifier, DirectoryStore, LimitPolicies,
    LockoutService, LoginService, MemoryStore, MemoryWindowStore, NoopNotifier, ServiceError,
    SessionRegistry, SlidingWindowLimiter, StaticGeoProvider, StaticVerifier,
};
use access_service::AppState;
use service_core::middleware::rate_limit::create_ip_rate_limiter;

/// Verifier wrapper that counts how often the identity provider is consulted.
pub struct CountingVerifier {
    inner: StaticVerifier,
    calls: Arc<AtomicUsize>,
}

impl CountingVerifier {
    pub fn new(inner: StaticVerifier) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                inner,
                calls: calls.clone(),
            },
            calls,
        )
    }
}

#[async_trait]
impl CredentialVerifier for CountingVerifier {
    async fn verify(&self, identifier: &str, secret: &str) -> Result<Option<Uuid>, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.verify(identifier, secret).await
    }
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
}

/// Build an app state over in-memory backends with the given verifier.
pub fn build_test_app(verifier: Arc<dyn CredentialVerifier>) -> TestApp {
    build_test_app_with(verifier, SessionOriginPolicy::LogOnly, LimitPolicies::default())
}

pub fn build_test_app_with(
    verifier: Arc<dyn CredentialVerifier>,
    origin_policy: SessionOriginPolicy,
    policies: LimitPolicies,
) -> TestApp {
    let config = AccessConfig::from_env().expect("test config should load from defaults");

    let store = Arc::new(MemoryStore::new());
    let audit = AuditService::new(
        store.clone(),
        Arc::new(StaticGeoProvider::disabled()),
        Duration::from_millis(100),
    );
    let lockout = LockoutService::new(
        store.clone(),
        store.clone(),
        audit.clone(),
        Arc::new(NoopNotifier),
    );
    let authorization = AuthorizationService::new(store.clone());
    let sessions = Arc::new(SessionRegistry::new(480, 5, origin_policy));
    let limiter = SlidingWindowLimiter::new(Arc::new(MemoryWindowStore::new()), policies);
    let login = LoginService::new(
        store.clone(),
        verifier,
        lockout.clone(),
        limiter.clone(),
        sessions.clone(),
        audit.clone(),
    );

    // Generous edge limiters; the engine's sliding windows are what the
    // tests exercise
    let login_rate_limiter = create_ip_rate_limiter(1000, 60);
    let ip_rate_limiter = create_ip_rate_limiter(10_000, 60);

    let state = AppState {
        config,
        directory: store.clone(),
        audit,
        authorization,
        lockout,
        login,
        sessions,
        limiter,
        login_rate_limiter,
        ip_rate_limiter,
    };

    TestApp { state, store }
}

pub async fn seed_tenant(store: &Arc<MemoryStore>, slug: &str) -> Tenant {
    let tenant = Tenant::new(slug.to_string(), format!("{} Payroll", slug));
    store
        .insert_tenant(&tenant)
        .await
        .expect("tenant insert should succeed");
    tenant
}

/// Seed a principal with an active membership in the tenant.
pub async fn seed_principal(
    store: &Arc<MemoryStore>,
    tenant: &Tenant,
    email: &str,
) -> (Principal, Membership) {
    let principal = Principal::new(tenant.tenant_id, email.to_string(), None);
    store
        .insert_principal(&principal)
        .await
        .expect("principal insert should succeed");

    let membership = Membership::new(tenant.tenant_id, principal.user_id, MembershipState::Active);
    store
        .insert_membership(&membership)
        .await
        .expect("membership insert should succeed");

    (principal, membership)
}

/// Seed a role with registered permissions and return it.
pub async fn seed_role(
    store: &Arc<MemoryStore>,
    tenant: &Tenant,
    role_key: &str,
    permissions: &[&str],
) -> Role {
    let permissions: Vec<String> = permissions.iter().map(|p| p.to_string()).collect();
    store
        .register_permissions(tenant.tenant_id, &permissions)
        .await
        .expect("permission registration should succeed");

    let role = Role::new(tenant.tenant_id, role_key.to_string(), role_key.to_string());
    store
        .insert_role(&role, &permissions)
        .await
        .expect("role insert should succeed");
    role
}
