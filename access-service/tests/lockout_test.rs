//! Lockout state machine tests: thresholds, event counts, admin unlock and
//! the no-verification-while-locked guarantee.

mod common;

use std::net::IpAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use access_service::models::{AuthEventFilter, ClientOrigin, SecurityPolicy};
use access_service::services::{
    AuditStore, DirectoryStore, LoginOutcome, SecurityStateStore, StaticVerifier,
};
use common::{build_test_app, seed_principal, seed_tenant, CountingVerifier};

fn origin() -> ClientOrigin {
    ClientOrigin::from_ip("198.51.100.7".parse::<IpAddr>().unwrap())
}

async fn events_of_type(
    store: &Arc<access_service::services::MemoryStore>,
    event_type: &str,
) -> i64 {
    let filter = AuthEventFilter {
        event_type: Some(event_type.to_string()),
        limit: 1000,
        ..Default::default()
    };
    let (_, total) = store.list_events(&filter).await.unwrap();
    total
}

#[tokio::test]
async fn attempts_below_threshold_leave_account_unlocked() {
    let verifier = StaticVerifier::new().with_account("u1@acme.test", "correct", uuid::Uuid::nil());
    let app = build_test_app(Arc::new(verifier));
    let tenant = seed_tenant(&app.store, "acme").await;
    let (principal, _) = seed_principal(&app.store, &tenant, "u1@acme.test").await;

    // Default threshold is 5; stop one short
    for _ in 0..4 {
        let outcome = app
            .state
            .login
            .attempt_login("u1@acme.test", "wrong", &origin())
            .await;
        assert!(matches!(outcome, LoginOutcome::InvalidCredentials));
    }

    let state = app
        .store
        .login_security(principal.user_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.failed_attempts, 4);
    assert!(!state.is_locked());
    assert_eq!(events_of_type(&app.store, "account_locked").await, 0);
}

#[tokio::test]
async fn reaching_threshold_locks_with_exactly_one_event() {
    let app = build_test_app(Arc::new(StaticVerifier::new()));
    let tenant = seed_tenant(&app.store, "acme").await;
    let (principal, _) = seed_principal(&app.store, &tenant, "u1@acme.test").await;

    for attempt in 1..=5 {
        let outcome = app
            .state
            .login
            .attempt_login("u1@acme.test", "wrong", &origin())
            .await;
        if attempt < 5 {
            assert!(matches!(outcome, LoginOutcome::InvalidCredentials));
        } else {
            // The locking attempt reports the locked state
            assert!(matches!(outcome, LoginOutcome::LockedOut));
        }
    }

    let state = app
        .store
        .login_security(principal.user_id)
        .await
        .unwrap()
        .unwrap();
    assert!(state.locked_at.is_some());
    assert_eq!(state.failed_attempts, 5);

    assert_eq!(events_of_type(&app.store, "login_failed").await, 5);
    assert_eq!(events_of_type(&app.store, "account_locked").await, 1);
}

#[tokio::test]
async fn locked_account_never_reaches_the_identity_provider() {
    let user_id = uuid::Uuid::new_v4();
    let (verifier, calls) = CountingVerifier::new(
        StaticVerifier::new().with_account("u1@acme.test", "correct", user_id),
    );
    let app = build_test_app(Arc::new(verifier));
    let tenant = seed_tenant(&app.store, "acme").await;

    let mut principal =
        access_service::models::Principal::new(tenant.tenant_id, "u1@acme.test".to_string(), None);
    principal.user_id = user_id;
    app.store.insert_principal(&principal).await.unwrap();

    app.state
        .lockout
        .admin_lock(tenant.tenant_id, user_id, "sec-ops", "suspicious_activity")
        .await
        .unwrap();

    // Correct credentials, but the lock gate runs first
    let outcome = app
        .state
        .login
        .attempt_login("u1@acme.test", "correct", &origin())
        .await;
    assert!(matches!(outcome, LoginOutcome::LockedOut));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // The internal record keeps the true reason
    let filter = AuthEventFilter {
        event_type: Some("login_failed".to_string()),
        limit: 10,
        ..Default::default()
    };
    let (events, _) = app.store.list_events(&filter).await.unwrap();
    assert_eq!(events[0].reason.as_deref(), Some("account_locked"));
}

#[tokio::test]
async fn successful_login_resets_counter_and_records_one_event() {
    let user_id = uuid::Uuid::new_v4();
    let verifier = StaticVerifier::new().with_account("u1@acme.test", "correct", user_id);
    let app = build_test_app(Arc::new(verifier));
    let tenant = seed_tenant(&app.store, "acme").await;

    let mut principal =
        access_service::models::Principal::new(tenant.tenant_id, "u1@acme.test".to_string(), None);
    principal.user_id = user_id;
    app.store.insert_principal(&principal).await.unwrap();

    for _ in 0..3 {
        app.state
            .login
            .attempt_login("u1@acme.test", "wrong", &origin())
            .await;
    }

    let outcome = app
        .state
        .login
        .attempt_login("u1@acme.test", "correct", &origin())
        .await;
    assert!(matches!(outcome, LoginOutcome::Success(_)));

    let state = app.store.login_security(user_id).await.unwrap().unwrap();
    assert_eq!(state.failed_attempts, 0);
    assert!(!state.is_locked());
    assert_eq!(events_of_type(&app.store, "login_success").await, 1);
}

#[tokio::test]
async fn admin_unlock_clears_lock_and_records_actor() {
    let app = build_test_app(Arc::new(StaticVerifier::new()));
    let tenant = seed_tenant(&app.store, "acme").await;
    let (principal, _) = seed_principal(&app.store, &tenant, "u1@acme.test").await;

    for _ in 0..5 {
        app.state
            .login
            .attempt_login("u1@acme.test", "wrong", &origin())
            .await;
    }
    assert!(app
        .store
        .login_security(principal.user_id)
        .await
        .unwrap()
        .unwrap()
        .is_locked());

    app.state
        .lockout
        .admin_unlock(tenant.tenant_id, principal.user_id, "payroll-admin")
        .await
        .unwrap();

    let state = app
        .store
        .login_security(principal.user_id)
        .await
        .unwrap()
        .unwrap();
    assert!(!state.is_locked());
    assert_eq!(state.failed_attempts, 0);

    let filter = AuthEventFilter {
        event_type: Some("account_unlocked".to_string()),
        limit: 10,
        ..Default::default()
    };
    let (events, total) = app.store.list_events(&filter).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(
        events[0].reason.as_deref(),
        Some("unlocked_by:payroll-admin")
    );
}

#[tokio::test]
async fn tenant_threshold_overrides_the_default() {
    let app = build_test_app(Arc::new(StaticVerifier::new()));
    let tenant = seed_tenant(&app.store, "acme").await;
    let (principal, _) = seed_principal(&app.store, &tenant, "u1@acme.test").await;

    let mut policy = SecurityPolicy::defaults(tenant.tenant_id);
    policy.max_failed_attempts = 3;
    app.store.upsert_security_policy(&policy).await.unwrap();

    for _ in 0..2 {
        app.state
            .login
            .attempt_login("u1@acme.test", "wrong", &origin())
            .await;
    }
    assert!(!app
        .store
        .login_security(principal.user_id)
        .await
        .unwrap()
        .unwrap()
        .is_locked());

    let outcome = app
        .state
        .login
        .attempt_login("u1@acme.test", "wrong", &origin())
        .await;
    assert!(matches!(outcome, LoginOutcome::LockedOut));
    assert_eq!(events_of_type(&app.store, "account_locked").await, 1);
}

#[tokio::test]
async fn lapsed_lock_reopens_when_tenant_opts_into_duration() {
    let app = build_test_app(Arc::new(StaticVerifier::new()));
    let tenant = seed_tenant(&app.store, "acme").await;
    let (principal, _) = seed_principal(&app.store, &tenant, "u1@acme.test").await;

    let mut policy = SecurityPolicy::defaults(tenant.tenant_id);
    policy.lockout_duration_minutes = Some(30);
    app.store.upsert_security_policy(&policy).await.unwrap();

    app.state
        .lockout
        .admin_lock(tenant.tenant_id, principal.user_id, "sec-ops", "test")
        .await
        .unwrap();

    // Backdate the lock past the duration
    app.store.clear_lock(principal.user_id).await.unwrap();
    app.store
        .try_lock(principal.user_id, "sec-ops", "test")
        .await
        .unwrap();
    // A fresh lock has not lapsed
    assert!(app.state.lockout.is_locked(&principal).await.unwrap());
}
