//! Session lifecycle through the login façade: admission, the concurrency
//! cap, logout and origin handling.

mod common;

use std::net::IpAddr;
use std::sync::Arc;
use uuid::Uuid;

use access_service::models::{AuthEventFilter, ClientOrigin, SessionOriginPolicy, TouchOutcome};
use access_service::services::{
    AuditStore, DirectoryStore, LimitPolicies, LimitPolicy, LoginOutcome, StaticVerifier,
};
use common::{build_test_app_with, seed_tenant};

fn origin() -> ClientOrigin {
    ClientOrigin::from_ip("198.51.100.20".parse::<IpAddr>().unwrap())
}

async fn seeded_login_app(
    policy: SessionOriginPolicy,
) -> (common::TestApp, Uuid) {
    let user_id = Uuid::new_v4();
    let verifier = StaticVerifier::new().with_account("u1@acme.test", "correct", user_id);
    // Generous login window; these tests exercise sessions, not limits
    let policies = LimitPolicies {
        login: LimitPolicy::new(100, 900, 1800),
        ..LimitPolicies::default()
    };
    let app = build_test_app_with(Arc::new(verifier), policy, policies);
    let tenant = seed_tenant(&app.store, "acme").await;

    let mut principal =
        access_service::models::Principal::new(tenant.tenant_id, "u1@acme.test".to_string(), None);
    principal.user_id = user_id;
    app.store.insert_principal(&principal).await.unwrap();

    (app, user_id)
}

async fn login(app: &common::TestApp) -> String {
    match app
        .state
        .login
        .attempt_login("u1@acme.test", "correct", &origin())
        .await
    {
        LoginOutcome::Success(session) => session.token,
        other => panic!("expected successful login, got {:?}", other),
    }
}

#[tokio::test]
async fn login_admits_a_touchable_session() {
    let (app, user_id) = seeded_login_app(SessionOriginPolicy::LogOnly).await;

    let token = login(&app).await;
    assert_eq!(app.state.sessions.active_count(user_id), 1);
    assert_eq!(
        app.state.login.touch_session(&token, &origin()).await,
        TouchOutcome::Valid
    );
}

#[tokio::test]
async fn sixth_login_evicts_least_recently_active_session() {
    let (app, user_id) = seeded_login_app(SessionOriginPolicy::LogOnly).await;

    let mut tokens = Vec::new();
    for _ in 0..5 {
        tokens.push(login(&app).await);
    }
    assert_eq!(app.state.sessions.active_count(user_id), 5);

    // Refresh the first session so the second becomes the oldest
    app.state.login.touch_session(&tokens[0], &origin()).await;

    let sixth = login(&app).await;
    assert_eq!(app.state.sessions.active_count(user_id), 5);

    assert_eq!(
        app.state.login.touch_session(&tokens[1], &origin()).await,
        TouchOutcome::NotFound
    );
    assert_eq!(
        app.state.login.touch_session(&tokens[0], &origin()).await,
        TouchOutcome::Valid
    );
    assert_eq!(
        app.state.login.touch_session(&sixth, &origin()).await,
        TouchOutcome::Valid
    );

    let filter = AuthEventFilter {
        event_type: Some("session_evicted".to_string()),
        limit: 10,
        ..Default::default()
    };
    let (_, total) = app.store.list_events(&filter).await.unwrap();
    assert_eq!(total, 1);
}

#[tokio::test]
async fn logout_revokes_the_session_and_audits_it() {
    let (app, user_id) = seeded_login_app(SessionOriginPolicy::LogOnly).await;

    let token = login(&app).await;
    app.state.login.logout(&token, &origin()).await;

    assert_eq!(app.state.sessions.active_count(user_id), 0);
    assert_eq!(
        app.state.login.touch_session(&token, &origin()).await,
        TouchOutcome::NotFound
    );

    let filter = AuthEventFilter {
        event_type: Some("session_revoked".to_string()),
        limit: 10,
        ..Default::default()
    };
    let (events, total) = app.store.list_events(&filter).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(events[0].reason.as_deref(), Some("logout"));
}

#[tokio::test]
async fn origin_mismatch_is_audited_but_session_survives_by_default() {
    let (app, user_id) = seeded_login_app(SessionOriginPolicy::LogOnly).await;

    let token = login(&app).await;
    let other = ClientOrigin::from_ip("203.0.113.99".parse::<IpAddr>().unwrap());

    assert_eq!(
        app.state.login.touch_session(&token, &other).await,
        TouchOutcome::OriginMismatch { revoked: false }
    );
    assert_eq!(app.state.sessions.active_count(user_id), 1);

    let filter = AuthEventFilter {
        event_type: Some("session_origin_mismatch".to_string()),
        limit: 10,
        ..Default::default()
    };
    let (events, total) = app.store.list_events(&filter).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(
        events[0]
            .event_data
            .as_ref()
            .and_then(|d| d.get("severity"))
            .and_then(|s| s.as_str()),
        Some("medium")
    );
}

#[tokio::test]
async fn origin_mismatch_revokes_under_revoke_policy() {
    let (app, user_id) = seeded_login_app(SessionOriginPolicy::Revoke).await;

    let token = login(&app).await;
    let other = ClientOrigin::from_ip("203.0.113.99".parse::<IpAddr>().unwrap());

    assert_eq!(
        app.state.login.touch_session(&token, &other).await,
        TouchOutcome::OriginMismatch { revoked: true }
    );
    assert_eq!(app.state.sessions.active_count(user_id), 0);
}
