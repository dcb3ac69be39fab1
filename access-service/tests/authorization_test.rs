//! Authorization decision tests: default deny, grant precedence and the
//! license-seat gate.

mod common;

use std::sync::Arc;
use uuid::Uuid;

use access_service::models::{
    AccessGrant, GrantEffect, License, Membership, MembershipState, ScopeType,
};
use access_service::services::{reason, DirectoryStore, StaticVerifier};
use common::{build_test_app, seed_principal, seed_role, seed_tenant};

const APPROVE: &str = "payroll.approve";

#[tokio::test]
async fn principal_without_roles_or_grants_is_denied_everything() {
    let app = build_test_app(Arc::new(StaticVerifier::new()));
    let tenant = seed_tenant(&app.store, "acme").await;
    let (principal, _) = seed_principal(&app.store, &tenant, "u1@acme.test").await;

    for action in ["payroll.view", "payroll.approve", "reports.export"] {
        let decision = app
            .state
            .authorization
            .authorize(principal.user_id, tenant.tenant_id, action, None)
            .await
            .unwrap();
        assert!(!decision.allowed, "{} should be denied", action);
        assert_eq!(decision.reason, reason::NO_PERMISSION);
    }
}

#[tokio::test]
async fn unknown_principal_is_denied_as_inactive_membership() {
    let app = build_test_app(Arc::new(StaticVerifier::new()));
    let tenant = seed_tenant(&app.store, "acme").await;

    let decision = app
        .state
        .authorization
        .authorize(Uuid::new_v4(), tenant.tenant_id, APPROVE, None)
        .await
        .unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.reason, reason::MEMBERSHIP_INACTIVE);
}

#[tokio::test]
async fn disabled_membership_contributes_no_permissions() {
    let app = build_test_app(Arc::new(StaticVerifier::new()));
    let tenant = seed_tenant(&app.store, "acme").await;

    let principal =
        access_service::models::Principal::new(tenant.tenant_id, "u1@acme.test".to_string(), None);
    app.store.insert_principal(&principal).await.unwrap();
    let membership = Membership::new(
        tenant.tenant_id,
        principal.user_id,
        MembershipState::Disabled,
    );
    app.store.insert_membership(&membership).await.unwrap();

    let role = seed_role(&app.store, &tenant, "approver", &[APPROVE]).await;
    app.store
        .attach_role(membership.membership_id, role.role_id)
        .await
        .unwrap();

    let decision = app
        .state
        .authorization
        .authorize(principal.user_id, tenant.tenant_id, APPROVE, None)
        .await
        .unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.reason, reason::MEMBERSHIP_INACTIVE);
}

#[tokio::test]
async fn role_permission_allows_action() {
    let app = build_test_app(Arc::new(StaticVerifier::new()));
    let tenant = seed_tenant(&app.store, "acme").await;
    let (principal, membership) = seed_principal(&app.store, &tenant, "u1@acme.test").await;
    let role = seed_role(&app.store, &tenant, "approver", &[APPROVE, "payroll.view"]).await;
    app.store
        .attach_role(membership.membership_id, role.role_id)
        .await
        .unwrap();

    let decision = app
        .state
        .authorization
        .authorize(principal.user_id, tenant.tenant_id, APPROVE, None)
        .await
        .unwrap();
    assert!(decision.allowed);
    assert_eq!(decision.reason, reason::ROLE_PERMISSION);
}

#[tokio::test]
async fn principal_deny_overrides_role_permission() {
    // An approver with a principal-targeted deny on the same action
    let app = build_test_app(Arc::new(StaticVerifier::new()));
    let tenant = seed_tenant(&app.store, "acme").await;
    let (principal, membership) = seed_principal(&app.store, &tenant, "p1@acme.test").await;
    let role = seed_role(&app.store, &tenant, "approver", &[APPROVE]).await;
    app.store
        .attach_role(membership.membership_id, role.role_id)
        .await
        .unwrap();

    let grant = AccessGrant::new(
        tenant.tenant_id,
        ScopeType::Resource,
        APPROVE.to_string(),
        GrantEffect::Deny,
    )
    .for_principal(principal.user_id);
    app.store.insert_grant(&grant).await.unwrap();

    let decision = app
        .state
        .authorization
        .authorize(principal.user_id, tenant.tenant_id, APPROVE, None)
        .await
        .unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.reason, reason::EXPLICIT_GRANT);
}

#[tokio::test]
async fn principal_deny_beats_tenant_wide_allow() {
    let app = build_test_app(Arc::new(StaticVerifier::new()));
    let tenant = seed_tenant(&app.store, "acme").await;
    let (principal, _) = seed_principal(&app.store, &tenant, "p1@acme.test").await;

    let allow = AccessGrant::new(
        tenant.tenant_id,
        ScopeType::Resource,
        APPROVE.to_string(),
        GrantEffect::Allow,
    );
    let deny = AccessGrant::new(
        tenant.tenant_id,
        ScopeType::Resource,
        APPROVE.to_string(),
        GrantEffect::Deny,
    )
    .for_principal(principal.user_id);
    app.store.insert_grant(&allow).await.unwrap();
    app.store.insert_grant(&deny).await.unwrap();

    let decision = app
        .state
        .authorization
        .authorize(principal.user_id, tenant.tenant_id, APPROVE, None)
        .await
        .unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.reason, reason::EXPLICIT_GRANT);
}

#[tokio::test]
async fn conflicting_grants_at_equal_specificity_deny() {
    let app = build_test_app(Arc::new(StaticVerifier::new()));
    let tenant = seed_tenant(&app.store, "acme").await;
    let (principal, _) = seed_principal(&app.store, &tenant, "p1@acme.test").await;

    for effect in [GrantEffect::Allow, GrantEffect::Deny] {
        let grant = AccessGrant::new(
            tenant.tenant_id,
            ScopeType::Resource,
            APPROVE.to_string(),
            effect,
        )
        .for_principal(principal.user_id);
        app.store.insert_grant(&grant).await.unwrap();
    }

    let decision = app
        .state
        .authorization
        .authorize(principal.user_id, tenant.tenant_id, APPROVE, None)
        .await
        .unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.reason, reason::EXPLICIT_GRANT);
}

#[tokio::test]
async fn explicit_allow_grants_beyond_roles() {
    // A single approver outside the approver role
    let app = build_test_app(Arc::new(StaticVerifier::new()));
    let tenant = seed_tenant(&app.store, "acme").await;
    let (principal, _) = seed_principal(&app.store, &tenant, "p1@acme.test").await;

    let grant = AccessGrant::new(
        tenant.tenant_id,
        ScopeType::Resource,
        APPROVE.to_string(),
        GrantEffect::Allow,
    )
    .for_principal(principal.user_id);
    app.store.insert_grant(&grant).await.unwrap();

    let decision = app
        .state
        .authorization
        .authorize(principal.user_id, tenant.tenant_id, APPROVE, None)
        .await
        .unwrap();
    assert!(decision.allowed);
    assert_eq!(decision.reason, reason::EXPLICIT_GRANT);
}

#[tokio::test]
async fn missing_seat_denies_seat_gated_actions_regardless_of_roles() {
    let app = build_test_app(Arc::new(StaticVerifier::new()));
    let tenant = seed_tenant(&app.store, "acme").await;
    let (principal, membership) = seed_principal(&app.store, &tenant, "p1@acme.test").await;
    let role = seed_role(&app.store, &tenant, "approver", &[APPROVE]).await;
    app.store
        .attach_role(membership.membership_id, role.role_id)
        .await
        .unwrap();

    app.store
        .upsert_license(&License::new(
            tenant.tenant_id,
            10,
            vec!["payroll.".to_string()],
        ))
        .await
        .unwrap();

    let decision = app
        .state
        .authorization
        .authorize(principal.user_id, tenant.tenant_id, APPROVE, None)
        .await
        .unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.reason, reason::NO_LICENSE_SEAT);

    // An explicit allow does not override the missing seat
    let grant = AccessGrant::new(
        tenant.tenant_id,
        ScopeType::Resource,
        APPROVE.to_string(),
        GrantEffect::Allow,
    )
    .for_principal(principal.user_id);
    app.store.insert_grant(&grant).await.unwrap();

    let decision = app
        .state
        .authorization
        .authorize(principal.user_id, tenant.tenant_id, APPROVE, None)
        .await
        .unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.reason, reason::NO_LICENSE_SEAT);

    // Assigning the seat restores role-derived access
    app.store
        .assign_seat(tenant.tenant_id, principal.user_id)
        .await
        .unwrap();
    let decision = app
        .state
        .authorization
        .authorize(principal.user_id, tenant.tenant_id, APPROVE, None)
        .await
        .unwrap();
    assert!(decision.allowed);

    // Actions outside the gated class never needed a seat
    app.store
        .revoke_seat(tenant.tenant_id, principal.user_id)
        .await
        .unwrap();
    let decision = app
        .state
        .authorization
        .authorize(principal.user_id, tenant.tenant_id, "reports.view", None)
        .await
        .unwrap();
    assert_eq!(decision.reason, reason::NO_PERMISSION);
}

#[tokio::test]
async fn role_targeted_grant_applies_only_to_attached_principals() {
    let app = build_test_app(Arc::new(StaticVerifier::new()));
    let tenant = seed_tenant(&app.store, "acme").await;
    let (attached, membership) = seed_principal(&app.store, &tenant, "in@acme.test").await;
    let (outsider, _) = seed_principal(&app.store, &tenant, "out@acme.test").await;
    let role = seed_role(&app.store, &tenant, "clerk", &["payroll.view"]).await;
    app.store
        .attach_role(membership.membership_id, role.role_id)
        .await
        .unwrap();

    let grant = AccessGrant::new(
        tenant.tenant_id,
        ScopeType::Resource,
        APPROVE.to_string(),
        GrantEffect::Allow,
    )
    .for_role(role.role_id);
    app.store.insert_grant(&grant).await.unwrap();

    let decision = app
        .state
        .authorization
        .authorize(attached.user_id, tenant.tenant_id, APPROVE, None)
        .await
        .unwrap();
    assert!(decision.allowed);

    let decision = app
        .state
        .authorization
        .authorize(outsider.user_id, tenant.tenant_id, APPROVE, None)
        .await
        .unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.reason, reason::NO_PERMISSION);
}

#[tokio::test]
async fn malformed_action_is_rejected_before_evaluation() {
    let app = build_test_app(Arc::new(StaticVerifier::new()));
    let tenant = seed_tenant(&app.store, "acme").await;
    let (principal, _) = seed_principal(&app.store, &tenant, "p1@acme.test").await;

    let result = app
        .state
        .authorization
        .authorize(principal.user_id, tenant.tenant_id, "NotAToken", None)
        .await;
    assert!(result.is_err());
}
