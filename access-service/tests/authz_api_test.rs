//! Authorization evaluation over the HTTP surface.

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::util::ServiceExt;

use access_service::build_router;
use access_service::services::{DirectoryStore, StaticVerifier};
use common::{build_test_app, seed_principal, seed_role, seed_tenant};

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn evaluate_returns_per_action_decisions() {
    let app = build_test_app(Arc::new(StaticVerifier::new()));
    let tenant = seed_tenant(&app.store, "acme").await;
    let (principal, membership) = seed_principal(&app.store, &tenant, "u1@acme.test").await;
    let role = seed_role(&app.store, &tenant, "clerk", &["payroll.view"]).await;
    app.store
        .attach_role(membership.membership_id, role.role_id)
        .await
        .unwrap();

    let router = build_router(app.state.clone()).await.unwrap();

    let request = Request::builder()
        .method("POST")
        .uri("/authz/evaluate")
        .header("Content-Type", "application/json")
        .body(Body::from(
            serde_json::json!({
                "user_id": principal.user_id,
                "tenant_id": tenant.tenant_id,
                "actions": ["payroll.view", "payroll.approve"],
            })
            .to_string(),
        ))
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["all_allowed"], false);
    let decisions = body["decisions"].as_array().unwrap();
    assert_eq!(decisions.len(), 2);
    assert_eq!(decisions[0]["action"], "payroll.view");
    assert_eq!(decisions[0]["allowed"], true);
    assert_eq!(decisions[1]["action"], "payroll.approve");
    assert_eq!(decisions[1]["allowed"], false);
    assert_eq!(decisions[1]["reason"], "no_permission");
}

#[tokio::test]
async fn evaluate_rejects_empty_action_lists_and_malformed_tokens() {
    let app = build_test_app(Arc::new(StaticVerifier::new()));
    let tenant = seed_tenant(&app.store, "acme").await;
    let (principal, _) = seed_principal(&app.store, &tenant, "u1@acme.test").await;

    let router = build_router(app.state.clone()).await.unwrap();

    let empty = Request::builder()
        .method("POST")
        .uri("/authz/evaluate")
        .header("Content-Type", "application/json")
        .body(Body::from(
            serde_json::json!({
                "user_id": principal.user_id,
                "tenant_id": tenant.tenant_id,
                "actions": [],
            })
            .to_string(),
        ))
        .unwrap();
    let response = router.clone().oneshot(empty).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let malformed = Request::builder()
        .method("POST")
        .uri("/authz/evaluate")
        .header("Content-Type", "application/json")
        .body(Body::from(
            serde_json::json!({
                "user_id": principal.user_id,
                "tenant_id": tenant.tenant_id,
                "actions": ["NotAToken"],
            })
            .to_string(),
        ))
        .unwrap();
    let response = router.oneshot(malformed).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
