pub mod config;
pub mod db;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use axum::{
    http::Request,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch, post, put},
    Json, Router,
};
use service_core::middleware::{
    metrics::metrics_middleware, rate_limit::ip_rate_limit_middleware,
    security_headers::security_headers_middleware, tracing::request_id_middleware,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::AccessConfig;
use crate::services::{
    AuditService, AuthorizationService, DirectoryStore, LockoutService, LoginService,
    SessionRegistry, SlidingWindowLimiter,
};
use service_core::error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub config: AccessConfig,
    pub directory: Arc<dyn DirectoryStore>,
    pub audit: AuditService,
    pub authorization: AuthorizationService,
    pub lockout: LockoutService,
    pub login: LoginService,
    pub sessions: Arc<SessionRegistry>,
    pub limiter: SlidingWindowLimiter,
    pub login_rate_limiter: service_core::middleware::rate_limit::IpRateLimiter,
    pub ip_rate_limiter: service_core::middleware::rate_limit::IpRateLimiter,
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    // Admin surface behind the API-key guard
    let admin_routes = Router::new()
        .route(
            "/admin/tenants/:tenant_id/roles",
            post(handlers::admin::roles::create_role).get(handlers::admin::roles::list_roles),
        )
        .route(
            "/admin/tenants/:tenant_id/roles/:role_id",
            patch(handlers::admin::roles::update_role).delete(handlers::admin::roles::delete_role),
        )
        .route(
            "/admin/tenants/:tenant_id/memberships/:membership_id/roles/:role_id",
            post(handlers::admin::roles::attach_role)
                .delete(handlers::admin::roles::detach_role),
        )
        .route(
            "/admin/tenants/:tenant_id/grants",
            post(handlers::admin::grants::create_grant).get(handlers::admin::grants::list_grants),
        )
        .route(
            "/admin/tenants/:tenant_id/grants/:grant_id",
            patch(handlers::admin::grants::update_grant)
                .delete(handlers::admin::grants::delete_grant),
        )
        .route(
            "/admin/tenants/:tenant_id/seats",
            get(handlers::admin::seats::seat_usage),
        )
        .route(
            "/admin/tenants/:tenant_id/seats/:user_id",
            put(handlers::admin::seats::assign_seat)
                .delete(handlers::admin::seats::revoke_seat),
        )
        .route(
            "/admin/tenants/:tenant_id/accounts/:user_id/lock",
            post(handlers::admin::locks::lock_account),
        )
        .route(
            "/admin/tenants/:tenant_id/accounts/:user_id/unlock",
            post(handlers::admin::locks::unlock_account),
        )
        .route(
            "/admin/audit/events",
            get(handlers::audit::list_auth_events),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::admin_auth_middleware,
        ));

    // The login route gets its own edge limiter on top of the engine's
    // sliding window
    let login_limiter = state.login_rate_limiter.clone();
    let login_route = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .layer(from_fn_with_state(login_limiter, ip_rate_limit_middleware));

    let ip_limiter = state.ip_rate_limiter.clone();

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics))
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/session/touch", post(handlers::auth::touch_session))
        .route("/authz/evaluate", post(handlers::authz::evaluate))
        .merge(login_route)
        .merge(admin_routes)
        .with_state(state.clone())
        // Global IP rate limiting
        .layer(from_fn_with_state(ip_limiter, ip_rate_limit_middleware))
        // Request metrics
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(
                    state
                        .config
                        .security
                        .allowed_origins
                        .iter()
                        .map(|o| {
                            o.parse::<axum::http::HeaderValue>().unwrap_or_else(|e| {
                                tracing::error!(
                                    "Invalid CORS origin '{}': {}. Using fallback.",
                                    o,
                                    e
                                );
                                axum::http::HeaderValue::from_static("*")
                            })
                        })
                        .collect::<Vec<axum::http::HeaderValue>>(),
                )
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::PATCH,
                    axum::http::Method::PUT,
                    axum::http::Method::DELETE,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([
                    axum::http::header::AUTHORIZATION,
                    axum::http::header::CONTENT_TYPE,
                    axum::http::header::HeaderName::from_static("x-admin-api-key"),
                    axum::http::header::HeaderName::from_static("x-request-id"),
                ]),
        );

    Ok(app)
}

/// Service health check
pub async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.directory.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Store health check failed");
        AppError::from(e)
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "store": "up"
        }
    })))
}
