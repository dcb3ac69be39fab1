//! Authentication handlers: login, logout and session touch.
//!
//! Every authentication failure returns the same 401 body regardless of
//! whether the credentials were wrong, the account is locked or the attempt
//! was rate limited. The audit trail keeps the real reason.

use axum::{
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::{IpAddr, SocketAddr};
use uuid::Uuid;

use crate::models::{ClientOrigin, TouchOutcome};
use crate::services::{LoginOutcome, GENERIC_LOGIN_FAILURE};
use crate::AppState;
use service_core::error::AppError;

/// Assemble the caller's origin from proxy headers and the socket address.
pub fn client_origin(headers: &HeaderMap, connect_info: Option<&SocketAddr>) -> ClientOrigin {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<IpAddr>().ok());

    ClientOrigin {
        ip: forwarded.or_else(|| connect_info.map(|addr| addr.ip())),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string()),
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub identifier: String,
    pub secret: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user_id: Uuid,
    pub tenant_id: Uuid,
}

fn generic_failure() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": GENERIC_LOGIN_FAILURE })),
    )
        .into_response()
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> Result<Response, AppError> {
    if req.identifier.trim().is_empty() || req.secret.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "identifier and secret are required"
        )));
    }

    let origin = client_origin(&headers, connect_info.as_ref().map(|ConnectInfo(a)| a));

    match state
        .login
        .attempt_login(&req.identifier, &req.secret, &origin)
        .await
    {
        LoginOutcome::Success(session) => Ok(Json(LoginResponse {
            token: session.token,
            user_id: session.user_id,
            tenant_id: session.tenant_id,
        })
        .into_response()),
        // Deliberately indistinguishable to the caller
        LoginOutcome::InvalidCredentials
        | LoginOutcome::LockedOut
        | LoginOutcome::RateLimited { .. } => Ok(generic_failure()),
    }
}

#[derive(Debug, Deserialize)]
pub struct SessionTokenRequest {
    pub token: String,
}

/// POST /auth/logout
pub async fn logout(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(req): Json<SessionTokenRequest>,
) -> Result<Response, AppError> {
    let origin = client_origin(&headers, connect_info.as_ref().map(|ConnectInfo(a)| a));
    state.login.logout(&req.token, &origin).await;
    Ok((StatusCode::NO_CONTENT, ()).into_response())
}

/// POST /auth/session/touch
pub async fn touch_session(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(req): Json<SessionTokenRequest>,
) -> Result<Response, AppError> {
    let origin = client_origin(&headers, connect_info.as_ref().map(|ConnectInfo(a)| a));

    let valid = match state.login.touch_session(&req.token, &origin).await {
        TouchOutcome::Valid => true,
        // Log-only origin policy keeps the session usable
        TouchOutcome::OriginMismatch { revoked } => !revoked,
        TouchOutcome::Expired | TouchOutcome::NotFound => false,
    };

    if valid {
        Ok(Json(json!({ "valid": true })).into_response())
    } else {
        Ok((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "valid": false })),
        )
            .into_response())
    }
}
