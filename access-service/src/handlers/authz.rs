//! Authorization evaluation handlers.
//!
//! The evaluate endpoint is the query surface the other payroll services
//! call before acting on a user's behalf.

use axum::{
    extract::{ConnectInfo, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use uuid::Uuid;

use crate::handlers::auth::client_origin;
use crate::models::ScopeType;
use crate::services::{LimitAction, Permit};
use crate::AppState;
use service_core::error::AppError;

/// Authorization evaluation request.
#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    /// Actions to evaluate, e.g. `payroll.approve`.
    pub actions: Vec<String>,
    /// Optional scope type; defaults to `resource`.
    pub scope_type: Option<ScopeType>,
}

/// Single action decision.
#[derive(Debug, Serialize)]
pub struct ActionDecision {
    pub action: String,
    pub allowed: bool,
    pub reason: String,
}

/// Authorization evaluation response.
#[derive(Debug, Serialize)]
pub struct EvaluateResponse {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub all_allowed: bool,
    pub decisions: Vec<ActionDecision>,
}

/// Evaluate authorization for a set of actions.
///
/// POST /authz/evaluate
#[tracing::instrument(
    skip(state, headers, connect_info, req),
    fields(user_id = %req.user_id, tenant_id = %req.tenant_id, actions = req.actions.len())
)]
pub async fn evaluate(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(req): Json<EvaluateRequest>,
) -> Result<Json<EvaluateResponse>, AppError> {
    if req.actions.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "actions must not be empty"
        )));
    }

    let origin = client_origin(&headers, connect_info.as_ref().map(|ConnectInfo(a)| a));
    if let Permit::Blocked { retry_after } = state
        .limiter
        .check(LimitAction::Api, &req.user_id.to_string(), origin.ip)
        .await
    {
        return Err(AppError::TooManyRequests(
            "Evaluation rate limit exceeded".to_string(),
            Some(retry_after.as_secs()),
        ));
    }

    let mut decisions = Vec::with_capacity(req.actions.len());
    for action in &req.actions {
        let decision = state
            .authorization
            .authorize(req.user_id, req.tenant_id, action, req.scope_type)
            .await
            .map_err(AppError::from)?;
        decisions.push(ActionDecision {
            action: action.clone(),
            allowed: decision.allowed,
            reason: decision.reason,
        });
    }

    let all_allowed = decisions.iter().all(|d| d.allowed);

    Ok(Json(EvaluateResponse {
        user_id: req.user_id,
        tenant_id: req.tenant_id,
        all_allowed,
        decisions,
    }))
}
