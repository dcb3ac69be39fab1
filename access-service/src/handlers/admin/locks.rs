//! Account lock administration handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::AppState;
use service_core::error::AppError;

#[derive(Debug, Deserialize)]
pub struct LockRequest {
    pub actor: String,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UnlockRequest {
    pub actor: String,
}

async fn require_tenant_principal(
    state: &AppState,
    tenant_id: Uuid,
    user_id: Uuid,
) -> Result<(), AppError> {
    state
        .directory
        .find_principal(user_id)
        .await
        .map_err(AppError::from)?
        .filter(|p| p.tenant_id == tenant_id)
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Principal not found")))?;
    Ok(())
}

/// POST /admin/tenants/:tenant_id/accounts/:user_id/lock
pub async fn lock_account(
    State(state): State<AppState>,
    Path((tenant_id, user_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<LockRequest>,
) -> Result<Response, AppError> {
    if req.actor.trim().is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!("actor is required")));
    }
    require_tenant_principal(&state, tenant_id, user_id).await?;

    let reason = req.reason.unwrap_or_else(|| "admin_lock".to_string());
    let locked = state
        .lockout
        .admin_lock(tenant_id, user_id, &req.actor, &reason)
        .await
        .map_err(AppError::from)?;

    if !locked {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Account is already locked"
        )));
    }

    Ok((StatusCode::NO_CONTENT, ()).into_response())
}

/// POST /admin/tenants/:tenant_id/accounts/:user_id/unlock
pub async fn unlock_account(
    State(state): State<AppState>,
    Path((tenant_id, user_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<UnlockRequest>,
) -> Result<Response, AppError> {
    if req.actor.trim().is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!("actor is required")));
    }
    require_tenant_principal(&state, tenant_id, user_id).await?;

    state
        .lockout
        .admin_unlock(tenant_id, user_id, &req.actor)
        .await
        .map_err(AppError::from)?;

    Ok((StatusCode::NO_CONTENT, ()).into_response())
}
