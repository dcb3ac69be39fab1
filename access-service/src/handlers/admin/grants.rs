//! Access grant administration handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;

use super::ensure_registered;
use crate::models::{AccessGrant, AuthEvent, AuthEventType, CreateGrantRequest, ScopeType};
use crate::AppState;
use service_core::error::AppError;

/// POST /admin/tenants/:tenant_id/grants
pub async fn create_grant(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
    Json(req): Json<CreateGrantRequest>,
) -> Result<Response, AppError> {
    if req.target_count() > 1 {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "A grant may target at most one of principal, role or company"
        )));
    }

    state
        .directory
        .find_tenant(tenant_id)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Tenant not found")))?;

    // Resource scope keys are permission tokens and must be registered;
    // feature keys only need to be well-formed.
    if req.scope_type == ScopeType::Resource {
        ensure_registered(&state, tenant_id, std::slice::from_ref(&req.scope_key)).await?;
    } else {
        crate::models::validate_permission_token(&req.scope_key).map_err(AppError::from)?;
    }

    if let Some(target_user_id) = req.target_user_id {
        state
            .directory
            .find_principal(target_user_id)
            .await
            .map_err(AppError::from)?
            .filter(|p| p.tenant_id == tenant_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Target principal not found")))?;
    }
    if let Some(target_role_id) = req.target_role_id {
        state
            .directory
            .find_role(tenant_id, target_role_id)
            .await
            .map_err(AppError::from)?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Target role not found")))?;
    }

    let mut grant = AccessGrant::new(tenant_id, req.scope_type, req.scope_key, req.effect);
    if let Some(user_id) = req.target_user_id {
        grant = grant.for_principal(user_id);
    }
    if let Some(role_id) = req.target_role_id {
        grant = grant.for_role(role_id);
    }
    if let Some(company_id) = req.target_company_id {
        grant = grant.for_company(company_id);
    }

    state
        .directory
        .insert_grant(&grant)
        .await
        .map_err(AppError::from)?;

    state
        .audit
        .record(
            AuthEvent::new(AuthEventType::GrantCreated, true)
                .for_tenant(tenant_id)
                .with_data(serde_json::json!({
                    "grant_id": grant.grant_id,
                    "scope_type": grant.scope_type_code,
                    "scope_key": grant.scope_key,
                    "effect": grant.effect_code,
                })),
        )
        .await;

    Ok((StatusCode::CREATED, Json(grant)).into_response())
}

/// GET /admin/tenants/:tenant_id/grants
pub async fn list_grants(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
) -> Result<Json<Vec<AccessGrant>>, AppError> {
    let grants = state
        .directory
        .list_grants(tenant_id)
        .await
        .map_err(AppError::from)?;
    Ok(Json(grants))
}

#[derive(Debug, serde::Deserialize)]
pub struct UpdateGrantRequest {
    pub effect: crate::models::GrantEffect,
}

/// PATCH /admin/tenants/:tenant_id/grants/:grant_id
pub async fn update_grant(
    State(state): State<AppState>,
    Path((tenant_id, grant_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<UpdateGrantRequest>,
) -> Result<Response, AppError> {
    let updated = state
        .directory
        .update_grant_effect(tenant_id, grant_id, req.effect.as_str())
        .await
        .map_err(AppError::from)?;
    if !updated {
        return Err(AppError::NotFound(anyhow::anyhow!("Grant not found")));
    }

    state
        .audit
        .record(
            AuthEvent::new(AuthEventType::GrantUpdated, true)
                .for_tenant(tenant_id)
                .with_data(serde_json::json!({
                    "grant_id": grant_id,
                    "effect": req.effect.as_str(),
                })),
        )
        .await;

    Ok((StatusCode::NO_CONTENT, ()).into_response())
}

/// DELETE /admin/tenants/:tenant_id/grants/:grant_id
pub async fn delete_grant(
    State(state): State<AppState>,
    Path((tenant_id, grant_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, AppError> {
    let deleted = state
        .directory
        .delete_grant(tenant_id, grant_id)
        .await
        .map_err(AppError::from)?;
    if !deleted {
        return Err(AppError::NotFound(anyhow::anyhow!("Grant not found")));
    }

    state
        .audit
        .record(
            AuthEvent::new(AuthEventType::GrantDeleted, true)
                .for_tenant(tenant_id)
                .with_data(serde_json::json!({ "grant_id": grant_id })),
        )
        .await;

    Ok((StatusCode::NO_CONTENT, ()).into_response())
}
