//! Role administration handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use uuid::Uuid;
use validator::Validate;

use super::{ensure_registered, sync_legacy_primary_role};
use crate::models::{
    AuthEvent, AuthEventType, CreateRoleRequest, Role, RoleResponse, RoleWithPermissions,
    UpdateRoleRequest,
};
use crate::AppState;
use service_core::error::AppError;

/// POST /admin/tenants/:tenant_id/roles
pub async fn create_role(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
    Json(req): Json<CreateRoleRequest>,
) -> Result<Response, AppError> {
    req.validate()?;
    ensure_tenant(&state, tenant_id).await?;
    ensure_registered(&state, tenant_id, &req.permissions).await?;

    let existing = state
        .directory
        .list_roles(tenant_id)
        .await
        .map_err(AppError::from)?;
    if existing.iter().any(|role| role.role_key == req.role_key) {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Role key '{}' already exists",
            req.role_key
        )));
    }

    let role = Role::new(tenant_id, req.role_key, req.role_label);
    state
        .directory
        .insert_role(&role, &req.permissions)
        .await
        .map_err(AppError::from)?;

    state
        .audit
        .record(
            AuthEvent::new(AuthEventType::RoleCreated, true)
                .for_tenant(tenant_id)
                .with_data(serde_json::json!({
                    "role_id": role.role_id,
                    "role_key": role.role_key,
                })),
        )
        .await;

    Ok((
        StatusCode::CREATED,
        Json(RoleWithPermissions {
            role: RoleResponse::from(role),
            permissions: req.permissions,
        }),
    )
        .into_response())
}

/// GET /admin/tenants/:tenant_id/roles
pub async fn list_roles(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
) -> Result<Json<Vec<RoleResponse>>, AppError> {
    ensure_tenant(&state, tenant_id).await?;
    let roles = state
        .directory
        .list_roles(tenant_id)
        .await
        .map_err(AppError::from)?;
    Ok(Json(roles.into_iter().map(RoleResponse::from).collect()))
}

/// PATCH /admin/tenants/:tenant_id/roles/:role_id
pub async fn update_role(
    State(state): State<AppState>,
    Path((tenant_id, role_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<UpdateRoleRequest>,
) -> Result<Json<RoleResponse>, AppError> {
    let role = require_role(&state, tenant_id, role_id).await?;
    if role.is_system {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "System roles cannot be modified"
        )));
    }

    if let Some(permissions) = &req.permissions {
        ensure_registered(&state, tenant_id, permissions).await?;
    }

    state
        .directory
        .update_role(
            tenant_id,
            role_id,
            req.role_label.as_deref(),
            req.permissions.as_deref(),
        )
        .await
        .map_err(AppError::from)?;

    state
        .audit
        .record(
            AuthEvent::new(AuthEventType::RoleUpdated, true)
                .for_tenant(tenant_id)
                .with_data(serde_json::json!({ "role_id": role_id })),
        )
        .await;

    let updated = require_role(&state, tenant_id, role_id).await?;
    Ok(Json(RoleResponse::from(updated)))
}

/// DELETE /admin/tenants/:tenant_id/roles/:role_id
pub async fn delete_role(
    State(state): State<AppState>,
    Path((tenant_id, role_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, AppError> {
    let role = require_role(&state, tenant_id, role_id).await?;
    if role.is_system {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "System roles cannot be deleted"
        )));
    }

    state
        .directory
        .delete_role(tenant_id, role_id)
        .await
        .map_err(AppError::from)?;

    state
        .audit
        .record(
            AuthEvent::new(AuthEventType::RoleDeleted, true)
                .for_tenant(tenant_id)
                .with_data(serde_json::json!({
                    "role_id": role_id,
                    "role_key": role.role_key,
                })),
        )
        .await;

    Ok((StatusCode::NO_CONTENT, ()).into_response())
}

/// POST /admin/tenants/:tenant_id/memberships/:membership_id/roles/:role_id
pub async fn attach_role(
    State(state): State<AppState>,
    Path((tenant_id, membership_id, role_id)): Path<(Uuid, Uuid, Uuid)>,
) -> Result<Response, AppError> {
    let membership = require_membership(&state, tenant_id, membership_id).await?;
    require_role(&state, tenant_id, role_id).await?;

    state
        .directory
        .attach_role(membership_id, role_id)
        .await
        .map_err(AppError::from)?;

    sync_legacy_primary_role(&state, membership_id).await;

    state
        .audit
        .record(
            AuthEvent::new(AuthEventType::RoleAttached, true)
                .for_principal(tenant_id, membership.user_id)
                .with_data(serde_json::json!({
                    "membership_id": membership_id,
                    "role_id": role_id,
                })),
        )
        .await;

    Ok((StatusCode::NO_CONTENT, ()).into_response())
}

/// DELETE /admin/tenants/:tenant_id/memberships/:membership_id/roles/:role_id
pub async fn detach_role(
    State(state): State<AppState>,
    Path((tenant_id, membership_id, role_id)): Path<(Uuid, Uuid, Uuid)>,
) -> Result<Response, AppError> {
    let membership = require_membership(&state, tenant_id, membership_id).await?;

    let detached = state
        .directory
        .detach_role(membership_id, role_id)
        .await
        .map_err(AppError::from)?;
    if !detached {
        return Err(AppError::NotFound(anyhow::anyhow!("Role attachment not found")));
    }

    sync_legacy_primary_role(&state, membership_id).await;

    state
        .audit
        .record(
            AuthEvent::new(AuthEventType::RoleDetached, true)
                .for_principal(tenant_id, membership.user_id)
                .with_data(serde_json::json!({
                    "membership_id": membership_id,
                    "role_id": role_id,
                })),
        )
        .await;

    Ok((StatusCode::NO_CONTENT, ()).into_response())
}

async fn ensure_tenant(state: &AppState, tenant_id: Uuid) -> Result<(), AppError> {
    state
        .directory
        .find_tenant(tenant_id)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Tenant not found")))?;
    Ok(())
}

async fn require_role(
    state: &AppState,
    tenant_id: Uuid,
    role_id: Uuid,
) -> Result<Role, AppError> {
    state
        .directory
        .find_role(tenant_id, role_id)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Role not found")))
}

async fn require_membership(
    state: &AppState,
    tenant_id: Uuid,
    membership_id: Uuid,
) -> Result<crate::models::Membership, AppError> {
    let membership = state
        .directory
        .find_membership_by_id(membership_id)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Membership not found")))?;
    if membership.tenant_id != tenant_id {
        return Err(AppError::NotFound(anyhow::anyhow!("Membership not found")));
    }
    Ok(membership)
}
