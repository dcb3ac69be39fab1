//! License seat administration handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{AuthEvent, AuthEventType};
use crate::AppState;
use service_core::error::AppError;

#[derive(Debug, Serialize)]
pub struct SeatUsageResponse {
    pub tenant_id: Uuid,
    pub seat_capacity: i32,
    pub seats_used: i64,
}

/// GET /admin/tenants/:tenant_id/seats
pub async fn seat_usage(
    State(state): State<AppState>,
    Path(tenant_id): Path<Uuid>,
) -> Result<Json<SeatUsageResponse>, AppError> {
    let license = state
        .directory
        .find_license(tenant_id)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("License not found")))?;
    let seats_used = state
        .directory
        .active_seat_count(tenant_id)
        .await
        .map_err(AppError::from)?;

    Ok(Json(SeatUsageResponse {
        tenant_id,
        seat_capacity: license.seat_capacity,
        seats_used,
    }))
}

/// PUT /admin/tenants/:tenant_id/seats/:user_id
pub async fn assign_seat(
    State(state): State<AppState>,
    Path((tenant_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, AppError> {
    let license = state
        .directory
        .find_license(tenant_id)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("License not found")))?;

    state
        .directory
        .find_principal(user_id)
        .await
        .map_err(AppError::from)?
        .filter(|p| p.tenant_id == tenant_id)
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Principal not found")))?;

    let already_seated = state
        .directory
        .has_active_seat(tenant_id, user_id)
        .await
        .map_err(AppError::from)?;
    if !already_seated {
        let used = state
            .directory
            .active_seat_count(tenant_id)
            .await
            .map_err(AppError::from)?;
        if used >= i64::from(license.seat_capacity) {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "No license seats available ({} of {} in use)",
                used,
                license.seat_capacity
            )));
        }
    }

    state
        .directory
        .assign_seat(tenant_id, user_id)
        .await
        .map_err(AppError::from)?;

    state
        .audit
        .record(
            AuthEvent::new(AuthEventType::SeatAssigned, true)
                .for_principal(tenant_id, user_id),
        )
        .await;

    Ok((StatusCode::NO_CONTENT, ()).into_response())
}

/// DELETE /admin/tenants/:tenant_id/seats/:user_id
pub async fn revoke_seat(
    State(state): State<AppState>,
    Path((tenant_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, AppError> {
    let revoked = state
        .directory
        .revoke_seat(tenant_id, user_id)
        .await
        .map_err(AppError::from)?;
    if !revoked {
        return Err(AppError::NotFound(anyhow::anyhow!("Active seat not found")));
    }

    state
        .audit
        .record(
            AuthEvent::new(AuthEventType::SeatRevoked, true)
                .for_principal(tenant_id, user_id),
        )
        .await;

    Ok((StatusCode::NO_CONTENT, ()).into_response())
}
