//! Audit event query handlers.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{AuthEvent, AuthEventFilter};
use crate::AppState;
use service_core::error::AppError;

/// Query params for listing auth events.
#[derive(Debug, Deserialize)]
pub struct ListAuthEventsQuery {
    pub tenant_id: Uuid,
    pub user_id: Option<Uuid>,
    pub event_type: Option<String>,
    pub success: Option<bool>,
    pub from_utc: Option<DateTime<Utc>>,
    pub to_utc: Option<DateTime<Utc>>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    100
}

/// Paginated auth events response.
#[derive(Debug, Serialize)]
pub struct AuthEventsResponse {
    pub events: Vec<AuthEvent>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// List auth events with filtering and pagination.
///
/// GET /admin/audit/events
#[tracing::instrument(
    skip(state),
    fields(
        tenant_id = %query.tenant_id,
        event_type = ?query.event_type,
        limit = query.limit,
        offset = query.offset
    )
)]
pub async fn list_auth_events(
    State(state): State<AppState>,
    Query(query): Query<ListAuthEventsQuery>,
) -> Result<Json<AuthEventsResponse>, AppError> {
    let _tenant = state
        .directory
        .find_tenant(query.tenant_id)
        .await
        .map_err(AppError::from)?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Tenant not found")))?;

    let filter = AuthEventFilter {
        tenant_id: Some(query.tenant_id),
        user_id: query.user_id,
        event_type: query.event_type,
        success: query.success,
        from_utc: query.from_utc,
        to_utc: query.to_utc,
        limit: query.limit,
        offset: query.offset,
    };

    let limit = filter.limit.clamp(1, crate::services::MAX_AUDIT_PAGE_SIZE);
    let offset = filter.offset.max(0);

    let (events, total) = state.audit.list(filter).await.map_err(AppError::from)?;

    Ok(Json(AuthEventsResponse {
        events,
        total,
        limit,
        offset,
    }))
}
