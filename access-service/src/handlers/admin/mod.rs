//! Admin operations: role, grant, seat and lock management.
//!
//! All routes in this module sit behind the admin API-key middleware.

pub mod grants;
pub mod locks;
pub mod roles;
pub mod seats;

use uuid::Uuid;

use crate::models::validate_permission_token;
use crate::AppState;
use service_core::error::AppError;

/// Validate permission tokens and check each against the tenant registry.
/// Unknown tokens are rejected here, at admin time, never at decision time.
pub(crate) async fn ensure_registered(
    state: &AppState,
    tenant_id: Uuid,
    tokens: &[String],
) -> Result<(), AppError> {
    for token in tokens {
        validate_permission_token(token).map_err(AppError::from)?;
        let registered = state
            .directory
            .is_permission_registered(tenant_id, token)
            .await
            .map_err(AppError::from)?;
        if !registered {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Unknown permission token '{}'",
                token
            )));
        }
    }
    Ok(())
}

/// Refresh the membership's legacy primary-role column from the first
/// attached role. Best effort: the projection is for older payroll screens
/// and never feeds decisions, so failures are logged and swallowed.
pub(crate) async fn sync_legacy_primary_role(state: &AppState, membership_id: Uuid) {
    let projected = async {
        let roles = state.directory.membership_roles(membership_id).await?;
        let key = roles.first().map(|role| role.role_key.clone());
        state
            .directory
            .set_legacy_primary_role(membership_id, key.as_deref())
            .await
    }
    .await;

    if let Err(e) = projected {
        tracing::warn!(
            membership_id = %membership_id,
            error = %e,
            "Legacy primary-role projection failed"
        );
    }
}
