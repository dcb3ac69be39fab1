//! Role model - tenant-scoped roles carrying permission token sets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Role entity (tenant-scoped).
///
/// System roles are seeded by provisioning and cannot be deleted; tenant
/// roles are mutable by tenant admins.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Role {
    pub role_id: Uuid,
    pub tenant_id: Uuid,
    pub role_key: String,
    pub role_label: String,
    pub is_system: bool,
    pub created_utc: DateTime<Utc>,
}

impl Role {
    /// Create a new tenant-defined role.
    pub fn new(tenant_id: Uuid, role_key: String, role_label: String) -> Self {
        Self {
            role_id: Uuid::new_v4(),
            tenant_id,
            role_key,
            role_label,
            is_system: false,
            created_utc: Utc::now(),
        }
    }

    /// Create a seeded system role.
    pub fn system(tenant_id: Uuid, role_key: String, role_label: String) -> Self {
        Self {
            is_system: true,
            ..Self::new(tenant_id, role_key, role_label)
        }
    }
}

/// Request to create a role.
#[derive(Debug, Deserialize, validator::Validate)]
pub struct CreateRoleRequest {
    #[validate(length(min = 1, max = 64))]
    pub role_key: String,
    #[validate(length(min = 1, max = 128))]
    pub role_label: String,
    pub permissions: Vec<String>,
}

/// Request to update a role; omitted fields are left unchanged.
#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role_label: Option<String>,
    pub permissions: Option<Vec<String>>,
}

/// Role response for API.
#[derive(Debug, Serialize)]
pub struct RoleResponse {
    pub role_id: Uuid,
    pub tenant_id: Uuid,
    pub role_key: String,
    pub role_label: String,
    pub is_system: bool,
    pub created_utc: DateTime<Utc>,
}

impl From<Role> for RoleResponse {
    fn from(r: Role) -> Self {
        Self {
            role_id: r.role_id,
            tenant_id: r.tenant_id,
            role_key: r.role_key,
            role_label: r.role_label,
            is_system: r.is_system,
            created_utc: r.created_utc,
        }
    }
}

/// Role with its permission tokens for detailed responses.
#[derive(Debug, Serialize)]
pub struct RoleWithPermissions {
    #[serde(flatten)]
    pub role: RoleResponse,
    pub permissions: Vec<String>,
}
