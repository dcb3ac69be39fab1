//! Tenant model - the isolation boundary owning roles, grants and memberships.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Tenant entity.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub tenant_id: Uuid,
    pub tenant_slug: String,
    pub tenant_label: String,
    pub created_utc: DateTime<Utc>,
}

impl Tenant {
    /// Create a new tenant.
    pub fn new(tenant_slug: String, tenant_label: String) -> Self {
        Self {
            tenant_id: Uuid::new_v4(),
            tenant_slug,
            tenant_label,
            created_utc: Utc::now(),
        }
    }
}

/// Default failed-login threshold applied when a tenant has no policy row.
pub const DEFAULT_MAX_FAILED_ATTEMPTS: u32 = 5;

/// Default session idle timeout in minutes (8 hours).
pub const DEFAULT_SESSION_IDLE_MINUTES: u32 = 480;

/// Default cap on concurrent sessions per principal.
pub const DEFAULT_MAX_CONCURRENT_SESSIONS: u32 = 5;

/// Per-tenant account lockout policy.
///
/// Absent rows fall back to the defaults above. `lockout_duration_minutes`
/// of `None` means a locked account stays locked until an admin unlocks it.
/// Session limits are deployment-wide, not per tenant.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SecurityPolicy {
    pub tenant_id: Uuid,
    pub max_failed_attempts: i32,
    pub lockout_duration_minutes: Option<i32>,
    pub updated_utc: DateTime<Utc>,
}

impl SecurityPolicy {
    /// Policy with platform defaults for a tenant.
    pub fn defaults(tenant_id: Uuid) -> Self {
        Self {
            tenant_id,
            max_failed_attempts: DEFAULT_MAX_FAILED_ATTEMPTS as i32,
            lockout_duration_minutes: None,
            updated_utc: Utc::now(),
        }
    }

    pub fn failed_attempt_threshold(&self) -> u32 {
        if self.max_failed_attempts <= 0 {
            DEFAULT_MAX_FAILED_ATTEMPTS
        } else {
            self.max_failed_attempts as u32
        }
    }
}
