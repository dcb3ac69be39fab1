//! License model - per-tenant seat ledger gating paid functionality.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// License entity - one row per tenant.
///
/// `enforced_prefixes` lists the permission-token prefixes (e.g. `payroll.`)
/// whose actions require the acting principal to hold an active seat.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct License {
    pub tenant_id: Uuid,
    pub seat_capacity: i32,
    pub enforced_prefixes: Vec<String>,
    pub updated_utc: DateTime<Utc>,
}

impl License {
    pub fn new(tenant_id: Uuid, seat_capacity: i32, enforced_prefixes: Vec<String>) -> Self {
        Self {
            tenant_id,
            seat_capacity,
            enforced_prefixes,
            updated_utc: Utc::now(),
        }
    }

    /// Whether the given action falls into a seat-gated action class.
    pub fn requires_seat(&self, action: &str) -> bool {
        self.enforced_prefixes
            .iter()
            .any(|prefix| action.starts_with(prefix.as_str()))
    }
}

/// Seat assignment entity.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LicenseSeat {
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub assigned_utc: DateTime<Utc>,
    pub revoked_utc: Option<DateTime<Utc>>,
}

impl LicenseSeat {
    pub fn new(tenant_id: Uuid, user_id: Uuid) -> Self {
        Self {
            tenant_id,
            user_id,
            assigned_utc: Utc::now(),
            revoked_utc: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.revoked_utc.is_none()
    }
}
