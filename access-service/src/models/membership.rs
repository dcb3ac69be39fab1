//! Membership model - a principal's relationship to a tenant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Membership state codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipState {
    Invited,
    Active,
    Disabled,
}

impl MembershipState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipState::Invited => "invited",
            MembershipState::Active => "active",
            MembershipState::Disabled => "disabled",
        }
    }
}

/// Membership entity.
///
/// `legacy_primary_role` mirrors the key of the first attached role for the
/// benefit of older payroll screens. It is a best-effort projection and is
/// never consulted by authorization decisions.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Membership {
    pub membership_id: Uuid,
    pub tenant_id: Uuid,
    pub user_id: Uuid,
    pub membership_state_code: String,
    pub legacy_primary_role: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl Membership {
    /// Create a new membership in the given state.
    pub fn new(tenant_id: Uuid, user_id: Uuid, state: MembershipState) -> Self {
        Self {
            membership_id: Uuid::new_v4(),
            tenant_id,
            user_id,
            membership_state_code: state.as_str().to_string(),
            legacy_primary_role: None,
            created_utc: Utc::now(),
        }
    }

    /// A membership contributes permissions only while active.
    pub fn is_active(&self) -> bool {
        self.membership_state_code == MembershipState::Active.as_str()
    }
}
