//! Principal model - tenant-scoped user accounts known to the engine.
//!
//! Credentials live with the external identity provider; the engine only
//! keeps the directory record it needs for lockout and authorization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Principal state codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalState {
    Active,
    Disabled,
}

impl PrincipalState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrincipalState::Active => "active",
            PrincipalState::Disabled => "disabled",
        }
    }
}

/// Principal entity (tenant-scoped).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Principal {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub principal_state_code: String,
    pub created_utc: DateTime<Utc>,
}

impl Principal {
    /// Create a new active principal.
    pub fn new(tenant_id: Uuid, email: String, display_name: Option<String>) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            tenant_id,
            email,
            display_name,
            principal_state_code: PrincipalState::Active.as_str().to_string(),
            created_utc: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.principal_state_code == PrincipalState::Active.as_str()
    }
}
