//! Authentication event model - the tamper-evident security trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::net::IpAddr;
use uuid::Uuid;

/// Authentication/security event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthEventType {
    LoginSuccess,
    LoginFailed,
    AccountLocked,
    AccountUnlocked,
    SessionEvicted,
    SessionRevoked,
    SessionExpired,
    SessionOriginMismatch,
    RoleCreated,
    RoleUpdated,
    RoleDeleted,
    RoleAttached,
    RoleDetached,
    GrantCreated,
    GrantUpdated,
    GrantDeleted,
    SeatAssigned,
    SeatRevoked,
}

impl AuthEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthEventType::LoginSuccess => "login_success",
            AuthEventType::LoginFailed => "login_failed",
            AuthEventType::AccountLocked => "account_locked",
            AuthEventType::AccountUnlocked => "account_unlocked",
            AuthEventType::SessionEvicted => "session_evicted",
            AuthEventType::SessionRevoked => "session_revoked",
            AuthEventType::SessionExpired => "session_expired",
            AuthEventType::SessionOriginMismatch => "session_origin_mismatch",
            AuthEventType::RoleCreated => "role_created",
            AuthEventType::RoleUpdated => "role_updated",
            AuthEventType::RoleDeleted => "role_deleted",
            AuthEventType::RoleAttached => "role_attached",
            AuthEventType::RoleDetached => "role_detached",
            AuthEventType::GrantCreated => "grant_created",
            AuthEventType::GrantUpdated => "grant_updated",
            AuthEventType::GrantDeleted => "grant_deleted",
            AuthEventType::SeatAssigned => "seat_assigned",
            AuthEventType::SeatRevoked => "seat_revoked",
        }
    }
}

/// Coarse location metadata attached to events with a public source IP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoInfo {
    pub country: String,
    pub country_code: String,
    pub region: String,
    pub city: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub timezone: String,
}

impl GeoInfo {
    /// Fixed placeholder for private/loopback addresses; no network call.
    pub fn local() -> Self {
        Self {
            country: "Local".to_string(),
            country_code: "LO".to_string(),
            region: "Local".to_string(),
            city: "Local".to_string(),
            lat: None,
            lon: None,
            timezone: "Local".to_string(),
        }
    }
}

/// Where a request came from, as far as the edge could tell.
#[derive(Debug, Clone, Default)]
pub struct ClientOrigin {
    pub ip: Option<IpAddr>,
    pub user_agent: Option<String>,
}

impl ClientOrigin {
    pub fn from_ip(ip: IpAddr) -> Self {
        Self {
            ip: Some(ip),
            user_agent: None,
        }
    }
}

/// Immutable authentication event. Append-only: the engine never updates or
/// deletes a recorded event.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuthEvent {
    pub event_id: Uuid,
    pub tenant_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub event_type_code: String,
    pub success: bool,
    pub reason: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub geo: Option<serde_json::Value>,
    pub event_data: Option<serde_json::Value>,
    pub created_utc: DateTime<Utc>,
}

impl AuthEvent {
    pub fn new(event_type: AuthEventType, success: bool) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            tenant_id: None,
            user_id: None,
            event_type_code: event_type.as_str().to_string(),
            success,
            reason: None,
            ip_address: None,
            user_agent: None,
            geo: None,
            event_data: None,
            created_utc: Utc::now(),
        }
    }

    pub fn for_principal(mut self, tenant_id: Uuid, user_id: Uuid) -> Self {
        self.tenant_id = Some(tenant_id);
        self.user_id = Some(user_id);
        self
    }

    pub fn for_tenant(mut self, tenant_id: Uuid) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_origin(mut self, origin: &ClientOrigin) -> Self {
        self.ip_address = origin.ip.map(|ip| ip.to_string());
        self.user_agent = origin.user_agent.clone();
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.event_data = Some(data);
        self
    }

    /// The source IP, if one was recorded and parses back.
    pub fn source_ip(&self) -> Option<IpAddr> {
        self.ip_address.as_deref().and_then(|s| s.parse().ok())
    }
}

/// Filter for the audit query surface.
#[derive(Debug, Clone, Default)]
pub struct AuthEventFilter {
    pub tenant_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub event_type: Option<String>,
    pub success: Option<bool>,
    pub from_utc: Option<DateTime<Utc>>,
    pub to_utc: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl AuthEventFilter {
    pub fn matches(&self, event: &AuthEvent) -> bool {
        if let Some(tenant_id) = self.tenant_id {
            if event.tenant_id != Some(tenant_id) {
                return false;
            }
        }
        if let Some(user_id) = self.user_id {
            if event.user_id != Some(user_id) {
                return false;
            }
        }
        if let Some(event_type) = &self.event_type {
            if &event.event_type_code != event_type {
                return false;
            }
        }
        if let Some(success) = self.success {
            if event.success != success {
                return false;
            }
        }
        if let Some(from) = self.from_utc {
            if event.created_utc < from {
                return false;
            }
        }
        if let Some(to) = self.to_utc {
            if event.created_utc >= to {
                return false;
            }
        }
        true
    }
}
