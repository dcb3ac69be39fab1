//! Session model - active sessions tracked per principal.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::net::IpAddr;
use uuid::Uuid;

use super::ClientOrigin;

/// Active session entry. Only the token hash is retained.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub token_hash: String,
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub origin_ip: Option<IpAddr>,
    pub user_agent: Option<String>,
    pub admitted_utc: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: Uuid, tenant_id: Uuid, token: &str, origin: &ClientOrigin) -> Self {
        let now = Utc::now();
        Self {
            token_hash: Self::hash_token(token),
            user_id,
            tenant_id,
            origin_ip: origin.ip,
            user_agent: origin.user_agent.clone(),
            admitted_utc: now,
            last_activity: now,
        }
    }

    /// Hash a session token for storage and lookup.
    pub fn hash_token(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Result of touching a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchOutcome {
    Valid,
    Expired,
    OriginMismatch { revoked: bool },
    NotFound,
}

/// What to do when a session is touched from a different IP than it was
/// admitted with. Mismatches are always audited; `Revoke` additionally
/// invalidates the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOriginPolicy {
    LogOnly,
    Revoke,
}

impl std::str::FromStr for SessionOriginPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "log_only" => Ok(SessionOriginPolicy::LogOnly),
            "revoke" => Ok(SessionOriginPolicy::Revoke),
            _ => Err(format!("Invalid session origin policy: {}", s)),
        }
    }
}
