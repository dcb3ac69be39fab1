//! Login security state - per-principal failed-attempt counter and lock.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Per-principal failed-login counter and lock metadata.
///
/// Invariant: `locked_at` is only ever set by a transition that observed the
/// counter at or above the tenant threshold, or by an explicit admin lock.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LoginSecurityState {
    pub user_id: Uuid,
    pub failed_attempts: i32,
    pub last_failed_utc: Option<DateTime<Utc>>,
    pub locked_at: Option<DateTime<Utc>>,
    pub locked_by: Option<String>,
    pub lock_reason: Option<String>,
    pub updated_utc: DateTime<Utc>,
}

impl LoginSecurityState {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            failed_attempts: 0,
            last_failed_utc: None,
            locked_at: None,
            locked_by: None,
            lock_reason: None,
            updated_utc: Utc::now(),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked_at.is_some()
    }

    /// Whether a lock has lapsed under an optional tenant lockout duration.
    /// `None` means locks never lapse on their own.
    pub fn lock_lapsed(&self, duration_minutes: Option<i32>, now: DateTime<Utc>) -> bool {
        match (self.locked_at, duration_minutes) {
            (Some(locked_at), Some(minutes)) if minutes > 0 => {
                locked_at + Duration::minutes(i64::from(minutes)) <= now
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_without_duration_never_lapses() {
        let mut state = LoginSecurityState::new(Uuid::new_v4());
        state.locked_at = Some(Utc::now() - Duration::days(365));
        assert!(!state.lock_lapsed(None, Utc::now()));
    }

    #[test]
    fn lock_lapses_after_duration() {
        let mut state = LoginSecurityState::new(Uuid::new_v4());
        state.locked_at = Some(Utc::now() - Duration::minutes(31));
        assert!(state.lock_lapsed(Some(30), Utc::now()));
        assert!(!state.lock_lapsed(Some(60), Utc::now()));
    }
}
