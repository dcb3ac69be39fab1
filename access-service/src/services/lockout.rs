//! Account lockout guard - failed-attempt counting and the lock state
//! machine.
//!
//! Transitions: unlocked accounts lock when the failed counter reaches the
//! tenant threshold; locked accounts unlock through an admin operation (or,
//! when the tenant opts in, after a lockout duration lapses). The lock
//! transition is a compare-and-set so exactly one caller observes it and
//! exactly one `account_locked` event is written.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{
    AuthEvent, AuthEventType, ClientOrigin, Principal, DEFAULT_MAX_FAILED_ATTEMPTS,
};
use crate::services::audit::AuditService;
use crate::services::notifier::LockoutNotifier;
use crate::services::store::{DirectoryStore, SecurityStateStore};
use crate::services::ServiceError;

/// Result of recording a failed credential check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// The account is locked; `newly_locked` is true for the single call
    /// that performed the transition.
    Locked { newly_locked: bool },
    /// Below the threshold.
    Counted { attempts: u32, remaining: u32 },
}

#[derive(Clone)]
pub struct LockoutService {
    state: Arc<dyn SecurityStateStore>,
    directory: Arc<dyn DirectoryStore>,
    audit: AuditService,
    notifier: Arc<dyn LockoutNotifier>,
}

impl LockoutService {
    pub fn new(
        state: Arc<dyn SecurityStateStore>,
        directory: Arc<dyn DirectoryStore>,
        audit: AuditService,
        notifier: Arc<dyn LockoutNotifier>,
    ) -> Self {
        Self {
            state,
            directory,
            audit,
            notifier,
        }
    }

    async fn threshold(&self, tenant_id: Uuid) -> u32 {
        match self.directory.find_security_policy(tenant_id).await {
            Ok(Some(policy)) => policy.failed_attempt_threshold(),
            Ok(None) => DEFAULT_MAX_FAILED_ATTEMPTS,
            Err(e) => {
                tracing::warn!(tenant_id = %tenant_id, error = %e, "Security policy lookup failed; using default threshold");
                DEFAULT_MAX_FAILED_ATTEMPTS
            }
        }
    }

    /// Whether the principal may proceed to credential verification.
    ///
    /// Errors propagate so the caller can fail closed (treat as locked).
    pub async fn is_locked(&self, principal: &Principal) -> Result<bool, ServiceError> {
        let Some(state) = self.state.login_security(principal.user_id).await? else {
            return Ok(false);
        };

        if !state.is_locked() {
            return Ok(false);
        }

        // Optional per-tenant lapse; locks are admin-unlock-only by default
        let duration = self
            .directory
            .find_security_policy(principal.tenant_id)
            .await?
            .and_then(|policy| policy.lockout_duration_minutes);

        if state.lock_lapsed(duration, Utc::now()) {
            self.state.clear_lock(principal.user_id).await?;
            self.audit
                .record(
                    AuthEvent::new(AuthEventType::AccountUnlocked, true)
                        .for_principal(principal.tenant_id, principal.user_id)
                        .with_reason("lockout_period_elapsed"),
                )
                .await;
            return Ok(false);
        }

        Ok(true)
    }

    /// Record a failed credential check, locking at the tenant threshold.
    pub async fn record_failure(
        &self,
        principal: &Principal,
        origin: &ClientOrigin,
    ) -> Result<FailureOutcome, ServiceError> {
        let attempts = self
            .state
            .record_failed_attempt(principal.user_id, Utc::now())
            .await?;
        let threshold = self.threshold(principal.tenant_id).await;

        if attempts < threshold {
            return Ok(FailureOutcome::Counted {
                attempts,
                remaining: threshold - attempts,
            });
        }

        let newly_locked = self
            .state
            .try_lock(principal.user_id, "system", "failed_attempt_threshold")
            .await?;

        if newly_locked {
            self.audit
                .record(
                    AuthEvent::new(AuthEventType::AccountLocked, true)
                        .for_principal(principal.tenant_id, principal.user_id)
                        .with_origin(origin)
                        .with_reason("failed_attempt_threshold")
                        .with_data(serde_json::json!({ "failed_attempts": attempts })),
                )
                .await;

            let notifier = self.notifier.clone();
            let tenant_id = principal.tenant_id;
            let user_id = principal.user_id;
            let email = principal.email.clone();
            tokio::spawn(async move {
                if let Err(e) = notifier
                    .account_locked(tenant_id, user_id, &email, attempts)
                    .await
                {
                    tracing::warn!(user_id = %user_id, error = %e, "Lockout notification failed");
                }
            });
        }

        Ok(FailureOutcome::Locked { newly_locked })
    }

    /// Record a successful credential check: the counter resets to zero.
    pub async fn record_success(&self, principal: &Principal) -> Result<(), ServiceError> {
        self.state.reset_failed_attempts(principal.user_id).await
    }

    /// Admin lock. Returns false if the account was already locked.
    pub async fn admin_lock(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        actor: &str,
        reason: &str,
    ) -> Result<bool, ServiceError> {
        let locked = self.state.try_lock(user_id, actor, reason).await?;
        if locked {
            self.audit
                .record(
                    AuthEvent::new(AuthEventType::AccountLocked, true)
                        .for_principal(tenant_id, user_id)
                        .with_reason(reason)
                        .with_data(serde_json::json!({ "actor": actor })),
                )
                .await;
        }
        Ok(locked)
    }

    /// Admin unlock: clears the lock, resets the counter and records the
    /// acting identity.
    pub async fn admin_unlock(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        actor: &str,
    ) -> Result<(), ServiceError> {
        self.state.clear_lock(user_id).await?;
        self.audit
            .record(
                AuthEvent::new(AuthEventType::AccountUnlocked, true)
                    .for_principal(tenant_id, user_id)
                    .with_reason(format!("unlocked_by:{}", actor)),
            )
            .await;
        Ok(())
    }
}
