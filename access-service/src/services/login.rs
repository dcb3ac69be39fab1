//! Login security façade - rate limit gate, lockout gate, credential
//! verification, session admission and the audit trail around them.
//!
//! User-visible failures are deliberately uniform: wrong credentials, locked
//! accounts and rate-limited attempts all surface the same message to the
//! caller. The internal audit record keeps the true reason.

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::models::{AuthEvent, AuthEventType, ClientOrigin, Principal, TouchOutcome};
use crate::services::audit::AuditService;
use crate::services::lockout::{FailureOutcome, LockoutService};
use crate::services::rate_limit::{LimitAction, Permit, SlidingWindowLimiter};
use crate::services::sessions::SessionRegistry;
use crate::services::store::DirectoryStore;
use crate::services::ServiceError;

/// The message shown for every authentication failure, to avoid account
/// enumeration and lock-state leaks.
pub const GENERIC_LOGIN_FAILURE: &str = "Invalid email or password";

/// External identity provider seam. The engine treats credentials as opaque.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// `Ok(Some(user_id))` on success, `Ok(None)` on bad credentials.
    async fn verify(&self, identifier: &str, secret: &str) -> Result<Option<Uuid>, ServiceError>;
}

/// HTTP client for the identity provider's verify endpoint.
#[derive(Clone)]
pub struct IdentityProviderClient {
    client: reqwest::Client,
    verify_url: String,
}

impl IdentityProviderClient {
    pub fn new(verify_url: &str, timeout: Duration) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("identity client: {}", e)))?;

        Ok(Self {
            client,
            verify_url: verify_url.to_string(),
        })
    }
}

#[derive(serde::Deserialize)]
struct VerifyResponse {
    user_id: Uuid,
}

#[async_trait]
impl CredentialVerifier for IdentityProviderClient {
    async fn verify(&self, identifier: &str, secret: &str) -> Result<Option<Uuid>, ServiceError> {
        let mut headers = reqwest::header::HeaderMap::new();
        service_core::observability::inject_trace_headers(&mut headers, None);

        let response = self
            .client
            .post(&self.verify_url)
            .headers(headers)
            .json(&serde_json::json!({
                "identifier": identifier,
                "secret": secret,
            }))
            .send()
            .await
            .map_err(|e| ServiceError::Upstream(e.to_string()))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(ServiceError::Upstream(format!(
                "identity provider returned {}",
                response.status()
            )));
        }

        let payload: VerifyResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Upstream(e.to_string()))?;
        Ok(Some(payload.user_id))
    }
}

/// Fixed identifier/secret table for tests and local development.
#[derive(Default)]
pub struct StaticVerifier {
    accounts: HashMap<String, (String, Uuid)>,
}

impl StaticVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(mut self, identifier: &str, secret: &str, user_id: Uuid) -> Self {
        self.accounts
            .insert(identifier.to_string(), (secret.to_string(), user_id));
        self
    }
}

#[async_trait]
impl CredentialVerifier for StaticVerifier {
    async fn verify(&self, identifier: &str, secret: &str) -> Result<Option<Uuid>, ServiceError> {
        Ok(self
            .accounts
            .get(identifier)
            .filter(|(expected, _)| expected == secret)
            .map(|(_, user_id)| *user_id))
    }
}

/// An admitted session handed back to the caller.
#[derive(Debug, Clone)]
pub struct EstablishedSession {
    pub token: String,
    pub user_id: Uuid,
    pub tenant_id: Uuid,
}

/// Outcome of a login attempt. Handlers collapse everything but `Success`
/// into the one generic failure message.
#[derive(Debug)]
pub enum LoginOutcome {
    Success(EstablishedSession),
    InvalidCredentials,
    LockedOut,
    RateLimited { retry_after: Duration },
}

#[derive(Clone)]
pub struct LoginService {
    directory: Arc<dyn DirectoryStore>,
    verifier: Arc<dyn CredentialVerifier>,
    lockout: LockoutService,
    limiter: SlidingWindowLimiter,
    sessions: Arc<SessionRegistry>,
    audit: AuditService,
}

impl LoginService {
    pub fn new(
        directory: Arc<dyn DirectoryStore>,
        verifier: Arc<dyn CredentialVerifier>,
        lockout: LockoutService,
        limiter: SlidingWindowLimiter,
        sessions: Arc<SessionRegistry>,
        audit: AuditService,
    ) -> Self {
        Self {
            directory,
            verifier,
            lockout,
            limiter,
            sessions,
            audit,
        }
    }

    /// Run one login attempt through the full gate sequence.
    pub async fn attempt_login(
        &self,
        identifier: &str,
        secret: &str,
        origin: &ClientOrigin,
    ) -> LoginOutcome {
        // Gate 1: sliding-window rate limit per (identifier, login, IP)
        if let Permit::Blocked { retry_after } = self
            .limiter
            .check(LimitAction::Login, identifier, origin.ip)
            .await
        {
            self.audit
                .record(
                    AuthEvent::new(AuthEventType::LoginFailed, false)
                        .with_origin(origin)
                        .with_reason("rate_limited")
                        .with_data(serde_json::json!({ "identifier": identifier })),
                )
                .await;
            return LoginOutcome::RateLimited { retry_after };
        }

        let principal = match self.directory.find_principal_by_email(identifier).await {
            Ok(principal) => principal,
            Err(e) => {
                tracing::error!(error = %e, "Principal lookup failed during login");
                self.audit
                    .record(
                        AuthEvent::new(AuthEventType::LoginFailed, false)
                            .with_origin(origin)
                            .with_reason("store_unavailable"),
                    )
                    .await;
                return LoginOutcome::InvalidCredentials;
            }
        };

        // Gate 2: lockout, checked before credential verification so a
        // locked account never reaches the identity provider. Store errors
        // are treated as locked.
        if let Some(principal) = &principal {
            match self.lockout.is_locked(principal).await {
                Ok(false) => {}
                Ok(true) => {
                    self.audit
                        .record(
                            AuthEvent::new(AuthEventType::LoginFailed, false)
                                .for_principal(principal.tenant_id, principal.user_id)
                                .with_origin(origin)
                                .with_reason("account_locked"),
                        )
                        .await;
                    return LoginOutcome::LockedOut;
                }
                Err(e) => {
                    tracing::error!(user_id = %principal.user_id, error = %e, "Lock state unavailable; failing closed");
                    self.audit
                        .record(
                            AuthEvent::new(AuthEventType::LoginFailed, false)
                                .for_principal(principal.tenant_id, principal.user_id)
                                .with_origin(origin)
                                .with_reason("store_unavailable"),
                        )
                        .await;
                    return LoginOutcome::LockedOut;
                }
            }

            if !principal.is_active() {
                self.audit
                    .record(
                        AuthEvent::new(AuthEventType::LoginFailed, false)
                            .for_principal(principal.tenant_id, principal.user_id)
                            .with_origin(origin)
                            .with_reason("principal_disabled"),
                    )
                    .await;
                return LoginOutcome::InvalidCredentials;
            }
        }

        // Gate 3: the credential check itself, delegated
        let verified = match self.verifier.verify(identifier, secret).await {
            Ok(verified) => verified,
            Err(e) => {
                tracing::error!(error = %e, "Identity provider unavailable");
                self.audit
                    .record(
                        AuthEvent::new(AuthEventType::LoginFailed, false)
                            .with_origin(origin)
                            .with_reason("identity_provider_unavailable"),
                    )
                    .await;
                return LoginOutcome::InvalidCredentials;
            }
        };

        match (verified, principal) {
            (Some(user_id), Some(principal)) if principal.user_id == user_id => {
                self.finish_success(principal, origin).await
            }
            (Some(user_id), _) => {
                // Verifier knows an account the directory does not; deny
                // rather than admit a session for an unknown principal.
                tracing::warn!(user_id = %user_id, "Verified credentials for unknown principal");
                self.audit
                    .record(
                        AuthEvent::new(AuthEventType::LoginFailed, false)
                            .with_origin(origin)
                            .with_reason("unknown_principal"),
                    )
                    .await;
                LoginOutcome::InvalidCredentials
            }
            (None, Some(principal)) => {
                let locked = match self.lockout.record_failure(&principal, origin).await {
                    Ok(outcome) => matches!(outcome, FailureOutcome::Locked { .. }),
                    Err(e) => {
                        tracing::error!(user_id = %principal.user_id, error = %e, "Failed-attempt counter unavailable");
                        false
                    }
                };
                self.audit
                    .record(
                        AuthEvent::new(AuthEventType::LoginFailed, false)
                            .for_principal(principal.tenant_id, principal.user_id)
                            .with_origin(origin)
                            .with_reason("invalid_credentials"),
                    )
                    .await;
                if locked {
                    LoginOutcome::LockedOut
                } else {
                    LoginOutcome::InvalidCredentials
                }
            }
            (None, None) => {
                self.audit
                    .record(
                        AuthEvent::new(AuthEventType::LoginFailed, false)
                            .with_origin(origin)
                            .with_reason("unknown_identifier")
                            .with_data(serde_json::json!({ "identifier": identifier })),
                    )
                    .await;
                LoginOutcome::InvalidCredentials
            }
        }
    }

    async fn finish_success(&self, principal: Principal, origin: &ClientOrigin) -> LoginOutcome {
        if let Err(e) = self.lockout.record_success(&principal).await {
            // Fail closed: a success that cannot reset the counter would
            // leave the lockout bookkeeping behind reality
            tracing::error!(user_id = %principal.user_id, error = %e, "Counter reset failed; denying login");
            self.audit
                .record(
                    AuthEvent::new(AuthEventType::LoginFailed, false)
                        .for_principal(principal.tenant_id, principal.user_id)
                        .with_origin(origin)
                        .with_reason("store_unavailable"),
                )
                .await;
            return LoginOutcome::InvalidCredentials;
        }

        let token = generate_session_token();
        let admission = self.sessions.admit(
            principal.user_id,
            principal.tenant_id,
            &token,
            origin,
            Utc::now(),
        );

        for evicted in &admission.evicted {
            self.audit
                .record(
                    AuthEvent::new(AuthEventType::SessionEvicted, true)
                        .for_principal(evicted.tenant_id, evicted.user_id)
                        .with_reason("concurrent_session_cap")
                        .with_data(serde_json::json!({
                            "admitted_utc": evicted.admitted_utc,
                            "last_activity": evicted.last_activity,
                        })),
                )
                .await;
        }

        self.audit
            .record(
                AuthEvent::new(AuthEventType::LoginSuccess, true)
                    .for_principal(principal.tenant_id, principal.user_id)
                    .with_origin(origin),
            )
            .await;

        LoginOutcome::Success(EstablishedSession {
            token,
            user_id: principal.user_id,
            tenant_id: principal.tenant_id,
        })
    }

    /// Revoke a session by token.
    pub async fn logout(&self, token: &str, origin: &ClientOrigin) {
        if let Some(session) = self.sessions.revoke(token) {
            self.audit
                .record(
                    AuthEvent::new(AuthEventType::SessionRevoked, true)
                        .for_principal(session.tenant_id, session.user_id)
                        .with_origin(origin)
                        .with_reason("logout"),
                )
                .await;
        }
    }

    /// Validate a session token against idle timeout and origin.
    pub async fn touch_session(&self, token: &str, origin: &ClientOrigin) -> TouchOutcome {
        let outcome = self.sessions.touch(token, origin, Utc::now());
        match outcome {
            TouchOutcome::Expired => {
                self.audit
                    .record(
                        AuthEvent::new(AuthEventType::SessionExpired, true)
                            .with_origin(origin)
                            .with_reason("idle_timeout"),
                    )
                    .await;
            }
            TouchOutcome::OriginMismatch { revoked } => {
                self.audit
                    .record(
                        AuthEvent::new(AuthEventType::SessionOriginMismatch, !revoked)
                            .with_origin(origin)
                            .with_reason(if revoked {
                                "origin_mismatch_revoked"
                            } else {
                                "origin_mismatch"
                            })
                            .with_data(serde_json::json!({ "severity": "medium" })),
                    )
                    .await;
            }
            TouchOutcome::Valid | TouchOutcome::NotFound => {}
        }
        outcome
    }
}

fn generate_session_token() -> String {
    let mut rng = rand::thread_rng();
    let token_bytes: [u8; 32] = rng.gen();
    hex::encode(token_bytes)
}
