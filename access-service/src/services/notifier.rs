//! Lockout notification - side-channel events for an external notifier.
//!
//! Delivery is fire-and-forget relative to the lock: a failed webhook never
//! rolls back or delays a lockout.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

use crate::services::ServiceError;

#[async_trait]
pub trait LockoutNotifier: Send + Sync {
    async fn account_locked(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        email: &str,
        failed_attempts: u32,
    ) -> Result<(), ServiceError>;
}

/// Posts lockout events to a configured webhook.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    endpoint: String,
}

impl WebhookNotifier {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("notifier client: {}", e)))?;

        tracing::info!(endpoint = %endpoint, "Lockout webhook notifier configured");

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl LockoutNotifier for WebhookNotifier {
    async fn account_locked(
        &self,
        tenant_id: Uuid,
        user_id: Uuid,
        email: &str,
        failed_attempts: u32,
    ) -> Result<(), ServiceError> {
        let mut headers = reqwest::header::HeaderMap::new();
        service_core::observability::inject_trace_headers(&mut headers, None);

        let response = self
            .client
            .post(&self.endpoint)
            .headers(headers)
            .json(&json!({
                "event": "account_locked",
                "tenant_id": tenant_id,
                "user_id": user_id,
                "email": email,
                "failed_attempts": failed_attempts,
            }))
            .send()
            .await
            .map_err(|e| ServiceError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ServiceError::Upstream(format!(
                "lockout webhook returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}

/// No-op notifier for deployments without a webhook and for tests.
#[derive(Default)]
pub struct NoopNotifier;

#[async_trait]
impl LockoutNotifier for NoopNotifier {
    async fn account_locked(
        &self,
        _tenant_id: Uuid,
        _user_id: Uuid,
        _email: &str,
        _failed_attempts: u32,
    ) -> Result<(), ServiceError> {
        Ok(())
    }
}
