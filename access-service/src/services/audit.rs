//! Audit service - durable, enrichment-bearing security event recording.
//!
//! `record` never fails the caller: a write failure is retried once and then
//! dumped to the fallback channel (structured log). Decisions proceed once
//! the write has been attempted.

use std::sync::Arc;
use std::time::Duration;

use crate::models::{AuthEvent, AuthEventFilter, GeoInfo};
use crate::services::geo::{is_public_ip, GeoProvider};
use crate::services::store::AuditStore;
use crate::services::ServiceError;

/// Hard cap on page size for the audit query surface.
pub const MAX_AUDIT_PAGE_SIZE: i64 = 1000;

#[derive(Clone)]
pub struct AuditService {
    store: Arc<dyn AuditStore>,
    geo: Arc<dyn GeoProvider>,
    geo_budget: Duration,
}

impl AuditService {
    pub fn new(store: Arc<dyn AuditStore>, geo: Arc<dyn GeoProvider>, geo_budget: Duration) -> Self {
        Self {
            store,
            geo,
            geo_budget,
        }
    }

    /// Record an event, enriching public source IPs with location data.
    ///
    /// Returns the stored event id, or `None` when both the write and its
    /// retry failed and the event went to the fallback channel instead.
    pub async fn record(&self, mut event: AuthEvent) -> Option<uuid::Uuid> {
        if let Some(ip) = event.source_ip() {
            let geo = if is_public_ip(ip) {
                // Time-boxed so a slow provider never delays a login response
                match tokio::time::timeout(self.geo_budget, self.geo.resolve(ip)).await {
                    Ok(Ok(geo)) => geo,
                    Ok(Err(e)) => {
                        tracing::debug!(ip = %ip, error = %e, "Geo enrichment unavailable");
                        None
                    }
                    Err(_) => {
                        tracing::debug!(ip = %ip, budget_ms = self.geo_budget.as_millis() as u64, "Geo enrichment timed out");
                        None
                    }
                }
            } else {
                Some(GeoInfo::local())
            };
            event.geo = geo.and_then(|g| serde_json::to_value(g).ok());
        }

        match self.store.append_event(&event).await {
            Ok(event_id) => Some(event_id),
            Err(first) => {
                tracing::warn!(error = %first, event_type = %event.event_type_code, "Audit write failed, retrying once");
                match self.store.append_event(&event).await {
                    Ok(event_id) => Some(event_id),
                    Err(second) => {
                        // Fallback channel: the event must not be silently dropped
                        let serialized = serde_json::to_string(&event)
                            .unwrap_or_else(|_| event.event_type_code.clone());
                        tracing::error!(
                            target: "audit_fallback",
                            error = %second,
                            event = %serialized,
                            "Audit write failed twice; event recorded to fallback channel"
                        );
                        None
                    }
                }
            }
        }
    }

    /// Query recorded events; page size is clamped to [1, MAX_AUDIT_PAGE_SIZE].
    pub async fn list(
        &self,
        mut filter: AuthEventFilter,
    ) -> Result<(Vec<AuthEvent>, i64), ServiceError> {
        filter.limit = filter.limit.clamp(1, MAX_AUDIT_PAGE_SIZE);
        filter.offset = filter.offset.max(0);
        self.store.list_events(&filter).await
    }
}
