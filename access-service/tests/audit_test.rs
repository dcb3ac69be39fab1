//! Audit service tests: enrichment, retry-then-fallback and the query
//! surface.

use async_trait::async_trait;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use access_service::models::{AuthEvent, AuthEventFilter, AuthEventType, ClientOrigin, GeoInfo};
use access_service::services::{
    AuditService, AuditStore, MemoryStore, ServiceError, StaticGeoProvider,
};

fn sample_geo() -> GeoInfo {
    GeoInfo {
        country: "Netherlands".to_string(),
        country_code: "NL".to_string(),
        region: "North Holland".to_string(),
        city: "Amsterdam".to_string(),
        lat: Some(52.37),
        lon: Some(4.89),
        timezone: "Europe/Amsterdam".to_string(),
    }
}

fn event_from(ip: &str) -> AuthEvent {
    AuthEvent::new(AuthEventType::LoginFailed, false)
        .with_origin(&ClientOrigin::from_ip(ip.parse::<IpAddr>().unwrap()))
}

#[tokio::test]
async fn private_ip_gets_the_local_placeholder_without_a_lookup() {
    let store = Arc::new(MemoryStore::new());
    // A provider that would return a real location if it were consulted
    let audit = AuditService::new(
        store.clone(),
        Arc::new(StaticGeoProvider::new(Some(sample_geo()))),
        Duration::from_millis(100),
    );

    audit.record(event_from("10.0.0.5")).await.unwrap();

    let (events, _) = store
        .list_events(&AuthEventFilter {
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    let geo = events[0].geo.as_ref().expect("geo should be set");
    assert_eq!(geo["country"], "Local");
}

#[tokio::test]
async fn public_ip_is_enriched_via_the_provider() {
    let store = Arc::new(MemoryStore::new());
    let audit = AuditService::new(
        store.clone(),
        Arc::new(StaticGeoProvider::new(Some(sample_geo()))),
        Duration::from_millis(100),
    );

    audit.record(event_from("203.0.113.10")).await.unwrap();

    let (events, _) = store
        .list_events(&AuthEventFilter {
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    let geo = events[0].geo.as_ref().expect("geo should be set");
    assert_eq!(geo["city"], "Amsterdam");
    assert_eq!(geo["country_code"], "NL");
}

#[tokio::test]
async fn enrichment_failure_yields_null_geo_not_an_error() {
    let store = Arc::new(MemoryStore::new());
    let audit = AuditService::new(
        store.clone(),
        Arc::new(StaticGeoProvider::disabled()),
        Duration::from_millis(100),
    );

    let event_id = audit.record(event_from("203.0.113.10")).await;
    assert!(event_id.is_some());

    let (events, _) = store
        .list_events(&AuthEventFilter {
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(events[0].geo.is_none());
}

/// Store that fails the first N appends.
struct FlakyAuditStore {
    inner: MemoryStore,
    failures_left: AtomicUsize,
}

impl FlakyAuditStore {
    fn failing(times: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            failures_left: AtomicUsize::new(times),
        }
    }
}

#[async_trait]
impl AuditStore for FlakyAuditStore {
    async fn append_event(&self, event: &AuthEvent) -> Result<Uuid, ServiceError> {
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ServiceError::StoreUnavailable(anyhow::anyhow!(
                "simulated outage"
            )));
        }
        self.inner.append_event(event).await
    }

    async fn list_events(
        &self,
        filter: &AuthEventFilter,
    ) -> Result<(Vec<AuthEvent>, i64), ServiceError> {
        self.inner.list_events(filter).await
    }
}

#[tokio::test]
async fn one_write_failure_is_retried_and_succeeds() {
    let store = Arc::new(FlakyAuditStore::failing(1));
    let audit = AuditService::new(
        store.clone(),
        Arc::new(StaticGeoProvider::disabled()),
        Duration::from_millis(100),
    );

    let event_id = audit
        .record(AuthEvent::new(AuthEventType::LoginSuccess, true))
        .await;
    assert!(event_id.is_some());

    let (_, total) = store
        .list_events(&AuthEventFilter {
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 1);
}

#[tokio::test]
async fn persistent_write_failure_never_reaches_the_caller() {
    let store = Arc::new(FlakyAuditStore::failing(usize::MAX));
    let audit = AuditService::new(
        store.clone(),
        Arc::new(StaticGeoProvider::disabled()),
        Duration::from_millis(100),
    );

    // Both the write and its retry fail; the caller just sees None
    let event_id = audit
        .record(AuthEvent::new(AuthEventType::LoginFailed, false))
        .await;
    assert!(event_id.is_none());
}

#[tokio::test]
async fn listing_filters_by_type_success_and_principal() {
    let store = Arc::new(MemoryStore::new());
    let audit = AuditService::new(
        store.clone(),
        Arc::new(StaticGeoProvider::disabled()),
        Duration::from_millis(100),
    );

    let tenant_id = Uuid::new_v4();
    let user_a = Uuid::new_v4();
    let user_b = Uuid::new_v4();

    audit
        .record(AuthEvent::new(AuthEventType::LoginFailed, false).for_principal(tenant_id, user_a))
        .await;
    audit
        .record(AuthEvent::new(AuthEventType::LoginSuccess, true).for_principal(tenant_id, user_a))
        .await;
    audit
        .record(AuthEvent::new(AuthEventType::LoginFailed, false).for_principal(tenant_id, user_b))
        .await;

    let (events, total) = audit
        .list(AuthEventFilter {
            tenant_id: Some(tenant_id),
            event_type: Some("login_failed".to_string()),
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 2);
    assert!(events.iter().all(|e| !e.success));

    let (events, total) = audit
        .list(AuthEventFilter {
            tenant_id: Some(tenant_id),
            user_id: Some(user_a),
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 2);
    assert!(events.iter().all(|e| e.user_id == Some(user_a)));

    let (events, total) = audit
        .list(AuthEventFilter {
            tenant_id: Some(tenant_id),
            success: Some(true),
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(events[0].event_type_code, "login_success");
}

#[tokio::test]
async fn listing_clamps_page_size_and_paginates() {
    let store = Arc::new(MemoryStore::new());
    let audit = AuditService::new(
        store.clone(),
        Arc::new(StaticGeoProvider::disabled()),
        Duration::from_millis(100),
    );

    let tenant_id = Uuid::new_v4();
    for _ in 0..7 {
        audit
            .record(
                AuthEvent::new(AuthEventType::LoginFailed, false)
                    .for_principal(tenant_id, Uuid::new_v4()),
            )
            .await;
    }

    let (events, total) = audit
        .list(AuthEventFilter {
            tenant_id: Some(tenant_id),
            limit: 3,
            offset: 0,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 7);
    assert_eq!(events.len(), 3);

    let (events, _) = audit
        .list(AuthEventFilter {
            tenant_id: Some(tenant_id),
            limit: 3,
            offset: 6,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(events.len(), 1);

    // A zero/negative limit is clamped up to one row rather than erroring
    let (events, _) = audit
        .list(AuthEventFilter {
            tenant_id: Some(tenant_id),
            limit: 0,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
}
