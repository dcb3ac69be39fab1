use access_service::{
    build_router,
    config::AccessConfig,
    db,
    models::{AuthEvent, AuthEventType},
    services::{
        AuditService, AuthorizationService, CredentialVerifier, GeoProvider, HttpGeoProvider,
        IdentityProviderClient, LockoutNotifier, LockoutService, LoginService, MemoryWindowStore,
        NoopNotifier, PgStore, RedisWindowStore, SessionRegistry, SlidingWindowLimiter,
        StaticGeoProvider, WebhookNotifier, WindowStore,
    },
    AppState,
};
use service_core::middleware::rate_limit::create_ip_rate_limiter;
use service_core::observability::logging::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    // Load configuration - fail fast if invalid
    let config = AccessConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    access_service::services::metrics::init_metrics();

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting access service"
    );

    // Database
    let pool = db::create_pool(&config.database).await?;
    db::run_migrations(&pool)
        .await
        .map_err(|e| service_core::error::AppError::DatabaseError(anyhow::anyhow!(e)))?;
    let store = Arc::new(PgStore::new(pool));
    tracing::info!("Database initialized");

    // Rate-limit window backend: shared via Redis when configured,
    // process-local otherwise
    let window_store: Arc<dyn WindowStore> = match &config.redis_url {
        Some(url) => Arc::new(
            RedisWindowStore::connect(url)
                .await
                .map_err(service_core::error::AppError::from)?,
        ),
        None => {
            tracing::info!("No REDIS_URL set; rate-limit windows are process-local");
            Arc::new(MemoryWindowStore::new())
        }
    };
    let limiter = SlidingWindowLimiter::new(window_store.clone(), config.limit_policies());

    // Geo enrichment
    let geo: Arc<dyn GeoProvider> = if config.geo.enabled {
        Arc::new(
            HttpGeoProvider::new(
                &config.geo.base_url,
                Duration::from_millis(config.geo.budget_ms),
            )
            .map_err(service_core::error::AppError::from)?,
        )
    } else {
        tracing::info!("Geo enrichment disabled");
        Arc::new(StaticGeoProvider::disabled())
    };

    let audit = AuditService::new(
        store.clone(),
        geo,
        Duration::from_millis(config.geo.budget_ms),
    );

    // Lockout notification
    let notifier: Arc<dyn LockoutNotifier> = match &config.lockout_webhook_url {
        Some(url) => Arc::new(
            WebhookNotifier::new(url, Duration::from_secs(5))
                .map_err(service_core::error::AppError::from)?,
        ),
        None => Arc::new(NoopNotifier),
    };

    let lockout = LockoutService::new(store.clone(), store.clone(), audit.clone(), notifier);
    let authorization = AuthorizationService::new(store.clone());

    let sessions = Arc::new(SessionRegistry::new(
        config.session.idle_minutes,
        config.session.max_concurrent,
        config.origin_policy()?,
    ));

    let verifier: Arc<dyn CredentialVerifier> = Arc::new(
        IdentityProviderClient::new(
            &config.identity.verify_url,
            Duration::from_secs(config.identity.timeout_seconds),
        )
        .map_err(service_core::error::AppError::from)?,
    );

    let login = LoginService::new(
        store.clone(),
        verifier,
        lockout.clone(),
        limiter.clone(),
        sessions.clone(),
        audit.clone(),
    );

    // Edge IP limiters in front of the engine's sliding windows
    let login_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.login_max_attempts,
        config.rate_limit.login_window_seconds,
    );
    let ip_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.global_ip_limit,
        config.rate_limit.global_ip_window_seconds,
    );
    tracing::info!("Rate limiters initialized");

    // Periodic maintenance: expired sessions and spent rate-limit windows
    {
        let sessions = sessions.clone();
        let limiter = limiter.clone();
        let audit = audit.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(MAINTENANCE_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                let expired = sessions.purge_expired(chrono::Utc::now());
                for session in &expired {
                    audit
                        .record(
                            AuthEvent::new(AuthEventType::SessionExpired, true)
                                .for_principal(session.tenant_id, session.user_id)
                                .with_reason("idle_timeout"),
                        )
                        .await;
                }
                if !expired.is_empty() {
                    tracing::info!(count = expired.len(), "Purged expired sessions");
                }
                match limiter.purge_expired().await {
                    Ok(0) => {}
                    Ok(count) => tracing::debug!(count, "Purged spent rate-limit windows"),
                    Err(e) => tracing::warn!(error = %e, "Rate-limit window purge failed"),
                }
            }
        });
    }

    let state = AppState {
        config: config.clone(),
        directory: store.clone(),
        audit,
        authorization,
        lockout,
        login,
        sessions,
        limiter,
        login_rate_limiter,
        ip_rate_limiter,
    };

    let app = build_router(state).await?;

    let addr = config.common.bind_addr()?;
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
