//! Entitlement Engine server.
//!
//! Serves the billing webhook and the callable reconcile endpoints, and runs
//! the reconciliation sweep in the background.

use std::sync::Arc;

use http::{header, HeaderValue, Method};
use secrecy::SecretString;
use sqlx::PgPool;
use tokio::sync::watch;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use entitlement_engine::adapters::auth::{JwtConfig, JwtSessionValidator};
use entitlement_engine::adapters::claims::{ClaimsApiConfig, HttpClaimsSync};
use entitlement_engine::adapters::http::{billing_router, BillingAppState};
use entitlement_engine::adapters::ledger::{PostgresIdempotencyLedger, RedisIdempotencyLedger};
use entitlement_engine::adapters::postgres::{
    PostgresCustomerLinkRepository, PostgresEntitlementStore,
};
use entitlement_engine::adapters::stripe::{StripeBillingAdapter, StripeConfig};
use entitlement_engine::adapters::{SweepScheduler, SweepSchedulerConfig};
use entitlement_engine::application::handlers::billing::{
    EventRouter, IdentityResolver, ProcessWebhookHandler, ReconcileEntitlementsHandler,
    RelinkCustomerHandler, StatePersister, SweepConfig, WebhookPipelineConfig,
};
use entitlement_engine::config::{AppConfig, LedgerBackend, ServerConfig};
use entitlement_engine::domain::billing::WebhookVerifier;
use entitlement_engine::ports::{
    BillingProvider, ClaimsSync, CustomerLinkRepository, EntitlementStore, IdempotencyLedger,
    SessionValidator,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let config = AppConfig::load()?;
    init_tracing(&config.server);
    config.validate()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.server.environment,
        ledger = ?config.ledger.backend,
        "Starting entitlement engine"
    );
    if config.is_production() && config.billing.is_test_mode() {
        tracing::warn!("Production environment is using a Stripe test-mode key");
    }

    let pool = config
        .database
        .pool_options()
        .connect(&config.database.url)
        .await?;
    if config.database.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Database migrations applied");
    }

    let ledger = build_ledger(&config, &pool).await?;

    let mut stripe = StripeConfig::new(SecretString::new(config.billing.stripe_api_key.clone()));
    if let Some(url) = &config.billing.api_base_url {
        stripe = stripe.with_base_url(url.clone());
    }
    let provider: Arc<dyn BillingProvider> = Arc::new(StripeBillingAdapter::new(stripe));
    let links: Arc<dyn CustomerLinkRepository> =
        Arc::new(PostgresCustomerLinkRepository::new(pool.clone()));
    let store: Arc<dyn EntitlementStore> = Arc::new(PostgresEntitlementStore::new(pool.clone()));
    let claims: Arc<dyn ClaimsSync> = Arc::new(HttpClaimsSync::new(ClaimsApiConfig::new(
        config.auth.claims_api_url.clone(),
        SecretString::new(config.auth.claims_api_token.clone()),
    )));
    let sessions: Arc<dyn SessionValidator> = Arc::new(JwtSessionValidator::new(JwtConfig::new(
        SecretString::new(config.auth.jwt_secret.clone()),
        config.auth.jwt_issuer.clone(),
    )));

    let catalog = Arc::new(config.billing.plan_catalog());
    tracing::info!(plans = catalog.len(), "Plan allow-list loaded");

    let persister = StatePersister::new(store, claims);
    let webhook_handler = ProcessWebhookHandler::new(
        WebhookVerifier::new(SecretString::new(
            config.billing.stripe_webhook_secret.clone(),
        )),
        ledger.clone(),
        EventRouter::new(provider.clone()),
        IdentityResolver::new(provider.clone(), links.clone()),
        persister.clone(),
        catalog.clone(),
        WebhookPipelineConfig {
            timeout: config.billing.webhook_timeout(),
            require_livemode: config.billing.require_livemode,
        },
    );
    let reconcile_handler = Arc::new(ReconcileEntitlementsHandler::new(
        provider,
        links.clone(),
        persister,
        catalog,
        SweepConfig {
            batch_size: config.reconciliation.batch_size,
            concurrency: config.reconciliation.concurrency,
        },
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_task = if config.reconciliation.enabled {
        let scheduler = SweepScheduler::new(
            reconcile_handler.clone(),
            ledger,
            SweepSchedulerConfig {
                interval: config.reconciliation.interval(),
                ledger_retention_days: config.reconciliation.ledger_retention_days,
            },
        );
        Some(tokio::spawn(async move { scheduler.run(shutdown_rx).await }))
    } else {
        tracing::warn!("Reconciliation sweep disabled");
        None
    };

    let relink_handler = Arc::new(RelinkCustomerHandler::new(links, reconcile_handler.clone()));
    let state = BillingAppState {
        webhook_handler: Arc::new(webhook_handler),
        reconcile_handler,
        relink_handler,
        session_validator: sessions,
    };

    let app = billing_router(state)
        .layer(TimeoutLayer::new(config.server.request_timeout()))
        .layer(cors_layer(&config.server))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Some(task) = scheduler_task {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Sweep scheduler task failed");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// JSON logs in production, human-readable otherwise. `RUST_LOG` overrides
/// the configured filter.
fn init_tracing(server: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(server.log_level.as_str()));
    let registry = tracing_subscriber::registry().with(filter);

    if server.is_production() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn build_ledger(
    config: &AppConfig,
    pool: &PgPool,
) -> Result<Arc<dyn IdempotencyLedger>, BoxError> {
    match (config.ledger.backend, &config.redis) {
        (LedgerBackend::Redis, Some(redis_config)) => {
            let client = redis::Client::open(redis_config.url.as_str())?;
            let conn = tokio::time::timeout(
                redis_config.connect_timeout(),
                client.get_multiplexed_async_connection(),
            )
            .await
            .map_err(|_| "timed out connecting to Redis")??;
            Ok(Arc::new(RedisIdempotencyLedger::new(
                conn,
                config.reconciliation.ledger_retention_days,
            )))
        }
        (LedgerBackend::Redis, None) => Err("redis ledger backend requires redis.url".into()),
        (LedgerBackend::Postgres, _) => Ok(Arc::new(PostgresIdempotencyLedger::new(pool.clone()))),
    }
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = server
        .cors_origins_list()
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::POST, Method::PUT])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
