//! Optics Back-Office - Backend Server

use std::{net::SocketAddr, sync::Arc, time::Duration};

use backoffice::{
    audit::{AuditHook, AuditWorker, PgAuditSink},
    create_app,
    store::{PgCatalog, PgLedgerStore},
    AppState, Config,
};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    tracing::info!("Starting Optics Back-Office Server");
    tracing::info!("Environment: {}", config.environment);

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.acquire_timeout_secs))
        .connect(&config.database.url)
        .await?;

    tracing::info!("Database connection established");

    // Run migrations in development
    if config.environment == "development" {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&db_pool).await?;
        tracing::info!("Migrations completed");
    }

    let (audit, audit_worker) = if config.audit.enabled {
        let (hook, rx) = AuditHook::channel(config.audit.channel_capacity);
        let worker = AuditWorker::spawn(rx, Arc::new(PgAuditSink::new(db_pool.clone())));
        (hook, Some(worker))
    } else {
        tracing::warn!("Audit notifications are disabled");
        (AuditHook::disabled(), None)
    };

    // Create application state
    let state = AppState {
        store: Arc::new(PgLedgerStore::new(
            db_pool.clone(),
            config.ledger.lock_timeout(),
        )),
        catalog: Arc::new(PgCatalog::new(db_pool.clone())),
        audit,
        config: Arc::new(config.clone()),
    };

    // Build application
    let app = create_app(state);

    // Start server
    let host: std::net::IpAddr = config.server.host.parse()?;
    let addr = SocketAddr::from((host, config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    // serve owns the router, so every audit hook is gone once it returns
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(worker) = audit_worker {
        tracing::info!("Flushing audit events...");
        worker.finish(config.audit.drain_timeout()).await;
    }

    db_pool.close().await;
    tracing::info!("Server stopped");

    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "backoffice=debug,backoffice_server=debug,tower_http=debug,sqlx=warn".into());

    // OBO_LOG_FORMAT=json for log shippers
    let json = std::env::var("OBO_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
