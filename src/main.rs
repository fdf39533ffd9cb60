//! Storefront server entry point

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront::api::{self, AppState};
use storefront::events::EventBus;
use storefront::payment::StripeGateway;
use storefront::storage::LocalImageStore;
use storefront::store::{MemoryStore, PgStore, Store};
use storefront::Config;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("configuration: {e}"))?;

    let mut pool = None;
    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let db = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(url)
                .await
                .context("connecting to PostgreSQL")?;
            sqlx::migrate!("./migrations")
                .run(&db)
                .await
                .context("running migrations")?;
            pool = Some(db.clone());
            Arc::new(PgStore::new(db))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let events = EventBus::connect(config.nats_url.as_deref()).await;
    let gateway = Arc::new(StripeGateway::new(
        &config.stripe_secret_key,
        &config.stripe_webhook_secret,
        &config.stripe_api_base,
        config.payment_timeout,
    )?);
    let images = Arc::new(LocalImageStore::new(&config.storage_dir));

    let state = AppState::new(&config, store, gateway, images, events)?;
    if let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) {
        state.auth.ensure_admin(email, password).await?;
    }

    let app = api::router(state, &config.storage_dir);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, environment = %config.environment, "storefront listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(pool) = pool {
        pool.close().await;
    }
    tracing::info!("storefront stopped");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
