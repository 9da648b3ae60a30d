mod config;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use gophermart_accrual::{AccrualClient, AccrualClientConfig, AccrualPipeline, PipelineConfig};
use gophermart_api::{AppState, AppStateInner};
use gophermart_auth::TokenCodec;
use gophermart_db::Database;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gophermart=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    if config.uses_placeholder_secret() {
        warn!("SECRET_KEY is unset or still a placeholder; tokens are forgeable");
    }

    let db = Arc::new(Database::open(&config.database_uri)?);
    let tokens = TokenCodec::new(config.secret_key.as_bytes(), config.token_lifetime);

    // Background accrual
    let client = AccrualClient::new(
        AccrualClientConfig::new(config.accrual_orders_url())
            .with_request_timeout(config.request_timeout)
            .with_backoff_base(config.backoff_base)
            .with_max_attempts(config.max_attempts)
            .with_cooldown(config.cooldown),
    )?;
    let cancel = CancellationToken::new();
    let pipeline = AccrualPipeline::new(
        db.clone(),
        Arc::new(client),
        PipelineConfig {
            poll_interval: config.poll_interval,
            idle_interval: config.idle_interval,
            queue_capacity: config.queue_capacity,
        },
    )
    .spawn(cancel.clone());

    let state: AppState = Arc::new(AppStateInner { db, tokens });
    let app = gophermart_api::router(state).layer(TraceLayer::new_for_http());

    info!("Gophermart listening on {}", config.run_address);
    info!("Accrual service at {}", config.accrual_address);

    let listener = tokio::net::TcpListener::bind(config.run_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped, waiting for the accrual pipeline");
    cancel.cancel();
    pipeline.join().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
