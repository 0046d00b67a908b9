use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use pagewatch_client::{FetcherConfig, NotifierConfig, WatchFetcher, build_dispatcher};
use pagewatch_core::proxy_pool::ProxyPool;
use pagewatch_core::scheduler::Scheduler;
use pagewatch_db::{Database, DatabaseConfig};
use pagewatch_server::routes;
use pagewatch_server::state::AppState;

const MAX_BODY_BYTES: usize = 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pagewatch=info".parse()?))
        .with_target(false)
        .init();

    let api_key = std::env::var("PAGEWATCH_SERVER_API_KEY")
        .context("PAGEWATCH_SERVER_API_KEY must be set")?;
    let port = std::env::var("PAGEWATCH_SERVER_PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{port}");

    let db = Database::connect(&DatabaseConfig::from_env()?).await?;
    db.migrate().await?;

    let proxies = ProxyPool::from_env();
    let fetcher = WatchFetcher::new(FetcherConfig::from_env()?, proxies.clone())?;
    let notifier = build_dispatcher(NotifierConfig::from_env()?)?;
    let scheduler = Scheduler::new(fetcher.clone(), db, notifier);

    let scheduled = scheduler.start().await?;
    tracing::info!(scheduled, proxies = proxies.size(), "Scheduler started");

    let state = Arc::new(AppState {
        scheduler: scheduler.clone(),
        proxies,
        api_key,
    });

    let app = routes::router(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!("Starting server on {addr}");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.stop();
    fetcher.browser().shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
