//! Binary entry point: brings up the relational store, the object store,
//! the three periodic workers (Active-Set Cache, Finalizer, Cleaner), and
//! the Task API Surface HTTP server.
//!
//! The Ingest Matcher is intentionally not wired in here. Its `BusConsumer`
//! transport is an external collaborator this workspace doesn't pin to a
//! concrete wire protocol (no message-bus SDK is part of the dependency
//! stack) — matching the teacher's habit of degrading a subsystem to "off"
//! rather than fabricating a client for it (see `db.rs::init_pg_pool`).

use std::sync::Arc;
use std::time::Duration;

use collector_cache::ActiveSetCache;
use collector_cleaner::Cleaner;
use collector_core::Config;
use collector_executor::PeriodicExecutor;
use collector_finalizer::Finalizer;
use collector_server::router::build_router;
use collector_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).with_level(true).init();

    collector_core::config::load_dotenv();
    let config = Config::from_env();
    config.log_summary();

    let pool = collector_store_pg::connect(&config.postgres.connection_string(), config.postgres.max_connections).await?;
    tracing::info!("connected to postgres and ran migrations");

    let (object_store, object_prefix) = collector_store_object::build_store(&config.object_store)?;

    let cache = ActiveSetCache::new(pool.clone());
    let cache_executor = Arc::new(PeriodicExecutor::new(
        Duration::from_secs(config.collector.cache_update_interval_secs),
        Duration::from_secs(config.collector.cache_update_interval_jitter_secs),
    ));
    let cache_handle = cache_executor.clone().spawn(cache.clone());

    let finalizer = Arc::new(Finalizer::new(
        pool.clone(),
        object_store.clone(),
        object_prefix.clone(),
        config.object_store.write_chunk_size_bytes as usize,
        config.collector.finalizer_result_batch_size,
        config.collector.finalizer_max_collections,
        config.collector.finalizer_concurrency,
    ));
    let finalizer_executor = Arc::new(PeriodicExecutor::new(
        Duration::from_secs(config.collector.finalizer_interval_secs),
        Duration::from_secs(config.collector.finalizer_interval_jitter_secs),
    ));
    let finalizer_handle = finalizer_executor.clone().spawn(finalizer);

    let cleaner = Arc::new(Cleaner::new(
        pool.clone(),
        object_store.clone(),
        object_prefix.clone(),
        chrono::Duration::days(config.collector.retention_period_days as i64),
    ));
    let cleaner_executor = Arc::new(PeriodicExecutor::new(
        Duration::from_secs(config.collector.cleanup_interval_secs),
        Duration::from_secs(config.collector.cleanup_interval_jitter_secs),
    ));
    let cleaner_handle = cleaner_executor.clone().spawn(cleaner);

    tracing::info!("ingest matcher not started: no bus consumer is wired into this binary");

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState { pool, cache, object_store, object_prefix, config });
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "collector-server listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    cache_executor.stop(cache_handle).await;
    finalizer_executor.stop(finalizer_handle).await;
    cleaner_executor.stop(cleaner_handle).await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
