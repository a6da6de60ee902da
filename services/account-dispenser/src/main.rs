//! Account Dispenser
//!
//! Single-binary service that:
//! 1. Hands out one single-use account per `GET /api/get-account`
//! 2. Holds every handed-out account in a durable cooldown pool
//! 3. Sweeps expired cooldown entries into the released pool on a fixed interval

mod admin;
mod api;
mod config;
mod error;
mod metrics;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use account_pool::{AccountPool, PoolStore, spawn_recycle_task};

use crate::admin::AdminState;
use crate::api::AppState;
use crate::config::Config;

/// Time allowed for in-flight requests to finish after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs, filter from LOG_LEVEL then RUST_LOG
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting account-dispenser");

    // Install before any pool operation emits a metric
    let prometheus_handle =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        admin_listen_addr = ?config.server.admin_listen_addr,
        data_dir = %config.pool.data_dir.display(),
        cooldown_secs = config.pool.cooldown_secs,
        sweep_interval_secs = config.pool.sweep_interval_secs,
        "configuration loaded"
    );

    let pool = Arc::new(AccountPool::new(
        PoolStore::new(config.pool.paths()),
        config.pool.cooldown(),
    ));

    // Repair an interrupted move before anything reads the pools
    if let Err(e) = pool.reconcile().await {
        error!(error = %e, "pool reconciliation failed, continuing with pools as found");
    }

    let recycler = spawn_recycle_task(Arc::clone(&pool), config.pool.sweep_interval());

    let app = api::build_router(
        AppState {
            pool: Arc::clone(&pool),
            prometheus: prometheus_handle,
        },
        &config.server,
    );

    let listener = TcpListener::bind(config.server.listen_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.server.listen_addr))?;

    let admin_listener = match config.server.admin_listen_addr {
        Some(addr) => Some((
            addr,
            TcpListener::bind(addr)
                .await
                .with_context(|| format!("failed to bind admin listener to {addr}"))?,
        )),
        None => None,
    };

    // Both servers drain on the same signal. The drain timeout starts when the
    // signal fires, not when the servers start.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut servers = tokio::task::JoinSet::new();

    let public_rx = shutdown_rx.clone();
    servers.spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(wait_for_shutdown(public_rx))
            .await
            .map(|()| "public")
            .context("public server error")
    });
    info!(addr = %config.server.listen_addr, "accepting requests");

    if let Some((admin_addr, admin_listener)) = admin_listener {
        let admin_app = admin::build_admin_router(AdminState::new(Arc::clone(&pool)));
        let admin_rx = shutdown_rx.clone();
        servers.spawn(async move {
            axum::serve(admin_listener, admin_app)
                .with_graceful_shutdown(wait_for_shutdown(admin_rx))
                .await
                .map(|()| "admin")
                .context("admin server error")
        });
        info!(addr = %admin_addr, "admin API listening");
    }

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        while let Some(result) = servers.join_next().await {
            match result {
                Ok(Ok(name)) => info!(server = name, "server drained"),
                Ok(Err(e)) => error!(error = %e, "server error during shutdown"),
                Err(e) => error!(error = %e, "server task panicked"),
            }
        }
    })
    .await;

    if drained.is_err() {
        warn!(
            drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "drain timeout exceeded, forcing shutdown"
        );
        servers.abort_all();
    }

    // No new sweeps. Taking the lock waits out a sweep or allocation that is
    // still between its two writes.
    recycler.abort();
    drop(pool.store().lock().await);

    info!("shutdown complete");
    Ok(())
}

async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
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
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
