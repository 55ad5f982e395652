//! Axum API server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mpost_api::{create_router, metrics, ApiConfig, AppState};
use mpost_imaging::{BackgroundRemovalClient, ImagingConfig, QwenEditClient};
use mpost_ledger::LedgerClient;
use mpost_worker::{EditorSet, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // rustls 0.23 needs a process-wide crypto provider
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    init_tracing();

    info!("Starting mpost-api");

    let config = ApiConfig::from_env();
    let worker = WorkerConfig::from_env();
    info!(
        host = %config.host,
        port = config.port,
        environment = %config.environment,
        demo_mode = config.auth.demo_mode,
        "API config loaded"
    );
    if config.is_production() && config.auth.demo_mode {
        warn!("Demo mode is enabled in production");
    }

    let ledger = LedgerClient::from_env().context("Failed to configure credit ledger")?;

    let imaging = ImagingConfig::from_env();
    let rembg = BackgroundRemovalClient::new(&imaging)
        .context("Failed to configure background-removal client")?;
    rembg.warm_up().await;

    let mut editors = EditorSet::new(Arc::new(rembg));
    if imaging.premium_enabled() {
        let qwen = QwenEditClient::new(&imaging).context("Failed to configure image-edit client")?;
        editors = editors.with_premium(Arc::new(qwen));
        info!(model = %imaging.qwen_model, "Premium processing enabled");
    } else {
        warn!("DASHSCOPE_API_KEY not set, premium processing disabled");
    }

    tokio::fs::create_dir_all(&worker.upload_dir)
        .await
        .with_context(|| format!("Failed to create {}", worker.upload_dir.display()))?;
    tokio::fs::create_dir_all(&worker.processed_dir)
        .await
        .with_context(|| format!("Failed to create {}", worker.processed_dir.display()))?;

    let metrics_handle = if config.metrics_enabled {
        info!("Prometheus metrics enabled at /metrics");
        Some(metrics::init_metrics().context("Failed to install Prometheus recorder")?)
    } else {
        None
    };

    let shutdown_timeout = worker.shutdown_timeout;
    let state = AppState::new(config.clone(), worker, Arc::new(ledger), editors)
        .map_err(|e| anyhow::anyhow!("Failed to create application state: {}", e))?;
    let executor = state.executor.clone();

    let app = create_router(state, metrics_handle);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid bind address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    executor.shutdown(shutdown_timeout).await;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mpost=debug,tower_http=debug"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
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
                warn!("Failed to listen for SIGTERM: {}", e);
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

    info!("Received shutdown signal");
}
