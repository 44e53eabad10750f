//! BUIDL BUXX node binary

use anyhow::Context;
use executor::{exporter, spawn_runtime_actor, Config, Runtime};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Optional config file as the first argument; env overrides either way
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("loading config from {}", path))?
            .with_env_overrides()?,
        None => Config::from_env()?,
    };

    init_tracing(config.json_logs);

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        data_dir = ?config.data_dir,
        "Starting BUIDL BUXX node"
    );

    let runtime = Runtime::open(&config).context("opening runtime")?;
    let metrics = runtime.metrics().clone();
    tracing::info!(fee_collector = %runtime.fee_collector(), "Runtime opened successfully");

    let (handle, actor) = spawn_runtime_actor(runtime, config.actor.mailbox_capacity);

    let listener = TcpListener::bind(&config.metrics_listen_addr)
        .await
        .with_context(|| format!("binding exporter on {}", config.metrics_listen_addr))?;
    tracing::info!(addr = %config.metrics_listen_addr, "Serving /metrics and /events");

    let app = exporter::router(metrics, handle.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving exporter")?;

    tracing::info!("Shutting down node");
    handle.shutdown().await?;
    actor.await?;
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}
