#![doc = include_str!("../README.md")]

mod config;
mod minifier;
mod runner;
mod telemetry;

use clap::Parser;
use config::{BridgeConfig, CliArgs};
use minibridge::{ServiceClient, WorkerPoolEngine};
use minifier::HtmlMinifier;
use std::sync::Arc;
use telemetry::init_telemetry;
use tokio::signal;

// Using mimalloc for better performance under contention from the worker
// threads, especially in musl environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = BridgeConfig::try_from(args)?;

    init_telemetry()?;
    log_startup_info(&config);

    let engine = Arc::new(WorkerPoolEngine::new(
        HtmlMinifier::new(),
        config.engine.clone(),
    ));
    let client = ServiceClient::with_config(Arc::clone(&engine), config.client.clone());
    client.start_service()?;

    let mut faults = client.subscribe_faults();
    let fault_logger = tokio::spawn(async move {
        while let Ok(fault) = faults.recv().await {
            tracing::error!("Protocol fault reported by engine: {fault}");
        }
    });

    let stopper = client.clone();
    let signal_watcher = tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received, stopping service...");
        if let Err(e) = stopper.stop_service() {
            tracing::error!("Error during service shutdown: {e}");
        }
    });

    let result = runner::run(&client, &config).await;

    signal_watcher.abort();
    client.stop_service()?;
    engine.wait_stopped().await;
    fault_logger.abort();

    let report = result?;
    tracing::info!("{report}");

    if report.mismatched > 0 {
        anyhow::bail!(
            "{} results differ from reference minification",
            report.mismatched
        );
    }
    if report.failed > 0 {
        anyhow::bail!("{} of {} requests failed", report.failed, report.requests);
    }
    Ok(())
}

fn log_startup_info(config: &BridgeConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting minibridge with full config: {:#?}", config);
    } else {
        tracing::info!(
            "Starting minibridge with {} workers over {} inputs x {} iterations",
            config.engine.num_workers,
            config.inputs.len(),
            config.iterations
        );
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }
}
