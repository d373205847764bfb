//! Orderer gRPC server binary

use clap::Parser;
use orderer::cli::{Cli, ExitStage, StageError, StageExt};
use orderer::{logging, service, spawn_sequencer, AtomicBroadcastService, Metrics, SequencerConfig};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // The subscriber may not be installed yet
            eprintln!("orderer-server: {}", e);
            tracing::error!(stage = ?e.stage, "{}", e);
            e.stage.into()
        }
    }
}

async fn run(cli: Cli) -> Result<(), StageError> {
    // Load configuration
    let (config, config_path) = cli.load_config().stage(ExitStage::ConfigLoadFailed)?;

    // Initialize tracing
    logging::init_tracing(&config.logging).stage(ExitStage::LoggerCreateFailed)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = ?config_path,
        "Starting orderer server"
    );

    std::fs::create_dir_all(&config.ledger.data_dir)
        .map_err(|e| {
            anyhow::anyhow!(
                "Failed to create data directory {}: {}",
                config.ledger.data_dir.display(),
                e
            )
        })
        .stage(ExitStage::ServerCreateFailed)?;

    let metrics = Metrics::new().stage(ExitStage::ServerCreateFailed)?;
    let sequencer_config =
        SequencerConfig::from_ordering(&config.ordering).stage(ExitStage::ServerCreateFailed)?;
    let sequencer = spawn_sequencer(&sequencer_config, metrics.clone());

    let service = AtomicBroadcastService::new(
        sequencer.clone(),
        metrics.clone(),
        config.server.max_recv_message_size,
    );
    let addr = config.server.socket_addr().stage(ExitStage::ServerCreateFailed)?;
    let router = service::router(&config.server, service).stage(ExitStage::ServerCreateFailed)?;

    tracing::info!(%addr, "Starting gRPC server");
    router
        .serve_with_shutdown(addr, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await
        .stage(ExitStage::ServerStartFailed)?;

    tracing::info!("Shutting down orderer server");
    if let Some(batch) = sequencer.shutdown().await.stage(ExitStage::AppShutdownFailed)? {
        tracing::info!(batch = batch.batch, size = batch.size, "Cut final batch");
    }
    match metrics.encode_text() {
        Ok(text) => tracing::debug!(metrics = %text, "Final metrics"),
        Err(e) => tracing::warn!("Failed to encode final metrics: {}", e),
    }

    Ok(())
}
