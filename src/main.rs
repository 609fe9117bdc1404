//! Mixin Multisig Relayer - broadcasts fully signed multisig outputs
//!
//! This relayer polls the Mixin API for pending multisig outputs and submits
//! every transaction whose co-signers have produced an aggregated signature.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod config;
mod error;
mod mixin;
mod relay;

use config::{Keystore, RelayerConfig};
use mixin::MixinClient;
use relay::Poller;

/// Command line arguments
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Keystore JSON file with the session credentials
    #[arg(long)]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    // Initialize logging
    init_logging();

    if let Err(e) = run().await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    info!("Starting Mixin Multisig Relayer v{}", env!("CARGO_PKG_VERSION"));

    let keystore = Keystore::load(&cli.config).context("load keystore")?;
    info!(
        "Loaded keystore for client {} (session {})",
        keystore.client_id, keystore.session_id
    );

    let config = RelayerConfig::default();
    let client = MixinClient::new(&keystore, &config).context("init mixin client")?;
    info!("Mixin client initialized against {}", config.api_base);

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            info!("Shutdown signal received, stopping...");
            shutdown.cancel();
        }
    });

    let poller = Poller::new(Arc::new(client), &config);
    poller.run(shutdown).await;

    info!("Mixin Multisig Relayer stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,mixin_multisig_relayer=debug,reqwest=warn,hyper=warn")
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
