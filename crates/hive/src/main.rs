//! Hive Server
//!
//! Hosts a process-data hive built from a TOML configuration.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use hive::HiveConfig;

/// Hive process-data server
#[derive(Parser, Debug)]
#[command(name = "hive")]
#[command(about = "Hive process-data server", long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./hive.toml")]
    config: PathBuf,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn main() -> Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> Result<()> {
    let args = Args::parse();
    let config = HiveConfig::load(&args.config).await?;

    // RUST_LOG wins over the configured filter
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    if args.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    info!("Starting hive server v{}", env!("CARGO_PKG_VERSION"));

    let hive = config.build_hive()?;

    let items = hive.list_items();
    if items.is_empty() {
        info!("No items registered");
    } else {
        info!("Registered items:");
        for item in items {
            info!("  - {}", item.id);
        }
    }

    shutdown_signal().await;

    info!("Shutting down hive...");
    hive.shutdown();
    info!("Hive shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
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
                warn!("Failed to install terminate handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down...");
        },
    }
}
