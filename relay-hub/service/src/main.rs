// Copyright (c) 2024 The Botho Foundation

//! Relay Hub Service
//!
//! Runs the parachain relay hub on a local ledger and drives the
//! registration, header collection and voting scenario against it.

use clap::Parser;
use std::{path::PathBuf, sync::Arc};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

mod client;
mod db;
mod demo;
mod ledger;

use relay_hub_core::{RelayConfig, RelayCoordinator};

/// Relay Hub Service - finalize parachain headers by relay votes
#[derive(Parser, Debug)]
#[command(name = "relay-hub")]
#[command(about = "Parachain relay hub with header collection and vote tallying")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "relay-hub.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Run database migrations only
    #[arg(long)]
    migrate: bool,

    /// Wait for Enter after the source header is stored
    #[arg(long)]
    pause: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Setup logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Relay Hub Service starting...");

    // Load configuration
    let config_path = args.config.to_string_lossy();
    let config = if args.config.exists() {
        info!("Loading configuration from {}", config_path);
        RelayConfig::from_file(&config_path)?
    } else {
        info!("Using default configuration");
        RelayConfig::default()
    };

    // Initialize database
    info!("Initializing database at {}", config.ledger.db_path);
    let db = db::Database::open(&config.ledger.db_path)?;
    db.migrate()?;

    if args.migrate {
        info!("Database migration complete");
        return Ok(());
    }

    let ledger = Arc::new(ledger::LocalLedger::open(&config.ledger, config.hub, db)?);

    info!("Hub configuration:");
    info!("  Module: {}", ledger.module());
    info!("  Chain ID: {}", config.ledger.chain_id);
    info!("  Block height: {}", ledger.block_height()?);
    info!("  Max votes policy: {:?}", config.hub.max_votes_policy);
    info!(
        "  Finality threshold: {}/{}",
        config.hub.finality_threshold.numerator, config.hub.finality_threshold.denominator
    );

    let client = client::LedgerHubClient::from_config(ledger, &config.ledger)?;
    info!("  Sender: {}", client.sender());
    let coordinator = RelayCoordinator::new(client, config.hub.finality_threshold);

    let report = demo::run(&coordinator, &config.demo, args.pause).await?;
    info!(
        "Parachain {} header {} relayed at height {}: {} headers collected, finalized: {}",
        report.source.chain_id,
        report.source.height,
        report.relay_height,
        report.collected.len(),
        report.finalized
    );

    Ok(())
}
