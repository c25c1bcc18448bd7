//! ChainFeed CLI — run the ingestion-and-fan-out service.
//!
//! # Commands
//! ```
//! chainfeed run         # ingest, persist, and fan out (default)
//! chainfeed chains      # print the resolved chain table and exit
//! ```
//!
//! Configuration comes from the environment: `PORT`, `DATABASE_URL`,
//! `RETENTION_HOURS`, numbered `CHAIN_{i}_NAME` / `CHAIN_{i}_ID` groups with
//! optional `CHAIN_{i}_WS_URL` / `CHAIN_{i}_RPC_URL`, and `PROVIDER` /
//! `PROVIDERS` plus `<PROVIDER>_API_KEY` for chains without explicit URLs.
//! Any configuration error is fatal before a single upstream connection is
//! attempted.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chainfeed_core::{AppConfig, ChainConfig, Dialect};
use chainfeed_providers::resolve_chains;
use chainfeed_server::{router, spawn_sweeper, AppState, SubscriberHub};
use chainfeed_service::Supervisor;
use chainfeed_storage::{SqliteStore, TxStore};

#[derive(Parser)]
#[command(
    name = "chainfeed",
    about = "Multi-chain mempool ingestion and fan-out service",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest, persist, and fan out transactions (default)
    Run,
    /// Print the resolved chain table and exit
    Chains,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = AppConfig::from_env().context("configuration error")?;
    let chains = resolve_chains(&config.chains, &config.providers, |key| {
        std::env::var(key).ok()
    })
    .context("endpoint resolution failed")?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Chains => {
            print_chains(&chains);
            Ok(())
        }
        Commands::Run => run(config, chains).await,
    }
}

fn print_chains(chains: &[ChainConfig]) {
    println!("{:<10} {:<16} {:<20} ws endpoint", "id", "name", "dialect");
    for chain in chains {
        println!(
            "{:<10} {:<16} {:<20} {}",
            chain.id,
            chain.name,
            Dialect::for_chain(chain.id).to_string(),
            chain.ws_url
        );
    }
}

async fn run(config: AppConfig, chains: Vec<ChainConfig>) -> anyhow::Result<()> {
    let store: Arc<dyn TxStore> = Arc::new(
        SqliteStore::open(&config.database_url)
            .await
            .context("open database")?,
    );
    let hub = Arc::new(SubscriberHub::new());

    let supervisor = Supervisor::start(chains, store.clone(), hub.clone())
        .await
        .context("supervisor startup failed")?;

    let (sweep_stop_tx, sweep_stop_rx) = tokio::sync::watch::channel(false);
    let sweeper = spawn_sweeper(
        store.clone(),
        chrono::Duration::hours(config.retention_hours as i64),
        Duration::from_secs(3_600),
        sweep_stop_rx,
    );

    let state = AppState { hub, store };
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("bind port {}", config.port))?;
    info!(port = config.port, "listening for subscribers and queries");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutdown signal received");
    supervisor.shutdown().await;
    let _ = sweep_stop_tx.send(true);
    let _ = tokio::time::timeout(Duration::from_secs(2), sweeper).await;
    info!("bye");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
