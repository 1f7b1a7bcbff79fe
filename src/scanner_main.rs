//! richlistd - chain scanning daemon
//!
//! Follows the node's best chain, maintains per-address balances, and
//! keeps the richlist database current. Shuts down cleanly on Ctrl+C.

use anyhow::{Context, Result};
use clap::Parser;
use richlist::rpc::RpcClient;
use richlist::service::RichListService;
use richlist::store::{MemoryStorage, Storage};
use richlist::RocksStorage;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};

/// Richlist indexing daemon
#[derive(Parser)]
#[command(name = "richlistd")]
#[command(about = "Scan the chain and maintain a balance richlist")]
struct Args {
    /// Node RPC endpoint URL
    #[arg(short, long, default_value = "http://127.0.0.1:8888")]
    rpc_url: String,

    /// Node RPC username
    #[arg(long)]
    rpc_user: Option<String>,

    /// Node RPC password
    #[arg(long)]
    rpc_password: Option<String>,

    /// Path to the RocksDB database directory; omit to index in memory
    #[arg(short, long)]
    db_path: Option<PathBuf>,

    /// Seconds between best-block polls while caught up
    #[arg(long, default_value_t = 10)]
    poll_interval: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let args = Args::parse();

    info!("Starting richlist daemon");
    info!("RPC URL: {}", args.rpc_url);
    match &args.db_path {
        Some(path) => info!("Database: {:?}", path),
        None => info!("Database: in-memory (state is lost on exit)"),
    }

    let mut rpc = RpcClient::new(args.rpc_url)
        .with_poll_interval(Duration::from_secs(args.poll_interval));
    if let (Some(user), Some(password)) = (args.rpc_user, args.rpc_password) {
        rpc = rpc.with_auth(user, password);
    }

    let store: Arc<dyn Storage> = match &args.db_path {
        Some(path) => Arc::new(
            RocksStorage::open(path)
                .with_context(|| format!("Failed to open database at {:?}", path))?,
        ),
        None => Arc::new(MemoryStorage::new()),
    };

    let mut service = RichListService::new(Arc::new(rpc), store);
    service.init();

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Received Ctrl+C, shutting down gracefully...");

    service.stop().await.context("Scanner error")?;
    info!("Scanner stopped");
    Ok(())
}
