//! CLI implementation for richctl
//!
//! Developer-friendly queries against a richlist database produced by
//! the daemon. All commands output pretty JSON.

use crate::rocks::RocksStorage;
use crate::store::Storage;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;

/// Richlist database CLI tool
#[derive(Parser)]
#[command(name = "richctl")]
#[command(about = "Query a richlist database")]
pub struct Cli {
    /// Path to the RocksDB database directory
    #[arg(short, long, default_value = "./richlist_db")]
    db_path: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the n richest addresses
    Top {
        /// Number of rows to return
        #[arg(default_value_t = 100)]
        n: usize,
    },
    /// Show the highest indexed block
    Tip,
    /// Show the tracked balance of an address
    Balance {
        /// Address as it appears on chain
        address: String,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let store = RocksStorage::open(&cli.db_path)
        .with_context(|| format!("Failed to open database at {:?}", cli.db_path))?;

    let result = match cli.command {
        Commands::Top { n } => {
            let list = store.get_most_richest(n)?;
            json!(list)
        }
        Commands::Tip => match store.tip()? {
            Some((height, hash)) => json!({
                "height": height,
                "hash": hash,
            }),
            None => json!(null),
        },
        Commands::Balance { address } => json!({
            "address": address,
            "balance": store.balance(&address)?,
        }),
    };

    // Pretty print JSON
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
