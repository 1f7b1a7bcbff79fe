//! richctl - richlist database CLI tool
//!
//! A developer-friendly command-line interface for inspecting the
//! balances and blocks a richlist daemon has indexed.

use richlist::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
