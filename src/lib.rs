//! richlist - incremental balance index for a UTXO chain
//!
//! This library follows a full node's best chain, interprets transaction
//! outputs and inputs as a running per-address ledger, and answers
//! "richest addresses" queries ranked by balance. It tracks chain
//! reorganizations by rolling blocks back one at a time until the local
//! tip is confirmed canonical again.

pub mod cli;
pub mod index;
pub mod keys;
pub mod records;
pub mod rocks;
pub mod store;

// Scanner modules
pub mod rpc;
pub mod scanner;
pub mod service;
pub mod source;
pub mod types;

#[cfg(test)]
mod testnode;

// Re-export the main types for convenience
pub use index::BalanceIndex;
pub use rocks::RocksStorage;
pub use scanner::{ScanState, Scanner, ScannerHandle};
pub use service::{RichListService, DEFAULT_LIST_SIZE};
pub use source::{BlockRef, BlockSource};
pub use store::{MemoryStorage, Storage, StoreError};
pub use types::{AddressBalance, Block, BlockHeader, Transaction, TxInput, TxOutput};
