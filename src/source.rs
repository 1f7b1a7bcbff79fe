//! Block source abstraction
//!
//! The seam between the scanner and the node it indexes. Lookup failures
//! mean "not found / no longer on the canonical chain"; the scanner
//! treats them as reorg signals.

use crate::types::{Block, BlockHeader, Transaction};
use anyhow::Result;
use async_trait::async_trait;
use std::fmt;

/// Reference to a block the node knows about, by hash or by height.
#[derive(Debug, Clone)]
pub enum BlockRef {
    Hash(String),
    Height(u64),
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockRef::Hash(hash) => f.write_str(hash),
            BlockRef::Height(height) => write!(f, "height {}", height),
        }
    }
}

/// A node interface supplying chain data to the scanner.
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Look up a block header. An error signals the block is not on the
    /// chain the node currently considers canonical.
    async fn block_header(&self, id: BlockRef) -> Result<BlockHeader>;

    /// Look up a block overview (header plus transaction id list).
    async fn block_overview(&self, hash: &str) -> Result<Block>;

    /// Look up full transaction detail.
    async fn transaction(&self, txid: &str) -> Result<Transaction>;

    /// Resolve once the node's tip advances past the point of the call.
    /// One-shot: callers re-arm by calling again.
    async fn wait_for_block(&self);
}
