//! In-process fake node for scanner and storage tests.

use crate::source::{BlockRef, BlockSource};
use crate::types::{Block, BlockHeader, Transaction, TxInput, TxOutput};
use anyhow::{bail, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::Notify;

#[derive(Default)]
struct FakeChain {
    blocks: HashMap<String, Block>,
    heights: HashMap<u64, String>,
    transactions: HashMap<String, Transaction>,
}

/// Scriptable [`BlockSource`]: tests mutate the chain between scans and
/// announce new blocks explicitly.
#[derive(Default)]
pub struct FakeNode {
    chain: Mutex<FakeChain>,
    notify: Notify,
}

impl FakeNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_block(&self, block: Block) {
        let mut chain = self.chain.lock();
        chain.heights.insert(block.height, block.hash.clone());
        chain.blocks.insert(block.hash.clone(), block);
    }

    pub fn remove_block(&self, hash: &str) {
        let mut chain = self.chain.lock();
        if let Some(block) = chain.blocks.remove(hash) {
            chain.heights.remove(&block.height);
        }
    }

    pub fn set_next_hash(&self, hash: &str, next: Option<&str>) {
        let mut chain = self.chain.lock();
        if let Some(block) = chain.blocks.get_mut(hash) {
            block.next_hash = next.map(str::to_string);
        }
    }

    pub fn insert_transaction(&self, tx: Transaction) {
        self.chain.lock().transactions.insert(tx.hash.clone(), tx);
    }

    pub fn remove_transaction(&self, txid: &str) {
        self.chain.lock().transactions.remove(txid);
    }

    /// Fire the new-block event a parked scanner is waiting on.
    pub fn announce_block(&self) {
        self.notify.notify_one();
    }
}

#[async_trait]
impl BlockSource for FakeNode {
    async fn block_header(&self, id: BlockRef) -> Result<BlockHeader> {
        let chain = self.chain.lock();
        let block = match &id {
            BlockRef::Hash(hash) => chain.blocks.get(hash),
            BlockRef::Height(height) => chain
                .heights
                .get(height)
                .and_then(|hash| chain.blocks.get(hash)),
        };
        match block {
            Some(block) => Ok(block.header()),
            None => bail!("block not found: {}", id),
        }
    }

    async fn block_overview(&self, hash: &str) -> Result<Block> {
        match self.chain.lock().blocks.get(hash) {
            Some(block) => Ok(block.clone()),
            None => bail!("block not found: {}", hash),
        }
    }

    async fn transaction(&self, txid: &str) -> Result<Transaction> {
        match self.chain.lock().transactions.get(txid) {
            Some(tx) => Ok(tx.clone()),
            None => bail!("transaction not found: {}", txid),
        }
    }

    async fn wait_for_block(&self) {
        self.notify.notified().await;
    }
}

/// A block overview with opaque but stable metadata.
pub fn test_block(hash: &str, height: u64, next: Option<&str>, txids: &[&str]) -> Block {
    Block {
        hash: hash.to_string(),
        height,
        time: 1_475_020_813 + height,
        median_time: 1_475_020_813,
        nonce: 3260,
        difficulty: 0.000244140625,
        chain_work: format!("{:064x}", height + 1),
        bits: "1e0ffff0".to_string(),
        version: 65538,
        next_hash: next.map(str::to_string),
        txids: txids.iter().map(|id| id.to_string()).collect(),
    }
}

/// A coin-issuing transaction (single input with no previous output).
pub fn coinbase_tx(hash: &str, outputs: &[(&str, i64)]) -> Transaction {
    Transaction {
        hash: hash.to_string(),
        version: 1,
        locktime: 0,
        inputs: vec![TxInput::default()],
        outputs: make_outputs(outputs),
    }
}

/// A transaction spending one previous output into the given outputs.
pub fn spend_tx(hash: &str, prev: &str, index: u32, outputs: &[(&str, i64)]) -> Transaction {
    Transaction {
        hash: hash.to_string(),
        version: 1,
        locktime: 0,
        inputs: vec![TxInput {
            prev_txid: Some(prev.to_string()),
            output_index: index,
        }],
        outputs: make_outputs(outputs),
    }
}

fn make_outputs(outputs: &[(&str, i64)]) -> Vec<TxOutput> {
    outputs
        .iter()
        .map(|(address, value)| TxOutput {
            address: Some(address.to_string()),
            value: *value,
        })
        .collect()
}
