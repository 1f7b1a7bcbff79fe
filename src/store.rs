//! Storage trait and in-memory implementation
//!
//! Persistence abstraction over blocks, transactions, and balances. The
//! scanner only ever appends one block or removes the most recent one,
//! so implementations keep a single height-ordered, hash-linked sequence
//! with no branching.

use crate::index::BalanceIndex;
use crate::types::{AddressBalance, Block, Transaction};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Errors surfaced by storage back ends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Asked to roll back a block when none is recorded.
    #[error("no block available")]
    NoBlockAvailable,

    /// `has_transactions` called with nothing to check.
    #[error("no transaction is specified")]
    NoTransactions,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Block/transaction/balance persistence.
///
/// `add_block` and `invalidate_latest_block` are exact inverses: applying
/// one and then the other leaves every balance and the ranking untouched.
/// Neither may leave a block's effects partially applied.
pub trait Storage: Send + Sync {
    /// Hash of the highest block recorded, or `None` when empty.
    fn latest_block(&self) -> Result<Option<String>, StoreError>;

    /// Which of `ids` are already recorded. Errors on an empty slice;
    /// a caller should never have nothing to check.
    fn has_transactions(&self, ids: &[String]) -> Result<HashSet<String>, StoreError>;

    /// Append a block: credit every addressed output, debit every input
    /// that resolves to a recorded output, then persist the block and
    /// its transactions.
    fn add_block(&self, block: &Block, txs: &[Transaction]) -> Result<(), StoreError>;

    /// Remove the most recent block, reversing every balance effect
    /// `add_block` applied for it.
    fn invalidate_latest_block(&self) -> Result<(), StoreError>;

    /// The `n` addresses with the largest positive balance, descending,
    /// ties broken by ascending address.
    fn get_most_richest(&self, n: usize) -> Result<Vec<AddressBalance>, StoreError>;
}

struct StoredBlock {
    block: Block,
    txs: Vec<Transaction>,
}

#[derive(Default)]
struct MemoryInner {
    blocks: Vec<StoredBlock>,
    transactions: HashMap<String, Transaction>,
    balances: HashMap<String, i64>,
    index: BalanceIndex,
}

/// Process-local storage: everything lives behind one `RwLock`, balances
/// use native `i64` arithmetic, and the ranking is an owned
/// [`BalanceIndex`]. Ranked reads take the read lock, so they see either
/// all of a block's effects or none of them.
#[derive(Default)]
pub struct MemoryStorage {
    inner: RwLock<MemoryInner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current tracked balance for an address (0 when never seen).
    pub fn balance(&self, address: &str) -> i64 {
        self.inner.read().balances.get(address).copied().unwrap_or(0)
    }

    /// Number of blocks currently recorded.
    pub fn block_count(&self) -> usize {
        self.inner.read().blocks.len()
    }
}

/// Signed balance changes a set of transactions implies. Inputs resolve
/// against the transaction map, which must already contain the block's
/// own transactions so intra-block spends land on the right address.
fn balance_changes(
    transactions: &HashMap<String, Transaction>,
    txs: &[Transaction],
    reverse: bool,
) -> Vec<(String, i64)> {
    let sign = if reverse { -1 } else { 1 };
    let mut changes = Vec::new();

    for tx in txs {
        for output in &tx.outputs {
            let Some(address) = &output.address else {
                continue;
            };
            changes.push((address.clone(), sign * output.value));
        }

        for input in &tx.inputs {
            let Some((prev, index)) = input.spendable_source() else {
                continue;
            };
            let Some(prev_tx) = transactions.get(prev) else {
                continue;
            };
            let Some(output) = prev_tx.outputs.get(index as usize) else {
                continue;
            };
            let Some(address) = &output.address else {
                continue;
            };
            changes.push((address.clone(), -sign * output.value));
        }
    }

    changes
}

fn apply_changes(inner: &mut MemoryInner, changes: Vec<(String, i64)>) {
    for (address, change) in changes {
        let current = inner.balances.get(&address).copied().unwrap_or(0);
        let next = current + change;
        inner.index.update(&address, current, next);
        inner.balances.insert(address, next);
    }
}

impl Storage for MemoryStorage {
    fn latest_block(&self) -> Result<Option<String>, StoreError> {
        Ok(self
            .inner
            .read()
            .blocks
            .last()
            .map(|stored| stored.block.hash.clone()))
    }

    fn has_transactions(&self, ids: &[String]) -> Result<HashSet<String>, StoreError> {
        if ids.is_empty() {
            return Err(StoreError::NoTransactions);
        }

        let inner = self.inner.read();
        Ok(ids
            .iter()
            .filter(|id| inner.transactions.contains_key(*id))
            .cloned()
            .collect())
    }

    fn add_block(&self, block: &Block, txs: &[Transaction]) -> Result<(), StoreError> {
        let mut inner = self.inner.write();

        // Record the transactions first so inputs spending an output
        // created earlier in this same block still resolve.
        for tx in txs {
            inner.transactions.insert(tx.hash.clone(), tx.clone());
        }

        let changes = balance_changes(&inner.transactions, txs, false);
        apply_changes(&mut inner, changes);

        inner.blocks.push(StoredBlock {
            block: block.clone(),
            txs: txs.to_vec(),
        });

        Ok(())
    }

    fn invalidate_latest_block(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.write();

        let txs = match inner.blocks.last() {
            Some(stored) => stored.txs.clone(),
            None => return Err(StoreError::NoBlockAvailable),
        };

        // Reverse while the block's transactions are still recorded, for
        // the same intra-block resolution add_block had.
        let changes = balance_changes(&inner.transactions, &txs, true);
        apply_changes(&mut inner, changes);

        inner.blocks.pop();
        for tx in &txs {
            inner.transactions.remove(&tx.hash);
        }

        Ok(())
    }

    fn get_most_richest(&self, n: usize) -> Result<Vec<AddressBalance>, StoreError> {
        Ok(self.inner.read().index.top(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testnode::{coinbase_tx, spend_tx, test_block};

    fn funding_chain() -> (Block, Vec<Transaction>) {
        let tx = coinbase_tx(
            "t1",
            &[("alice", 40), ("bob", 2), ("carol", 2)],
        );
        let block = test_block("b1", 1, None, &["t1"]);
        (block, vec![tx])
    }

    #[test]
    fn test_latest_block_empty_then_set() {
        let store = MemoryStorage::new();
        assert_eq!(store.latest_block().unwrap(), None);

        let (block, txs) = funding_chain();
        store.add_block(&block, &txs).unwrap();
        assert_eq!(store.latest_block().unwrap().as_deref(), Some("b1"));
    }

    #[test]
    fn test_add_block_credits_outputs_and_debits_spends() {
        let store = MemoryStorage::new();
        let (block, txs) = funding_chain();
        store.add_block(&block, &txs).unwrap();

        assert_eq!(store.balance("alice"), 40);
        assert_eq!(store.balance("bob"), 2);

        // spend alice's 40 into 30 for alice, 10 for bob
        let spend = spend_tx("t2", "t1", 0, &[("alice", 30), ("bob", 10)]);
        let block2 = test_block("b2", 2, None, &["t2"]);
        store.add_block(&block2, &[spend]).unwrap();

        assert_eq!(store.balance("alice"), 30);
        assert_eq!(store.balance("bob"), 12);
        assert_eq!(store.balance("carol"), 2);
    }

    #[test]
    fn test_block_delta_sums_match_outputs_and_spends() {
        let store = MemoryStorage::new();
        let (block, txs) = funding_chain();
        store.add_block(&block, &txs).unwrap();

        let before: i64 = ["alice", "bob", "carol"]
            .iter()
            .map(|a| store.balance(a))
            .sum();
        assert_eq!(before, 44); // sum of all addressed output values

        let spend = spend_tx("t2", "t1", 0, &[("alice", 25), ("dave", 15)]);
        let block2 = test_block("b2", 2, None, &["t2"]);
        store.add_block(&block2, &[spend]).unwrap();

        // +40 of new outputs, -40 of spent output
        let after: i64 = ["alice", "bob", "carol", "dave"]
            .iter()
            .map(|a| store.balance(a))
            .sum();
        assert_eq!(after, before);
    }

    #[test]
    fn test_add_then_invalidate_round_trips() {
        let store = MemoryStorage::new();
        let (block, txs) = funding_chain();
        store.add_block(&block, &txs).unwrap();
        let baseline = store.get_most_richest(100).unwrap();

        let spend = spend_tx("t2", "t1", 0, &[("alice", 30), ("bob", 10)]);
        let block2 = test_block("b2", 2, None, &["t2"]);
        store.add_block(&block2, &[spend]).unwrap();

        store.invalidate_latest_block().unwrap();

        assert_eq!(store.get_most_richest(100).unwrap(), baseline);
        assert_eq!(store.balance("alice"), 40);
        assert_eq!(store.balance("bob"), 2);
        assert_eq!(store.latest_block().unwrap().as_deref(), Some("b1"));
        // rolled-back transactions are forgotten
        assert!(store
            .has_transactions(&["t2".to_string()])
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_invalidate_empty_storage_fails() {
        let store = MemoryStorage::new();
        assert!(matches!(
            store.invalidate_latest_block(),
            Err(StoreError::NoBlockAvailable)
        ));
    }

    #[test]
    fn test_has_transactions_rejects_empty_input() {
        let store = MemoryStorage::new();
        assert!(matches!(
            store.has_transactions(&[]),
            Err(StoreError::NoTransactions)
        ));
    }

    #[test]
    fn test_intra_block_spend_resolves_and_round_trips() {
        let store = MemoryStorage::new();
        let fund = coinbase_tx("t1", &[("alice", 50)]);
        // t2 spends t1's output inside the same block
        let spend = spend_tx("t2", "t1", 0, &[("bob", 50)]);
        let block = test_block("b1", 1, None, &["t1", "t2"]);

        store.add_block(&block, &[fund, spend]).unwrap();
        assert_eq!(store.balance("alice"), 0);
        assert_eq!(store.balance("bob"), 50);

        store.invalidate_latest_block().unwrap();
        assert_eq!(store.balance("alice"), 0);
        assert_eq!(store.balance("bob"), 0);
        assert!(store.get_most_richest(10).unwrap().is_empty());
    }

    #[test]
    fn test_zero_and_negative_balances_never_ranked() {
        let store = MemoryStorage::new();
        let (block, txs) = funding_chain();
        store.add_block(&block, &txs).unwrap();

        // spend alice's whole output away from her
        let spend = spend_tx("t2", "t1", 0, &[("bob", 40)]);
        let block2 = test_block("b2", 2, None, &["t2"]);
        store.add_block(&block2, &[spend]).unwrap();

        let list = store.get_most_richest(100).unwrap();
        assert!(list.iter().all(|row| row.balance > 0));
        assert!(!list.iter().any(|row| row.address == "alice"));
    }
}
