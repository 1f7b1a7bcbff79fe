//! Chain scan loop
//!
//! Walks the node's best chain one block at a time, committing each
//! validated block to storage. When the local tip falls off the
//! canonical chain (a reorg), the scanner rolls back one block per pass
//! until it finds a header the node still confirms, then advances again.

use crate::source::{BlockRef, BlockSource};
use crate::store::{Storage, StoreError};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Notify};
use tracing::{debug, info};

/// Log a progress line every this many blocks.
const PROGRESS_INTERVAL: u64 = 100;

/// Scan loop lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// No scanning activity.
    Stopped,
    /// Actively fetching, validating, and committing one block.
    Running,
    /// Caught up with the node's tip, parked until a new block arrives.
    WaitingForNewBlock,
    /// Stop requested; the loop exits at its next safe point.
    Stopping,
}

#[derive(Debug, Error)]
enum ScanError {
    /// Local chain state diverged from the node's canonical chain.
    #[error("block not valid")]
    InvalidBlock,

    /// Caught up: the local tip is the node's tip.
    #[error("already latest block")]
    AlreadyAtTip,

    #[error(transparent)]
    Store(#[from] StoreError),
}

struct Shared {
    state: Mutex<ScanState>,
    wake: Notify,
    caught_up: watch::Sender<u64>,
}

/// Control handle over a running scanner: state inspection, the
/// caught-up notification, and the stop request.
#[derive(Clone)]
pub struct ScannerHandle {
    shared: Arc<Shared>,
}

impl ScannerHandle {
    pub fn state(&self) -> ScanState {
        *self.shared.state.lock()
    }

    /// Receiver whose value bumps every time the scanner reaches the
    /// chain tip.
    pub fn caught_up(&self) -> watch::Receiver<u64> {
        self.shared.caught_up.subscribe()
    }

    /// Ask the loop to stop at its next safe point. A loop parked
    /// waiting for a new block is nudged awake, since no block event may
    /// ever arrive to wake it otherwise.
    pub fn request_stop(&self) {
        let previous = {
            let mut state = self.shared.state.lock();
            let previous = *state;
            *state = ScanState::Stopping;
            previous
        };

        if previous == ScanState::WaitingForNewBlock {
            self.shared.wake.notify_one();
        }
    }
}

/// The scan loop. Single-owner: [`Scanner::run`] consumes the scanner
/// and is the only task that ever mutates storage.
pub struct Scanner {
    source: Arc<dyn BlockSource>,
    store: Arc<dyn Storage>,
    shared: Arc<Shared>,
}

impl Scanner {
    pub fn new(source: Arc<dyn BlockSource>, store: Arc<dyn Storage>) -> Self {
        let (caught_up, _) = watch::channel(0);
        Self {
            source,
            store,
            shared: Arc::new(Shared {
                state: Mutex::new(ScanState::Stopped),
                wake: Notify::new(),
                caught_up,
            }),
        }
    }

    pub fn handle(&self) -> ScannerHandle {
        ScannerHandle {
            shared: self.shared.clone(),
        }
    }

    /// Drive the scan loop until a stop request or a fatal storage
    /// failure. The state is Stopped by the time this returns.
    pub async fn run(self) -> Result<()> {
        let result = self.scan_loop().await;
        *self.shared.state.lock() = ScanState::Stopped;
        result
    }

    async fn scan_loop(&self) -> Result<()> {
        loop {
            // A stop request wins over everything else; this is the only
            // exit on the non-error path.
            {
                let mut state = self.shared.state.lock();
                if *state == ScanState::Stopping {
                    return Ok(());
                }
                *state = ScanState::Running;
            }

            match self.step().await {
                Ok(height) => {
                    if height % PROGRESS_INTERVAL == 0 {
                        info!(height, "blocks scanned");
                    }
                }
                Err(ScanError::InvalidBlock) => {
                    debug!("local tip left the canonical chain, rolling back one block");
                    self.store
                        .invalidate_latest_block()
                        .context("rollback after reorg failed")?;
                }
                Err(ScanError::AlreadyAtTip) => {
                    info!("all blocks scanned");

                    // Park only if no stop request arrived meanwhile; the
                    // check and the transition share one critical section
                    // so a concurrent stop cannot slip between them.
                    let parked = {
                        let mut state = self.shared.state.lock();
                        if *state == ScanState::Stopping {
                            false
                        } else {
                            *state = ScanState::WaitingForNewBlock;
                            true
                        }
                    };

                    self.shared.caught_up.send_modify(|n| *n += 1);

                    if parked {
                        tokio::select! {
                            _ = self.source.wait_for_block() => {}
                            _ = self.shared.wake.notified() => {}
                        }
                    }
                }
                Err(ScanError::Store(err)) => {
                    return Err(anyhow::Error::from(err).context("storage failure while scanning"));
                }
            }
        }
    }

    /// One scan pass: validate the local tip against the node, then
    /// fetch, resolve, and commit at most one block.
    async fn step(&self) -> Result<u64, ScanError> {
        // With empty storage the genesis header anchors the walk; blocks
        // are committed starting from height 1.
        let local = self.store.latest_block()?;
        let anchor = match local {
            Some(hash) => BlockRef::Hash(hash),
            None => BlockRef::Height(0),
        };

        let header = match self.source.block_header(anchor).await {
            Ok(header) => header,
            Err(err) => {
                debug!(error = %err, "local tip not confirmed by node");
                return Err(ScanError::InvalidBlock);
            }
        };

        let Some(next_hash) = header.next_hash else {
            return Err(ScanError::AlreadyAtTip);
        };

        // The expected successor vanishing here means a reorg happened
        // between the two lookups.
        let block = match self.source.block_overview(&next_hash).await {
            Ok(block) => block,
            Err(err) => {
                debug!(error = %err, hash = %next_hash, "next block not found");
                return Err(ScanError::InvalidBlock);
            }
        };

        // Seed the duplicate guard with what storage already has: a
        // malformed block can list the same transaction id twice, and a
        // duplicate must not touch balances twice.
        let mut seen = self.store.has_transactions(&block.txids)?;
        let mut txs = Vec::with_capacity(block.txids.len());

        // Strictly sequential fetches; a reorg racing this loop must
        // surface deterministically.
        for txid in &block.txids {
            if seen.contains(txid) {
                continue;
            }
            let tx = match self.source.transaction(txid).await {
                Ok(tx) => tx,
                Err(err) => {
                    debug!(error = %err, txid = %txid, "transaction fetch failed");
                    return Err(ScanError::InvalidBlock);
                }
            };
            seen.insert(txid.clone());
            txs.push(tx);
        }

        let height = block.height;
        self.store.add_block(&block, &txs)?;
        Ok(height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStorage;
    use crate::testnode::{coinbase_tx, spend_tx, test_block, FakeNode};
    use std::time::Duration;
    use tokio::time::timeout;

    fn seeded_node() -> FakeNode {
        let node = FakeNode::new();
        node.insert_block(test_block("genesis", 0, Some("b1"), &[]));
        node.insert_block(test_block("b1", 1, None, &["t1"]));
        node.insert_transaction(coinbase_tx("t1", &[("alice", 40), ("bob", 2)]));
        node
    }

    async fn wait_caught_up(rx: &mut watch::Receiver<u64>) {
        timeout(Duration::from_secs(5), rx.changed())
            .await
            .expect("scanner did not catch up in time")
            .expect("scanner dropped");
    }

    #[tokio::test]
    async fn test_scans_to_tip_and_parks() {
        let node = Arc::new(seeded_node());
        let store = Arc::new(MemoryStorage::new());
        let scanner = Scanner::new(node.clone(), store.clone());
        let handle = scanner.handle();
        let mut caught_up = handle.caught_up();

        let task = tokio::spawn(scanner.run());
        wait_caught_up(&mut caught_up).await;

        assert_eq!(handle.state(), ScanState::WaitingForNewBlock);
        assert_eq!(store.latest_block().unwrap().as_deref(), Some("b1"));
        assert_eq!(store.balance("alice"), 40);

        handle.request_stop();
        timeout(Duration::from_secs(5), task)
            .await
            .expect("stop timed out")
            .unwrap()
            .unwrap();
        assert_eq!(handle.state(), ScanState::Stopped);
    }

    #[tokio::test]
    async fn test_new_block_event_resumes_scan() {
        let node = Arc::new(seeded_node());
        let store = Arc::new(MemoryStorage::new());
        let scanner = Scanner::new(node.clone(), store.clone());
        let handle = scanner.handle();
        let mut caught_up = handle.caught_up();

        let task = tokio::spawn(scanner.run());
        wait_caught_up(&mut caught_up).await;

        node.set_next_hash("b1", Some("b2"));
        node.insert_block(test_block("b2", 2, None, &["t2"]));
        node.insert_transaction(spend_tx("t2", "t1", 0, &[("carol", 40)]));
        node.announce_block();

        wait_caught_up(&mut caught_up).await;
        assert_eq!(store.latest_block().unwrap().as_deref(), Some("b2"));
        assert_eq!(store.balance("alice"), 0);
        assert_eq!(store.balance("carol"), 40);

        handle.request_stop();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_txids_in_one_block_apply_once() {
        let node = Arc::new(FakeNode::new());
        node.insert_block(test_block("genesis", 0, Some("b1"), &[]));
        // upstream bug: the same id listed twice in one block
        node.insert_block(test_block("b1", 1, None, &["t1", "t1"]));
        node.insert_transaction(coinbase_tx("t1", &[("alice", 7)]));

        let store = Arc::new(MemoryStorage::new());
        let scanner = Scanner::new(node, store.clone());
        let handle = scanner.handle();
        let mut caught_up = handle.caught_up();

        let task = tokio::spawn(scanner.run());
        wait_caught_up(&mut caught_up).await;

        assert_eq!(store.balance("alice"), 7);

        handle.request_stop();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_fatal_when_empty_storage_has_no_anchor() {
        // no genesis anywhere: the first rollback finds nothing to undo
        let node = Arc::new(FakeNode::new());
        let store = Arc::new(MemoryStorage::new());
        let scanner = Scanner::new(node, store);
        let handle = scanner.handle();

        let task = tokio::spawn(scanner.run());
        let result = timeout(Duration::from_secs(5), task)
            .await
            .expect("scanner should terminate")
            .unwrap();
        assert!(result.is_err());
        assert_eq!(handle.state(), ScanState::Stopped);
    }
}
