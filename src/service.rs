//! Richlist service façade
//!
//! Owns the scanner task and the storage it feeds. Queries read straight
//! from storage and never wait on scanning; scan errors are observable
//! only through logs and the pace at which the list converges.

use crate::scanner::{ScanState, Scanner, ScannerHandle};
use crate::source::BlockSource;
use crate::store::{Storage, StoreError};
use crate::types::AddressBalance;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Rows returned by [`RichListService::list`] when no count is given.
pub const DEFAULT_LIST_SIZE: usize = 100;

/// Lifecycle control and the ranked-balance query.
pub struct RichListService {
    store: Arc<dyn Storage>,
    handle: ScannerHandle,
    scanner: Option<Scanner>,
    task: Option<JoinHandle<Result<()>>>,
}

impl RichListService {
    pub fn new(source: Arc<dyn BlockSource>, store: Arc<dyn Storage>) -> Self {
        let scanner = Scanner::new(source, store.clone());
        let handle = scanner.handle();
        Self {
            store,
            handle,
            scanner: Some(scanner),
            task: None,
        }
    }

    /// Start scanning. Returns immediately; catching up with the chain
    /// tip happens in the background.
    pub fn init(&mut self) {
        if let Some(scanner) = self.scanner.take() {
            self.task = Some(tokio::spawn(scanner.run()));
        }
    }

    /// The `n` (default 100) richest addresses currently committed.
    pub fn list(&self, n: Option<usize>) -> Result<Vec<AddressBalance>, StoreError> {
        self.store.get_most_richest(n.unwrap_or(DEFAULT_LIST_SIZE))
    }

    /// Stop scanning and wait for the loop to fully quiesce. Never
    /// aborts an in-flight step; a parked loop is nudged awake so the
    /// stop completes without an external block event.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        self.handle.request_stop();
        task.await.context("scanner task panicked")?
    }

    pub fn state(&self) -> ScanState {
        self.handle.state()
    }

    /// Receiver whose value bumps each time the scanner reaches the tip.
    pub fn caught_up(&self) -> watch::Receiver<u64> {
        self.handle.caught_up()
    }
}
