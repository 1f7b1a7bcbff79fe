//! JSON-RPC client for the chain node
//!
//! Typed interface to the node's JSON-RPC endpoints. Block and
//! transaction lookups map onto `getblockhash` / `getblockheader` /
//! `getblock` / `getrawtransaction`; new blocks are detected by polling
//! `getbestblockhash`, since the scanner only needs a level-triggered
//! "tip advanced" signal.

use crate::source::{BlockRef, BlockSource};
use crate::types::{Block, BlockHeader, Transaction};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// JSON-RPC client for the node.
pub struct RpcClient {
    client: reqwest::Client,
    url: String,
    auth: Option<(String, String)>,
    poll_interval: Duration,
}

impl RpcClient {
    /// Create a new RPC client.
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            auth: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Use HTTP basic auth (the node's rpcuser/rpcpassword).
    pub fn with_auth(mut self, user: String, password: String) -> Self {
        self.auth = Some((user, password));
        self
    }

    /// How often to poll for a new best block while parked.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Make a JSON-RPC call.
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });

        let mut builder = self.client.post(&self.url).json(&request);
        if let Some((user, password)) = &self.auth {
            builder = builder.basic_auth(user, Some(password));
        }

        let response = builder.send().await.context("Failed to send RPC request")?;

        let json: Value = response
            .json()
            .await
            .context("Failed to parse RPC response")?;

        // Check for RPC error
        if let Some(error) = json.get("error") {
            if !error.is_null() {
                anyhow::bail!("RPC error: {}", error);
            }
        }

        // Extract result
        json.get("result")
            .cloned()
            .context("RPC response missing 'result' field")
    }

    /// Get the hash of the current chain tip.
    pub async fn get_best_block_hash(&self) -> Result<String> {
        let result = self.call("getbestblockhash", json!([])).await?;
        result
            .as_str()
            .map(str::to_string)
            .context("Best block hash response is not a string")
    }

    /// Get the hash of the block at the given height.
    pub async fn get_block_hash(&self, height: u64) -> Result<String> {
        let result = self.call("getblockhash", json!([height])).await?;
        result
            .as_str()
            .map(str::to_string)
            .context("Block hash response is not a string")
    }

    /// Get a block header by hash.
    pub async fn get_block_header(&self, hash: &str) -> Result<BlockHeader> {
        let result = self.call("getblockheader", json!([hash, true])).await?;
        serde_json::from_value(result).context("Failed to deserialize block header")
    }

    /// Get a block overview (header plus transaction ids) by hash.
    pub async fn get_block(&self, hash: &str) -> Result<Block> {
        let result = self.call("getblock", json!([hash, 1])).await?;
        serde_json::from_value(result).context("Failed to deserialize block")
    }

    /// Get full transaction detail by id.
    pub async fn get_raw_transaction(&self, txid: &str) -> Result<Transaction> {
        let result = self.call("getrawtransaction", json!([txid, 1])).await?;
        serde_json::from_value(result).context("Failed to deserialize transaction")
    }
}

#[async_trait]
impl BlockSource for RpcClient {
    async fn block_header(&self, id: BlockRef) -> Result<BlockHeader> {
        match id {
            BlockRef::Hash(hash) => self.get_block_header(&hash).await,
            BlockRef::Height(height) => {
                let hash = self.get_block_hash(height).await?;
                self.get_block_header(&hash).await
            }
        }
    }

    async fn block_overview(&self, hash: &str) -> Result<Block> {
        self.get_block(hash).await
    }

    async fn transaction(&self, txid: &str) -> Result<Transaction> {
        self.get_raw_transaction(txid).await
    }

    async fn wait_for_block(&self) {
        // Transient poll failures are logged and retried; this method
        // only ever resolves on an observed tip change.
        let start = self.get_best_block_hash().await.ok();

        loop {
            tokio::time::sleep(self.poll_interval).await;
            match self.get_best_block_hash().await {
                Ok(best) if start.as_deref() != Some(best.as_str()) => return,
                Ok(_) => {}
                Err(err) => debug!(error = %err, "best block poll failed"),
            }
        }
    }
}
