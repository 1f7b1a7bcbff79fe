//! Record types for durable chain state
//!
//! These structs represent the data stored in the RocksDB back end. They
//! use postcard for binary serialization, which is compact and
//! deterministic.

use crate::types::{Block, Transaction};
use serde::{Deserialize, Serialize};

/// Persisted block: header metadata plus the ids of the transactions the
/// block was committed with (duplicates already dropped).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub hash: String,
    pub height: u64,
    pub time: u64,
    pub median_time: u64,
    pub nonce: u64,
    pub difficulty: f64,
    pub chain_work: String,
    pub bits: String,
    pub version: i64,
    pub txids: Vec<String>,
}

impl BlockRecord {
    pub fn from_parts(block: &Block, txs: &[Transaction]) -> Self {
        Self {
            hash: block.hash.clone(),
            height: block.height,
            time: block.time,
            median_time: block.median_time,
            nonce: block.nonce,
            difficulty: block.difficulty,
            chain_work: block.chain_work.clone(),
            bits: block.bits.clone(),
            version: block.version,
            txids: txs.iter().map(|tx| tx.hash.clone()).collect(),
        }
    }
}

/// Persisted transaction. Inputs and outputs are not duplicated here;
/// the outputs column family materializes everything balance tracking
/// needs to unwind a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRecord {
    pub hash: String,
    pub locktime: u64,
    pub version: i64,
}

impl TxRecord {
    pub fn from_transaction(tx: &Transaction) -> Self {
        Self {
            hash: tx.hash.clone(),
            locktime: tx.locktime,
            version: tx.version,
        }
    }
}

/// Persisted output: which address it pays, how much, and which
/// transaction (if any) has spent it. Outputs without a resolvable
/// address are never materialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub address: String,
    pub value: i64,
    pub spent_by: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testnode::{coinbase_tx, test_block};

    #[test]
    fn test_block_record_roundtrip() {
        let tx = coinbase_tx("t1", &[("addr", 5)]);
        let record = BlockRecord::from_parts(&test_block("b1", 7, None, &["t1"]), &[tx]);

        let bytes = postcard::to_allocvec(&record).unwrap();
        let decoded: BlockRecord = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(record, decoded);
        assert_eq!(decoded.txids, vec!["t1"]);
    }

    #[test]
    fn test_output_record_roundtrip() {
        let record = OutputRecord {
            address: "aEF2p3jepoWF2yRYZjb6EACCP4CaP41doV".to_string(),
            value: 40 * 100_000_000,
            spent_by: Some("t2".to_string()),
        };

        let bytes = postcard::to_allocvec(&record).unwrap();
        let decoded: OutputRecord = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(record, decoded);
    }
}
