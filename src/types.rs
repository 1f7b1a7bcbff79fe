//! Chain JSON-RPC types
//!
//! Type definitions for block headers, block overviews, and detailed
//! transactions returned from the node's JSON-RPC endpoints. Identifiers
//! (hashes, addresses) stay opaque strings; amounts are converted to
//! satoshis at the deserialization boundary.

use serde::{Deserialize, Serialize};

/// Number of satoshis in one coin.
pub const COIN: f64 = 100_000_000.0;

/// The all-zeros transaction id some inputs carry instead of a real
/// previous output reference (anonymous spends). The source of such a
/// spend cannot be attributed to an address.
pub const NULL_TXID: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Block header as returned by `getblockheader`.
///
/// Everything except `next_hash` is metadata carried through unmodified.
/// `next_hash` is absent when the block is the current chain tip.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockHeader {
    pub hash: String,

    pub height: u64,

    pub time: u64,

    #[serde(rename = "mediantime")]
    pub median_time: u64,

    pub nonce: u64,

    pub difficulty: f64,

    #[serde(rename = "chainwork")]
    pub chain_work: String,

    pub bits: String,

    pub version: i64,

    /// Successor on the chain the node currently considers canonical.
    #[serde(rename = "nextblockhash", default)]
    pub next_hash: Option<String>,
}

/// Block overview as returned by `getblock` (verbosity 1): the header
/// fields plus the ordered list of transaction ids in the block.
#[derive(Debug, Clone, Deserialize)]
pub struct Block {
    pub hash: String,

    pub height: u64,

    pub time: u64,

    #[serde(rename = "mediantime")]
    pub median_time: u64,

    pub nonce: u64,

    pub difficulty: f64,

    #[serde(rename = "chainwork")]
    pub chain_work: String,

    pub bits: String,

    pub version: i64,

    #[serde(rename = "nextblockhash", default)]
    pub next_hash: Option<String>,

    /// Ordered transaction ids belonging to this block.
    #[serde(rename = "tx")]
    pub txids: Vec<String>,
}

impl Block {
    /// The header view of this block.
    pub fn header(&self) -> BlockHeader {
        BlockHeader {
            hash: self.hash.clone(),
            height: self.height,
            time: self.time,
            median_time: self.median_time,
            nonce: self.nonce,
            difficulty: self.difficulty,
            chain_work: self.chain_work.clone(),
            bits: self.bits.clone(),
            version: self.version,
            next_hash: self.next_hash.clone(),
        }
    }
}

/// Detailed transaction as returned by `getrawtransaction` (verbose).
#[derive(Debug, Clone, Deserialize)]
pub struct Transaction {
    #[serde(rename = "txid")]
    pub hash: String,

    pub version: i64,

    pub locktime: u64,

    #[serde(rename = "vin")]
    pub inputs: Vec<TxInput>,

    #[serde(rename = "vout")]
    pub outputs: Vec<TxOutput>,
}

/// Transaction input.
///
/// Coinbase inputs carry no `txid`/`vout` fields in the node's JSON, so
/// `prev_txid` is absent for newly issued coins.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TxInput {
    #[serde(rename = "txid", default)]
    pub prev_txid: Option<String>,

    /// Index into the previous transaction's outputs. Only meaningful
    /// when `prev_txid` is present.
    #[serde(rename = "vout", default)]
    pub output_index: u32,
}

impl TxInput {
    /// The previous output this input spends, if it can be attributed to
    /// one: coinbase inputs have no source, and the all-zeros id marks
    /// spends whose source is unknowable.
    pub fn spendable_source(&self) -> Option<(&str, u32)> {
        match self.prev_txid.as_deref() {
            Some(id) if id != NULL_TXID => Some((id, self.output_index)),
            _ => None,
        }
    }
}

/// Transaction output, reduced to what balance tracking needs.
///
/// Some outputs carry no resolvable address (bare multisig, op_return,
/// anonymous mints); those never affect any balance.
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "RawTxOutput")]
pub struct TxOutput {
    pub address: Option<String>,

    /// Amount in satoshis.
    pub value: i64,
}

/// One row of the ranked-list query result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressBalance {
    pub address: String,

    /// Balance in satoshis.
    pub balance: i64,
}

/// Convert a coin-denominated amount to satoshis.
///
/// The node reports output values as decimal coins; rounding here keeps
/// upstream float noise from leaking into the integer ledger.
pub fn coins_to_satoshis(value: f64) -> i64 {
    (value * COIN).round() as i64
}

// Wire shape of a `vout` entry; collapsed into `TxOutput` on deserialize.
// Older nodes report `addresses` (a list), newer ones a single `address`.

#[derive(Deserialize)]
struct RawTxOutput {
    value: f64,

    #[serde(rename = "scriptPubKey", default)]
    script_pub_key: Option<RawScriptPubKey>,
}

#[derive(Deserialize, Default)]
struct RawScriptPubKey {
    #[serde(default)]
    address: Option<String>,

    #[serde(default)]
    addresses: Option<Vec<String>>,
}

impl From<RawTxOutput> for TxOutput {
    fn from(raw: RawTxOutput) -> Self {
        let address = raw.script_pub_key.and_then(|spk| {
            spk.address.or_else(|| {
                spk.addresses
                    .and_then(|mut a| if a.is_empty() { None } else { Some(a.remove(0)) })
            })
        });
        TxOutput {
            address,
            value: coins_to_satoshis(raw.value),
        }
    }
}
