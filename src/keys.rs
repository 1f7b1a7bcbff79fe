//! Key encoding for the durable store
//!
//! Column family names and key layouts. Identifiers are ASCII (hex
//! hashes, base58 addresses), so a NUL byte is a safe separator, and
//! numeric components are big-endian so RocksDB's lexicographic order
//! matches numeric order.

use anyhow::{bail, Result};

pub const CF_BLOCKS: &str = "blocks";
pub const CF_TXS: &str = "txs";
pub const CF_OUTPUTS: &str = "outputs";
pub const CF_SPENT: &str = "spent";
pub const CF_BALANCES: &str = "balances";
pub const CF_RANK: &str = "rank";

pub const COLUMN_FAMILIES: [&str; 6] = [
    CF_BLOCKS,
    CF_TXS,
    CF_OUTPUTS,
    CF_SPENT,
    CF_BALANCES,
    CF_RANK,
];

const SEP: u8 = 0x00;

/// Block key: height as 8 bytes big-endian. The highest block is one
/// reverse seek from the end of the column family.
pub fn encode_block_key(height: u64) -> [u8; 8] {
    height.to_be_bytes()
}

/// Output key: txid bytes + NUL + output index (4 bytes big-endian).
pub fn encode_output_key(txid: &str, index: u32) -> Vec<u8> {
    let mut key = Vec::with_capacity(txid.len() + 5);
    key.extend_from_slice(txid.as_bytes());
    key.push(SEP);
    key.extend_from_slice(&index.to_be_bytes());
    key
}

/// Prefix matching every output of one transaction.
pub fn output_prefix(txid: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(txid.len() + 1);
    prefix.extend_from_slice(txid.as_bytes());
    prefix.push(SEP);
    prefix
}

/// The txid component of an output key.
pub fn output_key_txid(key: &[u8]) -> Result<&str> {
    let end = match key.iter().position(|b| *b == SEP) {
        Some(end) => end,
        None => bail!("output key has no separator"),
    };
    Ok(std::str::from_utf8(&key[..end])?)
}

/// Spent-index key: spending txid + NUL + the spent output's key. A
/// prefix scan per spender finds everything a transaction consumed.
pub fn encode_spent_key(spender: &str, output_key: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(spender.len() + 1 + output_key.len());
    key.extend_from_slice(spender.as_bytes());
    key.push(SEP);
    key.extend_from_slice(output_key);
    key
}

/// Prefix matching every spent-index entry of one spending transaction.
pub fn spent_prefix(spender: &str) -> Vec<u8> {
    output_prefix(spender)
}

/// The output-key component of a spent-index key.
pub fn spent_key_output<'a>(key: &'a [u8], spender: &str) -> &'a [u8] {
    &key[spender.len() + 1..]
}

/// Rank key: inverted balance (8 bytes big-endian) + address. Forward
/// iteration yields descending balance with ascending address ties.
/// Only positive balances are ever encoded.
pub fn encode_rank_key(balance: i64, address: &str) -> Vec<u8> {
    let inverted = (i64::MAX - balance) as u64;
    let mut key = Vec::with_capacity(8 + address.len());
    key.extend_from_slice(&inverted.to_be_bytes());
    key.extend_from_slice(address.as_bytes());
    key
}

pub fn decode_rank_key(key: &[u8]) -> Result<(i64, String)> {
    if key.len() < 8 {
        bail!("rank key must be at least 8 bytes, got {}", key.len());
    }
    let inverted = u64::from_be_bytes(key[..8].try_into().expect("8 bytes"));
    if inverted >= i64::MAX as u64 {
        bail!("rank key encodes a non-positive balance");
    }
    let balance = i64::MAX - inverted as i64;
    let address = std::str::from_utf8(&key[8..])?.to_string();
    Ok((balance, address))
}

/// Balance value: 8 bytes big-endian, two's complement.
pub fn encode_balance(balance: i64) -> [u8; 8] {
    balance.to_be_bytes()
}

pub fn decode_balance(bytes: &[u8]) -> Result<i64> {
    if bytes.len() != 8 {
        bail!("balance must be 8 bytes (i64), got {}", bytes.len());
    }
    Ok(i64::from_be_bytes(bytes.try_into().expect("8 bytes")))
}
