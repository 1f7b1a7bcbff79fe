//! Durable storage on RocksDB
//!
//! Column families mirror the logical collections: blocks by height,
//! transactions by hash, materialized outputs with a sparse spent index,
//! balances by address, and a rank index ordered (balance descending,
//! address ascending) so the ranked query is a single forward scan.
//!
//! Every mutation of `add_block` / `invalidate_latest_block` is staged in
//! one `WriteBatch` and committed atomically, so a crash mid-operation
//! never leaves a block's effects partially applied.

use crate::keys::{
    decode_balance, decode_rank_key, encode_balance, encode_block_key, encode_output_key,
    encode_rank_key, encode_spent_key, output_key_txid, output_prefix, spent_key_output,
    spent_prefix, CF_BALANCES, CF_BLOCKS, CF_OUTPUTS, CF_RANK, CF_SPENT, CF_TXS,
    COLUMN_FAMILIES,
};
use crate::records::{BlockRecord, OutputRecord, TxRecord};
use crate::store::{Storage, StoreError};
use crate::types::{AddressBalance, Block, Transaction};
use anyhow::{anyhow, Context, Result};
use rocksdb::{ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

/// RocksDB-backed implementation of [`Storage`].
///
/// Balances are `i64` satoshis; deltas are applied with integer
/// arithmetic so millions of increments cannot drift.
pub struct RocksStorage {
    db: DB,
}

impl RocksStorage {
    /// Open or create a database at the given path, creating all
    /// required column families if they don't exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let column_families: Vec<_> = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&opts, path, column_families)
            .context("failed to open RocksDB database")?;

        Ok(Self { db })
    }

    /// Highest recorded block with its metadata, or `None` when empty.
    pub fn tip(&self) -> Result<Option<(u64, String)>, StoreError> {
        Ok(self
            .latest_block_record()?
            .map(|record| (record.height, record.hash)))
    }

    /// Current tracked balance for an address.
    pub fn balance(&self, address: &str) -> Result<Option<i64>, StoreError> {
        let cf = self.cf(CF_BALANCES)?;
        match self
            .db
            .get_cf(cf, address.as_bytes())
            .context("failed to get balance")?
        {
            Some(bytes) => Ok(Some(decode_balance(&bytes)?)),
            None => Ok(None),
        }
    }

    fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
        Ok(self
            .db
            .cf_handle(name)
            .with_context(|| format!("column family '{}' not found", name))?)
    }

    fn latest_block_record(&self) -> Result<Option<BlockRecord>, StoreError> {
        let cf = self.cf(CF_BLOCKS)?;
        match self.db.iterator_cf(cf, IteratorMode::End).next() {
            Some(entry) => {
                let (_, value) = entry.context("failed to read latest block")?;
                let record =
                    postcard::from_bytes(&value).context("failed to deserialize block record")?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn output(&self, key: &[u8]) -> Result<Option<OutputRecord>, StoreError> {
        let cf = self.cf(CF_OUTPUTS)?;
        match self.db.get_cf(cf, key).context("failed to get output")? {
            Some(bytes) => Ok(Some(
                postcard::from_bytes(&bytes).context("failed to deserialize output record")?,
            )),
            None => Ok(None),
        }
    }

    fn scan_prefix(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let cf = self.cf(cf_name)?;
        let mut rows = Vec::new();
        for entry in self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward))
        {
            let (key, value) = entry.context("prefix scan failed")?;
            if !key.starts_with(prefix) {
                break;
            }
            rows.push((key.to_vec(), value.to_vec()));
        }
        Ok(rows)
    }

    /// Stage balance and rank updates for a set of signed deltas. The
    /// rank entry moves together with the balance so no reader of the
    /// committed batch can observe an address in two buckets.
    fn stage_balance_changes(
        &self,
        batch: &mut WriteBatch,
        changes: &HashMap<String, i64>,
    ) -> Result<(), StoreError> {
        let balances_cf = self.cf(CF_BALANCES)?;
        let rank_cf = self.cf(CF_RANK)?;

        for (address, delta) in changes {
            if *delta == 0 {
                continue;
            }
            let current = self.balance(address)?.unwrap_or(0);
            let next = current + delta;

            if current > 0 {
                batch.delete_cf(rank_cf, encode_rank_key(current, address));
            }
            batch.put_cf(balances_cf, address.as_bytes(), encode_balance(next));
            if next > 0 {
                batch.put_cf(rank_cf, encode_rank_key(next, address), b"");
            }
        }

        Ok(())
    }
}

impl Storage for RocksStorage {
    fn latest_block(&self) -> Result<Option<String>, StoreError> {
        Ok(self.latest_block_record()?.map(|record| record.hash))
    }

    fn has_transactions(&self, ids: &[String]) -> Result<HashSet<String>, StoreError> {
        if ids.is_empty() {
            return Err(StoreError::NoTransactions);
        }

        let cf = self.cf(CF_TXS)?;
        let mut found = HashSet::new();
        for id in ids {
            if self
                .db
                .get_cf(cf, id.as_bytes())
                .context("failed to get transaction")?
                .is_some()
            {
                found.insert(id.clone());
            }
        }
        Ok(found)
    }

    fn add_block(&self, block: &Block, txs: &[Transaction]) -> Result<(), StoreError> {
        // Outputs this block creates. Addressless and zero-value outputs
        // cannot affect any balance and are not materialized.
        let mut staged: BTreeMap<Vec<u8>, OutputRecord> = BTreeMap::new();
        let mut changes: HashMap<String, i64> = HashMap::new();

        for tx in txs {
            for (index, output) in tx.outputs.iter().enumerate() {
                let Some(address) = &output.address else {
                    continue;
                };
                if output.value == 0 {
                    continue;
                }
                *changes.entry(address.clone()).or_insert(0) += output.value;
                staged.insert(
                    encode_output_key(&tx.hash, index as u32),
                    OutputRecord {
                        address: address.clone(),
                        value: output.value,
                        spent_by: None,
                    },
                );
            }
        }

        // Resolve spends. The spent output may have been created a few
        // transactions earlier in this same block, so the staged set is
        // consulted before the database.
        let mut spent_marks: Vec<(String, Vec<u8>)> = Vec::new();
        for tx in txs {
            for input in &tx.inputs {
                let Some((prev, index)) = input.spendable_source() else {
                    continue;
                };
                let key = encode_output_key(prev, index);
                if !staged.contains_key(&key) {
                    match self.output(&key)? {
                        Some(record) => {
                            staged.insert(key.clone(), record);
                        }
                        None => continue,
                    }
                }
                if let Some(record) = staged.get_mut(&key) {
                    record.spent_by = Some(tx.hash.clone());
                    *changes.entry(record.address.clone()).or_insert(0) -= record.value;
                    spent_marks.push((tx.hash.clone(), key));
                }
            }
        }

        let mut batch = WriteBatch::default();
        let txs_cf = self.cf(CF_TXS)?;
        let outputs_cf = self.cf(CF_OUTPUTS)?;
        let spent_cf = self.cf(CF_SPENT)?;
        let blocks_cf = self.cf(CF_BLOCKS)?;

        for tx in txs {
            let value = postcard::to_allocvec(&TxRecord::from_transaction(tx))
                .context("failed to serialize transaction record")?;
            batch.put_cf(txs_cf, tx.hash.as_bytes(), value);
        }
        for (key, record) in &staged {
            let value =
                postcard::to_allocvec(record).context("failed to serialize output record")?;
            batch.put_cf(outputs_cf, key, value);
        }
        for (spender, output_key) in &spent_marks {
            batch.put_cf(spent_cf, encode_spent_key(spender, output_key), b"");
        }
        let value = postcard::to_allocvec(&BlockRecord::from_parts(block, txs))
            .context("failed to serialize block record")?;
        batch.put_cf(blocks_cf, encode_block_key(block.height), value);

        self.stage_balance_changes(&mut batch, &changes)?;
        self.db.write(batch).context("failed to commit block")?;
        Ok(())
    }

    fn invalidate_latest_block(&self) -> Result<(), StoreError> {
        let Some(block) = self.latest_block_record()? else {
            return Err(StoreError::NoBlockAvailable);
        };

        let block_txids: HashSet<&str> = block.txids.iter().map(String::as_str).collect();
        let mut changes: HashMap<String, i64> = HashMap::new();

        // Reverse the credit of every output this block created.
        let mut created_keys: Vec<Vec<u8>> = Vec::new();
        for txid in &block.txids {
            for (key, value) in self.scan_prefix(CF_OUTPUTS, &output_prefix(txid))? {
                let record: OutputRecord = postcard::from_bytes(&value)
                    .context("failed to deserialize output record")?;
                *changes.entry(record.address).or_insert(0) -= record.value;
                created_keys.push(key);
            }
        }

        // Reverse the debit of every output this block spent and mark it
        // unspent again. Outputs both created and spent by this block are
        // deleted outright, so only foreign outputs are rewritten.
        let mut unspend: Vec<(Vec<u8>, OutputRecord)> = Vec::new();
        let mut spent_keys: Vec<Vec<u8>> = Vec::new();
        for txid in &block.txids {
            for (key, _) in self.scan_prefix(CF_SPENT, &spent_prefix(txid))? {
                let output_key = spent_key_output(&key, txid).to_vec();
                let Some(mut record) = self.output(&output_key)? else {
                    return Err(anyhow!("spent index references a missing output").into());
                };
                *changes.entry(record.address.clone()).or_insert(0) += record.value;
                if !block_txids.contains(output_key_txid(&output_key)?) {
                    record.spent_by = None;
                    unspend.push((output_key, record));
                }
                spent_keys.push(key);
            }
        }

        let mut batch = WriteBatch::default();
        let outputs_cf = self.cf(CF_OUTPUTS)?;
        let spent_cf = self.cf(CF_SPENT)?;
        let txs_cf = self.cf(CF_TXS)?;
        let blocks_cf = self.cf(CF_BLOCKS)?;

        for (key, record) in &unspend {
            let value =
                postcard::to_allocvec(record).context("failed to serialize output record")?;
            batch.put_cf(outputs_cf, key, value);
        }
        for key in &spent_keys {
            batch.delete_cf(spent_cf, key);
        }
        for key in &created_keys {
            batch.delete_cf(outputs_cf, key);
        }
        for txid in &block.txids {
            batch.delete_cf(txs_cf, txid.as_bytes());
        }
        batch.delete_cf(blocks_cf, encode_block_key(block.height));

        self.stage_balance_changes(&mut batch, &changes)?;
        self.db.write(batch).context("failed to roll back block")?;
        Ok(())
    }

    fn get_most_richest(&self, n: usize) -> Result<Vec<AddressBalance>, StoreError> {
        let cf = self.cf(CF_RANK)?;
        let mut out = Vec::new();

        for entry in self.db.iterator_cf(cf, IteratorMode::Start) {
            if out.len() == n {
                break;
            }
            let (key, _) = entry.context("rank scan failed")?;
            let (balance, address) = decode_rank_key(&key)?;
            out.push(AddressBalance { address, balance });
        }

        Ok(out)
    }
}
