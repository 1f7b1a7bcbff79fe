//! Ordered balance index
//!
//! Maps a balance amount to the set of addresses currently holding that
//! amount, so top-N queries walk buckets from the richest end instead of
//! scanning every tracked address.

use crate::types::AddressBalance;
use std::collections::{BTreeMap, BTreeSet};

/// Balance-keyed index over addresses.
///
/// An address lives in at most one bucket (the one matching its current
/// balance); addresses with balance <= 0 are not indexed at all and so
/// never appear in a ranking.
#[derive(Debug, Default)]
pub struct BalanceIndex {
    buckets: BTreeMap<i64, BTreeSet<String>>,
}

impl BalanceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move an address from its `old` balance bucket to the bucket for
    /// `new`, dropping it from the index entirely when `new <= 0`.
    pub fn update(&mut self, address: &str, old: i64, new: i64) {
        if old > 0 {
            if let Some(bucket) = self.buckets.get_mut(&old) {
                bucket.remove(address);
                if bucket.is_empty() {
                    self.buckets.remove(&old);
                }
            }
        }

        if new > 0 {
            self.buckets
                .entry(new)
                .or_default()
                .insert(address.to_owned());
        }
    }

    /// The `n` richest addresses, descending by balance, ties broken by
    /// ascending address. Cost is proportional to the buckets visited
    /// plus the rows returned.
    pub fn top(&self, n: usize) -> Vec<AddressBalance> {
        let mut out = Vec::new();

        for (balance, addresses) in self.buckets.iter().rev() {
            for address in addresses {
                if out.len() == n {
                    return out;
                }
                out.push(AddressBalance {
                    address: address.clone(),
                    balance: *balance,
                });
            }
        }

        out
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(address: &str, balance: i64) -> AddressBalance {
        AddressBalance {
            address: address.to_string(),
            balance,
        }
    }

    #[test]
    fn test_top_orders_descending_with_address_ties() {
        let mut index = BalanceIndex::new();
        index.update("bbb", 0, 5);
        index.update("aaa", 0, 5);
        index.update("ccc", 0, 9);

        assert_eq!(
            index.top(10),
            vec![entry("ccc", 9), entry("aaa", 5), entry("bbb", 5)]
        );
    }

    #[test]
    fn test_top_truncates_to_n() {
        let mut index = BalanceIndex::new();
        for (i, addr) in ["a", "b", "c", "d"].iter().enumerate() {
            index.update(addr, 0, (i as i64 + 1) * 10);
        }

        let top = index.top(2);
        assert_eq!(top, vec![entry("d", 40), entry("c", 30)]);
        assert!(index.top(0).is_empty());
    }

    #[test]
    fn test_update_moves_address_between_buckets() {
        let mut index = BalanceIndex::new();
        index.update("addr", 0, 10);
        index.update("addr", 10, 25);

        // the old bucket is gone, the address appears exactly once
        assert_eq!(index.top(10), vec![entry("addr", 25)]);
    }

    #[test]
    fn test_non_positive_balances_leave_the_index() {
        let mut index = BalanceIndex::new();
        index.update("addr", 0, 10);
        index.update("addr", 10, 0);
        assert!(index.is_empty());

        index.update("debtor", 0, -5);
        assert!(index.is_empty());
    }
}
