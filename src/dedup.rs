use std::collections::HashSet;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;

use crate::base::{Transaction, TransactionType};

/// Composite identity for transactions without an exchange-native id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CompositeKey {
    timestamp: NaiveDateTime,
    symbol: String,
    amount: Decimal,
    tx_type: TransactionType,
}

impl CompositeKey {
    fn of(tx: &Transaction) -> Self {
        Self {
            timestamp: tx.timestamp,
            symbol: tx.symbol.clone(),
            amount: tx.amount.normalize(),
            tx_type: tx.tx_type,
        }
    }
}

/// Classifies parsed candidates against a snapshot of a user's stored
/// transactions. Transfers carrying an exchange-native transaction id
/// are matched on that id (case-insensitively); everything else falls
/// back to the (timestamp, symbol, amount, type) composite key. Both
/// sides are indexed up front so each candidate check is O(1) average.
pub struct DuplicateChecker {
    txids: HashSet<String>,
    keys: HashSet<CompositeKey>,
}

impl DuplicateChecker {
    pub fn new(existing: &[Transaction]) -> Self {
        let mut txids = HashSet::new();
        let mut keys = HashSet::new();
        for tx in existing {
            if let Some(txid) = tx.native_txid() {
                txids.insert(txid.to_ascii_lowercase());
            }
            keys.insert(CompositeKey::of(tx));
        }
        Self { txids, keys }
    }

    pub fn is_duplicate(&self, candidate: &Transaction) -> bool {
        if candidate.tx_type.is_transfer() {
            if let Some(txid) = candidate.native_txid() {
                return self.txids.contains(&txid.to_ascii_lowercase());
            }
        }
        self.keys.contains(&CompositeKey::of(candidate))
    }

    /// Splits a batch into (new, duplicate_count). Candidates are
    /// compared against the stored snapshot only, not against each
    /// other; re-importing the same file twice in one call keeps both
    /// copies, which matches comparing each upload to persisted state.
    pub fn partition(&self, batch: Vec<Transaction>) -> (Vec<Transaction>, usize) {
        let mut fresh = Vec::with_capacity(batch.len());
        let mut duplicates = 0;
        for tx in batch {
            if self.is_duplicate(&tx) {
                duplicates += 1;
            } else {
                fresh.push(tx);
            }
        }
        (fresh, duplicates)
    }
}
