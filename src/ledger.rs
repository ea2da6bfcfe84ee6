//! The durable single source of truth for "has this token been redeemed?"
//! (spec §4.5).

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MintError;

/// The ledger's append-only core. A token id appears at most once;
/// existence of a record is the sole authoritative signal that a token
/// has been redeemed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpentRecord {
    pub token_id: Uuid,
    pub denomination_id: u32,
    pub key_id: Uuid,
    /// Milliseconds since the Unix epoch.
    pub redeemed_at: u64,
}

/// Approximate, eventually-consistent per-denomination counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DenominationCounters {
    pub minted_count: u64,
    pub redeemed_count: u64,
    pub last_updated: u64,
}

/// Approximate, eventually-consistent per-batch counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchCounters {
    pub batch_id: Uuid,
    pub currency: String,
    pub total_value: i128,
    pub redeemed_value: i128,
    pub created_at: u64,
    pub last_updated: u64,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_millis() as u64
}

/// Durable ledger of spent token ids plus best-effort aggregate counters.
pub trait Ledger: Send + Sync {
    /// Point lookup on the primary key.
    fn is_spent(&self, token_id: Uuid) -> bool;

    /// Returns the prior record if `token_id` was already spent.
    fn spent_record(&self, token_id: Uuid) -> Option<SpentRecord>;

    /// Atomically checks `is_spent` and, if not, inserts a [`SpentRecord`].
    /// This single call is the transactional check-and-insert the spec
    /// requires: within one ledger instance it never races with another
    /// call for the same `token_id`.
    fn mark_spent_if_unspent(
        &self,
        token_id: Uuid,
        denomination_id: u32,
        key_id: Uuid,
    ) -> Result<SpentRecord, MintError>;

    /// Best-effort upsert; failures are logged, never escalated.
    fn bump_mint_count(&self, denomination_id: u32, n: u64);

    /// Best-effort upsert; failures are logged, never escalated.
    fn bump_redeem_count(&self, denomination_id: u32, n: u64);

    /// Best-effort upsert; failures are logged, never escalated.
    fn bump_batch(&self, batch_id: Uuid, currency: &str, delta_total: i128, delta_redeemed: i128);

    fn denomination_counters(&self, denomination_id: u32) -> DenominationCounters;

    fn batch_counters(&self, batch_id: Uuid) -> Option<BatchCounters>;
}

/// In-process [`Ledger`] backed by lock-guarded maps. One lock guards the
/// `spent_tokens` table so `is_spent` + insert is a single critical
/// section; counters use their own, looser-isolation lock per spec §5's
/// "aggregate counters ... may use looser isolation."
pub struct InMemoryLedger {
    spent: RwLock<HashMap<Uuid, SpentRecord>>,
    denomination_counters: RwLock<HashMap<u32, DenominationCounters>>,
    batch_counters: RwLock<HashMap<Uuid, BatchCounters>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            spent: RwLock::new(HashMap::new()),
            denomination_counters: RwLock::new(HashMap::new()),
            batch_counters: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger for InMemoryLedger {
    fn is_spent(&self, token_id: Uuid) -> bool {
        self.spent.read().contains_key(&token_id)
    }

    fn spent_record(&self, token_id: Uuid) -> Option<SpentRecord> {
        self.spent.read().get(&token_id).cloned()
    }

    fn mark_spent_if_unspent(
        &self,
        token_id: Uuid,
        denomination_id: u32,
        key_id: Uuid,
    ) -> Result<SpentRecord, MintError> {
        let mut spent = self.spent.write();
        if let Some(existing) = spent.get(&token_id) {
            return Err(MintError::AlreadySpent {
                redeemed_at: Some(existing.redeemed_at),
            });
        }
        let record = SpentRecord {
            token_id,
            denomination_id,
            key_id,
            redeemed_at: now_millis(),
        };
        spent.insert(token_id, record.clone());
        Ok(record)
    }

    fn bump_mint_count(&self, denomination_id: u32, n: u64) {
        let mut counters = self.denomination_counters.write();
        let entry = counters.entry(denomination_id).or_default();
        entry.minted_count += n;
        entry.last_updated = now_millis();
    }

    fn bump_redeem_count(&self, denomination_id: u32, n: u64) {
        let mut counters = self.denomination_counters.write();
        let entry = counters.entry(denomination_id).or_default();
        entry.redeemed_count += n;
        entry.last_updated = now_millis();
    }

    fn bump_batch(&self, batch_id: Uuid, currency: &str, delta_total: i128, delta_redeemed: i128) {
        let mut counters = self.batch_counters.write();
        let now = now_millis();
        let entry = counters.entry(batch_id).or_insert_with(|| BatchCounters {
            batch_id,
            currency: currency.to_string(),
            total_value: 0,
            redeemed_value: 0,
            created_at: now,
            last_updated: now,
        });
        entry.total_value += delta_total;
        entry.redeemed_value += delta_redeemed;
        entry.last_updated = now;
    }

    fn denomination_counters(&self, denomination_id: u32) -> DenominationCounters {
        self.denomination_counters
            .read()
            .get(&denomination_id)
            .cloned()
            .unwrap_or_default()
    }

    fn batch_counters(&self, batch_id: Uuid) -> Option<BatchCounters> {
        self.batch_counters.read().get(&batch_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_spent_then_is_spent() {
        let ledger = InMemoryLedger::new();
        let token_id = Uuid::new_v4();
        assert!(!ledger.is_spent(token_id));

        ledger
            .mark_spent_if_unspent(token_id, 3, Uuid::new_v4())
            .unwrap();
        assert!(ledger.is_spent(token_id));
    }

    #[test]
    fn double_spend_is_rejected_with_the_prior_timestamp() {
        let ledger = InMemoryLedger::new();
        let token_id = Uuid::new_v4();

        let first = ledger
            .mark_spent_if_unspent(token_id, 3, Uuid::new_v4())
            .unwrap();

        let err = ledger
            .mark_spent_if_unspent(token_id, 3, Uuid::new_v4())
            .unwrap_err();
        match err {
            MintError::AlreadySpent { redeemed_at } => {
                assert_eq!(redeemed_at, Some(first.redeemed_at));
            }
            other => panic!("expected AlreadySpent, got {other:?}"),
        }
    }

    #[test]
    fn counters_accumulate() {
        let ledger = InMemoryLedger::new();
        ledger.bump_mint_count(0, 3);
        ledger.bump_mint_count(0, 2);
        ledger.bump_redeem_count(0, 1);

        let counters = ledger.denomination_counters(0);
        assert_eq!(counters.minted_count, 5);
        assert_eq!(counters.redeemed_count, 1);
    }

    #[test]
    fn batch_counters_accumulate_total_and_redeemed_value() {
        let ledger = InMemoryLedger::new();
        let batch_id = Uuid::new_v4();
        ledger.bump_batch(batch_id, "SATS", 1000, 0);
        ledger.bump_batch(batch_id, "SATS", 0, 128);

        let counters = ledger.batch_counters(batch_id).unwrap();
        assert_eq!(counters.total_value, 1000);
        assert_eq!(counters.redeemed_value, 128);
    }

    #[test]
    fn exactly_one_of_two_concurrent_marks_commits() {
        use std::sync::Arc;
        use std::thread;

        let ledger = Arc::new(InMemoryLedger::new());
        let token_id = Uuid::new_v4();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = ledger.clone();
                thread::spawn(move || {
                    ledger
                        .mark_spent_if_unspent(token_id, 0, Uuid::new_v4())
                        .is_ok()
                })
            })
            .collect();

        let successes: usize = handles.into_iter().map(|h| h.join().unwrap()).filter(|ok| *ok).count();
        assert_eq!(successes, 1, "exactly one concurrent mark_spent should commit");
    }
}

/// Property-based test for P1 (no double spend): spec §8, for any number
/// of concurrent `mark_spent_if_unspent` attempts on the same token id,
/// at most one commits.
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::thread;

    proptest! {
        #[test]
        fn at_most_one_of_n_concurrent_marks_commits(n_contenders in 2usize..16) {
            let ledger = Arc::new(InMemoryLedger::new());
            let token_id = Uuid::new_v4();

            let handles: Vec<_> = (0..n_contenders)
                .map(|_| {
                    let ledger = ledger.clone();
                    thread::spawn(move || ledger.mark_spent_if_unspent(token_id, 0, Uuid::new_v4()).is_ok())
                })
                .collect();

            let successes: usize = handles.into_iter().map(|h| h.join().unwrap()).filter(|ok| *ok).count();
            prop_assert_eq!(successes, 1);
            prop_assert!(ledger.is_spent(token_id));
        }
    }
}
