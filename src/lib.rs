//! Chaumian blind-signature mint.
//!
//! An RSA blind-signature mint over a fixed power-of-two denomination
//! ladder, with key rotation and a double-spend ledger. It supports:
//!
//! - Token issuance via blind signatures, singly or by target amount
//! - Offline-verifiable bearer tokens (no mint round-trip required to
//!   check a signature)
//! - Atomic, one-shot redemption backed by a double-spend ledger
//! - Split and remint, both expressed as a redeem-and-reissue-change
//!   operation
//! - Scheduled key rotation with a retention window for recently expired
//!   keys
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chaumian_mint::{
//!     DenominationRegistry, DenominationSelector, InMemoryKeyStore, InMemoryLedger,
//!     MintConfig, MintController,
//! };
//!
//! let registry = Arc::new(DenominationRegistry::bootstrap());
//! let config = MintConfig::default();
//! let key_store = Arc::new(InMemoryKeyStore::new(registry.clone(), config));
//! let ledger = Arc::new(InMemoryLedger::new());
//! let mint = MintController::new(registry, key_store, ledger);
//!
//! let issued = mint.issue_single(DenominationSelector::Default, None).unwrap();
//! let outcome = mint.redeem(&issued.token).unwrap();
//! println!("redeemed {} at {}", outcome.denomination.value, outcome.redeemed_at);
//! ```

pub mod bigint;
pub mod blind;
pub mod changemaker;
pub mod config;
pub mod denomination;
pub mod error;
pub mod keystore;
pub mod ledger;
pub mod mint;
pub mod rotation;
pub mod token;

pub use blind::BlindingFactor;
pub use config::{ConfigError, MintConfig};
pub use denomination::{Denomination, DenominationRegistry};
pub use error::{ChangeError, CryptoError, MintError};
pub use keystore::{InMemoryKeyStore, KeyStore, RsaPrivateKey, RsaPublicKey, SigningKey};
pub use ledger::{BatchCounters, DenominationCounters, InMemoryLedger, Ledger, SpentRecord};
pub use mint::{
    InvalidReason, IssuedToken, MintController, RedeemOutcome, SplitOutcome, VerifyOutcome,
};
pub use rotation::{spawn as spawn_rotation, spawn_default as spawn_rotation_default, RotationHandle};
pub use token::{DenominationSelector, HashAlg, Token, TokenRequest};

#[cfg(test)]
mod integration_tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use uuid::Uuid;

    fn test_mint() -> MintController {
        let registry = Arc::new(DenominationRegistry::bootstrap());
        let config = MintConfig {
            modulus_bits: 512,
            ..MintConfig::default()
        };
        let key_store = Arc::new(InMemoryKeyStore::new(registry.clone(), config));
        let ledger = Arc::new(InMemoryLedger::new());
        MintController::new(registry, key_store, ledger)
    }

    /// A [`KeyStore`] wrapper that fails its `n`th call, used to simulate a
    /// transient failure partway through a multi-denomination issue batch.
    struct FlakyKeyStore {
        inner: InMemoryKeyStore,
        calls: AtomicUsize,
        fail_on_call: usize,
    }

    impl KeyStore for FlakyKeyStore {
        fn active_key_for_with_deadline(
            &self,
            denomination_id: u32,
            deadline: Option<Instant>,
        ) -> Result<SigningKey, MintError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call == self.fail_on_call {
                return Err(MintError::IssueSelfCheckFailed);
            }
            self.inner.active_key_for_with_deadline(denomination_id, deadline)
        }

        fn get(&self, key_id: Uuid) -> Result<SigningKey, MintError> {
            self.inner.get(key_id)
        }

        fn rotate(&self) -> Result<Vec<Uuid>, MintError> {
            self.inner.rotate()
        }
    }

    /// A failure partway through `issue_total`'s decomposition must not
    /// leave any denomination's mint counter bumped for a token the caller
    /// never received: every token in the batch is prepared before any of
    /// them are committed, so a failure on the 4th of 6 denominations rolls
    /// the whole batch back rather than leaking 3 committed counters.
    #[test]
    fn issue_total_rolls_back_counters_when_a_later_denomination_fails() {
        let registry = Arc::new(DenominationRegistry::bootstrap());
        let config = MintConfig {
            modulus_bits: 512,
            ..MintConfig::default()
        };
        let inner = InMemoryKeyStore::new(registry.clone(), config);
        let key_store = Arc::new(FlakyKeyStore {
            inner,
            calls: AtomicUsize::new(0),
            fail_on_call: 4,
        });
        let ledger = Arc::new(InMemoryLedger::new());
        let mint = MintController::new(registry, key_store, ledger.clone());

        // 1000 decomposes into denomination ids [9, 8, 7, 6, 5, 3]
        // (values 512, 256, 128, 64, 32, 8); the 4th prepared token fails.
        let err = mint.issue_total(1000, None).unwrap_err();
        assert!(matches!(err, MintError::IssueSelfCheckFailed));

        for id in [9, 8, 7, 6, 5, 3] {
            assert_eq!(
                ledger.denomination_counters(id).minted_count,
                0,
                "denomination {id} should have no committed mint count after a rolled-back batch"
            );
        }
    }

    /// Scenario 1 (spec §8): issue, verify, redeem, verify-after-redeem.
    #[test]
    fn issue_verify_redeem_then_verify_reports_already_spent() {
        let mint = test_mint();

        let issued = mint
            .issue_single(DenominationSelector::ById(10), None)
            .unwrap();
        assert_eq!(issued.denomination.value, 1024);

        match mint.verify(&issued.token).unwrap() {
            VerifyOutcome::Valid { denomination, .. } => assert_eq!(denomination.value, 1024),
            other => panic!("expected Valid, got {other:?}"),
        }

        let redeemed = mint.redeem(&issued.token).unwrap();
        assert_eq!(redeemed.denomination.value, 1024);

        match mint.verify(&issued.token).unwrap() {
            VerifyOutcome::Invalid {
                reason: InvalidReason::AlreadySpent { .. },
            } => {}
            other => panic!("expected Invalid(AlreadySpent), got {other:?}"),
        }

        assert!(matches!(
            mint.redeem(&issued.token),
            Err(MintError::AlreadySpent { .. })
        ));
    }

    /// Scenario 2 (spec §8): issue a target total, check its decomposition
    /// matches the documented greedy breakdown for 1000.
    #[test]
    fn issue_total_decomposes_and_redeems_exactly() {
        let mint = test_mint();

        let (tokens, _batch_id) = mint.issue_total(1000, None).unwrap();
        let mut values: Vec<u64> = tokens.iter().map(|t| t.denomination.value).collect();
        values.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(values, vec![512, 256, 128, 64, 32, 8]);

        let mut total_redeemed = 0u64;
        for issued in &tokens {
            let outcome = mint.redeem(&issued.token).unwrap();
            total_redeemed += outcome.denomination.value;
        }
        assert_eq!(total_redeemed, 1000);
    }

    /// Scenario 5 (spec §8): split a 32-value token into 27 + change,
    /// producing the documented greedy breakdown.
    #[test]
    fn split_produces_the_documented_change_breakdown() {
        let mint = test_mint();

        let issued = mint
            .issue_single(
                DenominationSelector::ByValue {
                    value: 32,
                    currency: "SATS".to_string(),
                },
                None,
            )
            .unwrap();

        let outcome = mint.split(&issued.token, 5).unwrap();
        let mut values: Vec<u64> = outcome.change.iter().map(|t| t.denomination.value).collect();
        values.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(values, vec![16, 8, 2, 1]);
        assert_eq!(outcome.change_total_value(), 27);

        // The original token is now spent.
        assert!(matches!(
            mint.redeem(&issued.token),
            Err(MintError::AlreadySpent { .. })
        ));
        // Every change token is fresh and independently redeemable.
        for change in &outcome.change {
            assert!(mint.redeem(&change.token).is_ok());
        }
    }

    /// Remint is split with redeem_value = 0: the full value comes back
    /// as fresh change.
    #[test]
    fn remint_preserves_total_value() {
        let mint = test_mint();

        let issued = mint
            .issue_single(DenominationSelector::ById(6), None)
            .unwrap();
        let value = issued.denomination.value;

        let outcome = mint.remint(&issued.token).unwrap();
        assert_eq!(outcome.change_total_value(), value);
    }

    /// Tampering with the signature bytes is caught by the signature
    /// check, not silently accepted under a relabeled denomination.
    #[test]
    fn tampering_with_signature_bytes_is_rejected() {
        let mint = test_mint();
        let mut issued = mint
            .issue_single(DenominationSelector::ById(0), None)
            .unwrap();

        let last = issued.token.signature.len() - 1;
        issued.token.signature[last] ^= 0x01;

        match mint.verify(&issued.token).unwrap() {
            VerifyOutcome::Invalid {
                reason: InvalidReason::BadSignature,
            } => {}
            other => panic!("expected Invalid(BadSignature), got {other:?}"),
        }
        assert!(matches!(mint.redeem(&issued.token), Err(MintError::BadSignature)));
    }

    #[test]
    fn malformed_token_data_is_bad_format() {
        let mint = test_mint();
        let issued = mint
            .issue_single(DenominationSelector::ById(0), None)
            .unwrap();

        let mut token = issued.token;
        token.data = b"not json".to_vec();

        assert!(matches!(mint.verify(&token), Err(MintError::BadFormat)));
        assert!(matches!(mint.redeem(&token), Err(MintError::BadFormat)));
    }

    #[test]
    fn split_requires_redeem_value_strictly_less_than_denomination() {
        let mint = test_mint();
        let issued = mint
            .issue_single(DenominationSelector::ById(5), None)
            .unwrap();

        assert!(matches!(
            mint.split(&issued.token, issued.denomination.value),
            Err(MintError::RedeemValueNotLessThanDenom)
        ));
    }

    /// Key rotation: an explicit `rotate()` call produces a different
    /// active key, and tokens issued under the superseded key still
    /// verify (the retention window covers the rotation boundary).
    #[test]
    fn rotated_keys_still_verify_previously_issued_tokens() {
        let registry = Arc::new(DenominationRegistry::bootstrap());
        let config = MintConfig {
            modulus_bits: 512,
            rotation_interval: Duration::from_millis(10),
            ..MintConfig::default()
        };
        let key_store = Arc::new(InMemoryKeyStore::new(registry.clone(), config));
        let ledger = Arc::new(InMemoryLedger::new());
        let mint = MintController::new(registry, key_store.clone(), ledger);

        let issued = mint
            .issue_single(DenominationSelector::ById(0), None)
            .unwrap();

        std::thread::sleep(Duration::from_millis(20));
        key_store.rotate().unwrap();

        match mint.verify(&issued.token).unwrap() {
            VerifyOutcome::Valid { .. } => {}
            other => panic!("expected Valid even after rotation, got {other:?}"),
        }
    }

    /// Outstanding-value accounting: minted minus redeemed tracks exactly
    /// what has and hasn't come back through `redeem`/`split`.
    #[test]
    fn outstanding_value_tracks_mint_and_redeem() {
        let mint = test_mint();

        let a = mint.issue_single(DenominationSelector::ById(4), None).unwrap();
        let b = mint.issue_single(DenominationSelector::ById(4), None).unwrap();

        let (total, redeemed, outstanding) = mint.outstanding_value(None);
        assert_eq!(total, 32);
        assert_eq!(redeemed, 0);
        assert_eq!(outstanding, 32);

        mint.redeem(&a.token).unwrap();
        let (total, redeemed, outstanding) = mint.outstanding_value(None);
        assert_eq!(total, 32);
        assert_eq!(redeemed, 16);
        assert_eq!(outstanding, 16);

        mint.redeem(&b.token).unwrap();
        let (_, _, outstanding) = mint.outstanding_value(None);
        assert_eq!(outstanding, 0);
    }
}
