//! The mint's operation-level state machine (spec §4.6): issue, verify,
//! redeem, split, remint. The only stateful coordinator; owns all
//! transaction boundaries.

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use crate::blind;
use crate::changemaker;
use crate::denomination::{Denomination, DenominationRegistry};
use crate::error::MintError;
use crate::keystore::{KeyStore, SigningKey};
use crate::ledger::Ledger;
use crate::token::{parse_token_data, DenominationSelector, Token, TokenRequest};

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_millis() as u64
}

/// A freshly issued token alongside the denomination it was issued for.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: Token,
    pub denomination: Denomination,
}

/// Result of a successful `verify`.
#[derive(Debug, Clone)]
pub enum VerifyOutcome {
    Valid {
        token_id: Uuid,
        denomination: Denomination,
    },
    Invalid {
        reason: InvalidReason,
    },
}

/// Why a token failed verification, when that failure is not itself an
/// input error (spec §6: verify's only *errors* are `bad_format` and
/// `unknown_key`; a bad signature or an already-spent token are reported
/// as `{invalid, reason}`, not thrown).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidReason {
    BadSignature,
    AlreadySpent { redeemed_at: u64 },
}

/// Result of a successful `redeem`.
#[derive(Debug, Clone)]
pub struct RedeemOutcome {
    pub token_id: Uuid,
    pub denomination: Denomination,
    pub redeemed_at: u64,
}

/// Result of a successful `split`/`remint`.
#[derive(Debug, Clone)]
pub struct SplitOutcome {
    pub consumed_token_id: Uuid,
    pub change: Vec<IssuedToken>,
}

impl SplitOutcome {
    pub fn change_total_value(&self) -> u64 {
        self.change.iter().map(|t| t.denomination.value).sum()
    }
}

/// The resolved, verified pieces of a token shared by verify/redeem/split's
/// first five steps.
struct Resolved {
    token_id: Uuid,
    key: SigningKey,
    denomination: Denomination,
}

enum ResolveOutcome {
    Ok(Resolved),
    BadSignature(Uuid, Denomination),
}

/// Orchestrates issue/verify/redeem/split/remint. Holds no durable state
/// of its own: the registry, key store, and ledger own everything
/// persistent.
pub struct MintController {
    registry: Arc<DenominationRegistry>,
    key_store: Arc<dyn KeyStore>,
    ledger: Arc<dyn Ledger>,
}

impl MintController {
    pub fn new(
        registry: Arc<DenominationRegistry>,
        key_store: Arc<dyn KeyStore>,
        ledger: Arc<dyn Ledger>,
    ) -> Self {
        Self {
            registry,
            key_store,
            ledger,
        }
    }

    pub fn list_denominations(&self) -> Vec<Denomination> {
        self.registry.list_active()
    }

    fn resolve_denomination(&self, selector: &DenominationSelector) -> Result<Denomination, MintError> {
        match selector {
            DenominationSelector::ById(id) => self.registry.get(*id),
            DenominationSelector::ByValue { value, currency } => {
                self.registry.find_by_value(*value, currency)
            }
            DenominationSelector::Default => self.registry.smallest_active(),
        }
    }

    /// Logs at `error!` when `err` is one of the invariant-violation
    /// variants (spec §7's "Invariants": log at fatal severity, alert
    /// operators). A no-op for every other error, since ordinary input and
    /// state errors are surfaced to the caller verbatim and don't warrant
    /// an operator page.
    fn record_invariant_violation(&self, err: &MintError, detail: &str) {
        if err.is_invariant_violation() {
            tracing::error!(error = %err, detail, "mint invariant violated, operator alert required");
        }
    }

    /// Steps 1-6 of Issue (single denomination) (spec §4.6): resolve the
    /// denomination and active key, build the [`TokenRequest`], run the
    /// blind/sign/unblind pipeline, and self-check the result. Touches
    /// neither the ledger nor any counters, so a caller that discards the
    /// returned [`IssuedToken`] on failure leaves no durable trace behind —
    /// this is what lets [`issue_total`](Self::issue_total) build an entire
    /// batch before committing any of it.
    fn prepare_token(
        &self,
        selector: &DenominationSelector,
        deadline: Option<Instant>,
    ) -> Result<IssuedToken, MintError> {
        let denomination = self.resolve_denomination(selector)?;
        let key = self
            .key_store
            .active_key_for_with_deadline(denomination.id, deadline)?;

        if key.is_expired(now_millis()) {
            let err = MintError::MissingKeyForActiveDenomination;
            self.record_invariant_violation(
                &err,
                &format!(
                    "active key store returned an expired key (key_id={}, denomination_id={})",
                    key.id, denomination.id
                ),
            );
            return Err(err);
        }

        let request = TokenRequest {
            id: Uuid::new_v4(),
            denomination_id: denomination.id,
            hash_alg: blind::select_hash_alg(&key.public),
        };
        let data = request.canonical_data();
        let hash = blind::hash_with(request.hash_alg, &data);

        let (blinded, r) = blind::blind(&hash, &key.public)?;
        let blind_sig = blind::sign_blinded(&blinded, &key.private)?;
        let signature = blind::unblind(&blind_sig, &r, &key.public)?;

        if !blind::verify(&hash, &signature, &key.public) {
            let err = MintError::IssueSelfCheckFailed;
            self.record_invariant_violation(
                &err,
                &format!(
                    "unblinded signature does not verify (key_id={}, denomination_id={})",
                    key.id, denomination.id
                ),
            );
            return Err(err);
        }

        let token = Token {
            data,
            signature,
            key_id: key.id,
        };

        tracing::debug!(token_id = %request.id, denomination_id = denomination.id, "prepared token");

        Ok(IssuedToken { token, denomination })
    }

    /// Commits the mint-count and (if present) batch counters for an
    /// already-prepared [`IssuedToken`]. Best-effort per spec §4.6 step 7:
    /// called only once a token is known-good and about to be handed back
    /// to the caller.
    fn commit_issue(&self, issued: &IssuedToken, batch_id: Option<Uuid>) {
        self.ledger.bump_mint_count(issued.denomination.id, 1);
        if let Some(batch_id) = batch_id {
            self.ledger.bump_batch(
                batch_id,
                &issued.denomination.currency,
                issued.denomination.value as i128,
                0,
            );
        }
    }

    /// Issue (single denomination): spec §4.6 steps 1-8.
    pub fn issue_single(
        &self,
        selector: DenominationSelector,
        batch_id: Option<Uuid>,
    ) -> Result<IssuedToken, MintError> {
        self.issue_single_with_deadline(selector, batch_id, None)
    }

    /// Same as [`issue_single`](Self::issue_single), but bounds the one step
    /// that can be slow — key synthesis on a cold denomination — by
    /// `deadline` (spec §5's caller-supplied deadline). Callers that don't
    /// care about latency budgets use `issue_single`.
    #[tracing::instrument(skip(self), fields(batch_id = ?batch_id))]
    pub fn issue_single_with_deadline(
        &self,
        selector: DenominationSelector,
        batch_id: Option<Uuid>,
        deadline: Option<Instant>,
    ) -> Result<IssuedToken, MintError> {
        let issued = self.prepare_token(&selector, deadline)?;
        self.commit_issue(&issued, batch_id);
        tracing::debug!(denomination_id = issued.denomination.id, "issued token");
        Ok(issued)
    }

    /// Issue (target total amount): spec §4.6. Decomposes `total_amount`
    /// and issues one token per denomination in the decomposition, all or
    /// nothing: every token in the batch is prepared (steps 1-6, no ledger
    /// mutation) before any counter is committed, so a failure partway
    /// through the decomposition — a transient self-check failure on a
    /// cold key, say — rolls back the whole batch instead of leaving
    /// earlier iterations' mint counts committed for tokens the caller
    /// never receives.
    #[tracing::instrument(skip(self))]
    pub fn issue_total(
        &self,
        total_amount: i128,
        batch_id: Option<Uuid>,
    ) -> Result<(Vec<IssuedToken>, Uuid), MintError> {
        let ladder = self.registry.list_active();
        let decomposition = changemaker::decompose(total_amount, &ladder)?;
        let batch_id = batch_id.unwrap_or_else(Uuid::new_v4);

        let mut issued = Vec::with_capacity(decomposition.len());
        for denomination in decomposition {
            let prepared = self.prepare_token(&DenominationSelector::ById(denomination.id), None)?;
            issued.push(prepared);
        }

        for token in &issued {
            self.commit_issue(token, Some(batch_id));
        }
        tracing::debug!(batch_id = %batch_id, count = issued.len(), "issued batch");

        Ok((issued, batch_id))
    }

    /// Steps 1-5 shared by verify/redeem/split: parse, resolve key and
    /// denomination, recompute the hash, and check the signature. Returns
    /// `Err` for the two genuine input errors (`bad_format`,
    /// `unknown_key`); a failed signature check is reported via
    /// `ResolveOutcome::BadSignature` so callers decide whether that's an
    /// error (redeem/split) or a non-error outcome (verify).
    fn resolve_and_check_signature(&self, token: &Token) -> Result<ResolveOutcome, MintError> {
        let token_id = parse_token_data(&token.data).ok_or(MintError::BadFormat)?;
        let key = self.key_store.get(token.key_id)?;
        let denomination = self.registry.get(key.denomination_id)?;

        let hash_alg = blind::select_hash_alg(&key.public);
        let hash = blind::hash_with(hash_alg, &token.data);

        if !blind::verify(&hash, &token.signature, &key.public) {
            return Ok(ResolveOutcome::BadSignature(token_id, denomination));
        }

        Ok(ResolveOutcome::Ok(Resolved {
            token_id,
            key,
            denomination,
        }))
    }

    /// Verify: spec §4.6. Never mutates state.
    #[tracing::instrument(skip(self, token))]
    pub fn verify(&self, token: &Token) -> Result<VerifyOutcome, MintError> {
        let resolved = match self.resolve_and_check_signature(token)? {
            ResolveOutcome::BadSignature(..) => {
                return Ok(VerifyOutcome::Invalid {
                    reason: InvalidReason::BadSignature,
                })
            }
            ResolveOutcome::Ok(resolved) => resolved,
        };

        if let Some(record) = self.ledger.spent_record(resolved.token_id) {
            return Ok(VerifyOutcome::Invalid {
                reason: InvalidReason::AlreadySpent {
                    redeemed_at: record.redeemed_at,
                },
            });
        }

        Ok(VerifyOutcome::Valid {
            token_id: resolved.token_id,
            denomination: resolved.denomination,
        })
    }

    /// Redeem: spec §4.6. One-shot; consumes the token.
    #[tracing::instrument(skip(self, token))]
    pub fn redeem(&self, token: &Token) -> Result<RedeemOutcome, MintError> {
        let resolved = self.resolve_checked(token)?;

        let record = self.ledger.mark_spent_if_unspent(
            resolved.token_id,
            resolved.denomination.id,
            resolved.key.id,
        )?;
        self.ledger.bump_redeem_count(resolved.denomination.id, 1);

        tracing::debug!(token_id = %resolved.token_id, "redeemed token");

        Ok(RedeemOutcome {
            token_id: resolved.token_id,
            denomination: resolved.denomination,
            redeemed_at: record.redeemed_at,
        })
    }

    /// Steps 1-5, with `bad_signature` escalated to a real error: used by
    /// `redeem` and `split`, where the spec's error table lists
    /// `bad_signature` as a thrown error (unlike `verify`).
    fn resolve_checked(&self, token: &Token) -> Result<Resolved, MintError> {
        match self.resolve_and_check_signature(token)? {
            ResolveOutcome::BadSignature(..) => Err(MintError::BadSignature),
            ResolveOutcome::Ok(resolved) => Ok(resolved),
        }
    }

    /// Split: spec §4.6. Consumes `token` and issues change for
    /// `denom.value - redeem_value`. If issuing any change token fails,
    /// the whole operation fails and the input token is never marked
    /// spent: this implementation produces every change token *before*
    /// calling `mark_spent` on the input, so a failure partway through
    /// only leaves behind harmless stray mint-counter increments (best
    /// effort, per spec §4.6's counter semantics) rather than a consumed
    /// input with no change delivered.
    #[tracing::instrument(skip(self, token))]
    pub fn split(&self, token: &Token, redeem_value: u64) -> Result<SplitOutcome, MintError> {
        let resolved = self.resolve_checked(token)?;

        if redeem_value >= resolved.denomination.value {
            return Err(MintError::RedeemValueNotLessThanDenom);
        }
        let change_amount = resolved.denomination.value - redeem_value;

        let ladder = self.registry.list_active();
        let decomposition = changemaker::decompose(change_amount as i128, &ladder)?;

        let mut change = Vec::with_capacity(decomposition.len());
        for denomination in decomposition {
            let issued = self.issue_single(DenominationSelector::ById(denomination.id), None)?;
            change.push(issued);
        }

        self.ledger.mark_spent_if_unspent(
            resolved.token_id,
            resolved.denomination.id,
            resolved.key.id,
        )?;
        self.ledger.bump_redeem_count(resolved.denomination.id, 1);

        tracing::debug!(
            token_id = %resolved.token_id,
            change_total = change.iter().map(|t| t.denomination.value).sum::<u64>(),
            "split token"
        );

        Ok(SplitOutcome {
            consumed_token_id: resolved.token_id,
            change,
        })
    }

    /// Remint: a split with `redeem_value = 0`, i.e. the full denomination
    /// value comes back as change in a single fresh token of the same
    /// denomination. Used to rotate holdings across a key-rotation
    /// boundary.
    #[tracing::instrument(skip(self, token))]
    pub fn remint(&self, token: &Token) -> Result<SplitOutcome, MintError> {
        self.split(token, 0)
    }

    /// `outstanding_value`: total minted value minus total redeemed value,
    /// optionally scoped to one batch and/or currency.
    pub fn outstanding_value(&self, batch_id: Option<Uuid>) -> (i128, i128, i128) {
        if let Some(batch_id) = batch_id {
            if let Some(counters) = self.ledger.batch_counters(batch_id) {
                let outstanding = counters.total_value - counters.redeemed_value;
                return (counters.total_value, counters.redeemed_value, outstanding);
            }
            return (0, 0, 0);
        }

        let mut total = 0i128;
        let mut redeemed = 0i128;
        for denomination in self.registry.list_active() {
            let counters = self.ledger.denomination_counters(denomination.id);
            total += counters.minted_count as i128 * denomination.value as i128;
            redeemed += counters.redeemed_count as i128 * denomination.value as i128;
        }
        (total, redeemed, total - redeemed)
    }

    /// `outstanding_by_denomination`: per-denomination minted/redeemed
    /// counts and values.
    pub fn outstanding_by_denomination(&self) -> Vec<(Denomination, u64, u64)> {
        self.registry
            .list_active()
            .into_iter()
            .map(|denomination| {
                let counters = self.ledger.denomination_counters(denomination.id);
                (denomination, counters.minted_count, counters.redeemed_count)
            })
            .collect()
    }
}
