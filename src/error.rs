//! Error taxonomy (spec §7).
//!
//! Input errors are non-retryable and surfaced to the caller verbatim.
//! State errors (`AlreadySpent`) are authoritative and final. Invariant
//! violations indicate internal corruption and must never leak private
//! key material or other internals to the caller.

use thiserror::Error;

/// Errors from the blind-signature engine (spec §4.1).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("message integer value is not smaller than the modulus")]
    MessageTooLarge,
    #[error("blinding factor is zero or not coprime with the modulus")]
    InvalidBlindingFactor,
}

/// Errors from the change maker (spec §4.4).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChangeError {
    #[error("amount must be non-negative")]
    NegativeAmount,
    #[error("denomination ladder does not reach 1, change cannot be made exactly")]
    CannotMakeChange,
}

/// The mint controller's unified error surface (spec §6/§7/§8).
#[derive(Debug, Error)]
pub enum MintError {
    // --- Input errors: non-retryable, surfaced verbatim ---
    #[error("malformed token")]
    BadFormat,

    #[error("signature does not verify against the resolved key")]
    BadSignature,

    #[error("no signing key found for the given key id")]
    UnknownKey,

    #[error("no denomination found for the given selector")]
    UnknownDenomination,

    #[error("split redeem_value must be strictly less than the token's denomination value")]
    RedeemValueNotLessThanDenom,

    #[error("amount cannot be decomposed over the denomination ladder: {0}")]
    CannotMakeChange(#[from] ChangeError),

    #[error("no active denomination available")]
    NoActiveDenomination,

    // --- State errors: authoritative, final ---
    #[error("token has already been spent")]
    AlreadySpent {
        /// Millisecond unix timestamp of the prior redemption, when known.
        redeemed_at: Option<u64>,
    },

    // --- Transient errors ---
    #[error("ledger or key store is temporarily unavailable")]
    ServiceUnavailable,

    #[error("operation deadline exceeded before completion")]
    DeadlineExceeded,

    // --- Invariant violations: internal, logged at fatal severity upstream ---
    #[error("issued token failed its own self-check")]
    IssueSelfCheckFailed,

    #[error("an active denomination has no usable signing key")]
    MissingKeyForActiveDenomination,

    #[error("internal error")]
    Internal,

    // --- Lower-level error conversions ---
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl MintError {
    /// True for the invariant-violation variants that indicate internal
    /// corruption rather than caller error (spec §7's "Invariants").
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            MintError::IssueSelfCheckFailed | MintError::MissingKeyForActiveDenomination
        )
    }
}
