//! Fixed power-of-two denomination ladder (spec §4.2).

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::MintError;

/// The smallest and largest powers of two seeded at bootstrap: `2^0..=2^20`.
pub const LADDER_MIN_EXPONENT: u32 = 0;
pub const LADDER_MAX_EXPONENT: u32 = 20;

pub const DEFAULT_CURRENCY: &str = "SATS";

/// A fixed integer value that a single signing key issues. Immutable after
/// creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Denomination {
    pub id: u32,
    pub value: u64,
    pub currency: String,
    pub description: String,
    pub is_active: bool,
}

/// Read-only-after-bootstrap table of denominations. Bootstrapping inserts
/// one row per power of two from `2^0` through `2^20` inclusive, currency
/// "SATS"; the core never deactivates a denomination afterwards.
pub struct DenominationRegistry {
    rows: RwLock<Vec<Denomination>>,
}

impl DenominationRegistry {
    /// Builds a fresh registry seeded with the bootstrap ladder.
    pub fn bootstrap() -> Self {
        let rows = (LADDER_MIN_EXPONENT..=LADDER_MAX_EXPONENT)
            .map(|exp| {
                let value = 1u64 << exp;
                Denomination {
                    id: exp,
                    value,
                    currency: DEFAULT_CURRENCY.to_string(),
                    description: format!("2^{exp} {DEFAULT_CURRENCY}"),
                    is_active: true,
                }
            })
            .collect();
        Self {
            rows: RwLock::new(rows),
        }
    }

    /// All active denominations, ascending by value.
    pub fn list_active(&self) -> Vec<Denomination> {
        let mut rows: Vec<_> = self
            .rows
            .read()
            .iter()
            .filter(|d| d.is_active)
            .cloned()
            .collect();
        rows.sort_by_key(|d| d.value);
        rows
    }

    /// Exact lookup by id.
    pub fn get(&self, id: u32) -> Result<Denomination, MintError> {
        self.rows
            .read()
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or(MintError::UnknownDenomination)
    }

    /// Lookup by `(value, currency)`.
    pub fn find_by_value(&self, value: u64, currency: &str) -> Result<Denomination, MintError> {
        self.rows
            .read()
            .iter()
            .find(|d| d.value == value && d.currency == currency && d.is_active)
            .cloned()
            .ok_or(MintError::UnknownDenomination)
    }

    /// The smallest active denomination, used by `DenominationSelector::Default`.
    pub fn smallest_active(&self) -> Result<Denomination, MintError> {
        self.list_active()
            .into_iter()
            .next()
            .ok_or(MintError::NoActiveDenomination)
    }
}

impl Default for DenominationRegistry {
    fn default() -> Self {
        Self::bootstrap()
    }
}
