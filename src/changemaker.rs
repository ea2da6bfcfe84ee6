//! Greedy decomposition of an integer amount over the denomination ladder
//! (spec §4.4).
//!
//! For a power-of-two ladder dense down to 1, greedy largest-first is both
//! optimal (fewest coins) and always exact.

use crate::denomination::Denomination;
use crate::error::ChangeError;

/// Decomposes `amount` into a multiset of denominations, returned
/// largest-first. `ladder` must be sorted ascending by value (as returned
/// by [`crate::denomination::DenominationRegistry::list_active`]).
pub fn decompose(amount: i128, ladder: &[Denomination]) -> Result<Vec<Denomination>, ChangeError> {
    if amount < 0 {
        return Err(ChangeError::NegativeAmount);
    }
    if ladder.iter().all(|d| d.value != 1) {
        return Err(ChangeError::CannotMakeChange);
    }

    let mut remaining = amount as u128;
    let mut result = Vec::new();

    for denom in ladder.iter().rev() {
        let value = denom.value as u128;
        while remaining >= value {
            result.push(denom.clone());
            remaining -= value;
        }
    }

    if remaining != 0 {
        return Err(ChangeError::CannotMakeChange);
    }

    Ok(result)
}


/// Property-based tests for P5 (change conservation): spec §8, the sum of
/// a split/remint's change-token values always equals the requested
/// amount exactly, for any amount the full ladder can reach.
#[cfg(test)]
mod proptests {
    use super::*;
    use crate::denomination::DenominationRegistry;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn decomposition_sums_to_the_requested_amount(amount in 0i128..(1i128 << 21)) {
            let registry = DenominationRegistry::bootstrap();
            let ladder = registry.list_active();

            let change = decompose(amount, &ladder).unwrap();
            let sum: u64 = change.iter().map(|d| d.value).sum();
            prop_assert_eq!(sum as i128, amount);
        }

        #[test]
        fn decomposition_is_largest_first(amount in 1i128..(1i128 << 21)) {
            let registry = DenominationRegistry::bootstrap();
            let ladder = registry.list_active();

            let change = decompose(amount, &ladder).unwrap();
            for pair in change.windows(2) {
                prop_assert!(pair[0].value >= pair[1].value);
            }
        }

        #[test]
        fn negative_amounts_never_succeed(amount in i128::MIN..0i128) {
            let registry = DenominationRegistry::bootstrap();
            let ladder = registry.list_active();
            prop_assert_eq!(decompose(amount, &ladder), Err(ChangeError::NegativeAmount));
        }
    }
}
