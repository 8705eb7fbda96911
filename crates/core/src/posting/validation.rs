//! Double-entry validation for submitted transactions.
//!
//! Validation runs before any durable write. A submission that fails here is
//! rejected and only the cached rejection is ever persisted.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use thiserror::Error;

use super::types::PostTransactionInput;

/// Validation errors for transaction submissions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The idempotency key is empty.
    #[error("idempotency key must not be empty")]
    EmptyIdempotencyKey,

    /// The submission has no postings.
    #[error("transaction must have at least one posting")]
    NoPostings,

    /// A posting references an empty account code.
    #[error("posting {index} has an empty account code")]
    EmptyAccountCode {
        /// Index of the offending posting.
        index: usize,
    },

    /// A posting carries a zero amount.
    #[error("posting {index} has a zero amount")]
    ZeroAmount {
        /// Index of the offending posting.
        index: usize,
    },

    /// A posting carries an empty or malformed currency code.
    #[error("posting {index} has an invalid currency code")]
    InvalidCurrency {
        /// Index of the offending posting.
        index: usize,
    },

    /// Amounts in one currency do not sum to zero.
    #[error("postings in {currency} sum to {sum}, expected 0")]
    Unbalanced {
        /// The unbalanced currency.
        currency: String,
        /// The nonzero per-currency sum.
        sum: Decimal,
    },
}

/// Validates a submission against the double-entry invariant.
///
/// Checks, in order: non-empty idempotency key, at least one posting, every
/// posting has an account code, a plausible currency code and a nonzero
/// signed amount, and the amounts within each currency sum to zero.
///
/// # Errors
///
/// Returns the first violated rule.
pub fn validate(input: &PostTransactionInput) -> Result<(), ValidationError> {
    if input.idempotency_key.trim().is_empty() {
        return Err(ValidationError::EmptyIdempotencyKey);
    }

    if input.postings.is_empty() {
        return Err(ValidationError::NoPostings);
    }

    let mut sums: BTreeMap<&str, Decimal> = BTreeMap::new();

    for (index, posting) in input.postings.iter().enumerate() {
        if posting.account_code.trim().is_empty() {
            return Err(ValidationError::EmptyAccountCode { index });
        }
        if posting.currency.len() != 3 || !posting.currency.chars().all(|c| c.is_ascii_uppercase())
        {
            return Err(ValidationError::InvalidCurrency { index });
        }
        if posting.amount == Decimal::ZERO {
            return Err(ValidationError::ZeroAmount { index });
        }

        *sums.entry(posting.currency.as_str()).or_default() += posting.amount;
    }

    for (currency, sum) in sums {
        if sum != Decimal::ZERO {
            return Err(ValidationError::Unbalanced {
                currency: currency.to_string(),
                sum,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::types::PostingInput;
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn posting(code: &str, currency: &str, amount: Decimal) -> PostingInput {
        PostingInput {
            account_code: code.to_string(),
            currency: currency.to_string(),
            amount,
        }
    }

    fn input(key: &str, postings: Vec<PostingInput>) -> PostTransactionInput {
        PostTransactionInput {
            idempotency_key: key.to_string(),
            external_id: None,
            occurred_at: None,
            postings,
        }
    }

    #[test]
    fn test_balanced_pair_is_valid() {
        let submission = input(
            "k1",
            vec![
                posting("a", "USD", dec!(-100)),
                posting("b", "USD", dec!(100)),
            ],
        );
        assert!(validate(&submission).is_ok());
    }

    #[test]
    fn test_unbalanced_pair_is_rejected() {
        let submission = input(
            "k1",
            vec![
                posting("a", "USD", dec!(-100)),
                posting("b", "USD", dec!(50)),
            ],
        );
        assert_eq!(
            validate(&submission),
            Err(ValidationError::Unbalanced {
                currency: "USD".to_string(),
                sum: dec!(-50),
            })
        );
    }

    #[test]
    fn test_empty_idempotency_key() {
        let submission = input("  ", vec![posting("a", "USD", dec!(1))]);
        assert_eq!(
            validate(&submission),
            Err(ValidationError::EmptyIdempotencyKey)
        );
    }

    #[test]
    fn test_no_postings() {
        assert_eq!(validate(&input("k1", vec![])), Err(ValidationError::NoPostings));
    }

    #[test]
    fn test_zero_amount() {
        let submission = input(
            "k1",
            vec![
                posting("a", "USD", dec!(0)),
                posting("b", "USD", dec!(0)),
            ],
        );
        assert_eq!(
            validate(&submission),
            Err(ValidationError::ZeroAmount { index: 0 })
        );
    }

    #[test]
    fn test_empty_account_code() {
        let submission = input(
            "k1",
            vec![
                posting("", "USD", dec!(-1)),
                posting("b", "USD", dec!(1)),
            ],
        );
        assert_eq!(
            validate(&submission),
            Err(ValidationError::EmptyAccountCode { index: 0 })
        );
    }

    #[test]
    fn test_malformed_currency() {
        let submission = input(
            "k1",
            vec![
                posting("a", "usd", dec!(-1)),
                posting("b", "usd", dec!(1)),
            ],
        );
        assert_eq!(
            validate(&submission),
            Err(ValidationError::InvalidCurrency { index: 0 })
        );
    }

    #[test]
    fn test_balance_is_per_currency() {
        // Each currency group balances independently.
        let submission = input(
            "k1",
            vec![
                posting("a", "USD", dec!(-100)),
                posting("b", "USD", dec!(100)),
                posting("c", "EUR", dec!(-20)),
                posting("d", "EUR", dec!(20)),
            ],
        );
        assert!(validate(&submission).is_ok());

        let submission = input(
            "k2",
            vec![
                posting("a", "USD", dec!(-100)),
                posting("b", "EUR", dec!(100)),
            ],
        );
        assert!(matches!(
            validate(&submission),
            Err(ValidationError::Unbalanced { .. })
        ));
    }

    proptest! {
        /// Any nonzero amount mirrored across two accounts balances.
        #[test]
        fn prop_mirrored_amounts_validate(n in 1i64..1_000_000_000i64, scale in 0u32..6) {
            let amount = Decimal::new(n, scale);
            let submission = input(
                "key",
                vec![
                    posting("a", "USD", amount),
                    posting("b", "USD", -amount),
                ],
            );
            prop_assert!(validate(&submission).is_ok());
        }

        /// Dropping one posting from a balanced pair always unbalances it.
        #[test]
        fn prop_single_leg_never_validates(n in 1i64..1_000_000_000i64, scale in 0u32..6) {
            let amount = Decimal::new(n, scale);
            let submission = input("key", vec![posting("a", "USD", amount)]);
            let unbalanced = matches!(
                validate(&submission),
                Err(ValidationError::Unbalanced { .. })
            );
            prop_assert!(unbalanced);
        }
    }
}
