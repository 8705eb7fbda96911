//! Posting domain types for transaction submission and the canonical
//! posted representation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Transaction status.
///
/// A transaction is either waiting on its atomic commit, durably posted,
/// or rejected by validation. Posted and rejected are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Submitted but not yet committed.
    Pending,
    /// Durably committed to the ledger (immutable).
    Posted,
    /// Rejected by validation; no ledger effect.
    Rejected,
}

impl TransactionStatus {
    /// Returns true if the transaction can no longer change.
    #[must_use]
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Posted | Self::Rejected)
    }
}

/// One signed movement of value against one account, as submitted.
///
/// A positive amount increases the account balance, a negative amount
/// decreases it. Amounts travel as strings on the wire for precision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingInput {
    /// Caller-facing account code. The account is created on first reference.
    pub account_code: String,
    /// ISO 4217 currency code of the amount.
    pub currency: String,
    /// Signed amount; must be nonzero.
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
}

/// Input for posting a transaction.
#[derive(Debug, Clone, Deserialize)]
pub struct PostTransactionInput {
    /// Caller-supplied idempotency key, unique per ledger.
    pub idempotency_key: String,
    /// Optional caller-side reference.
    #[serde(default)]
    pub external_id: Option<String>,
    /// When the underlying economic event occurred. Defaults to submission time.
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
    /// Ordered postings; per-currency amounts must sum to zero.
    pub postings: Vec<PostingInput>,
}

/// A committed posting inside the canonical representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostedPosting {
    /// Posting ID.
    pub id: Uuid,
    /// Account ID the value moved against.
    pub account_id: Uuid,
    /// Caller-facing account code.
    pub account_code: String,
    /// Currency of the amount.
    pub currency: String,
    /// Signed amount.
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
}

/// Canonical representation of a posted transaction.
///
/// This is both the API response body and the webhook payload; receivers
/// deduplicate deliveries by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostedTransaction {
    /// Transaction ID.
    pub id: Uuid,
    /// Ledger the transaction belongs to.
    pub ledger_id: Uuid,
    /// The idempotency key it was posted under.
    pub idempotency_key: String,
    /// Optional caller-side reference.
    pub external_id: Option<String>,
    /// Always `posted` in this representation.
    pub status: TransactionStatus,
    /// When the underlying economic event occurred.
    pub occurred_at: DateTime<Utc>,
    /// When the transaction was committed.
    pub created_at: DateTime<Utc>,
    /// The committed postings, in submission order.
    pub postings: Vec<PostedPosting>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_status_finality() {
        assert!(!TransactionStatus::Pending.is_final());
        assert!(TransactionStatus::Posted.is_final());
        assert!(TransactionStatus::Rejected.is_final());
    }

    #[test]
    fn test_posting_input_amount_is_string_on_the_wire() {
        let input: PostingInput = serde_json::from_str(
            r#"{"account_code":"cash","currency":"USD","amount":"-100.50"}"#,
        )
        .unwrap();
        assert_eq!(input.amount, dec!(-100.50));

        let json = serde_json::to_string(&input).unwrap();
        assert!(json.contains(r#""amount":"-100.50""#));
    }

    #[test]
    fn test_posted_transaction_roundtrip() {
        let tx = PostedTransaction {
            id: Uuid::now_v7(),
            ledger_id: Uuid::now_v7(),
            idempotency_key: "k1".into(),
            external_id: Some("inv-42".into()),
            status: TransactionStatus::Posted,
            occurred_at: Utc::now(),
            created_at: Utc::now(),
            postings: vec![PostedPosting {
                id: Uuid::now_v7(),
                account_id: Uuid::now_v7(),
                account_code: "cash".into(),
                currency: "USD".into(),
                amount: dec!(100),
            }],
        };

        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["status"], "posted");
        let back: PostedTransaction = serde_json::from_value(json).unwrap();
        assert_eq!(back, tx);
    }
}
